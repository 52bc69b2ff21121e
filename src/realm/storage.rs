use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use sled::IVec;

use crate::realm::errors::RealmError;
use crate::realm::types::{ItemGuid, PlayerGuid, ITEM_SCHEMA_VERSION, REPUTATION_SCHEMA_VERSION};

const TREE_CHARACTERS: &str = "realm_characters";

/// Flat persisted item instance. Field order mirrors the row layout the
/// loader decodes positionally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemRow {
    pub creator: u32,
    pub gift_creator: u32,
    pub count: u32,
    pub duration: u32,
    /// Space separated spell charge counters, one per template spell slot.
    pub charges: String,
    pub flags: u32,
    /// Space separated `id duration charges` triples, one per enchantment slot.
    pub enchantments: String,
    pub random_property_id: i16,
    pub durability: u16,
    pub played_time: u32,
    pub text: String,
    pub guid: u32,
    pub entry: u32,
    pub owner: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReputationRow {
    pub faction: u16,
    pub standing: i32,
    pub flags: u16,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundRow {
    pub item: u32,
    pub recipient: u32,
    pub paid_money: u32,
    pub paid_extended_cost: u16,
}

/// One write against character storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    ReplaceItemInstance(ItemRow),
    UpdateItemInstance(ItemRow),
    /// Narrow corrective write issued while loading a self-healed item.
    UpdateItemInstanceOnLoad {
        item: ItemGuid,
        count: u32,
        duration: u32,
        flags: u32,
        durability: u32,
    },
    DeleteItemInstance {
        item: ItemGuid,
    },
    UpdateGiftOwner {
        owner: PlayerGuid,
        item: ItemGuid,
    },
    DeleteGift {
        item: ItemGuid,
    },
    InsertItemRefund(RefundRow),
    DeleteItemRefund {
        item: ItemGuid,
    },
    InsertItemBopTrade {
        item: ItemGuid,
        allowed: Vec<PlayerGuid>,
    },
    DeleteItemBopTrade {
        item: ItemGuid,
    },
    DeleteReputation {
        player: PlayerGuid,
        faction: u16,
    },
    InsertReputation {
        player: PlayerGuid,
        row: ReputationRow,
    },
}

/// Ordered batch of statements committed as one unit.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Transaction {
    statements: Vec<Statement>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }
}

/// Transactional writer for character data.
pub trait CharacterDb {
    fn commit(&self, transaction: Transaction) -> Result<(), RealmError>;

    /// Run a single statement in its own transaction.
    fn execute(&self, statement: Statement) -> Result<(), RealmError> {
        let mut transaction = Transaction::new();
        transaction.append(statement);
        self.commit(transaction)
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    schema_version: u8,
    record: T,
}

/// Sled-backed persistence for item instances and reputation rows. All records
/// share one tree, so a committed [`Transaction`] lands as a single atomic batch.
pub struct SledCharacterStore {
    _db: sled::Db,
    characters: sled::Tree,
}

impl SledCharacterStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RealmError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        Self::from_db(db)
    }

    /// In-memory store that vanishes when dropped.
    pub fn temporary() -> Result<Self, RealmError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, RealmError> {
        let characters = db.open_tree(TREE_CHARACTERS)?;
        Ok(Self {
            _db: db,
            characters,
        })
    }

    fn item_key(item: u32) -> Vec<u8> {
        format!("items:{:010}", item).into_bytes()
    }

    fn gift_key(item: u32) -> Vec<u8> {
        format!("gifts:{:010}", item).into_bytes()
    }

    fn refund_key(item: u32) -> Vec<u8> {
        format!("refunds:{:010}", item).into_bytes()
    }

    fn bop_trade_key(item: u32) -> Vec<u8> {
        format!("boptrade:{:010}", item).into_bytes()
    }

    fn reputation_prefix(player: PlayerGuid) -> Vec<u8> {
        format!("reputation:{:010}:", player.0).into_bytes()
    }

    fn reputation_key(player: PlayerGuid, faction: u16) -> Vec<u8> {
        format!("reputation:{:010}:{:05}", player.0, faction).into_bytes()
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, RealmError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, RealmError> {
        Ok(bincode::deserialize::<T>(bytes)?)
    }

    fn encode_item(row: &ItemRow) -> Result<Vec<u8>, RealmError> {
        Self::serialize(&Envelope {
            schema_version: ITEM_SCHEMA_VERSION,
            record: row,
        })
    }

    fn decode_item(bytes: &[u8]) -> Result<ItemRow, RealmError> {
        let envelope: Envelope<ItemRow> = Self::deserialize(bytes)?;
        if envelope.schema_version != ITEM_SCHEMA_VERSION {
            return Err(RealmError::SchemaMismatch {
                entity: "item",
                expected: ITEM_SCHEMA_VERSION,
                found: envelope.schema_version,
            });
        }
        Ok(envelope.record)
    }

    fn decode_reputation(bytes: &[u8]) -> Result<ReputationRow, RealmError> {
        let envelope: Envelope<ReputationRow> = Self::deserialize(bytes)?;
        if envelope.schema_version != REPUTATION_SCHEMA_VERSION {
            return Err(RealmError::SchemaMismatch {
                entity: "reputation",
                expected: REPUTATION_SCHEMA_VERSION,
                found: envelope.schema_version,
            });
        }
        Ok(envelope.record)
    }

    /// Fetch one item row by guid.
    pub fn item_row(&self, item: ItemGuid) -> Result<Option<ItemRow>, RealmError> {
        match self.characters.get(Self::item_key(item.0))? {
            Some(bytes) => Ok(Some(Self::decode_item(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All item rows owned by a character, in guid order.
    pub fn load_item_rows(&self, owner: PlayerGuid) -> Result<Vec<ItemRow>, RealmError> {
        let mut rows = Vec::new();
        for entry in self.characters.scan_prefix(b"items:") {
            let (_, value) = entry?;
            let row = Self::decode_item(&value)?;
            if row.owner == owner.0 {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    pub fn load_reputation_rows(&self, player: PlayerGuid) -> Result<Vec<ReputationRow>, RealmError> {
        self.characters
            .scan_prefix(Self::reputation_prefix(player))
            .map(|entry| {
                entry
                    .map_err(RealmError::from)
                    .and_then(|(_key, value)| Self::decode_reputation(&value))
            })
            .collect()
    }

    pub fn gift_owner(&self, item: ItemGuid) -> Result<Option<PlayerGuid>, RealmError> {
        match self.characters.get(Self::gift_key(item.0))? {
            Some(bytes) => Ok(Some(PlayerGuid(Self::deserialize(&bytes)?))),
            None => Ok(None),
        }
    }

    pub fn refund_row(&self, item: ItemGuid) -> Result<Option<RefundRow>, RealmError> {
        match self.characters.get(Self::refund_key(item.0))? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn bop_trade_allowed(&self, item: ItemGuid) -> Result<Option<Vec<PlayerGuid>>, RealmError> {
        match self.characters.get(Self::bop_trade_key(item.0))? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read through staged writes first so later statements in a transaction see earlier ones.
    fn staged_get(
        &self,
        staged: &BTreeMap<Vec<u8>, Option<Vec<u8>>>,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, RealmError> {
        if let Some(value) = staged.get(key) {
            return Ok(value.clone());
        }
        Ok(self.characters.get(key)?.map(|v: IVec| v.to_vec()))
    }

    fn stage(
        &self,
        staged: &mut BTreeMap<Vec<u8>, Option<Vec<u8>>>,
        statement: Statement,
    ) -> Result<(), RealmError> {
        match statement {
            Statement::ReplaceItemInstance(row) | Statement::UpdateItemInstance(row) => {
                staged.insert(Self::item_key(row.guid), Some(Self::encode_item(&row)?));
            }
            Statement::UpdateItemInstanceOnLoad {
                item,
                count,
                duration,
                flags,
                durability,
            } => {
                let key = Self::item_key(item.0);
                // Nothing to correct if the row is already gone.
                if let Some(bytes) = self.staged_get(staged, &key)? {
                    let mut row = Self::decode_item(&bytes)?;
                    row.count = count;
                    row.duration = duration;
                    row.flags = flags;
                    row.durability = durability.min(u16::MAX as u32) as u16;
                    staged.insert(key, Some(Self::encode_item(&row)?));
                }
            }
            Statement::DeleteItemInstance { item } => {
                staged.insert(Self::item_key(item.0), None);
            }
            Statement::UpdateGiftOwner { owner, item } => {
                staged.insert(Self::gift_key(item.0), Some(Self::serialize(&owner.0)?));
            }
            Statement::DeleteGift { item } => {
                staged.insert(Self::gift_key(item.0), None);
            }
            Statement::InsertItemRefund(row) => {
                staged.insert(Self::refund_key(row.item), Some(Self::serialize(&row)?));
            }
            Statement::DeleteItemRefund { item } => {
                staged.insert(Self::refund_key(item.0), None);
            }
            Statement::InsertItemBopTrade { item, allowed } => {
                staged.insert(Self::bop_trade_key(item.0), Some(Self::serialize(&allowed)?));
            }
            Statement::DeleteItemBopTrade { item } => {
                staged.insert(Self::bop_trade_key(item.0), None);
            }
            Statement::DeleteReputation { player, faction } => {
                staged.insert(Self::reputation_key(player, faction), None);
            }
            Statement::InsertReputation { player, row } => {
                let bytes = Self::serialize(&Envelope {
                    schema_version: REPUTATION_SCHEMA_VERSION,
                    record: row,
                })?;
                staged.insert(Self::reputation_key(player, row.faction), Some(bytes));
            }
        }
        Ok(())
    }
}

impl CharacterDb for SledCharacterStore {
    fn commit(&self, transaction: Transaction) -> Result<(), RealmError> {
        let count = transaction.len();
        let mut staged = BTreeMap::new();
        for statement in transaction.into_statements() {
            self.stage(&mut staged, statement)?;
        }

        let mut batch = sled::Batch::default();
        for (key, value) in staged {
            match value {
                Some(bytes) => batch.insert(key, bytes),
                None => batch.remove(key),
            }
        }
        self.characters.apply_batch(batch)?;
        self.characters.flush()?;
        debug!("Committed character transaction with {} statements", count);
        Ok(())
    }
}
