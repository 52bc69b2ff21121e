use bitflags::bitflags;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ITEM_SCHEMA_VERSION: u8 = 1;
pub const REPUTATION_SCHEMA_VERSION: u8 = 1;

pub const MINUTE: u32 = 60;
pub const HOUR: u32 = 60 * MINUTE;

pub const MAX_ITEM_PROTO_SPELLS: usize = 5;
pub const MAX_ITEM_PROTO_SOCKETS: usize = 3;
pub const MAX_GEM_SOCKETS: usize = MAX_ITEM_PROTO_SOCKETS;
pub const MAX_ENCHANTMENT_SLOT: usize = 12;
/// Slots below this index are visible on inspection and produce enchant log notices.
pub const MAX_INSPECTED_ENCHANTMENT_SLOT: usize = 7;
pub const MAX_ITEM_SET_SPELLS: usize = 8;

pub const INVENTORY_SLOT_BAG_0: u8 = 255;
pub const EQUIPMENT_SLOT_END: u8 = 19;
pub const INVENTORY_SLOT_BAG_START: u8 = 19;
pub const INVENTORY_SLOT_BAG_END: u8 = 23;
pub const BANK_SLOT_BAG_START: u8 = 67;
pub const BANK_SLOT_BAG_END: u8 = 74;

/// Seconds since the unix epoch, the clock every played-time counter is measured against.
pub fn game_time() -> i64 {
    Utc::now().timestamp()
}

/// Low counter of a character guid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerGuid(pub u32);

impl fmt::Display for PlayerGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player-{}", self.0)
    }
}

/// Low counter of an item instance guid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemGuid(pub u32);

impl ItemGuid {
    /// Guid handed to temporary items that never reach storage.
    pub const TEMPORARY: ItemGuid = ItemGuid(0xFFFF_FFFF);
}

impl fmt::Display for ItemGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item-{}", self.0)
    }
}

/// Where an item currently sits: `bag == INVENTORY_SLOT_BAG_0` means the backpack
/// or an equipment slot, anything else is the slot of the containing bag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ItemPosition {
    pub bag: u8,
    pub slot: u8,
}

impl ItemPosition {
    pub fn new(bag: u8, slot: u8) -> Self {
        Self { bag, slot }
    }

    pub fn is_equipment(&self) -> bool {
        self.bag == INVENTORY_SLOT_BAG_0 && self.slot < EQUIPMENT_SLOT_END
    }

    /// Slots that can only hold bags (character bag bar and bank bag bar).
    pub fn is_bag_slot(&self) -> bool {
        self.bag == INVENTORY_SLOT_BAG_0
            && ((INVENTORY_SLOT_BAG_START..INVENTORY_SLOT_BAG_END).contains(&self.slot)
                || (BANK_SLOT_BAG_START..BANK_SLOT_BAG_END).contains(&self.slot))
    }
}

impl Default for ItemPosition {
    fn default() -> Self {
        Self {
            bag: INVENTORY_SLOT_BAG_0,
            slot: 0,
        }
    }
}

/// Enchantment slots on an item instance, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EnchantmentSlot {
    Perm = 0,
    Temp = 1,
    Sock1 = 2,
    Sock2 = 3,
    Sock3 = 4,
    Bonus = 5,
    Prismatic = 6,
    Prop0 = 7,
    Prop1 = 8,
    Prop2 = 9,
    Prop3 = 10,
    Prop4 = 11,
}

impl EnchantmentSlot {
    pub const ALL: [EnchantmentSlot; MAX_ENCHANTMENT_SLOT] = [
        EnchantmentSlot::Perm,
        EnchantmentSlot::Temp,
        EnchantmentSlot::Sock1,
        EnchantmentSlot::Sock2,
        EnchantmentSlot::Sock3,
        EnchantmentSlot::Bonus,
        EnchantmentSlot::Prismatic,
        EnchantmentSlot::Prop0,
        EnchantmentSlot::Prop1,
        EnchantmentSlot::Prop2,
        EnchantmentSlot::Prop3,
        EnchantmentSlot::Prop4,
    ];
    pub const SOCKETS: [EnchantmentSlot; MAX_GEM_SOCKETS] = [
        EnchantmentSlot::Sock1,
        EnchantmentSlot::Sock2,
        EnchantmentSlot::Sock3,
    ];
    pub const PROPERTIES: [EnchantmentSlot; 5] = [
        EnchantmentSlot::Prop0,
        EnchantmentSlot::Prop1,
        EnchantmentSlot::Prop2,
        EnchantmentSlot::Prop3,
        EnchantmentSlot::Prop4,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_inspected(self) -> bool {
        self.index() < MAX_INSPECTED_ENCHANTMENT_SLOT
    }
}

/// One enchantment slot's persisted triple.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnchantmentData {
    pub id: u32,
    pub duration: u32,
    pub charges: u32,
}

bitflags! {
    /// Per-instance item flags, persisted with the instance row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ItemFieldFlags: u32 {
        const SOULBOUND = 0x0000_0001;
        const TRANSLATED = 0x0000_0002;
        const UNLOCKED = 0x0000_0004;
        const WRAPPED = 0x0000_0008;
        const BROKEN = 0x0000_0020;
        const BOP_TRADEABLE = 0x0000_0100;
        const READABLE = 0x0000_0200;
        const REFUNDABLE = 0x0000_1000;
    }
}

bitflags! {
    /// Static template flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TemplateFlags: u32 {
        const CONJURED = 0x0000_0002;
        const HAS_LOOT = 0x0000_0004;
        const UNIQUE_EQUIPPABLE = 0x0008_0000;
        const BOUND_TO_ACCOUNT = 0x0800_0000;
    }
}

bitflags! {
    /// Which specialised bags an item may be stored in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BagFamily: u32 {
        const ARROWS = 0x0000_0001;
        const BULLETS = 0x0000_0002;
        const SOUL_SHARDS = 0x0000_0004;
        const LEATHERWORKING_SUPP = 0x0000_0008;
        const INSCRIPTION_SUPP = 0x0000_0010;
        const HERBS = 0x0000_0020;
        const ENCHANTING_SUPP = 0x0000_0040;
        const ENGINEERING_SUPP = 0x0000_0080;
        const KEYS = 0x0000_0100;
        const GEMS = 0x0000_0200;
        const MINING_SUPP = 0x0000_0400;
    }
}

bitflags! {
    /// Per-faction reputation state flags, persisted with the reputation row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FactionFlags: u32 {
        const VISIBLE = 0x01;
        const AT_WAR = 0x02;
        const HIDDEN = 0x04;
        const INVISIBLE_FORCED = 0x08;
        const PEACE_FORCED = 0x10;
        const INACTIVE = 0x20;
        const RIVAL = 0x40;
        const SPECIAL = 0x80;
    }
}

/// Enchantment entry `slot` bit: applying it soulbinds the item.
pub const ENCHANTMENT_CAN_SOULBOUND: u32 = 0x01;

pub mod item_class {
    pub const CONSUMABLE: u32 = 0;
    pub const CONTAINER: u32 = 1;
    pub const WEAPON: u32 = 2;
    pub const GEM: u32 = 3;
    pub const ARMOR: u32 = 4;
    pub const REAGENT: u32 = 5;
    pub const PROJECTILE: u32 = 6;
    pub const TRADE_GOODS: u32 = 7;
    pub const QUIVER: u32 = 11;
    pub const QUEST: u32 = 12;
}

pub mod container_subclass {
    pub const CONTAINER: u32 = 0;
    pub const SOUL: u32 = 1;
    pub const HERB: u32 = 2;
    pub const ENCHANTING: u32 = 3;
    pub const ENGINEERING: u32 = 4;
    pub const GEM: u32 = 5;
    pub const MINING: u32 = 6;
    pub const LEATHERWORKING: u32 = 7;
    pub const INSCRIPTION: u32 = 8;
}

pub mod quiver_subclass {
    pub const QUIVER: u32 = 2;
    pub const AMMO_POUCH: u32 = 3;
}

pub mod trade_goods_subclass {
    pub const ARMOR_ENCHANTMENT: u32 = 14;
    pub const WEAPON_ENCHANTMENT: u32 = 15;
}

pub mod weapon_subclass {
    pub const AXE: u32 = 0;
    pub const AXE2: u32 = 1;
    pub const BOW: u32 = 2;
    pub const GUN: u32 = 3;
    pub const MACE: u32 = 4;
    pub const MACE2: u32 = 5;
    pub const POLEARM: u32 = 6;
    pub const SWORD: u32 = 7;
    pub const SWORD2: u32 = 8;
    pub const STAFF: u32 = 10;
    pub const DAGGER: u32 = 15;
    pub const THROWN: u32 = 16;
    pub const SPEAR: u32 = 17;
    pub const CROSSBOW: u32 = 18;
    pub const WAND: u32 = 19;
}

pub mod armor_subclass {
    pub const CLOTH: u32 = 1;
    pub const LEATHER: u32 = 2;
    pub const MAIL: u32 = 3;
    pub const PLATE: u32 = 4;
    pub const SHIELD: u32 = 6;
}

pub mod inventory_type {
    pub const NON_EQUIP: u8 = 0;
    pub const HEAD: u8 = 1;
    pub const NECK: u8 = 2;
    pub const SHOULDERS: u8 = 3;
    pub const BODY: u8 = 4;
    pub const CHEST: u8 = 5;
    pub const WAIST: u8 = 6;
    pub const LEGS: u8 = 7;
    pub const FEET: u8 = 8;
    pub const WRISTS: u8 = 9;
    pub const HANDS: u8 = 10;
    pub const FINGER: u8 = 11;
    pub const TRINKET: u8 = 12;
    pub const WEAPON: u8 = 13;
    pub const SHIELD: u8 = 14;
    pub const RANGED: u8 = 15;
    pub const CLOAK: u8 = 16;
    pub const TWO_HAND_WEAPON: u8 = 17;
    pub const BAG: u8 = 18;
    pub const TABARD: u8 = 19;
    pub const ROBE: u8 = 20;
    pub const WEAPON_MAIN_HAND: u8 = 21;
    pub const WEAPON_OFF_HAND: u8 = 22;
    pub const HOLDABLE: u8 = 23;
    pub const AMMO: u8 = 24;
    pub const THROWN: u8 = 25;
    pub const RANGED_RIGHT: u8 = 26;
    pub const QUIVER: u8 = 27;
    pub const RELIC: u8 = 28;
}

pub mod item_quality {
    pub const POOR: u32 = 0;
    pub const NORMAL: u32 = 1;
    pub const UNCOMMON: u32 = 2;
    pub const RARE: u32 = 3;
    pub const EPIC: u32 = 4;
    pub const LEGENDARY: u32 = 5;
    pub const ARTIFACT: u32 = 6;
}

/// Skill line whose abilities may target enchanting vellum.
pub const SKILL_ENCHANTING: u32 = 333;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Bonding {
    #[default]
    NoBind,
    PickedUp,
    Equipped,
    Used,
    Quest,
}

/// Persistence state of an item instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemUpdateState {
    Unchanged,
    Changed,
    New,
    Removed,
}

/// Outcome of a stacking or placement check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryResult {
    Ok,
    AlreadyLooted,
    CantStack,
}

/// The eight reputation tiers, ordered from worst to best.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ReputationRank {
    Hated = 0,
    Hostile = 1,
    Unfriendly = 2,
    Neutral = 3,
    Friendly = 4,
    Honored = 5,
    Revered = 6,
    Exalted = 7,
}

impl ReputationRank {
    pub const ALL: [ReputationRank; 8] = [
        ReputationRank::Hated,
        ReputationRank::Hostile,
        ReputationRank::Unfriendly,
        ReputationRank::Neutral,
        ReputationRank::Friendly,
        ReputationRank::Honored,
        ReputationRank::Revered,
        ReputationRank::Exalted,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Ranks past `Exalted` saturate.
    pub fn from_index(index: u32) -> Self {
        Self::ALL[(index as usize).min(Self::ALL.len() - 1)]
    }
}

impl fmt::Display for ReputationRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReputationRank::Hated => "Hated",
            ReputationRank::Hostile => "Hostile",
            ReputationRank::Unfriendly => "Unfriendly",
            ReputationRank::Neutral => "Neutral",
            ReputationRank::Friendly => "Friendly",
            ReputationRank::Honored => "Honored",
            ReputationRank::Revered => "Revered",
            ReputationRank::Exalted => "Exalted",
        };
        f.write_str(name)
    }
}
