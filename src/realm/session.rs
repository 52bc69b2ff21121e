//! Outbound notifications to a player's client. Transport framing is not our
//! concern; the session only buffers what should be sent, in order.

use crate::realm::types::{ItemGuid, PlayerGuid, ReputationRank};

/// Number of entries in the initial faction table.
pub const INITIAL_FACTION_TABLE_SIZE: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// An enchantment was applied (`caster` set) or removed from an item.
    EnchantmentLog {
        owner: PlayerGuid,
        caster: Option<PlayerGuid>,
        item_entry: u32,
        enchant_id: u32,
    },
    ItemTimeUpdate {
        item: ItemGuid,
        duration: u32,
    },
    /// Enchant ids of the three socket slots followed by the socket bonus slot.
    SocketGemsResult {
        item: ItemGuid,
        enchant_ids: [u32; 4],
    },
    ForcedReactions(Vec<(u32, ReputationRank)>),
    /// Changed faction first, then every other faction still pending.
    FactionStanding {
        increased: bool,
        entries: Vec<(u32, i32)>,
    },
    /// Dense table of `(flags, standing)` indexed by reputation list id.
    InitializeFactions(Vec<(u8, i32)>),
    FactionVisible {
        reputation_list_id: u32,
    },
}

#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<Notification>,
    loading: bool,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, notification: Notification) {
        self.pending.push(notification);
    }

    /// True while the character is still being loaded into the world.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn pending(&self) -> &[Notification] {
        &self.pending
    }

    pub fn drain(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }
}
