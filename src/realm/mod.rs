//! Item lifecycle and faction standing for a game realm server.
//!
//! Items carry their own persistence state and join their owner's update queue
//! when they change; the owner later flushes that queue into a single
//! [`Transaction`]. Reputation is tracked per character by [`ReputationMgr`].
//! Static game data comes from a read-only [`Catalog`].

pub mod catalog;
pub mod errors;
pub mod hooks;
pub mod item;
pub mod item_set;
pub mod player;
pub mod reputation;
pub mod session;
pub mod storage;
pub mod types;

pub use catalog::{Catalog, CatalogSnapshot, FactionEntry, ItemTemplate};
pub use errors::RealmError;
pub use hooks::{NoHooks, ScriptHooks};
pub use item::{
    generate_ench_suffix_factor, item_can_go_into_bag, save_queued_items, CreateOptions, Item,
    ItemGuidGenerator, Lifecycle, RefundData, TradeWindows,
};
pub use item_set::{add_item_set_item, remove_item_set_item, ItemSetEffect};
pub use player::{PlayerContext, UpdateQueue};
pub use reputation::{
    rank_to_standing, reputation_to_rank, FactionState, ReputationEnv, ReputationMgr,
    ReputationRates, POINTS_IN_RANK, REPUTATION_BOTTOM, REPUTATION_CAP,
};
pub use session::{Notification, Outbox};
pub use storage::{CharacterDb, SledCharacterStore, Statement, Transaction};
pub use types::*;
