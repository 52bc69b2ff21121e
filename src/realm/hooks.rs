//! Script extension points.
//!
//! Every method has a default that allows the action and does nothing else, so
//! a server without scripts passes [`NoHooks`].

use crate::realm::catalog::ItemTemplate;
use crate::realm::item::Item;
use crate::realm::types::{ItemGuid, PlayerGuid, ReputationRank};

pub trait ScriptHooks {
    /// Called once a freshly created item has its template defaults applied.
    fn on_item_create(&self, _item: &Item, _template: &ItemTemplate, _owner: Option<PlayerGuid>) {}

    /// Called when a timed item runs out, before the owner destroys it.
    fn on_item_expire(&self, _owner: PlayerGuid, _template: &ItemTemplate) {}

    /// Gate for stripping a stale soulbound flag from a no-bind item at load.
    fn can_apply_soulbound_flag(&self, _item: &Item, _template: &ItemTemplate) -> bool {
        true
    }

    /// Gate for applying an item set spell right now (shapeshift forms may defer it).
    fn can_item_apply_equip_spell(&self, _player: PlayerGuid, _item: &Item) -> bool {
        true
    }

    /// Called for every item row deleted through the static delete path.
    fn on_item_deleted_from_db(&self, _item: ItemGuid) {}

    /// Veto point for a standing change. Returning false leaves all state untouched.
    fn on_reputation_change(
        &self,
        _player: PlayerGuid,
        _faction_id: u32,
        _standing: i32,
        _incremental: bool,
    ) -> bool {
        true
    }

    fn on_reputation_rank_change(
        &self,
        _player: PlayerGuid,
        _faction_id: u32,
        _new_rank: ReputationRank,
        _old_rank: ReputationRank,
        _increased: bool,
    ) {
    }
}

/// Hook set used when no scripts are loaded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl ScriptHooks for NoHooks {}
