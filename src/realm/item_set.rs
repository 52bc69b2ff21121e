//! Item set bonus tracking.
//!
//! Each player keeps one [`ItemSetEffect`] per set that currently has equipped
//! pieces. Effects live in a slot vector: a new set takes the first empty slot,
//! and a set whose last piece is unequipped leaves its slot empty rather than
//! shifting the others.

use log::error;

use crate::realm::catalog::{Catalog, ItemTemplate};
use crate::realm::hooks::ScriptHooks;
use crate::realm::item::Item;
use crate::realm::player::PlayerContext;
use crate::realm::types::MAX_ITEM_SET_SPELLS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSetEffect {
    pub set_id: u32,
    pub item_count: u32,
    /// Granted spell ids. Empty entries are free for the next threshold crossing.
    pub spells: [Option<u32>; MAX_ITEM_SET_SPELLS],
}

impl ItemSetEffect {
    fn new(set_id: u32) -> Self {
        Self {
            set_id,
            item_count: 0,
            spells: [None; MAX_ITEM_SET_SPELLS],
        }
    }

    pub fn has_spell(&self, spell_id: u32) -> bool {
        self.spells.iter().any(|s| *s == Some(spell_id))
    }
}

fn find_effect_slot(player: &PlayerContext, set_id: u32) -> Option<usize> {
    player
        .item_set_effects
        .iter()
        .position(|slot| matches!(slot, Some(eff) if eff.set_id == set_id))
}

/// Count one more equipped piece of `item`'s set and grant any spell whose
/// threshold is now met.
pub fn add_item_set_item(
    player: &mut PlayerContext,
    item: &Item,
    catalog: &Catalog,
    hooks: &dyn ScriptHooks,
) {
    let template = item.template();
    let set_id = template.item_set;

    let Some(set) = catalog.item_set(set_id) else {
        error!(
            "Item set {} for item (id {}) not found, mods not applied.",
            set_id, template.item_id
        );
        return;
    };

    if set.required_skill_id != 0
        && player.skill_value(set.required_skill_id) < set.required_skill_value
    {
        return;
    }

    let index = match find_effect_slot(player, set_id) {
        Some(index) => index,
        None => {
            let effect = Some(ItemSetEffect::new(set_id));
            match player.item_set_effects.iter().position(Option::is_none) {
                Some(free) => {
                    player.item_set_effects[free] = effect;
                    free
                }
                None => {
                    player.item_set_effects.push(effect);
                    player.item_set_effects.len() - 1
                }
            }
        }
    };

    let mut to_apply = Vec::new();
    if let Some(effect) = player.item_set_effects[index].as_mut() {
        effect.item_count += 1;

        for set_spell in set.spells.iter().take(MAX_ITEM_SET_SPELLS) {
            if set_spell.spell_id == 0 || set_spell.threshold > effect.item_count {
                continue;
            }
            if effect.has_spell(set_spell.spell_id) {
                continue;
            }
            let Some(free) = effect.spells.iter().position(Option::is_none) else {
                continue;
            };
            if catalog.spell(set_spell.spell_id).is_none() {
                error!(
                    "Unknown spell id {} in items set {} effects",
                    set_spell.spell_id, set_id
                );
                continue;
            }
            effect.spells[free] = Some(set_spell.spell_id);
            to_apply.push(set_spell.spell_id);
        }
    }

    // A spell that does not fit the current form is recorded but applied on form change.
    if !to_apply.is_empty() && hooks.can_item_apply_equip_spell(player.guid(), item) {
        for spell_id in to_apply {
            player.apply_equip_spell(spell_id, true);
        }
    }
}

/// Count one fewer equipped piece of `template`'s set, revoking spells that
/// fall below threshold and dropping the effect when no pieces remain.
pub fn remove_item_set_item(player: &mut PlayerContext, template: &ItemTemplate, catalog: &Catalog) {
    let set_id = template.item_set;

    let Some(set) = catalog.item_set(set_id) else {
        error!(
            "Item set #{} for item #{} not found, mods not removed.",
            set_id, template.item_id
        );
        return;
    };

    // The set may have been skipped at equip time for lack of skill.
    let Some(index) = find_effect_slot(player, set_id) else {
        return;
    };

    let mut to_revoke = Vec::new();
    let emptied = match player.item_set_effects[index].as_mut() {
        Some(effect) => {
            effect.item_count = effect.item_count.saturating_sub(1);
            for set_spell in set.spells.iter().take(MAX_ITEM_SET_SPELLS) {
                if set_spell.spell_id == 0 || set_spell.threshold <= effect.item_count {
                    continue;
                }
                if let Some(slot) = effect
                    .spells
                    .iter_mut()
                    .find(|s| **s == Some(set_spell.spell_id))
                {
                    *slot = None;
                    to_revoke.push(set_spell.spell_id);
                }
            }
            effect.item_count == 0
        }
        None => false,
    };

    for spell_id in to_revoke {
        player.apply_equip_spell(spell_id, false);
    }

    if emptied {
        player.item_set_effects[index] = None;
    }
}
