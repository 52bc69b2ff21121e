//! The slice of a character the item and reputation engines talk to: identity,
//! the pending item save queue, equip-spell bookkeeping and the client session.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::realm::item_set::ItemSetEffect;
use crate::realm::session::Outbox;
use crate::realm::types::{ItemGuid, ItemPosition, PlayerGuid};

/// Items waiting for the next inventory save, in insertion order.
///
/// Removing an entry nulls it instead of shifting, so positions handed out by
/// [`UpdateQueue::push`] stay valid until the queue is drained.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    entries: Vec<Option<ItemGuid>>,
    blocked: bool,
}

impl UpdateQueue {
    pub fn push(&mut self, item: ItemGuid) -> usize {
        self.entries.push(Some(item));
        self.entries.len() - 1
    }

    /// Checks a stored position against the live queue. Stale positions read as not queued.
    pub fn holds(&self, position: usize, item: ItemGuid) -> bool {
        matches!(self.entries.get(position), Some(Some(queued)) if *queued == item)
    }

    pub fn clear_at(&mut self, position: usize, item: ItemGuid) -> bool {
        if !self.holds(position, item) {
            return false;
        }
        self.entries[position] = None;
        true
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// While blocked, items neither join nor leave the queue.
    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    pub fn queued(&self) -> impl Iterator<Item = ItemGuid> + '_ {
        self.entries.iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.queued().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the queue, returning the live entries in order.
    pub fn take(&mut self) -> Vec<ItemGuid> {
        std::mem::take(&mut self.entries).into_iter().flatten().collect()
    }
}

#[derive(Debug)]
pub struct PlayerContext {
    guid: PlayerGuid,
    race_mask: u32,
    class_mask: u32,
    total_played_time: u32,
    loot_target: Option<ItemGuid>,
    unequip_locked: HashSet<ItemPosition>,
    skills: HashMap<u32, u32>,
    item_update_queue: UpdateQueue,
    refundable_items: BTreeSet<ItemGuid>,
    tradeable_items: BTreeSet<ItemGuid>,
    pub(crate) item_set_effects: Vec<Option<ItemSetEffect>>,
    active_equip_spells: BTreeSet<u32>,
    session: Outbox,
}

impl PlayerContext {
    pub fn new(guid: PlayerGuid, race_mask: u32, class_mask: u32) -> Self {
        Self {
            guid,
            race_mask,
            class_mask,
            total_played_time: 0,
            loot_target: None,
            unequip_locked: HashSet::new(),
            skills: HashMap::new(),
            item_update_queue: UpdateQueue::default(),
            refundable_items: BTreeSet::new(),
            tradeable_items: BTreeSet::new(),
            item_set_effects: Vec::new(),
            active_equip_spells: BTreeSet::new(),
            session: Outbox::new(),
        }
    }

    pub fn guid(&self) -> PlayerGuid {
        self.guid
    }

    pub fn race_mask(&self) -> u32 {
        self.race_mask
    }

    pub fn class_mask(&self) -> u32 {
        self.class_mask
    }

    pub fn total_played_time(&self) -> u32 {
        self.total_played_time
    }

    pub fn set_total_played_time(&mut self, seconds: u32) {
        self.total_played_time = seconds;
    }

    /// Item currently opened as a loot source, if any.
    pub fn loot_target(&self) -> Option<ItemGuid> {
        self.loot_target
    }

    pub fn set_loot_target(&mut self, item: Option<ItemGuid>) {
        self.loot_target = item;
    }

    pub fn lock_unequip(&mut self, position: ItemPosition, locked: bool) {
        if locked {
            self.unequip_locked.insert(position);
        } else {
            self.unequip_locked.remove(&position);
        }
    }

    pub fn can_unequip(&self, position: ItemPosition) -> bool {
        !self.unequip_locked.contains(&position)
    }

    pub fn skill_value(&self, skill: u32) -> u32 {
        self.skills.get(&skill).copied().unwrap_or(0)
    }

    pub fn set_skill(&mut self, skill: u32, value: u32) {
        self.skills.insert(skill, value);
    }

    pub fn item_update_queue(&self) -> &UpdateQueue {
        &self.item_update_queue
    }

    pub fn item_update_queue_mut(&mut self) -> &mut UpdateQueue {
        &mut self.item_update_queue
    }

    pub fn add_refundable_item(&mut self, item: ItemGuid) {
        self.refundable_items.insert(item);
    }

    pub fn delete_refund_reference(&mut self, item: ItemGuid) {
        self.refundable_items.remove(&item);
    }

    pub fn refundable_items(&self) -> &BTreeSet<ItemGuid> {
        &self.refundable_items
    }

    pub fn add_tradeable_item(&mut self, item: ItemGuid) {
        self.tradeable_items.insert(item);
    }

    pub fn remove_tradeable_item(&mut self, item: ItemGuid) {
        self.tradeable_items.remove(&item);
    }

    pub fn tradeable_items(&self) -> &BTreeSet<ItemGuid> {
        &self.tradeable_items
    }

    pub fn apply_equip_spell(&mut self, spell_id: u32, apply: bool) {
        if apply {
            self.active_equip_spells.insert(spell_id);
        } else {
            self.active_equip_spells.remove(&spell_id);
        }
    }

    pub fn has_equip_spell(&self, spell_id: u32) -> bool {
        self.active_equip_spells.contains(&spell_id)
    }

    pub fn item_set_effects(&self) -> impl Iterator<Item = &ItemSetEffect> {
        self.item_set_effects.iter().flatten()
    }

    pub fn session(&self) -> &Outbox {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Outbox {
        &mut self.session
    }
}
