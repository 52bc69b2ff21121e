//! Item instances: one mutable, persisted record per owned item.
//!
//! An [`Item`] tracks its own persistence state ([`ItemUpdateState`]) and, while
//! dirty, a position in its owner's save queue. Operations that need the owner,
//! static data, script hooks or the database take them explicitly; the item
//! never holds a reference to any of them.
//!
//! Destruction is expressed through ownership. State transitions that end an
//! item's life return [`Lifecycle::Discarded`], and the caller drops the value.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, error, warn};
use rand::Rng;

use crate::logutil::escape_log;
use crate::realm::catalog::{Catalog, EnchantmentEntry, ItemTemplate, SpellInfo};
use crate::realm::errors::RealmError;
use crate::realm::hooks::ScriptHooks;
use crate::realm::item_set::{add_item_set_item, remove_item_set_item};
use crate::realm::player::PlayerContext;
use crate::realm::session::Notification;
use crate::realm::storage::{CharacterDb, ItemRow, RefundRow, Statement, Transaction};
use crate::realm::types::{
    armor_subclass, container_subclass, game_time, inventory_type, item_class, item_quality,
    quiver_subclass, weapon_subclass, BagFamily, Bonding, EnchantmentData, EnchantmentSlot,
    InventoryResult, ItemFieldFlags, ItemGuid, ItemPosition, ItemUpdateState, PlayerGuid,
    ENCHANTMENT_CAN_SOULBOUND, HOUR, MAX_ENCHANTMENT_SLOT, MAX_GEM_SOCKETS, MAX_ITEM_PROTO_SPELLS,
    SKILL_ENCHANTING,
};

/// Values per enchantment slot in the persisted enchantment string.
const ENCHANTMENT_FIELDS: usize = 3;

/// What the caller must do with an item after a state transition.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Alive,
    /// The item no longer exists and must be dropped.
    Discarded,
}

/// Played-time windows after which refunds and soulbound trading lapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeWindows {
    pub refund: u32,
    pub bop_trade: u32,
}

impl Default for TradeWindows {
    fn default() -> Self {
        Self {
            refund: 2 * HOUR,
            bop_trade: 2 * HOUR,
        }
    }
}

/// Hands out instance guids for new items.
#[derive(Debug)]
pub struct ItemGuidGenerator {
    next: u32,
}

impl ItemGuidGenerator {
    pub fn new(next: u32) -> Self {
        Self { next: next.max(1) }
    }

    pub fn generate(&mut self) -> ItemGuid {
        if self.next >= ItemGuid::TEMPORARY.0 {
            panic!("Item guid overflow, no more guids can be generated");
        }
        let guid = ItemGuid(self.next);
        self.next += 1;
        guid
    }
}

/// Knobs for [`Item::create_item`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Copies keep their source's random properties instead of rolling new ones.
    pub clone: bool,
    /// Positive ids index the property table, negative ids the suffix table.
    pub random_property_id: i32,
    /// Temporary items share a fixed guid and are never saved.
    pub temporary: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefundData {
    pub recipient: u32,
    pub paid_money: u32,
    pub paid_extended_cost: u32,
}

#[derive(Debug, Clone)]
pub struct Item {
    guid: ItemGuid,
    template: Arc<ItemTemplate>,
    owner: Option<PlayerGuid>,
    creator: u32,
    gift_creator: u32,
    count: u32,
    durability: u32,
    max_durability: u32,
    duration: u32,
    spell_charges: [i32; MAX_ITEM_PROTO_SPELLS],
    flags: ItemFieldFlags,
    enchantments: [EnchantmentData; MAX_ENCHANTMENT_SLOT],
    random_property_id: i32,
    property_seed: u32,
    create_played_time: u32,
    text: String,
    state: ItemUpdateState,
    queue_pos: Option<usize>,
    position: ItemPosition,
    contained_items: u32,
    loot_generated: bool,
    last_played_time_update: i64,
    refund: RefundData,
    allowed_traders: HashSet<PlayerGuid>,
}

impl Item {
    fn with_template(guid: ItemGuid, template: Arc<ItemTemplate>) -> Self {
        Self {
            guid,
            template,
            owner: None,
            creator: 0,
            gift_creator: 0,
            count: 1,
            durability: 0,
            max_durability: 0,
            duration: 0,
            spell_charges: [0; MAX_ITEM_PROTO_SPELLS],
            flags: ItemFieldFlags::empty(),
            enchantments: [EnchantmentData::default(); MAX_ENCHANTMENT_SLOT],
            random_property_id: 0,
            property_seed: 0,
            create_played_time: 0,
            text: String::new(),
            state: ItemUpdateState::New,
            queue_pos: None,
            position: ItemPosition::default(),
            contained_items: 0,
            loot_generated: false,
            last_played_time_update: game_time(),
            refund: RefundData::default(),
            allowed_traders: HashSet::new(),
        }
    }

    /// Build a fresh item from its template. Returns `None` when the template is unknown.
    pub fn create(
        guid: ItemGuid,
        entry: u32,
        owner: Option<&PlayerContext>,
        catalog: &Catalog,
        hooks: &dyn ScriptHooks,
    ) -> Option<Self> {
        let template = catalog.item_template(entry)?;
        let mut item = Self::with_template(guid, Arc::clone(&template));
        item.owner = owner.map(PlayerContext::guid);
        item.max_durability = template.max_durability;
        item.durability = template.max_durability;
        for (index, charges) in item.spell_charges.iter_mut().enumerate() {
            *charges = template.spell(index).map(|s| s.charges).unwrap_or(0);
        }
        item.duration = template.duration;
        hooks.on_item_create(&item, &template, item.owner);
        Some(item)
    }

    /// Create `count` items of `entry`, clamped to the stack size.
    ///
    /// # Panics
    ///
    /// Panics if `entry` has no template. Callers validate ids before this point,
    /// so a miss means corrupted upstream state.
    pub fn create_item(
        entry: u32,
        count: u32,
        owner: Option<&mut PlayerContext>,
        options: CreateOptions,
        catalog: &Catalog,
        hooks: &dyn ScriptHooks,
        guids: &mut ItemGuidGenerator,
    ) -> Option<Self> {
        if count < 1 {
            return None;
        }

        let Some(template) = catalog.item_template(entry) else {
            panic!("Item template {} missing at item creation", entry);
        };
        let count = count.min(template.max_stack_size());

        let guid = if options.temporary {
            ItemGuid::TEMPORARY
        } else {
            guids.generate()
        };

        let mut item = Self::create(guid, entry, owner.as_deref(), catalog, hooks)?;
        item.count = count;
        if !options.clone {
            let random_id = if options.random_property_id != 0 {
                options.random_property_id
            } else {
                Self::generate_item_random_property_id(entry, catalog, &mut rand::thread_rng())
            };
            item.set_item_random_properties(random_id, catalog, owner);
        } else if options.random_property_id != 0 {
            item.set_item_random_properties(options.random_property_id, catalog, owner);
        }
        Some(item)
    }

    /// Copy this item into a new instance. Refund and soulbound-trade eligibility
    /// do not carry over.
    pub fn clone_item(
        &self,
        count: u32,
        owner: Option<&mut PlayerContext>,
        catalog: &Catalog,
        hooks: &dyn ScriptHooks,
        guids: &mut ItemGuidGenerator,
    ) -> Option<Self> {
        // Without an owner there is no save queue to record the property change in.
        let random_property_id = if owner.is_some() {
            self.random_property_id
        } else {
            0
        };
        let options = CreateOptions {
            clone: true,
            random_property_id,
            temporary: false,
        };
        let mut copy = Self::create_item(self.entry(), count, owner, options, catalog, hooks, guids)?;
        copy.creator = self.creator;
        copy.gift_creator = self.gift_creator;
        copy.flags = self.flags - (ItemFieldFlags::REFUNDABLE | ItemFieldFlags::BOP_TRADEABLE);
        copy.duration = self.duration;
        Some(copy)
    }

    /// Rebuild an item from its stored row, repairing stale fields on the way.
    ///
    /// Repairs of stack count, duration, binding and durability are written back at once with
    /// a narrow update so they do not recur on every load.
    pub fn load_from_db(
        row: &ItemRow,
        owner: Option<PlayerGuid>,
        catalog: &Catalog,
        hooks: &dyn ScriptHooks,
        db: &dyn CharacterDb,
    ) -> Option<Self> {
        let guid = ItemGuid(row.guid);
        let Some(template) = catalog.item_template(row.entry) else {
            error!("Invalid entry {} for item {}. Refusing to load.", row.entry, guid);
            return None;
        };

        let mut item = Self::with_template(guid, Arc::clone(&template));
        item.owner = owner;
        let mut need_save = false;

        item.creator = row.creator;
        item.gift_creator = row.gift_creator;
        item.count = row.count.clamp(1, template.max_stack_size());
        if item.count != row.count {
            warn!(
                "Item {} (entry {}) had stack count {}, clamped to {}.",
                guid, row.entry, row.count, item.count
            );
            need_save = true;
        }

        item.duration = row.duration;
        if (template.duration == 0) != (row.duration == 0) {
            item.duration = template.duration;
            need_save = true;
        }

        let tokens: Vec<&str> = row.charges.split_whitespace().collect();
        if tokens.len() == MAX_ITEM_PROTO_SPELLS {
            for (index, token) in tokens.iter().enumerate() {
                match token.parse::<i32>() {
                    Ok(charges) => item.spell_charges[index] = charges,
                    Err(_) => warn!(
                        "Invalid charge info '{}' for item {}, charge data not loaded.",
                        escape_log(token),
                        guid
                    ),
                }
            }
        } else {
            warn!(
                "Charge data '{}' for item {} has {} entries, expected {}. Skipped.",
                escape_log(&row.charges),
                guid,
                tokens.len(),
                MAX_ITEM_PROTO_SPELLS
            );
        }

        item.flags = ItemFieldFlags::from_bits_retain(row.flags);
        if item.is_soulbound()
            && template.bonding == Bonding::NoBind
            && hooks.can_apply_soulbound_flag(&item, &template)
        {
            item.flags.remove(ItemFieldFlags::SOULBOUND);
            need_save = true;
        }

        if !item.load_enchantments(&row.enchantments) {
            warn!(
                "Invalid enchantment data '{}' for item {}. Forcing partial load.",
                escape_log(&row.enchantments),
                guid
            );
        }

        item.random_property_id = i32::from(row.random_property_id);
        if item.random_property_id < 0 {
            item.update_item_suffix_factor(catalog);
        }

        item.durability = u32::from(row.durability);
        item.max_durability = template.max_durability;
        // Wrapped gifts keep whatever durability they were wrapped with.
        if item.durability > template.max_durability && !item.is_wrapped() {
            item.durability = template.max_durability;
            need_save = true;
        }

        item.create_played_time = row.played_time;
        item.text = row.text.clone();
        if !item.text.is_empty() {
            debug!("Item {} carries text '{}'", guid, escape_log(&item.text));
        }
        item.state = ItemUpdateState::Unchanged;

        if need_save {
            let fix = Statement::UpdateItemInstanceOnLoad {
                item: guid,
                count: item.count,
                duration: item.duration,
                flags: item.flags.bits(),
                durability: item.durability,
            };
            if let Err(e) = db.execute(fix) {
                error!("Failed to write load fixes for item {}: {}", guid, e);
            }
        }

        Some(item)
    }

    fn load_enchantments(&mut self, data: &str) -> bool {
        let expected = MAX_ENCHANTMENT_SLOT * ENCHANTMENT_FIELDS;
        let tokens: Vec<&str> = data.split_whitespace().collect();
        for (index, token) in tokens.iter().take(expected).enumerate() {
            let Ok(value) = token.parse::<u32>() else {
                return false;
            };
            let slot = &mut self.enchantments[index / ENCHANTMENT_FIELDS];
            match index % ENCHANTMENT_FIELDS {
                0 => slot.id = value,
                1 => slot.duration = value,
                _ => slot.charges = value,
            }
        }
        tokens.len() == expected
    }

    /// Flat row in storage layout.
    pub fn to_row(&self) -> ItemRow {
        let charges: String = self.spell_charges.iter().map(|c| format!("{} ", c)).collect();
        let enchantments: String = self
            .enchantments
            .iter()
            .map(|e| format!("{} {} {} ", e.id, e.duration, e.charges))
            .collect();
        ItemRow {
            creator: self.creator,
            gift_creator: self.gift_creator,
            count: self.count,
            duration: self.duration,
            charges,
            flags: self.flags.bits(),
            enchantments,
            random_property_id: self.random_property_id as i16,
            durability: self.durability.min(u32::from(u16::MAX)) as u16,
            played_time: self.create_played_time,
            text: self.text.clone(),
            guid: self.guid.0,
            entry: self.entry(),
            owner: self.owner.map(|o| o.0).unwrap_or(0),
        }
    }

    /// Write (or delete) this item according to its state.
    ///
    /// With a supplied transaction the statements are only appended; otherwise
    /// they are committed right away. A removed item reports
    /// [`Lifecycle::Discarded`] once its delete is queued.
    pub fn save_to_db(&mut self, db: &dyn CharacterDb, transaction: Option<&mut Transaction>) -> Lifecycle {
        let supplied = transaction.is_some();
        let mut own = Transaction::new();
        let tx = match transaction {
            Some(tx) => tx,
            None => &mut own,
        };

        let lifecycle = match self.state {
            ItemUpdateState::New | ItemUpdateState::Changed => {
                let row = self.to_row();
                if self.state == ItemUpdateState::New {
                    tx.append(Statement::ReplaceItemInstance(row));
                } else {
                    tx.append(Statement::UpdateItemInstance(row));
                    if self.is_wrapped() {
                        tx.append(Statement::UpdateGiftOwner {
                            owner: self.owner.unwrap_or(PlayerGuid(0)),
                            item: self.guid,
                        });
                    }
                }
                self.mark_saved();
                Lifecycle::Alive
            }
            ItemUpdateState::Removed => {
                tx.append(Statement::DeleteItemInstance { item: self.guid });
                if self.is_wrapped() {
                    tx.append(Statement::DeleteGift { item: self.guid });
                }
                Lifecycle::Discarded
            }
            ItemUpdateState::Unchanged => {
                self.mark_saved();
                Lifecycle::Alive
            }
        };

        if !supplied {
            if let Err(e) = db.commit(own) {
                error!("Failed to save item {}: {}", self.guid, e);
            }
        }
        lifecycle
    }

    /// Queue the delete of an item row by guid, telling scripts first.
    pub fn delete_guid_from_db(transaction: &mut Transaction, item: ItemGuid, hooks: &dyn ScriptHooks) {
        hooks.on_item_deleted_from_db(item);
        transaction.append(Statement::DeleteItemInstance { item });
    }

    pub fn delete_from_db(&self, transaction: &mut Transaction, hooks: &dyn ScriptHooks) {
        Self::delete_guid_from_db(transaction, self.guid, hooks);
    }

    fn mark_saved(&mut self) {
        self.queue_pos = None;
        self.state = ItemUpdateState::Unchanged;
    }

    fn mark_changed(&mut self, owner: Option<&mut PlayerContext>) {
        // Changed never discards.
        let _ = self.set_state(ItemUpdateState::Changed, owner);
    }

    /// Move the persistence state machine.
    ///
    /// A new item stays `New` until its first save. Removing a new item discards it
    /// outright, since storage never saw it.
    pub fn set_state(&mut self, state: ItemUpdateState, for_player: Option<&mut PlayerContext>) -> Lifecycle {
        if self.state == ItemUpdateState::New && state == ItemUpdateState::Removed {
            if let Some(player) = for_player {
                self.remove_from_update_queue_of(player);
                player.delete_refund_reference(self.guid);
            }
            return Lifecycle::Discarded;
        }

        match state {
            ItemUpdateState::Unchanged => {
                if self.state == ItemUpdateState::New {
                    debug!("Item {} is unsaved and cannot become unchanged", self.guid);
                    return Lifecycle::Alive;
                }
                // The queue slot itself is released by whoever drains the queue.
                self.mark_saved();
            }
            _ => {
                if self.state != ItemUpdateState::New {
                    self.state = state;
                }
                if let Some(player) = for_player {
                    self.add_to_update_queue_of(player);
                }
            }
        }
        Lifecycle::Alive
    }

    /// True when the stored queue position still points at this item.
    pub fn is_in_update_queue_of(&self, player: &PlayerContext) -> bool {
        matches!(self.queue_pos, Some(pos) if player.item_update_queue().holds(pos, self.guid))
    }

    pub fn add_to_update_queue_of(&mut self, player: &mut PlayerContext) {
        if self.is_in_update_queue_of(player) {
            return;
        }

        if self.owner != Some(player.guid()) {
            debug!(
                "Item::add_to_update_queue_of - owner {:?} and player {} don't match",
                self.owner,
                player.guid()
            );
            return;
        }

        if player.item_update_queue().is_blocked() {
            return;
        }

        self.queue_pos = Some(player.item_update_queue_mut().push(self.guid));
    }

    pub fn remove_from_update_queue_of(&mut self, player: &mut PlayerContext) {
        if !self.is_in_update_queue_of(player) {
            self.queue_pos = None;
            return;
        }

        if self.owner != Some(player.guid()) {
            debug!(
                "Item::remove_from_update_queue_of - owner {:?} and player {} don't match",
                self.owner,
                player.guid()
            );
            return;
        }

        if player.item_update_queue().is_blocked() {
            return;
        }

        if let Some(pos) = self.queue_pos.take() {
            player.item_update_queue_mut().clear_at(pos, self.guid);
        }
    }

    /// Count down a timed item. Returns true once it has expired; the owner is
    /// then responsible for destroying it.
    #[must_use]
    pub fn update_duration(&mut self, owner: &mut PlayerContext, diff: u32, hooks: &dyn ScriptHooks) -> bool {
        if self.duration == 0 {
            return false;
        }

        debug!(
            "Item::update_duration item (entry: {} duration {} diff {})",
            self.entry(),
            self.duration,
            diff
        );

        if self.duration <= diff {
            hooks.on_item_expire(owner.guid(), &self.template);
            return true;
        }

        self.duration -= diff;
        self.mark_changed(Some(owner));
        false
    }

    pub fn send_time_update(&self, owner: &mut PlayerContext) {
        if self.duration == 0 {
            return;
        }
        owner.session_mut().send(Notification::ItemTimeUpdate {
            item: self.guid,
            duration: self.duration,
        });
    }

    pub fn send_update_sockets(&self, owner: &mut PlayerContext) {
        let mut enchant_ids = [0u32; 4];
        let slots = [
            EnchantmentSlot::Sock1,
            EnchantmentSlot::Sock2,
            EnchantmentSlot::Sock3,
            EnchantmentSlot::Bonus,
        ];
        for (out, slot) in enchant_ids.iter_mut().zip(slots) {
            *out = self.enchantment_id(slot);
        }
        owner.session_mut().send(Notification::SocketGemsResult {
            item: self.guid,
            enchant_ids,
        });
    }

    /// Apply or lift this item's set bonus contribution on equip and unequip.
    pub fn apply_item_set(
        &self,
        player: &mut PlayerContext,
        catalog: &Catalog,
        hooks: &dyn ScriptHooks,
        apply: bool,
    ) {
        if self.template.item_set == 0 {
            return;
        }
        if apply {
            add_item_set_item(player, self, catalog, hooks);
        } else {
            remove_item_set_item(player, &self.template, catalog);
        }
    }

    pub fn can_be_merged_partly_with(&self, template: &ItemTemplate) -> InventoryResult {
        if self.loot_generated {
            return InventoryResult::AlreadyLooted;
        }

        if self.entry() != template.item_id {
            return InventoryResult::CantStack;
        }

        // Full stacks can't be the target of a merge.
        if self.count >= template.max_stack_size() {
            return InventoryResult::CantStack;
        }

        InventoryResult::Ok
    }

    pub fn is_fit_to_spell_requirements(&self, spell: &SpellInfo) -> bool {
        let proto = &self.template;

        if spell.equipped_item_class != -1 {
            // Vellum stands in for armor and weapons, for enchanting spells only.
            let vellum = (spell.equipped_item_class == item_class::ARMOR as i32 && proto.is_armor_vellum())
                || (spell.equipped_item_class == item_class::WEAPON as i32 && proto.is_weapon_vellum());
            if vellum && spell.is_ability_of_skill_type(SKILL_ENCHANTING) {
                return true;
            }

            if spell.equipped_item_class != proto.class as i32 {
                return false;
            }

            if spell.equipped_item_subclass_mask != 0
                && !mask_has(spell.equipped_item_subclass_mask, proto.subclass)
            {
                return false;
            }
        }

        if spell.equipped_item_inventory_type_mask != 0 {
            let mask = spell.equipped_item_inventory_type_mask;
            let hand_slot = mask_has(mask, u32::from(inventory_type::WEAPON_MAIN_HAND))
                || mask_has(mask, u32::from(inventory_type::WEAPON_OFF_HAND));
            if proto.inventory_type == inventory_type::WEAPON && hand_slot {
                return true;
            }
            if !mask_has(mask, u32::from(proto.inventory_type)) {
                return false;
            }
        }

        true
    }

    pub fn can_be_traded(&self, mail: bool, trade: bool, owner: Option<&PlayerContext>, catalog: &Catalog) -> bool {
        let account_bound_mail = mail && self.is_bound_account_wide();

        if !account_bound_mail && self.is_soulbound() && (!self.is_bop_tradeable() || !trade) {
            return false;
        }

        if self.template.is_container() && (self.position.is_bag_slot() || self.is_not_empty_bag()) {
            return false;
        }

        if let Some(owner) = owner {
            if !owner.can_unequip(self.position) {
                return false;
            }
            if owner.loot_target() == Some(self.guid) {
                return false;
            }
        }

        if self.is_bound_by_temp_enchant(catalog) {
            return false;
        }

        if !account_bound_mail && self.is_bound_by_enchant(catalog) {
            return false;
        }

        true
    }

    /// Soulbound to someone other than `player`, with no exception that lets them hold it.
    pub fn is_binded_not_with(&self, player: PlayerGuid) -> bool {
        if !self.is_soulbound() {
            return false;
        }
        if self.owner == Some(player) {
            return false;
        }
        if self.is_bop_tradeable() && self.allowed_traders.contains(&player) {
            return false;
        }
        !self.is_bound_account_wide()
    }

    fn enchant_entries<'c>(
        &'c self,
        catalog: &'c Catalog,
    ) -> impl Iterator<Item = &'c EnchantmentEntry> + 'c {
        self.enchantments
            .iter()
            .filter(|e| e.id != 0)
            .filter_map(move |e| catalog.enchantment(e.id))
    }

    pub fn has_enchant_required_skill(&self, player: &PlayerContext, catalog: &Catalog) -> bool {
        self.enchant_entries(catalog).all(|entry| {
            entry.required_skill == 0 || player.skill_value(entry.required_skill) >= entry.required_skill_value
        })
    }

    pub fn enchant_required_level(&self, catalog: &Catalog) -> u32 {
        self.enchant_entries(catalog)
            .map(|entry| entry.required_level)
            .max()
            .unwrap_or(0)
    }

    pub fn is_bound_by_enchant(&self, catalog: &Catalog) -> bool {
        self.enchant_entries(catalog)
            .any(|entry| entry.slot & ENCHANTMENT_CAN_SOULBOUND != 0)
    }

    pub fn is_bound_by_temp_enchant(&self, catalog: &Catalog) -> bool {
        let id = self.enchantment_id(EnchantmentSlot::Temp);
        id != 0
            && catalog
                .enchantment(id)
                .is_some_and(|entry| entry.slot & ENCHANTMENT_CAN_SOULBOUND != 0)
    }

    pub fn is_enchanted(&self) -> bool {
        self.enchantments.iter().any(|e| e.id != 0)
    }

    /// Replace one enchantment slot. Writing the current triple again does nothing.
    pub fn set_enchantment(
        &mut self,
        slot: EnchantmentSlot,
        id: u32,
        duration: u32,
        charges: u32,
        caster: Option<PlayerGuid>,
        mut owner: Option<&mut PlayerContext>,
    ) {
        let current = self.enchantments[slot.index()];
        if current.id == id && current.duration == duration && current.charges == charges {
            return;
        }

        if slot.is_inspected() {
            if let Some(player) = owner.as_deref_mut() {
                let owner_guid = player.guid();
                let item_entry = self.entry();
                if current.id != 0 {
                    player.session_mut().send(Notification::EnchantmentLog {
                        owner: owner_guid,
                        caster: None,
                        item_entry,
                        enchant_id: current.id,
                    });
                }
                if id != 0 {
                    player.session_mut().send(Notification::EnchantmentLog {
                        owner: owner_guid,
                        caster,
                        item_entry,
                        enchant_id: id,
                    });
                }
            }
        }

        self.enchantments[slot.index()] = EnchantmentData { id, duration, charges };
        self.mark_changed(owner);
    }

    pub fn set_enchantment_duration(&mut self, slot: EnchantmentSlot, duration: u32, owner: Option<&mut PlayerContext>) {
        if self.enchantments[slot.index()].duration == duration {
            return;
        }
        self.enchantments[slot.index()].duration = duration;
        self.mark_changed(owner);
    }

    pub fn set_enchantment_charges(&mut self, slot: EnchantmentSlot, charges: u32, owner: Option<&mut PlayerContext>) {
        if self.enchantments[slot.index()].charges == charges {
            return;
        }
        self.enchantments[slot.index()].charges = charges;
        self.mark_changed(owner);
    }

    pub fn clear_enchantment(&mut self, slot: EnchantmentSlot, owner: Option<&mut PlayerContext>) {
        if self.enchantments[slot.index()].id == 0 {
            return;
        }
        self.enchantments[slot.index()] = EnchantmentData::default();
        self.mark_changed(owner);
    }

    /// Every colored socket holds a gem whose color matches.
    pub fn gems_fit_sockets(&self, catalog: &Catalog) -> bool {
        for (index, slot) in EnchantmentSlot::SOCKETS.iter().enumerate() {
            let socket_color = self.template.socket_color(index);
            if socket_color == 0 {
                continue;
            }

            let enchant_id = self.enchantment_id(*slot);
            if enchant_id == 0 {
                return false;
            }

            let Some(entry) = catalog.enchantment(enchant_id) else {
                return false;
            };

            let gem_color = if entry.gem_id != 0 {
                catalog
                    .item_template(entry.gem_id)
                    .and_then(|gem| catalog.gem_properties(gem.gem_properties).map(|p| p.color))
                    .unwrap_or(0)
            } else {
                0
            };

            if gem_color & socket_color == 0 {
                return false;
            }
        }
        true
    }

    /// Built-in sockets live on the template; an added socket always uses the prismatic slot.
    pub fn has_socket(&self) -> bool {
        self.template.socket_color(0) != 0 || self.enchantment_id(EnchantmentSlot::Prismatic) != 0
    }

    fn socket_gem_entries<'c>(
        &'c self,
        catalog: &'c Catalog,
    ) -> impl Iterator<Item = &'c EnchantmentEntry> + 'c {
        EnchantmentSlot::SOCKETS
            .into_iter()
            .take(MAX_GEM_SOCKETS)
            .map(move |slot| self.enchantment_id(slot))
            .filter(|id| *id != 0)
            .filter_map(move |id| catalog.enchantment(id))
    }

    pub fn gem_count_with_id(&self, gem_id: u32, catalog: &Catalog) -> u8 {
        self.socket_gem_entries(catalog)
            .filter(|entry| entry.gem_id == gem_id)
            .count() as u8
    }

    pub fn gem_count_with_limit_category(&self, limit_category: u32, catalog: &Catalog) -> u8 {
        self.socket_gem_entries(catalog)
            .filter_map(|entry| catalog.item_template(entry.gem_id))
            .filter(|gem| gem.item_limit_category == limit_category)
            .count() as u8
    }

    pub fn is_limited_to_another_map_or_zone(&self, map_id: u32, zone_id: u32) -> bool {
        (self.template.map != 0 && self.template.map != map_id)
            || (self.template.area != 0 && self.template.area != zone_id)
    }

    /// Roll a random property id for a template: positive for the property
    /// table, negated for the suffix table, 0 for none.
    pub fn generate_item_random_property_id<R: Rng + ?Sized>(item_id: u32, catalog: &Catalog, rng: &mut R) -> i32 {
        let Some(template) = catalog.item_template(item_id) else {
            return 0;
        };

        if template.random_property == 0 && template.random_suffix == 0 {
            return 0;
        }

        if template.random_property != 0 && template.random_suffix != 0 {
            error!(
                "Item template {} has RandomProperty == {} and RandomSuffix == {}, but must have one field = 0",
                template.item_id, template.random_property, template.random_suffix
            );
            return 0;
        }

        if template.random_property != 0 {
            let rolled = catalog.roll_enchant_group(template.random_property, rng);
            match catalog.random_property(rolled) {
                Some(entry) => entry.id as i32,
                None => {
                    error!(
                        "Enchantment id #{} used but it doesn't have records in the random property table",
                        rolled
                    );
                    0
                }
            }
        } else {
            let rolled = catalog.roll_enchant_group(template.random_suffix, rng);
            match catalog.random_suffix(rolled) {
                Some(entry) => -(entry.id as i32),
                None => {
                    error!(
                        "Enchantment id #{} used but it doesn't have records in the random suffix table",
                        rolled
                    );
                    0
                }
            }
        }
    }

    /// Apply a random property or suffix row to the property enchantment slots.
    pub fn set_item_random_properties(
        &mut self,
        random_property_id: i32,
        catalog: &Catalog,
        mut owner: Option<&mut PlayerContext>,
    ) {
        if random_property_id == 0 {
            return;
        }

        let enchantments = if random_property_id > 0 {
            let Some(entry) = catalog.random_property(random_property_id as u32) else {
                return;
            };
            let id = entry.id as i32;
            if self.random_property_id != id {
                self.random_property_id = id;
                self.mark_changed(owner.as_deref_mut());
            }
            entry.enchantments.clone()
        } else {
            let Some(entry) = catalog.random_suffix(random_property_id.unsigned_abs()) else {
                return;
            };
            let id = -(entry.id as i32);
            if self.random_property_id != id || self.property_seed == 0 {
                self.random_property_id = id;
                self.update_item_suffix_factor(catalog);
                self.mark_changed(owner.as_deref_mut());
            }
            entry.enchantments.clone()
        };

        for (index, slot) in EnchantmentSlot::PROPERTIES.iter().enumerate() {
            let id = enchantments.get(index).copied().unwrap_or(0);
            self.set_enchantment(*slot, id, 0, 0, None, owner.as_deref_mut());
        }
    }

    pub fn update_item_suffix_factor(&mut self, catalog: &Catalog) {
        let factor = generate_ench_suffix_factor(self.entry(), catalog);
        if self.property_seed == factor {
            return;
        }
        self.property_seed = factor;
    }

    /// Weapon or armor proficiency spell needed to use this item, 0 if none.
    pub fn proficiency_spell(&self) -> u32 {
        let proto = &self.template;
        match proto.class {
            item_class::WEAPON => match proto.subclass {
                weapon_subclass::AXE => 196,
                weapon_subclass::AXE2 => 197,
                weapon_subclass::BOW => 264,
                weapon_subclass::GUN => 266,
                weapon_subclass::MACE => 198,
                weapon_subclass::MACE2 => 199,
                weapon_subclass::POLEARM => 200,
                weapon_subclass::SWORD => 201,
                weapon_subclass::SWORD2 => 202,
                weapon_subclass::STAFF => 227,
                weapon_subclass::DAGGER => 1180,
                weapon_subclass::THROWN => 2567,
                weapon_subclass::SPEAR => 3386,
                weapon_subclass::CROSSBOW => 5011,
                weapon_subclass::WAND => 5009,
                _ => 0,
            },
            item_class::ARMOR => match proto.subclass {
                armor_subclass::CLOTH => 9078,
                armor_subclass::LEATHER => 9077,
                armor_subclass::MAIL => 8737,
                armor_subclass::PLATE => 750,
                armor_subclass::SHIELD => 9116,
                _ => 0,
            },
            _ => 0,
        }
    }

    pub fn save_refund_data_to_db(&self, db: &dyn CharacterDb) {
        let mut tx = Transaction::new();
        tx.append(Statement::DeleteItemRefund { item: self.guid });
        tx.append(Statement::InsertItemRefund(RefundRow {
            item: self.guid.0,
            recipient: self.refund.recipient,
            paid_money: self.refund.paid_money,
            paid_extended_cost: self.refund.paid_extended_cost as u16,
        }));
        if let Err(e) = db.commit(tx) {
            error!("Failed to save refund data for item {}: {}", self.guid, e);
        }
    }

    pub fn delete_refund_data_from_db(&self, transaction: Option<&mut Transaction>) {
        if let Some(tx) = transaction {
            tx.append(Statement::DeleteItemRefund { item: self.guid });
        }
    }

    pub fn set_not_refundable(
        &mut self,
        owner: &mut PlayerContext,
        change_state: bool,
        transaction: Option<&mut Transaction>,
    ) {
        if !self.is_refundable() {
            return;
        }

        self.flags.remove(ItemFieldFlags::REFUNDABLE);
        // Trades finalise state themselves.
        if change_state {
            self.mark_changed(Some(&mut *owner));
        }

        self.refund = RefundData::default();
        self.delete_refund_data_from_db(transaction);
        owner.delete_refund_reference(self.guid);
    }

    /// Add played time since the last tick; past the refund window the item stops being refundable.
    pub fn update_played_time(&mut self, owner: &mut PlayerContext, now: i64, windows: &TradeWindows) {
        let new_playtime = self.played_time(now);
        if new_playtime <= windows.refund {
            self.create_played_time = new_playtime;
            self.mark_changed(Some(owner));
            self.last_played_time_update = now;
            return;
        }
        self.set_not_refundable(owner, true, None);
    }

    pub fn played_time(&self, now: i64) -> u32 {
        let elapsed = (now - self.last_played_time_update).max(0) as u32;
        self.create_played_time.saturating_add(elapsed)
    }

    pub fn is_refund_expired(&self, now: i64, windows: &TradeWindows) -> bool {
        self.played_time(now) > windows.refund
    }

    /// Open the soulbound trade window for `allowed`. The window is measured from
    /// the owner's played time at the moment of the grant.
    pub fn set_soulbound_tradeable(&mut self, allowed: HashSet<PlayerGuid>, owner: &mut PlayerContext) {
        self.flags.insert(ItemFieldFlags::BOP_TRADEABLE);
        self.allowed_traders = allowed;
        self.create_played_time = owner.total_played_time();
        self.mark_changed(Some(owner));
        owner.add_tradeable_item(self.guid);
    }

    /// Persist the current allow-list.
    pub fn save_soulbound_tradeable(&self, transaction: &mut Transaction) {
        let mut allowed: Vec<PlayerGuid> = self.allowed_traders.iter().copied().collect();
        allowed.sort_unstable();
        transaction.append(Statement::InsertItemBopTrade {
            item: self.guid,
            allowed,
        });
    }

    pub fn clear_soulbound_tradeable(&mut self, owner: &mut PlayerContext, db: &dyn CharacterDb) {
        self.flags.remove(ItemFieldFlags::BOP_TRADEABLE);
        if self.allowed_traders.is_empty() {
            return;
        }

        self.allowed_traders.clear();
        self.mark_changed(Some(owner));
        if let Err(e) = db.execute(Statement::DeleteItemBopTrade { item: self.guid }) {
            error!("Failed to delete trade allow-list of item {}: {}", self.guid, e);
        }
    }

    /// Lapse soulbound trading once the owner has played past the window since the
    /// grant. Returns true when the item left the owner's tradeable set.
    pub fn check_soulbound_trade_expire(
        &mut self,
        owner: &mut PlayerContext,
        db: &dyn CharacterDb,
        windows: &TradeWindows,
    ) -> bool {
        if self.create_played_time.saturating_add(windows.bop_trade) < owner.total_played_time() {
            self.clear_soulbound_tradeable(owner, db);
            owner.remove_tradeable_item(self.guid);
            return true;
        }
        false
    }

    pub fn guid(&self) -> ItemGuid {
        self.guid
    }

    pub fn entry(&self) -> u32 {
        self.template.item_id
    }

    pub fn template(&self) -> &ItemTemplate {
        &self.template
    }

    pub fn owner(&self) -> Option<PlayerGuid> {
        self.owner
    }

    pub fn set_owner(&mut self, owner: Option<PlayerGuid>) {
        self.owner = owner;
    }

    pub fn creator(&self) -> u32 {
        self.creator
    }

    pub fn set_creator(&mut self, creator: u32) {
        self.creator = creator;
    }

    pub fn gift_creator(&self) -> u32 {
        self.gift_creator
    }

    pub fn set_gift_creator(&mut self, gift_creator: u32) {
        self.gift_creator = gift_creator;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Set the stack size, kept within `1..=max_stack_size`.
    pub fn set_count(&mut self, count: u32) {
        self.count = count.clamp(1, self.template.max_stack_size());
    }

    pub fn durability(&self) -> u32 {
        self.durability
    }

    pub fn set_durability(&mut self, durability: u32) {
        self.durability = durability.min(self.max_durability);
    }

    pub fn max_durability(&self) -> u32 {
        self.max_durability
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn spell_charges(&self, index: usize) -> i32 {
        self.spell_charges.get(index).copied().unwrap_or(0)
    }

    pub fn set_spell_charges(&mut self, index: usize, charges: i32) {
        if let Some(slot) = self.spell_charges.get_mut(index) {
            *slot = charges;
        }
    }

    pub fn flags(&self) -> ItemFieldFlags {
        self.flags
    }

    pub fn is_soulbound(&self) -> bool {
        self.flags.contains(ItemFieldFlags::SOULBOUND)
    }

    pub fn set_binding(&mut self, bound: bool) {
        self.flags.set(ItemFieldFlags::SOULBOUND, bound);
    }

    pub fn is_bound_account_wide(&self) -> bool {
        self.template.is_bound_account_wide()
    }

    pub fn is_wrapped(&self) -> bool {
        self.flags.contains(ItemFieldFlags::WRAPPED)
    }

    pub fn set_wrapped(&mut self, wrapped: bool) {
        self.flags.set(ItemFieldFlags::WRAPPED, wrapped);
    }

    pub fn is_bop_tradeable(&self) -> bool {
        self.flags.contains(ItemFieldFlags::BOP_TRADEABLE)
    }

    pub fn allowed_traders(&self) -> &HashSet<PlayerGuid> {
        &self.allowed_traders
    }

    pub fn is_refundable(&self) -> bool {
        self.flags.contains(ItemFieldFlags::REFUNDABLE)
    }

    /// Mark the item as bought with refundable currency.
    pub fn set_refundable(&mut self, refund: RefundData) {
        self.flags.insert(ItemFieldFlags::REFUNDABLE);
        self.refund = refund;
    }

    pub fn refund(&self) -> RefundData {
        self.refund
    }

    pub fn enchantment(&self, slot: EnchantmentSlot) -> EnchantmentData {
        self.enchantments[slot.index()]
    }

    pub fn enchantment_id(&self, slot: EnchantmentSlot) -> u32 {
        self.enchantments[slot.index()].id
    }

    pub fn enchantment_duration(&self, slot: EnchantmentSlot) -> u32 {
        self.enchantments[slot.index()].duration
    }

    pub fn enchantment_charges(&self, slot: EnchantmentSlot) -> u32 {
        self.enchantments[slot.index()].charges
    }

    pub fn random_property_id(&self) -> i32 {
        self.random_property_id
    }

    /// Suffix factor used to scale suffix enchantment values.
    pub fn item_suffix_factor(&self) -> u32 {
        self.property_seed
    }

    pub fn create_played_time(&self) -> u32 {
        self.create_played_time
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn state(&self) -> ItemUpdateState {
        self.state
    }

    pub fn queue_pos(&self) -> Option<usize> {
        self.queue_pos
    }

    pub fn position(&self) -> ItemPosition {
        self.position
    }

    pub fn set_position(&mut self, position: ItemPosition) {
        self.position = position;
    }

    pub fn is_equipped(&self) -> bool {
        self.position.is_equipment()
    }

    /// Number of items stored inside this bag.
    pub fn contained_items(&self) -> u32 {
        self.contained_items
    }

    pub fn set_contained_items(&mut self, count: u32) {
        self.contained_items = count;
    }

    pub fn is_not_empty_bag(&self) -> bool {
        self.template.is_container() && self.contained_items > 0
    }

    pub fn loot_generated(&self) -> bool {
        self.loot_generated
    }

    pub fn set_loot_generated(&mut self, generated: bool) {
        self.loot_generated = generated;
    }

}

fn mask_has(mask: i32, bit: u32) -> bool {
    bit < 32 && (mask as u32) & (1u32 << bit) != 0
}

/// Suffix factor for a template: the random points budget for its item level,
/// picked by slot group and quality.
pub fn generate_ench_suffix_factor(item_id: u32, catalog: &Catalog) -> u32 {
    let Some(template) = catalog.item_template(item_id) else {
        return 0;
    };
    if template.random_suffix == 0 {
        return 0;
    }
    let Some(points) = catalog.random_points(template.item_level) else {
        return 0;
    };

    use inventory_type as it;
    let group = match template.inventory_type {
        it::HEAD | it::BODY | it::CHEST | it::LEGS | it::TWO_HAND_WEAPON | it::ROBE => 0,
        it::SHOULDERS | it::WAIST | it::FEET | it::HANDS | it::TRINKET => 1,
        it::NECK | it::WRISTS | it::FINGER | it::SHIELD | it::CLOAK | it::HOLDABLE => 2,
        it::WEAPON | it::WEAPON_MAIN_HAND | it::WEAPON_OFF_HAND => 3,
        it::RANGED | it::THROWN | it::RANGED_RIGHT => 4,
        _ => return 0,
    };

    match template.quality {
        item_quality::UNCOMMON => points.uncommon[group],
        item_quality::RARE => points.rare[group],
        item_quality::EPIC => points.epic[group],
        _ => 0,
    }
}

/// Whether an item may be stored in a specialised bag.
pub fn item_can_go_into_bag(item: &ItemTemplate, bag: &ItemTemplate) -> bool {
    let family = item.bag_family_mask();
    match bag.class {
        item_class::CONTAINER => {
            if bag.subclass == container_subclass::CONTAINER {
                return true;
            }
            if item.class == item_class::CONTAINER {
                return false;
            }
            let required = match bag.subclass {
                container_subclass::SOUL => BagFamily::SOUL_SHARDS,
                container_subclass::HERB => BagFamily::HERBS,
                container_subclass::ENCHANTING => BagFamily::ENCHANTING_SUPP,
                container_subclass::MINING => BagFamily::MINING_SUPP,
                container_subclass::ENGINEERING => BagFamily::ENGINEERING_SUPP,
                container_subclass::GEM => BagFamily::GEMS,
                container_subclass::LEATHERWORKING => BagFamily::LEATHERWORKING_SUPP,
                container_subclass::INSCRIPTION => BagFamily::INSCRIPTION_SUPP,
                _ => return false,
            };
            family.intersects(required)
        }
        item_class::QUIVER => {
            if item.class == item_class::QUIVER {
                return false;
            }
            let required = match bag.subclass {
                quiver_subclass::QUIVER => BagFamily::ARROWS,
                quiver_subclass::AMMO_POUCH => BagFamily::BULLETS,
                _ => return false,
            };
            family.intersects(required)
        }
        _ => false,
    }
}

/// Flush an owner's save queue in one transaction.
///
/// Items whose save discarded them are dropped from `items` after the commit.
/// Returns the number of queued items processed.
pub fn save_queued_items(
    owner: &mut PlayerContext,
    items: &mut HashMap<ItemGuid, Item>,
    db: &dyn CharacterDb,
) -> Result<usize, RealmError> {
    let queued = owner.item_update_queue_mut().take();
    if queued.is_empty() {
        return Ok(0);
    }

    let mut tx = Transaction::new();
    let mut discarded = Vec::new();
    for guid in &queued {
        let Some(item) = items.get_mut(guid) else {
            error!("Queued item {} of {} is not loaded, skipping save", guid, owner.guid());
            continue;
        };
        if item.save_to_db(db, Some(&mut tx)) == Lifecycle::Discarded {
            discarded.push(*guid);
        }
    }

    let result = db.commit(tx);
    for guid in discarded {
        items.remove(&guid);
    }
    result?;
    debug!("Saved {} queued items for {}", queued.len(), owner.guid());
    Ok(queued.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::catalog::{
        CatalogSnapshot, EnchantChance, EnchantGroup, EnchantmentEntry, GemProperties, RandomPointsEntry,
        RandomPropertyEntry, RandomSuffixEntry, SocketDef, TemplateSpell,
    };
    use crate::realm::hooks::NoHooks;
    use crate::realm::storage::SledCharacterStore;
    use crate::realm::types::TemplateFlags;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingDb {
        commits: RefCell<Vec<Transaction>>,
    }

    impl RecordingDb {
        fn statements(&self) -> Vec<Statement> {
            self.commits
                .borrow()
                .iter()
                .flat_map(|t| t.statements().to_vec())
                .collect()
        }
    }

    impl CharacterDb for RecordingDb {
        fn commit(&self, transaction: Transaction) -> Result<(), RealmError> {
            self.commits.borrow_mut().push(transaction);
            Ok(())
        }
    }

    const SWORD: u32 = 100;
    const POTION: u32 = 101;
    const HELM: u32 = 102;
    const RED_GEM: u32 = 103;
    const VELLUM: u32 = 104;
    const CLOAK: u32 = 105;
    const MISCONFIGURED: u32 = 106;

    fn catalog() -> Catalog {
        Catalog::from_snapshot(CatalogSnapshot {
            item_templates: vec![
                ItemTemplate {
                    item_id: SWORD,
                    class: item_class::WEAPON,
                    subclass: weapon_subclass::SWORD,
                    inventory_type: inventory_type::WEAPON,
                    max_durability: 50,
                    bonding: Bonding::PickedUp,
                    spells: vec![TemplateSpell { spell_id: 1, charges: -3 }],
                    ..Default::default()
                },
                ItemTemplate {
                    item_id: POTION,
                    max_stack: 20,
                    duration: 600,
                    ..Default::default()
                },
                ItemTemplate {
                    item_id: HELM,
                    class: item_class::ARMOR,
                    inventory_type: inventory_type::HEAD,
                    quality: item_quality::RARE,
                    item_level: 60,
                    random_suffix: 9,
                    sockets: vec![SocketDef { color: 2, content: 0 }],
                    ..Default::default()
                },
                ItemTemplate {
                    item_id: RED_GEM,
                    class: item_class::GEM,
                    gem_properties: 1,
                    ..Default::default()
                },
                ItemTemplate {
                    item_id: VELLUM,
                    class: item_class::TRADE_GOODS,
                    subclass: crate::realm::types::trade_goods_subclass::ARMOR_ENCHANTMENT,
                    ..Default::default()
                },
                ItemTemplate {
                    item_id: CLOAK,
                    class: item_class::ARMOR,
                    inventory_type: inventory_type::CLOAK,
                    random_property: 20,
                    ..Default::default()
                },
                ItemTemplate {
                    item_id: MISCONFIGURED,
                    random_property: 20,
                    random_suffix: 9,
                    ..Default::default()
                },
            ],
            enchantments: vec![
                EnchantmentEntry { id: 10, gem_id: RED_GEM, ..Default::default() },
                EnchantmentEntry { id: 11, slot: ENCHANTMENT_CAN_SOULBOUND, ..Default::default() },
                EnchantmentEntry { id: 12, required_level: 35, ..Default::default() },
            ],
            gem_properties: vec![GemProperties { id: 1, color: 2 }],
            random_properties: vec![RandomPropertyEntry { id: 6, enchantments: vec![80, 81, 82] }],
            random_suffixes: vec![RandomSuffixEntry { id: 5, enchantments: vec![70, 71] }],
            enchant_groups: vec![
                EnchantGroup { id: 9, entries: vec![EnchantChance { ench_id: 5, chance: 100.0 }] },
                EnchantGroup { id: 20, entries: vec![EnchantChance { ench_id: 6, chance: 100.0 }] },
            ],
            random_points: vec![RandomPointsEntry {
                item_level: 60,
                epic: [90, 70, 50, 40, 30],
                rare: [60, 45, 35, 25, 20],
                uncommon: [40, 30, 20, 15, 10],
            }],
            ..Default::default()
        })
    }

    fn owned(catalog: &Catalog, player: &PlayerContext, entry: u32, guid: u32) -> Item {
        Item::create(ItemGuid(guid), entry, Some(player), catalog, &NoHooks).expect("template")
    }

    #[test]
    fn create_applies_template_defaults() {
        let catalog = catalog();
        let player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let sword = owned(&catalog, &player, SWORD, 1);
        assert_eq!(sword.count(), 1);
        assert_eq!(sword.durability(), 50);
        assert_eq!(sword.spell_charges(0), -3);
        assert_eq!(sword.state(), ItemUpdateState::New);
        assert!(Item::create(ItemGuid(2), 9999, None, &catalog, &NoHooks).is_none());
    }

    #[test]
    fn new_item_removed_is_discarded_without_storage() {
        let catalog = catalog();
        let db = RecordingDb::default();
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut potion = owned(&catalog, &player, POTION, 3);
        player.add_refundable_item(potion.guid());

        potion.mark_changed(Some(&mut player));
        assert_eq!(player.item_update_queue().len(), 1);
        assert_eq!(
            potion.set_state(ItemUpdateState::Removed, Some(&mut player)),
            Lifecycle::Discarded
        );
        assert!(player.item_update_queue().is_empty());
        assert!(player.refundable_items().is_empty());
        assert!(db.commits.borrow().is_empty());
    }

    #[test]
    fn changed_item_removed_deletes_on_flush() {
        let catalog = catalog();
        let db = RecordingDb::default();
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut sword = owned(&catalog, &player, SWORD, 4);
        assert_eq!(sword.save_to_db(&db, None), Lifecycle::Alive);
        assert_eq!(sword.state(), ItemUpdateState::Unchanged);

        assert_eq!(
            sword.set_state(ItemUpdateState::Removed, Some(&mut player)),
            Lifecycle::Alive
        );
        let mut items = HashMap::from([(sword.guid(), sword)]);
        let saved = save_queued_items(&mut player, &mut items, &db).expect("flush");
        assert_eq!(saved, 1);
        assert!(items.is_empty());
        assert_eq!(
            db.statements().last(),
            Some(&Statement::DeleteItemInstance { item: ItemGuid(4) })
        );
    }

    #[test]
    fn enqueue_is_idempotent_and_owner_checked() {
        let catalog = catalog();
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut stranger = PlayerContext::new(PlayerGuid(2), 1, 1);
        let mut sword = owned(&catalog, &player, SWORD, 5);

        sword.mark_changed(Some(&mut player));
        sword.mark_changed(Some(&mut player));
        assert_eq!(player.item_update_queue().len(), 1);

        sword.add_to_update_queue_of(&mut stranger);
        assert!(stranger.item_update_queue().is_empty());

        // A drained queue leaves a stale position behind; it must read as not queued.
        let _ = player.item_update_queue_mut().take();
        assert!(!sword.is_in_update_queue_of(&player));
        sword.mark_changed(Some(&mut player));
        assert_eq!(player.item_update_queue().len(), 1);
    }

    #[test]
    fn blocked_queue_ignores_enqueue() {
        let catalog = catalog();
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut sword = owned(&catalog, &player, SWORD, 6);
        player.item_update_queue_mut().set_blocked(true);
        sword.mark_changed(Some(&mut player));
        assert!(player.item_update_queue().is_empty());
    }

    #[test]
    fn same_enchantment_is_a_no_op() {
        let catalog = catalog();
        let db = RecordingDb::default();
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut sword = owned(&catalog, &player, SWORD, 7);
        sword.set_enchantment(EnchantmentSlot::Perm, 12, 0, 0, None, Some(&mut player));
        assert_eq!(player.session_mut().drain().len(), 1);
        let _ = sword.save_to_db(&db, None);
        let _ = player.item_update_queue_mut().take();

        sword.set_enchantment(EnchantmentSlot::Perm, 12, 0, 0, None, Some(&mut player));
        assert!(player.session().pending().is_empty());
        assert_eq!(sword.state(), ItemUpdateState::Unchanged);
        assert!(player.item_update_queue().is_empty());

        sword.set_enchantment(EnchantmentSlot::Perm, 11, 0, 0, Some(PlayerGuid(9)), Some(&mut player));
        let notes = player.session_mut().drain();
        assert_eq!(notes.len(), 2);
        assert!(matches!(
            notes[1],
            Notification::EnchantmentLog { caster: Some(PlayerGuid(9)), enchant_id: 11, .. }
        ));
        assert_eq!(sword.state(), ItemUpdateState::Changed);
        assert_eq!(sword.enchant_required_level(&catalog), 0);
    }

    #[test]
    fn merge_fails_on_full_stack() {
        let catalog = catalog();
        let player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut potion = owned(&catalog, &player, POTION, 8);
        let template = catalog.item_template(POTION).expect("potion");
        assert_eq!(potion.can_be_merged_partly_with(&template), InventoryResult::Ok);
        potion.set_count(20);
        assert_eq!(potion.can_be_merged_partly_with(&template), InventoryResult::CantStack);
        let sword = catalog.item_template(SWORD).expect("sword");
        potion.set_count(1);
        assert_eq!(potion.can_be_merged_partly_with(&sword), InventoryResult::CantStack);
        potion.set_loot_generated(true);
        assert_eq!(potion.can_be_merged_partly_with(&template), InventoryResult::AlreadyLooted);
    }

    #[test]
    fn soulbound_items_only_mail_when_account_bound() {
        let mut snapshot_catalog = CatalogSnapshot::default();
        snapshot_catalog.item_templates.push(ItemTemplate {
            item_id: 1,
            flags: TemplateFlags::BOUND_TO_ACCOUNT.bits(),
            ..Default::default()
        });
        snapshot_catalog.item_templates.push(ItemTemplate { item_id: 2, ..Default::default() });
        let catalog = Catalog::from_snapshot(snapshot_catalog);

        let mut heirloom = Item::create(ItemGuid(1), 1, None, &catalog, &NoHooks).expect("item");
        heirloom.set_binding(true);
        assert!(!heirloom.can_be_traded(false, true, None, &catalog));
        assert!(heirloom.can_be_traded(true, false, None, &catalog));

        let mut plain = Item::create(ItemGuid(2), 2, None, &catalog, &NoHooks).expect("item");
        plain.set_binding(true);
        assert!(!plain.can_be_traded(true, false, None, &catalog));
        let mut looter = PlayerContext::new(PlayerGuid(3), 1, 1);
        plain.set_soulbound_tradeable(HashSet::from([PlayerGuid(3)]), &mut looter);
        assert!(plain.can_be_traded(false, true, None, &catalog));
        assert!(!plain.is_binded_not_with(PlayerGuid(3)));
        assert!(plain.is_binded_not_with(PlayerGuid(4)));
    }

    #[test]
    fn loot_target_and_enchant_binding_block_trade() {
        let catalog = catalog();
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut sword = owned(&catalog, &player, SWORD, 9);
        assert!(sword.can_be_traded(false, true, Some(&player), &catalog));

        player.set_loot_target(Some(sword.guid()));
        assert!(!sword.can_be_traded(false, true, Some(&player), &catalog));
        player.set_loot_target(None);

        sword.set_enchantment(EnchantmentSlot::Temp, 11, 60, 0, None, None);
        assert!(sword.is_bound_by_temp_enchant(&catalog));
        assert!(!sword.can_be_traded(true, true, Some(&player), &catalog));
    }

    #[test]
    fn gems_must_match_socket_colors() {
        let catalog = catalog();
        let player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut helm = owned(&catalog, &player, HELM, 10);
        assert!(helm.has_socket());
        assert!(!helm.gems_fit_sockets(&catalog));

        helm.set_enchantment(EnchantmentSlot::Sock1, 12, 0, 0, None, None);
        assert!(!helm.gems_fit_sockets(&catalog));

        helm.set_enchantment(EnchantmentSlot::Sock1, 10, 0, 0, None, None);
        assert!(helm.gems_fit_sockets(&catalog));
        assert_eq!(helm.gem_count_with_id(RED_GEM, &catalog), 1);
        assert_eq!(helm.gem_count_with_limit_category(0, &catalog), 1);
    }

    #[test]
    fn suffix_ids_are_negated_and_seed_the_factor() {
        let catalog = catalog();
        let mut rng = rand::thread_rng();
        assert_eq!(Item::generate_item_random_property_id(HELM, &catalog, &mut rng), -5);
        assert_eq!(Item::generate_item_random_property_id(SWORD, &catalog, &mut rng), 0);
        assert_eq!(generate_ench_suffix_factor(HELM, &catalog), 60);

        let mut guids = ItemGuidGenerator::new(1);
        let helm = Item::create_item(HELM, 1, None, CreateOptions::default(), &catalog, &NoHooks, &mut guids)
            .expect("helm");
        assert_eq!(helm.random_property_id(), -5);
        assert_eq!(helm.item_suffix_factor(), 60);
        assert_eq!(helm.enchantment_id(EnchantmentSlot::Prop0), 70);
        assert_eq!(helm.enchantment_id(EnchantmentSlot::Prop1), 71);
    }

    #[test]
    fn create_item_clamps_and_clones_strip_flags() {
        let catalog = catalog();
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut guids = ItemGuidGenerator::new(40);
        assert!(Item::create_item(POTION, 0, None, CreateOptions::default(), &catalog, &NoHooks, &mut guids).is_none());

        let mut potion = Item::create_item(POTION, 50, None, CreateOptions::default(), &catalog, &NoHooks, &mut guids)
            .expect("potion");
        assert_eq!(potion.count(), 20);
        assert_eq!(potion.guid(), ItemGuid(40));

        let temporary = CreateOptions { temporary: true, ..Default::default() };
        let temp = Item::create_item(POTION, 1, None, temporary, &catalog, &NoHooks, &mut guids).expect("temp");
        assert_eq!(temp.guid(), ItemGuid::TEMPORARY);

        potion.set_refundable(RefundData { recipient: 1, paid_money: 10, paid_extended_cost: 0 });
        potion.set_soulbound_tradeable(HashSet::new(), &mut player);
        potion.set_creator(77);
        let copy = potion
            .clone_item(3, None, &catalog, &NoHooks, &mut guids)
            .expect("copy");
        assert_eq!(copy.count(), 3);
        assert_eq!(copy.creator(), 77);
        assert!(!copy.is_refundable());
        assert!(!copy.is_bop_tradeable());
        assert_eq!(copy.duration(), potion.duration());
    }

    #[test]
    #[should_panic]
    fn create_item_with_unknown_template_aborts() {
        let catalog = catalog();
        let mut guids = ItemGuidGenerator::new(1);
        let _ = Item::create_item(4242, 1, None, CreateOptions::default(), &catalog, &NoHooks, &mut guids);
    }

    #[test]
    fn load_repairs_stale_duration_and_durability() {
        let catalog = catalog();
        let db = RecordingDb::default();
        let row = ItemRow {
            guid: 20,
            entry: SWORD,
            owner: 1,
            count: 1,
            duration: 300,
            charges: "-2 0 0 0 0 ".to_string(),
            flags: ItemFieldFlags::SOULBOUND.bits(),
            enchantments: "11 0 0".to_string(),
            durability: 90,
            ..Default::default()
        };
        let sword = Item::load_from_db(&row, Some(PlayerGuid(1)), &catalog, &NoHooks, &db).expect("load");
        assert_eq!(sword.duration(), 0);
        assert_eq!(sword.durability(), 50);
        assert_eq!(sword.spell_charges(0), -2);
        assert_eq!(sword.enchantment_id(EnchantmentSlot::Perm), 11);
        assert!(sword.is_soulbound());
        assert_eq!(sword.state(), ItemUpdateState::Unchanged);
        assert_eq!(
            db.statements(),
            vec![Statement::UpdateItemInstanceOnLoad {
                item: ItemGuid(20),
                count: 1,
                duration: 0,
                flags: ItemFieldFlags::SOULBOUND.bits(),
                durability: 50,
            }]
        );

        let potion_row = ItemRow { guid: 21, entry: POTION, count: 2, ..Default::default() };
        let potion = Item::load_from_db(&potion_row, None, &catalog, &NoHooks, &db).expect("load");
        assert_eq!(potion.duration(), 600);
    }

    #[test]
    fn load_strips_soulbound_from_no_bind_templates() {
        let catalog = catalog();
        let db = RecordingDb::default();
        let row = ItemRow {
            guid: 22,
            entry: POTION,
            duration: 600,
            flags: ItemFieldFlags::SOULBOUND.bits(),
            ..Default::default()
        };
        let potion = Item::load_from_db(&row, None, &catalog, &NoHooks, &db).expect("load");
        assert!(!potion.is_soulbound());
        assert_eq!(db.statements().len(), 1);
    }

    #[test]
    fn spell_requirements_accept_vellum_and_one_hand_weapons() {
        let catalog = catalog();
        let vellum = Item::create(ItemGuid(1), VELLUM, None, &catalog, &NoHooks).expect("vellum");
        let enchant_spell = SpellInfo {
            id: 1,
            equipped_item_class: item_class::ARMOR as i32,
            skill_line: SKILL_ENCHANTING,
            ..Default::default()
        };
        assert!(vellum.is_fit_to_spell_requirements(&enchant_spell));
        let other_spell = SpellInfo { skill_line: 0, ..enchant_spell.clone() };
        assert!(!vellum.is_fit_to_spell_requirements(&other_spell));

        let sword = Item::create(ItemGuid(2), SWORD, None, &catalog, &NoHooks).expect("sword");
        let off_hand = SpellInfo {
            id: 2,
            equipped_item_inventory_type_mask: 1 << inventory_type::WEAPON_OFF_HAND,
            ..Default::default()
        };
        assert!(sword.is_fit_to_spell_requirements(&off_hand));
        let wrong_subclass = SpellInfo {
            id: 3,
            equipped_item_class: item_class::WEAPON as i32,
            equipped_item_subclass_mask: 1 << weapon_subclass::AXE,
            ..Default::default()
        };
        assert!(!sword.is_fit_to_spell_requirements(&wrong_subclass));
        assert_eq!(sword.proficiency_spell(), 201);
    }

    #[test]
    fn refund_lapses_after_played_window() {
        let catalog = catalog();
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut potion = owned(&catalog, &player, POTION, 30);
        potion.set_refundable(RefundData { recipient: 1, paid_money: 500, paid_extended_cost: 0 });
        player.add_refundable_item(potion.guid());
        let windows = TradeWindows::default();

        let start = potion.last_played_time_update;
        potion.update_played_time(&mut player, start + 3600, &windows);
        assert!(potion.is_refundable());
        assert_eq!(potion.create_played_time(), 3600);

        potion.update_played_time(&mut player, start + 7300, &windows);
        assert!(!potion.is_refundable());
        assert_eq!(potion.refund(), RefundData::default());
        assert!(player.refundable_items().is_empty());
    }

    #[test]
    fn soulbound_trade_window_expires_against_owner_played_time() {
        let catalog = catalog();
        let db = RecordingDb::default();
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut sword = owned(&catalog, &player, SWORD, 31);
        sword.set_binding(true);
        player.set_total_played_time(360_000);
        sword.set_soulbound_tradeable(HashSet::from([PlayerGuid(2)]), &mut player);
        assert_eq!(sword.create_played_time(), 360_000);
        assert!(player.tradeable_items().contains(&sword.guid()));
        assert!(sword.is_in_update_queue_of(&player));
        let windows = TradeWindows::default();

        // A veteran character keeps the full window right after the grant.
        assert!(!sword.check_soulbound_trade_expire(&mut player, &db, &windows));
        assert!(sword.is_bop_tradeable());

        player.set_total_played_time(360_000 + 7200);
        assert!(!sword.check_soulbound_trade_expire(&mut player, &db, &windows));

        player.set_total_played_time(360_000 + 7201);
        assert!(sword.check_soulbound_trade_expire(&mut player, &db, &windows));
        assert!(!sword.is_bop_tradeable());
        assert!(player.tradeable_items().is_empty());
        assert_eq!(db.statements(), vec![Statement::DeleteItemBopTrade { item: ItemGuid(31) }]);
    }

    #[test]
    fn timed_items_expire_through_the_owner() {
        let catalog = catalog();
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut potion = owned(&catalog, &player, POTION, 32);
        assert!(!potion.update_duration(&mut player, 100, &NoHooks));
        assert_eq!(potion.duration(), 500);
        potion.send_time_update(&mut player);
        assert_eq!(
            player.session().pending(),
            &[Notification::ItemTimeUpdate { item: ItemGuid(32), duration: 500 }]
        );
        assert!(potion.update_duration(&mut player, 500, &NoHooks));
    }

    #[test]
    fn set_count_stays_within_stack_bounds() {
        let catalog = catalog();
        let player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut potion = owned(&catalog, &player, POTION, 33);
        potion.set_count(500);
        assert_eq!(potion.count(), 20);
        potion.set_count(0);
        assert_eq!(potion.count(), 1);

        let mut sword = owned(&catalog, &player, SWORD, 34);
        sword.set_count(2);
        assert_eq!(sword.count(), 1);
    }

    #[test]
    fn load_clamps_stack_count_and_writes_the_fix() {
        let catalog = catalog();
        let db = RecordingDb::default();
        let row = ItemRow { guid: 35, entry: POTION, count: 999, duration: 600, ..Default::default() };
        let potion = Item::load_from_db(&row, None, &catalog, &NoHooks, &db).expect("load");
        assert_eq!(potion.count(), 20);
        assert_eq!(
            db.statements(),
            vec![Statement::UpdateItemInstanceOnLoad {
                item: ItemGuid(35),
                count: 20,
                duration: 600,
                flags: 0,
                durability: 0,
            }]
        );

        let empty = ItemRow { guid: 36, entry: POTION, count: 0, duration: 600, ..Default::default() };
        let potion = Item::load_from_db(&empty, None, &catalog, &NoHooks, &db).expect("load");
        assert_eq!(potion.count(), 1);
        assert_eq!(db.statements().len(), 2);
    }

    #[test]
    fn wrapped_items_keep_the_gift_row_in_step() {
        let catalog = catalog();
        let db = RecordingDb::default();
        let store = SledCharacterStore::temporary().expect("store");
        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut sword = owned(&catalog, &player, SWORD, 40);
        assert_eq!(sword.save_to_db(&db, None), Lifecycle::Alive);

        sword.set_wrapped(true);
        sword.mark_changed(Some(&mut player));
        assert_eq!(sword.save_to_db(&db, None), Lifecycle::Alive);
        let statements = db.statements();
        assert!(matches!(statements[1], Statement::UpdateItemInstance(ref row) if row.guid == 40));
        assert_eq!(
            statements[2],
            Statement::UpdateGiftOwner { owner: PlayerGuid(1), item: ItemGuid(40) }
        );
        for tx in db.commits.take() {
            store.commit(tx).expect("commit");
        }
        assert_eq!(store.gift_owner(ItemGuid(40)).expect("gift"), Some(PlayerGuid(1)));

        let _ = player.item_update_queue_mut().take();
        assert_eq!(
            sword.set_state(ItemUpdateState::Removed, Some(&mut player)),
            Lifecycle::Alive
        );
        assert_eq!(sword.save_to_db(&db, None), Lifecycle::Discarded);
        assert_eq!(
            db.statements(),
            vec![
                Statement::DeleteItemInstance { item: ItemGuid(40) },
                Statement::DeleteGift { item: ItemGuid(40) },
            ]
        );
        for tx in db.commits.take() {
            store.commit(tx).expect("commit");
        }
        assert_eq!(store.gift_owner(ItemGuid(40)).expect("gift"), None);
        assert!(store.item_row(ItemGuid(40)).expect("row").is_none());
    }

    #[test]
    fn wrapped_items_load_with_their_wrapped_durability() {
        let catalog = catalog();
        let db = RecordingDb::default();
        let row = ItemRow {
            guid: 41,
            entry: SWORD,
            count: 1,
            charges: "-3 0 0 0 0 ".to_string(),
            flags: ItemFieldFlags::WRAPPED.bits(),
            durability: 999,
            ..Default::default()
        };
        let sword = Item::load_from_db(&row, Some(PlayerGuid(1)), &catalog, &NoHooks, &db).expect("load");
        assert!(sword.is_wrapped());
        assert_eq!(sword.durability(), 999);
        assert!(db.statements().is_empty());
    }

    #[test]
    fn property_ids_come_from_the_property_table() {
        let catalog = catalog();
        let mut rng = rand::thread_rng();
        assert_eq!(Item::generate_item_random_property_id(CLOAK, &catalog, &mut rng), 6);
        assert_eq!(Item::generate_item_random_property_id(MISCONFIGURED, &catalog, &mut rng), 0);

        let mut guids = ItemGuidGenerator::new(1);
        let cloak = Item::create_item(CLOAK, 1, None, CreateOptions::default(), &catalog, &NoHooks, &mut guids)
            .expect("cloak");
        assert_eq!(cloak.random_property_id(), 6);
        assert_eq!(cloak.item_suffix_factor(), 0);
        assert_eq!(cloak.enchantment_id(EnchantmentSlot::Prop0), 80);
        assert_eq!(cloak.enchantment_id(EnchantmentSlot::Prop1), 81);
        assert_eq!(cloak.enchantment_id(EnchantmentSlot::Prop2), 82);
        assert_eq!(cloak.enchantment_id(EnchantmentSlot::Prop3), 0);

        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let mut sword = owned(&catalog, &player, SWORD, 42);
        sword.set_item_random_properties(6, &catalog, Some(&mut player));
        assert_eq!(sword.random_property_id(), 6);
        assert_eq!(sword.enchantment_id(EnchantmentSlot::Prop2), 82);
        assert!(sword.is_in_update_queue_of(&player));

        sword.set_item_random_properties(99, &catalog, Some(&mut player));
        assert_eq!(sword.random_property_id(), 6);
    }

    #[test]
    fn clones_never_roll_their_own_properties() {
        let catalog = catalog();
        let mut guids = ItemGuidGenerator::new(1);
        let bare = CreateOptions { clone: true, ..Default::default() };
        let copy = Item::create_item(CLOAK, 1, None, bare, &catalog, &NoHooks, &mut guids).expect("copy");
        assert_eq!(copy.random_property_id(), 0);
        assert_eq!(copy.enchantment_id(EnchantmentSlot::Prop0), 0);

        let given = CreateOptions { clone: true, random_property_id: 6, ..Default::default() };
        let copy = Item::create_item(CLOAK, 1, None, given, &catalog, &NoHooks, &mut guids).expect("copy");
        assert_eq!(copy.random_property_id(), 6);
        assert_eq!(copy.enchantment_id(EnchantmentSlot::Prop1), 81);

        let mut player = PlayerContext::new(PlayerGuid(1), 1, 1);
        let helm = Item::create_item(HELM, 1, None, CreateOptions::default(), &catalog, &NoHooks, &mut guids)
            .expect("helm");
        let copy = helm
            .clone_item(1, Some(&mut player), &catalog, &NoHooks, &mut guids)
            .expect("copy");
        assert_eq!(copy.random_property_id(), -5);
        assert_eq!(copy.item_suffix_factor(), 60);
        assert_eq!(copy.enchantment_id(EnchantmentSlot::Prop0), 70);
    }

    #[test]
    fn bag_families_gate_special_bags() {
        let herb = ItemTemplate { bag_family: BagFamily::HERBS.bits(), ..Default::default() };
        let herb_bag = ItemTemplate {
            class: item_class::CONTAINER,
            subclass: container_subclass::HERB,
            ..Default::default()
        };
        let quiver = ItemTemplate {
            class: item_class::QUIVER,
            subclass: quiver_subclass::QUIVER,
            ..Default::default()
        };
        assert!(item_can_go_into_bag(&herb, &herb_bag));
        assert!(!item_can_go_into_bag(&herb, &quiver));
        let plain_bag = ItemTemplate { class: item_class::CONTAINER, ..Default::default() };
        assert!(item_can_go_into_bag(&herb_bag, &plain_bag));
        assert!(!item_can_go_into_bag(&plain_bag, &herb_bag));
    }
}
