//! Per-character faction standing.
//!
//! Standing is stored as a delta over the base value a character's race and
//! class receive from the faction table. Rank is a step function of the total
//! over eight fixed bands. A [`ReputationMgr`] holds one [`FactionState`] per
//! listed faction, keyed by reputation list id, plus rank counters and the
//! forced reactions shown to the client.

use std::collections::BTreeMap;

use log::{debug, error, warn};

use crate::realm::catalog::{Catalog, FactionEntry};
use crate::realm::hooks::ScriptHooks;
use crate::realm::session::{Notification, Outbox, INITIAL_FACTION_TABLE_SIZE};
use crate::realm::storage::{ReputationRow, Statement, Transaction};
use crate::realm::types::{FactionFlags, PlayerGuid, ReputationRank};

/// Width of each rank band, Hated first.
pub const POINTS_IN_RANK: [i32; 8] = [36000, 3000, 3000, 3000, 6000, 12000, 21000, 1000];
pub const REPUTATION_CAP: i32 = 42999;
pub const REPUTATION_BOTTOM: i32 = -42000;

/// Scaled awards closer than this to a whole number are not rounded.
const ROUNDING_EPSILON: f32 = 1e-4;

pub fn reputation_to_rank(standing: i32) -> ReputationRank {
    let mut limit = REPUTATION_CAP + 1;
    for rank in ReputationRank::ALL.iter().rev() {
        limit -= POINTS_IN_RANK[rank.index()];
        if standing >= limit {
            return *rank;
        }
    }
    ReputationRank::Hated
}

/// Representative standing of a rank: one below its band's upper bound.
pub fn rank_to_standing(rank: ReputationRank) -> i32 {
    let standing = REPUTATION_BOTTOM + POINTS_IN_RANK[..=rank.index()].iter().sum::<i32>();
    (standing - 1).max(REPUTATION_BOTTOM)
}

/// Global reputation gain multiplier and the factions it does not apply to.
#[derive(Debug, Clone, PartialEq)]
pub struct ReputationRates {
    pub gain: f32,
    pub exempt_factions: Vec<u32>,
}

impl Default for ReputationRates {
    fn default() -> Self {
        Self {
            gain: 1.0,
            exempt_factions: vec![1161],
        }
    }
}

impl ReputationRates {
    pub fn multiplier_for(&self, faction_id: u32) -> f32 {
        if self.exempt_factions.contains(&faction_id) {
            1.0
        } else {
            self.gain
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactionState {
    pub id: u32,
    pub reputation_list_id: u32,
    /// Delta over the character's base standing.
    pub standing: i32,
    pub flags: FactionFlags,
    pub need_send: bool,
    pub need_save: bool,
    /// Direction the next fractional award rounds in.
    pub rounded_up: bool,
}

/// Collaborators a standing change reaches out to.
pub struct ReputationEnv<'a> {
    pub catalog: &'a Catalog,
    pub hooks: &'a dyn ScriptHooks,
    pub outbox: &'a mut Outbox,
}

#[derive(Debug)]
pub struct ReputationMgr {
    player: PlayerGuid,
    race_mask: u32,
    class_mask: u32,
    rates: ReputationRates,
    factions: BTreeMap<u32, FactionState>,
    forced_reactions: BTreeMap<u32, ReputationRank>,
    visible_faction_count: u32,
    honored_faction_count: u32,
    revered_faction_count: u32,
    exalted_faction_count: u32,
    send_faction_increased: bool,
}

fn list_id(faction: &FactionEntry) -> Option<u32> {
    u32::try_from(faction.reputation_list_id).ok()
}

impl ReputationMgr {
    pub fn new(player: PlayerGuid, race_mask: u32, class_mask: u32, rates: ReputationRates) -> Self {
        Self {
            player,
            race_mask,
            class_mask,
            rates,
            factions: BTreeMap::new(),
            forced_reactions: BTreeMap::new(),
            visible_faction_count: 0,
            honored_faction_count: 0,
            revered_faction_count: 0,
            exalted_faction_count: 0,
            send_faction_increased: false,
        }
    }

    pub fn player(&self) -> PlayerGuid {
        self.player
    }

    pub fn rates(&self) -> &ReputationRates {
        &self.rates
    }

    pub fn visible_faction_count(&self) -> u32 {
        self.visible_faction_count
    }

    pub fn honored_faction_count(&self) -> u32 {
        self.honored_faction_count
    }

    pub fn revered_faction_count(&self) -> u32 {
        self.revered_faction_count
    }

    pub fn exalted_faction_count(&self) -> u32 {
        self.exalted_faction_count
    }

    pub fn state(&self, reputation_list_id: u32) -> Option<&FactionState> {
        self.factions.get(&reputation_list_id)
    }

    pub fn state_of(&self, faction: &FactionEntry) -> Option<&FactionState> {
        list_id(faction).and_then(|id| self.factions.get(&id))
    }

    /// All tracked factions in list id order.
    pub fn states(&self) -> impl Iterator<Item = &FactionState> {
        self.factions.values()
    }

    pub fn base_reputation(&self, faction: &FactionEntry) -> i32 {
        faction
            .base_index(self.race_mask, self.class_mask)
            .map(|i| faction.base_rep_value[i])
            .unwrap_or(0)
    }

    fn default_state_flags(&self, faction: &FactionEntry) -> FactionFlags {
        faction
            .base_index(self.race_mask, self.class_mask)
            .map(|i| FactionFlags::from_bits_truncate(faction.reputation_flags[i]))
            .unwrap_or_default()
    }

    /// Total standing; factions without a state read as 0.
    pub fn reputation_of(&self, faction: &FactionEntry) -> i32 {
        match self.state_of(faction) {
            Some(state) => self.base_reputation(faction).saturating_add(state.standing),
            None => 0,
        }
    }

    pub fn reputation(&self, faction_id: u32, catalog: &Catalog) -> i32 {
        match catalog.faction(faction_id) {
            Some(faction) => self.reputation_of(faction),
            None => {
                error!(
                    "ReputationMgr::reputation: can't get reputation of {} for unknown faction #{}",
                    self.player, faction_id
                );
                0
            }
        }
    }

    pub fn rank(&self, faction: &FactionEntry) -> ReputationRank {
        reputation_to_rank(self.reputation_of(faction))
    }

    pub fn base_rank(&self, faction: &FactionEntry) -> ReputationRank {
        reputation_to_rank(self.base_reputation(faction))
    }

    pub fn rank_by_id(&self, faction_id: u32, catalog: &Catalog) -> ReputationRank {
        reputation_to_rank(self.reputation(faction_id, catalog))
    }

    pub fn is_at_war(&self, faction_id: u32, catalog: &Catalog) -> bool {
        let Some(faction) = catalog.faction(faction_id) else {
            error!(
                "ReputationMgr::is_at_war: can't get at-war flag of {} for unknown faction #{}",
                self.player, faction_id
            );
            return false;
        };
        self.state_of(faction)
            .is_some_and(|state| state.flags.contains(FactionFlags::AT_WAR))
    }

    pub fn apply_force_reaction(&mut self, faction_id: u32, rank: ReputationRank, apply: bool) {
        if apply {
            self.forced_reactions.insert(faction_id, rank);
        } else {
            self.forced_reactions.remove(&faction_id);
        }
    }

    pub fn forced_reaction(&self, faction_id: u32) -> Option<ReputationRank> {
        self.forced_reactions.get(&faction_id).copied()
    }

    pub fn send_force_reactions(&self, outbox: &mut Outbox) {
        let reactions = self
            .forced_reactions
            .iter()
            .map(|(faction, rank)| (*faction, *rank))
            .collect();
        outbox.send(Notification::ForcedReactions(reactions));
    }

    /// Report one faction's standing, followed by every other faction still pending.
    pub fn send_state(&mut self, reputation_list_id: u32, outbox: &mut Outbox) {
        let Some(target) = self.factions.get(&reputation_list_id) else {
            return;
        };
        let mut entries = vec![(target.reputation_list_id, target.standing)];
        let increased = std::mem::take(&mut self.send_faction_increased);

        for state in self.factions.values_mut() {
            if !state.need_send {
                continue;
            }
            state.need_send = false;
            if state.reputation_list_id != reputation_list_id {
                entries.push((state.reputation_list_id, state.standing));
            }
        }

        outbox.send(Notification::FactionStanding { increased, entries });
    }

    pub fn send_states(&mut self, outbox: &mut Outbox) {
        let ids: Vec<u32> = self.factions.keys().copied().collect();
        for id in ids {
            self.send_state(id, outbox);
        }
    }

    pub fn send_initial_reputations(&mut self, outbox: &mut Outbox) {
        let mut table = vec![(0u8, 0i32); INITIAL_FACTION_TABLE_SIZE];
        for (id, state) in self.factions.iter_mut() {
            match table.get_mut(*id as usize) {
                Some(entry) => *entry = (state.flags.bits() as u8, state.standing),
                None => warn!(
                    "Reputation list id {} of faction {} does not fit the initial faction table",
                    id, state.id
                ),
            }
            state.need_send = false;
        }
        outbox.send(Notification::InitializeFactions(table));
    }

    fn send_visible(&self, reputation_list_id: u32, outbox: &mut Outbox) {
        if outbox.is_loading() {
            return;
        }
        outbox.send(Notification::FactionVisible { reputation_list_id });
    }

    /// Rebuild every faction state from static data with no personal standing.
    pub fn initialize(&mut self, catalog: &Catalog) {
        self.factions.clear();
        self.visible_faction_count = 0;
        self.honored_faction_count = 0;
        self.revered_faction_count = 0;
        self.exalted_faction_count = 0;
        self.send_faction_increased = false;

        for faction in catalog.factions() {
            let Some(list_id) = list_id(faction) else {
                continue;
            };
            let state = FactionState {
                id: faction.id,
                reputation_list_id: list_id,
                standing: 0,
                flags: self.default_state_flags(faction),
                need_send: true,
                need_save: true,
                rounded_up: false,
            };
            if state.flags.contains(FactionFlags::VISIBLE) {
                self.visible_faction_count += 1;
            }
            self.update_rank_counters(ReputationRank::Hostile, self.base_rank(faction));
            self.factions.insert(list_id, state);
        }
    }

    /// Re-initialise, then overlay stored rows. Rows are keyed by faction id.
    pub fn load_from_db(&mut self, rows: &[ReputationRow], catalog: &Catalog, outbox: &mut Outbox) {
        self.initialize(catalog);

        for row in rows {
            let Some(faction) = catalog.faction(u32::from(row.faction)) else {
                continue;
            };
            let Some(list_id) = list_id(faction) else {
                continue;
            };
            let base = self.base_reputation(faction);
            let total = base.saturating_add(row.standing).clamp(REPUTATION_BOTTOM, REPUTATION_CAP);
            let standing = total - base;
            let clamped = standing != row.standing;
            if clamped {
                warn!(
                    "Player {} faction {} stored standing {} is out of range, clamped to {}",
                    self.player, row.faction, row.standing, standing
                );
            }
            let Some(state) = self.factions.get_mut(&list_id) else {
                continue;
            };
            state.standing = standing;
            self.update_rank_counters(reputation_to_rank(base), reputation_to_rank(total));

            let db_flags = FactionFlags::from_bits_retain(u32::from(row.flags));

            if db_flags.contains(FactionFlags::VISIBLE) {
                self.set_visible_state(list_id, outbox);
            }

            if db_flags.contains(FactionFlags::INACTIVE) {
                self.set_inactive_state(list_id, true);
            }

            if db_flags.contains(FactionFlags::AT_WAR) {
                // Hidden factions stay at war only while still unfriendly or worse.
                let at_war = !db_flags.contains(FactionFlags::HIDDEN)
                    || self.rank(faction) < ReputationRank::Neutral;
                self.set_at_war_state(list_id, at_war);
            } else if self
                .factions
                .get(&list_id)
                .is_some_and(|s| s.flags.contains(FactionFlags::VISIBLE))
            {
                self.set_at_war_state(list_id, false);
            }

            if self.rank(faction) <= ReputationRank::Hostile {
                self.set_at_war_state(list_id, true);
            }

            if let Some(state) = self.factions.get_mut(&list_id) {
                if state.flags == db_flags && !clamped {
                    state.need_send = false;
                    state.need_save = false;
                }
                state.rounded_up = false;
            }
        }
    }

    /// Queue a delete and insert for every faction with unsaved changes.
    pub fn save_to_db(&mut self, transaction: &mut Transaction) {
        for state in self.factions.values_mut() {
            if !state.need_save {
                continue;
            }
            let faction = state.id as u16;
            transaction.append(Statement::DeleteReputation {
                player: self.player,
                faction,
            });
            transaction.append(Statement::InsertReputation {
                player: self.player,
                row: ReputationRow {
                    faction,
                    standing: state.standing,
                    flags: state.flags.bits() as u16,
                },
            });
            state.need_save = false;
        }
    }

    /// Incremental award with spillover and no rank cap.
    pub fn modify_reputation(&mut self, faction_id: u32, standing: f32, env: &mut ReputationEnv<'_>) -> bool {
        self.set_reputation(faction_id, standing, true, false, None, env)
    }

    /// Change a faction's standing, spilling over to related factions first.
    ///
    /// With a `rank_cap` the faction never rises above that rank, and a faction
    /// already above it only passes spillover on. The faction's state is
    /// reported to the client either way.
    pub fn set_reputation(
        &mut self,
        faction_id: u32,
        standing: f32,
        incremental: bool,
        no_spillover: bool,
        rank_cap: Option<ReputationRank>,
        env: &mut ReputationEnv<'_>,
    ) -> bool {
        let catalog = env.catalog;
        let Some(faction) = catalog.faction(faction_id) else {
            error!(
                "ReputationMgr::set_reputation: unknown faction #{} for {}",
                faction_id, self.player
            );
            return false;
        };

        let mut res = false;

        if !no_spillover {
            if let Some(template) = catalog.spillover_template(faction.id) {
                for target in &template.targets {
                    if target.faction == 0 {
                        continue;
                    }
                    let Some(target_faction) = catalog.faction(target.faction) else {
                        error!(
                            "Spillover template of faction {} names unknown faction {}",
                            faction.id, target.faction
                        );
                        continue;
                    };
                    if self.rank(target_faction) <= ReputationRank::from_index(target.max_rank) {
                        self.set_one_faction_reputation(
                            target_faction,
                            standing * target.rate,
                            incremental,
                            None,
                            env,
                        );
                    }
                }
            } else {
                let mut spillover_out = standing;
                let mut team = catalog.faction_team_list(faction.id);

                // No sub-factions of its own: spill to the parent or the siblings.
                if team.is_none() && faction.team != 0 && faction.spillover_rate_out != 0.0 {
                    spillover_out *= faction.spillover_rate_out;
                    if let Some(parent) = catalog.faction(faction.team) {
                        let parent_special = self
                            .state_of(parent)
                            .is_some_and(|s| s.flags.contains(FactionFlags::SPECIAL));
                        if parent_special {
                            self.set_one_faction_reputation(parent, spillover_out, incremental, None, env);
                        } else {
                            team = catalog.faction_team_list(faction.team);
                        }
                    }
                }

                for member_id in team.unwrap_or_default() {
                    let Some(member) = catalog.faction(*member_id) else {
                        continue;
                    };
                    if member.id == faction.id
                        || self.rank(member) > ReputationRank::from_index(member.spillover_max_rank_in)
                    {
                        continue;
                    }
                    let spillover = spillover_out * member.spillover_rate_in;
                    if spillover != 0.0 || !incremental {
                        res = self.set_one_faction_reputation(member, spillover, incremental, None, env);
                    }
                }
            }
        }

        let spillover_only = rank_cap.is_some_and(|cap| self.rank(faction) > cap);

        if let Some(list_id) = list_id(faction).filter(|id| self.factions.contains_key(id)) {
            if !spillover_only {
                res = self.set_one_faction_reputation(faction, standing, incremental, rank_cap, env);
            }
            self.send_state(list_id, env.outbox);
        }
        res
    }

    /// Apply a change to one faction only. Returns false if the faction is not
    /// tracked or a script vetoed the change.
    pub fn set_one_faction_reputation(
        &mut self,
        faction: &FactionEntry,
        stand: f32,
        incremental: bool,
        rank_cap: Option<ReputationRank>,
        env: &mut ReputationEnv<'_>,
    ) -> bool {
        let Some(list_id) = list_id(faction) else {
            return false;
        };
        let Some(state) = self.factions.get(&list_id) else {
            return false;
        };
        let base = self.base_reputation(faction);
        let current = state.standing;

        let stand = if incremental {
            stand * self.rates.multiplier_for(faction.id)
        } else {
            stand
        };

        // Fractional awards alternate between rounding down and up so repeated
        // small gains neither drift high nor low.
        let mut rounded_up = state.rounded_up;
        let mut standing = if (stand - stand.round()).abs() < ROUNDING_EPSILON {
            stand.round() as i32
        } else {
            let value = if rounded_up { stand.ceil() } else { stand.trunc() };
            rounded_up = !rounded_up;
            value as i32
        };

        if incremental {
            standing = standing.saturating_add(current + base);
        }
        standing = standing.clamp(REPUTATION_BOTTOM, REPUTATION_CAP);

        let old_rank = reputation_to_rank(current + base);
        let mut new_rank = reputation_to_rank(standing);
        if let Some(cap) = rank_cap {
            if new_rank > cap {
                standing = rank_to_standing(cap);
                new_rank = cap;
            }
        }

        if !env
            .hooks
            .on_reputation_change(self.player, faction.id, standing, incremental)
        {
            return false;
        }

        if let Some(state) = self.factions.get_mut(&list_id) {
            state.standing = standing - base;
            state.need_send = true;
            state.need_save = true;
            state.rounded_up = rounded_up;
        }

        self.set_visible_state(list_id, env.outbox);

        if new_rank <= ReputationRank::Hostile {
            self.set_at_war_state(list_id, true);
        }

        if old_rank == ReputationRank::Hostile
            && new_rank >= ReputationRank::Unfriendly
            && faction.can_be_set_at_war()
        {
            self.set_at_war_state(list_id, false);
        }

        if new_rank > old_rank {
            self.send_faction_increased = true;
        }

        if new_rank != old_rank {
            env.hooks.on_reputation_rank_change(
                self.player,
                faction.id,
                new_rank,
                old_rank,
                self.send_faction_increased,
            );
        }

        self.update_rank_counters(old_rank, new_rank);
        debug!(
            "{} standing with faction {} now {} ({})",
            self.player, faction.id, standing, new_rank
        );
        true
    }

    /// Show a faction reached through a faction template, unless it belongs to
    /// the opposing team.
    pub fn set_visible_for_template(&mut self, template_faction_id: u32, catalog: &Catalog, outbox: &mut Outbox) {
        if template_faction_id == 0 {
            return;
        }
        let Some(faction) = catalog.faction(template_faction_id) else {
            return;
        };
        let opposing_team =
            faction.base_rep_race_mask[1] & self.race_mask != 0 && faction.base_rep_value[1] == REPUTATION_BOTTOM;
        if !opposing_team {
            self.set_visible(faction, outbox);
        }
    }

    pub fn set_visible(&mut self, faction: &FactionEntry, outbox: &mut Outbox) {
        let Some(list_id) = list_id(faction) else {
            return;
        };
        self.set_visible_state(list_id, outbox);
    }

    fn set_visible_state(&mut self, list_id: u32, outbox: &mut Outbox) {
        let Some(state) = self.factions.get_mut(&list_id) else {
            return;
        };
        // Forced-invisible and hidden factions stay hidden unless special.
        if state
            .flags
            .intersects(FactionFlags::INVISIBLE_FORCED | FactionFlags::HIDDEN)
            && !state.flags.contains(FactionFlags::SPECIAL)
        {
            return;
        }
        if state.flags.contains(FactionFlags::VISIBLE) {
            return;
        }

        state.flags.insert(FactionFlags::VISIBLE);
        state.need_send = true;
        state.need_save = true;
        self.visible_faction_count += 1;

        self.send_visible(list_id, outbox);
    }

    pub fn set_at_war(&mut self, reputation_list_id: u32, on: bool) {
        let Some(state) = self.factions.get(&reputation_list_id) else {
            return;
        };
        if state
            .flags
            .intersects(FactionFlags::INVISIBLE_FORCED | FactionFlags::HIDDEN)
        {
            return;
        }
        self.set_at_war_state(reputation_list_id, on);
    }

    fn set_at_war_state(&mut self, list_id: u32, at_war: bool) {
        let Some(state) = self.factions.get_mut(&list_id) else {
            return;
        };
        // Own faction can't be declared war on.
        if at_war && state.flags.contains(FactionFlags::PEACE_FORCED) {
            return;
        }
        if state.flags.contains(FactionFlags::AT_WAR) == at_war {
            return;
        }
        state.flags.set(FactionFlags::AT_WAR, at_war);
        state.need_send = true;
        state.need_save = true;
    }

    pub fn set_inactive(&mut self, reputation_list_id: u32, on: bool) {
        self.set_inactive_state(reputation_list_id, on);
    }

    fn set_inactive_state(&mut self, list_id: u32, inactive: bool) {
        let Some(state) = self.factions.get_mut(&list_id) else {
            return;
        };
        if inactive
            && (state
                .flags
                .intersects(FactionFlags::INVISIBLE_FORCED | FactionFlags::HIDDEN)
                || !state.flags.contains(FactionFlags::VISIBLE))
        {
            return;
        }
        if state.flags.contains(FactionFlags::INACTIVE) == inactive {
            return;
        }
        state.flags.set(FactionFlags::INACTIVE, inactive);
        state.need_send = true;
        state.need_save = true;
    }

    fn update_rank_counters(&mut self, old_rank: ReputationRank, new_rank: ReputationRank) {
        if old_rank >= ReputationRank::Exalted {
            self.exalted_faction_count = self.exalted_faction_count.saturating_sub(1);
        }
        if old_rank >= ReputationRank::Revered {
            self.revered_faction_count = self.revered_faction_count.saturating_sub(1);
        }
        if old_rank >= ReputationRank::Honored {
            self.honored_faction_count = self.honored_faction_count.saturating_sub(1);
        }

        if new_rank >= ReputationRank::Exalted {
            self.exalted_faction_count += 1;
        }
        if new_rank >= ReputationRank::Revered {
            self.revered_faction_count += 1;
        }
        if new_rank >= ReputationRank::Honored {
            self.honored_faction_count += 1;
        }
    }
}
