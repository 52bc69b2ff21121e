//! Read-only static game data: item templates, item sets, spells, enchantments,
//! gems, random property tables and factions.
//!
//! A [`Catalog`] is built once from a JSON [`CatalogSnapshot`] and never mutated
//! afterwards. Everything in the item and reputation engines resolves ids through it.

use log::error;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::realm::errors::RealmError;
use crate::realm::types::{
    inventory_type, item_class, item_quality, trade_goods_subclass, BagFamily, Bonding,
    FactionFlags, TemplateFlags, MAX_ITEM_PROTO_SOCKETS, MAX_ITEM_PROTO_SPELLS,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateSpell {
    pub spell_id: u32,
    /// Negative charges mean the item is consumed when they run out.
    #[serde(default)]
    pub charges: i32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SocketDef {
    pub color: u32,
    #[serde(default)]
    pub content: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ItemTemplate {
    pub item_id: u32,
    pub name: String,
    pub class: u32,
    pub subclass: u32,
    pub inventory_type: u8,
    pub quality: u32,
    pub item_level: u32,
    pub max_durability: u32,
    pub max_stack: u32,
    pub spells: Vec<TemplateSpell>,
    pub sockets: Vec<SocketDef>,
    pub gem_properties: u32,
    pub bag_family: u32,
    pub bonding: Bonding,
    pub flags: u32,
    pub item_set: u32,
    pub duration: u32,
    pub random_property: u32,
    pub random_suffix: u32,
    pub map: u32,
    pub area: u32,
    pub item_limit_category: u32,
}

impl Default for ItemTemplate {
    fn default() -> Self {
        Self {
            item_id: 0,
            name: String::new(),
            class: item_class::CONSUMABLE,
            subclass: 0,
            inventory_type: inventory_type::NON_EQUIP,
            quality: item_quality::NORMAL,
            item_level: 1,
            max_durability: 0,
            max_stack: 1,
            spells: Vec::new(),
            sockets: Vec::new(),
            gem_properties: 0,
            bag_family: 0,
            bonding: Bonding::NoBind,
            flags: 0,
            item_set: 0,
            duration: 0,
            random_property: 0,
            random_suffix: 0,
            map: 0,
            area: 0,
            item_limit_category: 0,
        }
    }
}

impl ItemTemplate {
    pub fn template_flags(&self) -> TemplateFlags {
        TemplateFlags::from_bits_truncate(self.flags)
    }

    pub fn bag_family_mask(&self) -> BagFamily {
        BagFamily::from_bits_truncate(self.bag_family)
    }

    /// A zero stack size in data is treated as a single item.
    pub fn max_stack_size(&self) -> u32 {
        self.max_stack.max(1)
    }

    pub fn spell(&self, index: usize) -> Option<&TemplateSpell> {
        if index >= MAX_ITEM_PROTO_SPELLS {
            return None;
        }
        self.spells.get(index)
    }

    pub fn socket_color(&self, index: usize) -> u32 {
        if index >= MAX_ITEM_PROTO_SOCKETS {
            return 0;
        }
        self.sockets.get(index).map(|s| s.color).unwrap_or(0)
    }

    pub fn is_container(&self) -> bool {
        self.class == item_class::CONTAINER
    }

    pub fn is_armor_vellum(&self) -> bool {
        self.class == item_class::TRADE_GOODS
            && self.subclass == trade_goods_subclass::ARMOR_ENCHANTMENT
    }

    pub fn is_weapon_vellum(&self) -> bool {
        self.class == item_class::TRADE_GOODS
            && self.subclass == trade_goods_subclass::WEAPON_ENCHANTMENT
    }

    pub fn is_bound_account_wide(&self) -> bool {
        self.template_flags().contains(TemplateFlags::BOUND_TO_ACCOUNT)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemSetSpell {
    pub spell_id: u32,
    /// Number of equipped set pieces needed before the spell applies.
    pub threshold: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ItemSetEntry {
    pub id: u32,
    pub name: String,
    pub spells: Vec<ItemSetSpell>,
    pub required_skill_id: u32,
    pub required_skill_value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpellInfo {
    pub id: u32,
    /// -1 accepts any item class.
    pub equipped_item_class: i32,
    /// 0 accepts any subclass.
    pub equipped_item_subclass_mask: i32,
    /// 0 accepts any inventory type.
    pub equipped_item_inventory_type_mask: i32,
    /// Skill line the spell is an ability of, 0 if none.
    pub skill_line: u32,
}

impl Default for SpellInfo {
    fn default() -> Self {
        Self {
            id: 0,
            equipped_item_class: -1,
            equipped_item_subclass_mask: 0,
            equipped_item_inventory_type_mask: 0,
            skill_line: 0,
        }
    }
}

impl SpellInfo {
    pub fn is_ability_of_skill_type(&self, skill: u32) -> bool {
        self.skill_line != 0 && self.skill_line == skill
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnchantmentEntry {
    pub id: u32,
    /// Bitmask, see `ENCHANTMENT_CAN_SOULBOUND`.
    pub slot: u32,
    pub gem_id: u32,
    pub required_skill: u32,
    pub required_skill_value: u32,
    pub required_level: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GemProperties {
    pub id: u32,
    pub color: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RandomPropertyEntry {
    pub id: u32,
    #[serde(default)]
    pub enchantments: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RandomSuffixEntry {
    pub id: u32,
    #[serde(default)]
    pub enchantments: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnchantChance {
    pub ench_id: u32,
    /// Percentage in 0..100.
    pub chance: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnchantGroup {
    pub id: u32,
    pub entries: Vec<EnchantChance>,
}

/// Stat budget per item level, by quality and slot group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RandomPointsEntry {
    pub item_level: u32,
    pub epic: [u32; 5],
    pub rare: [u32; 5],
    pub uncommon: [u32; 5],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FactionEntry {
    pub id: u32,
    pub name: String,
    /// Slot in the character's reputation list, negative when not listed.
    pub reputation_list_id: i32,
    pub base_rep_race_mask: [u32; 4],
    pub base_rep_class_mask: [u32; 4],
    pub base_rep_value: [i32; 4],
    pub reputation_flags: [u32; 4],
    /// Parent faction id, 0 if none.
    pub team: u32,
    pub spillover_rate_in: f32,
    pub spillover_rate_out: f32,
    pub spillover_max_rank_in: u32,
}

impl Default for FactionEntry {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            reputation_list_id: -1,
            base_rep_race_mask: [0; 4],
            base_rep_class_mask: [0; 4],
            base_rep_value: [0; 4],
            reputation_flags: [0; 4],
            team: 0,
            spillover_rate_in: 0.0,
            spillover_rate_out: 0.0,
            spillover_max_rank_in: 0,
        }
    }
}

impl FactionEntry {
    /// Index of the race/class row that applies to a character, if any.
    pub fn base_index(&self, race_mask: u32, class_mask: u32) -> Option<usize> {
        (0..4).find(|&i| {
            let race = self.base_rep_race_mask[i];
            let class = self.base_rep_class_mask[i];
            (race & race_mask != 0 || (race == 0 && class != 0))
                && (class & class_mask != 0 || class == 0)
        })
    }

    pub fn is_listed(&self) -> bool {
        self.reputation_list_id >= 0
    }

    pub fn can_be_set_at_war(&self) -> bool {
        self.is_listed()
            && !self
                .reputation_flags
                .iter()
                .any(|f| FactionFlags::from_bits_truncate(*f).contains(FactionFlags::PEACE_FORCED))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SpilloverTarget {
    pub faction: u32,
    pub rate: f32,
    /// Highest rank at which the target still receives spillover.
    pub max_rank: u32,
}

/// Explicit spillover override, takes precedence over the team tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SpilloverTemplate {
    pub faction_id: u32,
    pub targets: Vec<SpilloverTarget>,
}

/// Serialized form of the whole static data set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSnapshot {
    pub item_templates: Vec<ItemTemplate>,
    pub item_sets: Vec<ItemSetEntry>,
    pub spells: Vec<SpellInfo>,
    pub enchantments: Vec<EnchantmentEntry>,
    pub gem_properties: Vec<GemProperties>,
    pub random_properties: Vec<RandomPropertyEntry>,
    pub random_suffixes: Vec<RandomSuffixEntry>,
    pub enchant_groups: Vec<EnchantGroup>,
    pub random_points: Vec<RandomPointsEntry>,
    pub factions: Vec<FactionEntry>,
    pub spillover_templates: Vec<SpilloverTemplate>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    item_templates: HashMap<u32, Arc<ItemTemplate>>,
    item_sets: HashMap<u32, ItemSetEntry>,
    spells: HashMap<u32, SpellInfo>,
    enchantments: HashMap<u32, EnchantmentEntry>,
    gem_properties: HashMap<u32, GemProperties>,
    random_properties: HashMap<u32, RandomPropertyEntry>,
    random_suffixes: HashMap<u32, RandomSuffixEntry>,
    enchant_groups: HashMap<u32, EnchantGroup>,
    random_points: HashMap<u32, RandomPointsEntry>,
    factions: BTreeMap<u32, FactionEntry>,
    faction_teams: HashMap<u32, Vec<u32>>,
    spillover_templates: HashMap<u32, SpilloverTemplate>,
}

impl Catalog {
    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let mut faction_teams: HashMap<u32, Vec<u32>> = HashMap::new();
        for faction in &snapshot.factions {
            if faction.team != 0 {
                faction_teams.entry(faction.team).or_default().push(faction.id);
            }
        }

        Self {
            item_templates: snapshot
                .item_templates
                .into_iter()
                .map(|t| (t.item_id, Arc::new(t)))
                .collect(),
            item_sets: snapshot.item_sets.into_iter().map(|s| (s.id, s)).collect(),
            spells: snapshot.spells.into_iter().map(|s| (s.id, s)).collect(),
            enchantments: snapshot.enchantments.into_iter().map(|e| (e.id, e)).collect(),
            gem_properties: snapshot.gem_properties.into_iter().map(|g| (g.id, g)).collect(),
            random_properties: snapshot
                .random_properties
                .into_iter()
                .map(|r| (r.id, r))
                .collect(),
            random_suffixes: snapshot.random_suffixes.into_iter().map(|r| (r.id, r)).collect(),
            enchant_groups: snapshot.enchant_groups.into_iter().map(|g| (g.id, g)).collect(),
            random_points: snapshot
                .random_points
                .into_iter()
                .map(|p| (p.item_level, p))
                .collect(),
            factions: snapshot.factions.into_iter().map(|f| (f.id, f)).collect(),
            faction_teams,
            spillover_templates: snapshot
                .spillover_templates
                .into_iter()
                .map(|s| (s.faction_id, s))
                .collect(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, RealmError> {
        let snapshot: CatalogSnapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Load a snapshot from a JSON file on disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RealmError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn item_template(&self, item_id: u32) -> Option<Arc<ItemTemplate>> {
        self.item_templates.get(&item_id).cloned()
    }

    pub fn item_set(&self, set_id: u32) -> Option<&ItemSetEntry> {
        self.item_sets.get(&set_id)
    }

    pub fn spell(&self, spell_id: u32) -> Option<&SpellInfo> {
        self.spells.get(&spell_id)
    }

    pub fn enchantment(&self, enchant_id: u32) -> Option<&EnchantmentEntry> {
        self.enchantments.get(&enchant_id)
    }

    pub fn gem_properties(&self, id: u32) -> Option<&GemProperties> {
        self.gem_properties.get(&id)
    }

    pub fn random_property(&self, id: u32) -> Option<&RandomPropertyEntry> {
        self.random_properties.get(&id)
    }

    pub fn random_suffix(&self, id: u32) -> Option<&RandomSuffixEntry> {
        self.random_suffixes.get(&id)
    }

    pub fn random_points(&self, item_level: u32) -> Option<&RandomPointsEntry> {
        self.random_points.get(&item_level)
    }

    pub fn faction(&self, faction_id: u32) -> Option<&FactionEntry> {
        self.factions.get(&faction_id)
    }

    /// All factions in id order.
    pub fn factions(&self) -> impl Iterator<Item = &FactionEntry> {
        self.factions.values()
    }

    /// Sub-factions whose parent team is `faction_id`.
    pub fn faction_team_list(&self, faction_id: u32) -> Option<&[u32]> {
        self.faction_teams.get(&faction_id).map(Vec::as_slice)
    }

    pub fn spillover_template(&self, faction_id: u32) -> Option<&SpilloverTemplate> {
        self.spillover_templates.get(&faction_id)
    }

    /// Roll one enchantment out of a weighted random-enchant group.
    pub fn roll_enchant_group<R: Rng + ?Sized>(&self, group_id: u32, rng: &mut R) -> u32 {
        if group_id == 0 {
            return 0;
        }
        let Some(group) = self.enchant_groups.get(&group_id) else {
            error!("Item random enchantment group #{} not found", group_id);
            return 0;
        };

        let roll: f32 = rng.gen_range(0.0..100.0);
        let mut total = 0.0f32;
        for entry in &group.entries {
            total += entry.chance;
            if total > roll {
                return entry.ench_id;
            }
        }

        // Chances summed to less than 100%: reroll inside the covered range.
        if total <= 0.0 {
            return 0;
        }
        let roll: f32 = rng.gen_range(0.0..total);
        let mut acc = 0.0f32;
        for entry in &group.entries {
            acc += entry.chance;
            if acc > roll {
                return entry.ench_id;
            }
        }
        0
    }

    /// Report data errors a loaded snapshot carries. Lookups degrade gracefully on
    /// these, so this is purely diagnostic.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut ids: Vec<_> = self.item_templates.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let Some(template) = self.item_templates.get(&id) else {
                continue;
            };
            if template.random_property != 0 && template.random_suffix != 0 {
                problems.push(format!(
                    "item template {} has both random property {} and random suffix {}",
                    id, template.random_property, template.random_suffix
                ));
            }
            if template.item_set != 0 && !self.item_sets.contains_key(&template.item_set) {
                problems.push(format!(
                    "item template {} references missing item set {}",
                    id, template.item_set
                ));
            }
            if template.spells.len() > MAX_ITEM_PROTO_SPELLS {
                problems.push(format!(
                    "item template {} lists {} spells, only {} are used",
                    id,
                    template.spells.len(),
                    MAX_ITEM_PROTO_SPELLS
                ));
            }
        }
        for (id, set) in &self.item_sets {
            for spell in &set.spells {
                if spell.spell_id != 0 && !self.spells.contains_key(&spell.spell_id) {
                    problems.push(format!("item set {} references missing spell {}", id, spell.spell_id));
                }
            }
        }
        for faction in self.factions.values() {
            if faction.team != 0 && !self.factions.contains_key(&faction.team) {
                problems.push(format!(
                    "faction {} references missing parent team {}",
                    faction.id, faction.team
                ));
            }
        }
        problems
    }
}
