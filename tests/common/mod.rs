//! Shared fixtures for the integration tests.

use realmcore::realm::{Catalog, PlayerContext, PlayerGuid};

/// A small static data set: three item templates and a faction family with
/// both team and template spillover.
pub const CATALOG_JSON: &str = r#"{
  "item_templates": [
    { "item_id": 100, "name": "Linen Cloth", "class": 7, "max_stack": 20 },
    { "item_id": 200, "name": "Sand Timer", "duration": 3600 },
    { "item_id": 300, "name": "Worn Shortsword", "class": 2, "inventory_type": 13,
      "max_durability": 50, "bonding": "picked_up" }
  ],
  "factions": [
    { "id": 1, "name": "Alliance Vanguard", "reputation_list_id": 0 },
    { "id": 2, "name": "Valiance Expedition", "reputation_list_id": 1, "team": 1,
      "spillover_rate_out": 1.0, "spillover_rate_in": 0.5, "spillover_max_rank_in": 7 },
    { "id": 3, "name": "Explorers League", "reputation_list_id": 2, "team": 1,
      "spillover_rate_out": 1.0, "spillover_rate_in": 0.5, "spillover_max_rank_in": 7 },
    { "id": 4, "name": "Frenzyheart Tribe", "reputation_list_id": 3 },
    { "id": 5, "name": "Unlisted Guild" }
  ],
  "spillover_templates": [
    { "faction_id": 4, "targets": [ { "faction": 2, "rate": 0.25, "max_rank": 4 } ] }
  ]
}"#;

pub fn catalog() -> Catalog {
    Catalog::from_json_str(CATALOG_JSON).expect("fixture catalog parses")
}

#[allow(dead_code)]
pub fn player(guid: u32) -> PlayerContext {
    PlayerContext::new(PlayerGuid(guid), 1, 1)
}
