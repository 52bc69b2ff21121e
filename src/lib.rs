//! # Realmcore - Item and Reputation Engine for Game Realm Servers
//!
//! Realmcore models two pieces of per-character state on a persistent
//! multiplayer game server: the lifecycle of individual item instances and a
//! character's standing with factions.
//!
//! ## Features
//!
//! - **Item lifecycle**: creation from templates, load-time self-healing, a
//!   four-state persistence machine and a per-owner update queue.
//! - **Enchantments and sockets**: twelve enchantment slots, gem fitting, random
//!   properties and suffixes.
//! - **Refunds and soulbound trading**: played-time windows tracked per item.
//! - **Reputation**: eight-rank standing with rate scaling, rank caps,
//!   spillover to related factions and at-war/visibility rules.
//! - **Persistence**: typed write statements batched into transactions and
//!   applied to a sled store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use realmcore::config::Config;
//! use realmcore::realm::{Catalog, Outbox, PlayerGuid, ReputationMgr, SledCharacterStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("realmcore.toml").await?;
//!     let catalog = Catalog::load(&config.catalog.path)?;
//!     let store = SledCharacterStore::open(config.storage.characters_path())?;
//!
//!     let player = PlayerGuid(1);
//!     let mut reputation = ReputationMgr::new(player, 1, 1, config.rates.reputation_rates());
//!     let mut outbox = Outbox::new();
//!     reputation.load_from_db(&store.load_reputation_rows(player)?, &catalog, &mut outbox);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`realm`] - Items, reputation, static data and persistence
//! - [`config`] - Configuration management
//! - [`logutil`] - Helpers for keeping log lines readable

pub mod config;
pub mod logutil;
pub mod realm;
