//! # Configuration Management Module
//!
//! Server-wide settings for the realm engine, read from a TOML file.
//!
//! ## Configuration Structure
//!
//! - [`RatesConfig`] - Reputation gain multiplier and the factions exempt from it
//! - [`ItemsConfig`] - Refund and soulbound trade windows
//! - [`StorageConfig`] - Character database location
//! - [`CatalogConfig`] - Static game data snapshot
//! - [`LoggingConfig`] - Logging level and optional file sink
//!
//! ## Usage
//!
//! ```rust,no_run
//! use realmcore::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("realmcore.toml").await?;
//!     let config = Config::load("realmcore.toml").await?;
//!     println!("Reputation gain: {}", config.rates.reputation_gain);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [rates]
//! reputation_gain = 1.0
//! rate_exempt_factions = [1161]
//!
//! [items]
//! refund_window_secs = 7200
//! bop_trade_window_secs = 7200
//!
//! [storage]
//! data_dir = "./data"
//!
//! [catalog]
//! path = "./data/catalog.json"
//!
//! [logging]
//! level = "info"
//! file = "realmcore.log"
//! ```
//!
//! Every section is optional; missing values fall back to the defaults above.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::realm::item::TradeWindows;
use crate::realm::reputation::ReputationRates;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesConfig {
    /// Multiplier applied to incremental reputation awards.
    #[serde(default = "default_reputation_gain")]
    pub reputation_gain: f32,
    /// Factions whose awards are never scaled by `reputation_gain`.
    #[serde(default = "default_rate_exempt_factions")]
    pub rate_exempt_factions: Vec<u32>,
}

fn default_reputation_gain() -> f32 {
    1.0
}

fn default_rate_exempt_factions() -> Vec<u32> {
    vec![1161]
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            reputation_gain: default_reputation_gain(),
            rate_exempt_factions: default_rate_exempt_factions(),
        }
    }
}

impl RatesConfig {
    pub fn reputation_rates(&self) -> ReputationRates {
        ReputationRates {
            gain: self.reputation_gain,
            exempt_factions: self.rate_exempt_factions.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsConfig {
    /// Seconds of played time a purchase stays refundable.
    #[serde(default = "default_trade_window")]
    pub refund_window_secs: u32,
    /// Seconds a freshly looted soulbound item may be traded to its allow-list.
    #[serde(default = "default_trade_window")]
    pub bop_trade_window_secs: u32,
}

fn default_trade_window() -> u32 {
    2 * 60 * 60
}

impl Default for ItemsConfig {
    fn default() -> Self {
        Self {
            refund_window_secs: default_trade_window(),
            bop_trade_window_secs: default_trade_window(),
        }
    }
}

impl ItemsConfig {
    pub fn trade_windows(&self) -> TradeWindows {
        TradeWindows {
            refund: self.refund_window_secs,
            bop_trade: self.bop_trade_window_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

impl StorageConfig {
    /// Sled database directory for character rows.
    pub fn characters_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("characters")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "./data/catalog.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("realmcore.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub items: ItemsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let gain = self.rates.reputation_gain;
        if !gain.is_finite() || gain < 0.0 {
            return Err(anyhow!("rates.reputation_gain must be a non-negative number, got {}", gain));
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        Ok(())
    }
}
