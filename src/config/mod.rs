//! # Configuration Management Module
//!
//! Habitquest reads a single TOML file (`habitquest.toml` by default) organised into
//! sections:
//!
//! - [`StorageConfig`] - where the sled ledger database lives
//! - [`LedgerConfig`] - economy and calendar settings shared by every account
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use habitquest::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("habitquest.toml").await?;
//!     let config = Config::load("habitquest.toml").await?;
//!     println!("Ledger data: {}", config.storage.data_dir);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "./data/ledger"
//!
//! [ledger]
//! starting_coins = 0
//! day_boundary_offset_minutes = 0   # 0 = UTC midnight
//! pet_decay_per_day = 10
//! seed_catalog = true
//!
//! [logging]
//! level = "info"
//! file = "habitquest.log"
//! ```
//!
//! Missing `[ledger]` keys fall back to their defaults, so older files keep loading.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::ledger::calendar::DayBoundary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    /// Coins granted to newly registered accounts
    #[serde(default)]
    pub starting_coins: u64,
    /// Offset east of UTC, in minutes, at whose midnight a new day starts
    #[serde(default)]
    pub day_boundary_offset_minutes: i32,
    /// Pet happiness lost per 24 hours without feeding
    #[serde(default = "default_pet_decay_per_day")]
    pub pet_decay_per_day: u32,
    /// Seed the starter catalog into an empty store on open
    #[serde(default = "default_seed_catalog")]
    pub seed_catalog: bool,
}

fn default_pet_decay_per_day() -> u32 {
    10
}

fn default_seed_catalog() -> bool {
    true
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_coins: 0,
            day_boundary_offset_minutes: 0,
            pet_decay_per_day: default_pet_decay_per_day(),
            seed_catalog: default_seed_catalog(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Load configuration from file
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
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("[storage] data_dir must not be empty"));
        }
        DayBoundary::from_offset_minutes(self.ledger.day_boundary_offset_minutes)
            .map_err(|e| anyhow!("Invalid [ledger] day_boundary_offset_minutes: {}", e))?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig {
                data_dir: "./data/ledger".to_string(),
            },
            ledger: LedgerConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("habitquest.log".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("habitquest.toml");
        let path = path.to_str().unwrap();

        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.storage.data_dir, "./data/ledger");
        assert_eq!(loaded.ledger, LedgerConfig::default());
        assert_eq!(loaded.logging.level, "info");
    }

    #[tokio::test]
    async fn missing_ledger_section_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minimal.toml");
        std::fs::write(
            &path,
            "[storage]\ndata_dir = \"/tmp/hq\"\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let loaded = Config::load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(loaded.ledger.pet_decay_per_day, 10);
        assert!(loaded.ledger.seed_catalog);
        assert_eq!(loaded.logging.file, None);
    }

    #[tokio::test]
    async fn out_of_range_boundary_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(
            &path,
            "[storage]\ndata_dir = \"x\"\n[ledger]\nday_boundary_offset_minutes = 2000\n[logging]\nlevel = \"info\"\n",
        )
        .unwrap();
        assert!(Config::load(path.to_str().unwrap()).await.is_err());
    }

    #[test]
    fn negative_offset_within_range_is_accepted() {
        let mut config = Config::default();
        config.ledger.day_boundary_offset_minutes = -300;
        assert!(config.validate().is_ok());
        config.storage.data_dir = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
