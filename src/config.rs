// ⚙️ Configuration - TOML file + environment overrides
//
// Resolution order for the config file:
//   1. Explicit path (command-line argument)
//   2. PARKING_CONFIG environment variable
//   3. ./parking.toml
//   4. Compiled defaults
//
// A missing file falls back to defaults; a malformed file is an error.
// PARKING_DB_PATH and PARKING_BIND override single fields afterwards.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::store::{MemoryStore, ParkingStore};
use crate::tariff::{
    Amount, TariffCalculator, DEFAULT_FLAT_RATE, DEFAULT_TIER_LIMIT_HOURS, DEFAULT_UNIT_RATE,
};

pub const CONFIG_ENV: &str = "PARKING_CONFIG";
pub const DB_PATH_ENV: &str = "PARKING_DB_PATH";
pub const BIND_ENV: &str = "PARKING_BIND";
pub const DEFAULT_CONFIG_FILE: &str = "parking.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParkingConfig {
    pub tariff: TariffConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffConfig {
    pub unit_rate: Amount,
    pub flat_rate: Amount,
    pub tier_limit_hours: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_path: PathBuf,
    /// Seed the demo facility into an empty store
    pub seed_demo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for TariffConfig {
    fn default() -> Self {
        TariffConfig {
            unit_rate: DEFAULT_UNIT_RATE,
            flat_rate: DEFAULT_FLAT_RATE,
            tier_limit_hours: DEFAULT_TIER_LIMIT_HOURS,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Sqlite,
            database_path: PathBuf::from("parking.db"),
            seed_demo: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl TariffConfig {
    pub fn calculator(&self) -> TariffCalculator {
        TariffCalculator::new(self.unit_rate, self.flat_rate, self.tier_limit_hours)
    }
}

impl ParkingConfig {
    /// Parse TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ParkingConfig = toml::from_str(text).context("Invalid configuration TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load following the resolution order, then apply env overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if candidate.exists() {
            let text = std::fs::read_to_string(&candidate)
                .with_context(|| format!("Failed to read config {}", candidate.display()))?;
            let config = Self::from_toml_str(&text)
                .with_context(|| format!("Failed to load config {}", candidate.display()))?;
            info!(path = %candidate.display(), "configuration loaded");
            config
        } else {
            if explicit.is_some() {
                warn!(path = %candidate.display(), "config file not found, using defaults");
            }
            ParkingConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(path) = std::env::var_os(DB_PATH_ENV) {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Ok(bind) = std::env::var(BIND_ENV) {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tariff.unit_rate <= 0 {
            bail!("tariff.unit_rate must be positive");
        }
        if self.tariff.flat_rate <= 0 {
            bail!("tariff.flat_rate must be positive");
        }
        if self.tariff.tier_limit_hours == 0 {
            bail!("tariff.tier_limit_hours must be at least 1");
        }
        Ok(())
    }

    /// Build the store selected by `storage.backend`, without seeding it
    pub fn connect_store(&self) -> Result<Arc<dyn ParkingStore>> {
        Ok(match self.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Sqlite => {
                Arc::new(crate::db::SqliteStore::open(&self.storage.database_path)?)
            }
        })
    }

    /// Store ready for the engine: seeded with the demo facility if configured
    pub fn open_store(&self) -> Result<Arc<dyn ParkingStore>> {
        let store = self.connect_store()?;

        if self.storage.seed_demo && crate::provision::seed_demo_facility(store.as_ref())? {
            info!(backend = store.backend(), "demo facility seeded");
        }

        Ok(store)
    }
}
