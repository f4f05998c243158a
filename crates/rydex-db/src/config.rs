//! # Engine Configuration
//!
//! Database and fare settings for the ride engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     RYDEX_DATABASE_PATH=/var/lib/rydex/rydex.db                        │
//! │     RYDEX_FARE_PER_KM_CENTS=6000                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ./rydex.toml, or the path given on the command line                │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     rydex.db, 5 connections, PKR 100 + PKR 50/km                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # rydex.toml
//! [database]
//! path = "rydex.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//! operation_timeout_ms = 10000
//!
//! [fare]
//! base_cents = 10000     # PKR 100.00
//! per_km_cents = 5000    # PKR 50.00 per km
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::DbConfig;
use rydex_core::fare::{DEFAULT_BASE_CENTS, DEFAULT_PER_KM_CENTS};
use rydex_core::{FarePolicy, Money};

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "rydex.toml";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Created on first run.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer queues for the write lock.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Deadline for every store operation.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("rydex.db")
}
fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout() -> u64 {
    5_000
}
fn default_operation_timeout() -> u64 {
    10_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
            operation_timeout_ms: default_operation_timeout(),
        }
    }
}

// =============================================================================
// Fare Settings
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareSettings {
    #[serde(default = "default_base_cents")]
    pub base_cents: i64,

    #[serde(default = "default_per_km_cents")]
    pub per_km_cents: i64,
}

fn default_base_cents() -> i64 {
    DEFAULT_BASE_CENTS
}
fn default_per_km_cents() -> i64 {
    DEFAULT_PER_KM_CENTS
}

impl Default for FareSettings {
    fn default() -> Self {
        FareSettings {
            base_cents: default_base_cents(),
            per_km_cents: default_per_km_cents(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub fare: FareSettings,
}

impl EngineConfig {
    /// Loads defaults, then the config file, then environment overrides.
    ///
    /// A missing file is not an error. A malformed one is.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            info!(?path, "Loading engine config from file");
            Self::from_file(&path)?
        } else {
            debug!(?path, "Config file not found, using defaults");
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.database.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "database.operation_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.fare.base_cents < 0 {
            return Err(ConfigError::Invalid("fare.base_cents must not be negative".into()));
        }
        if self.fare.per_km_cents <= 0 {
            return Err(ConfigError::Invalid(
                "fare.per_km_cents must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Applies `RYDEX_*` overrides read through `lookup`.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("RYDEX_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        override_number(&lookup, "RYDEX_MAX_CONNECTIONS", &mut self.database.max_connections);
        override_number(&lookup, "RYDEX_BUSY_TIMEOUT_MS", &mut self.database.busy_timeout_ms);
        override_number(
            &lookup,
            "RYDEX_OPERATION_TIMEOUT_MS",
            &mut self.database.operation_timeout_ms,
        );
        override_number(&lookup, "RYDEX_FARE_BASE_CENTS", &mut self.fare.base_cents);
        override_number(&lookup, "RYDEX_FARE_PER_KM_CENTS", &mut self.fare.per_km_cents);
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .operation_timeout(Duration::from_millis(self.database.operation_timeout_ms))
    }

    pub fn fare_policy(&self) -> FarePolicy {
        FarePolicy::new(
            Money::from_cents(self.fare.base_cents),
            Money::from_cents(self.fare.per_km_cents),
        )
    }
}

fn override_number<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable environment override"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
