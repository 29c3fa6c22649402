//! Configuration module
//!
//! Loaded from a TOML file; every field has a default so a partial (or
//! missing) file is fine. Default location:
//! `~/.config/ev-booking/config.toml`.
//!
//! ```toml
//! [storage]
//! persistence_enabled = true
//!
//! [booking.refund]
//! full_refund_mins = 20
//! grace_mins = 22
//!
//! [simulation]
//! speed = 60.0
//! ```

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::domain::{RefundPolicy, StatusThresholds};
use crate::shared::errors::ConfigError;

const APP_DIR: &str = "ev-booking";

/// Default config file path (`<config dir>/ev-booking/config.toml`).
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

/// Default durable store path (`<data dir>/ev-booking/store.json`).
pub fn default_store_path() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("store.json")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    #[validate(nested)]
    pub storage: StorageConfig,
    #[validate(nested)]
    pub cache: CacheConfig,
    #[validate(nested)]
    pub ledger: LedgerConfig,
    #[validate(nested)]
    pub booking: BookingConfig,
    #[validate(nested)]
    pub predictor: PredictorConfig,
    #[validate(nested)]
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    /// Re-run validation, e.g. after command-line overrides.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        Ok(())
    }
}

// ── Storage ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    /// Mirror cache and ledger writes to the durable store. Off means
    /// memory-only operation with nothing surviving a restart.
    pub persistence_enabled: bool,
    /// Durable store file; defaults to [`default_store_path`]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_store_path)
    }
}

// ── Cache ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    /// 0 disables expiry for plain `set` calls
    pub default_ttl_secs: u64,
    #[validate(range(min = 1))]
    pub max_memory_items: usize,
    #[validate(length(min = 1, message = "cache key prefix is required"))]
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            max_memory_items: 100,
            key_prefix: "ev_cache_".to_string(),
        }
    }
}

// ── Ledger ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LedgerConfig {
    /// Reload the ledger from storage when the in-process copy is older
    #[validate(range(min = 1))]
    pub freshness_window_hours: u64,
    /// Same-station requests closer than this are the same booking
    pub dedup_window_secs: u64,
    /// Default expiry offset from the booked instant
    pub expiry_after_mins: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            freshness_window_hours: 24,
            dedup_window_secs: 60,
            expiry_after_mins: 12,
        }
    }
}

// ── Booking flow ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BookingConfig {
    /// Simulated seconds the driver has to arrive once the slot starts
    #[validate(range(min = 1))]
    pub arrival_window_secs: u64,
    /// Wall-clock delay before a confirmation is reported as paid
    pub payment_delay_ms: u64,
    #[validate(range(min = 1, max = 168))]
    pub slot_count: usize,
    #[validate(nested)]
    pub refund: RefundConfig,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            arrival_window_secs: 600,
            payment_delay_ms: 2000,
            slot_count: 12,
            refund: RefundConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_refund_windows"))]
pub struct RefundConfig {
    pub full_refund_mins: u64,
    pub grace_mins: u64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub partial_refund_ratio: f64,
}

impl Default for RefundConfig {
    fn default() -> Self {
        Self {
            full_refund_mins: 10,
            grace_mins: 12,
            partial_refund_ratio: 0.5,
        }
    }
}

impl RefundConfig {
    pub fn policy(&self) -> RefundPolicy {
        RefundPolicy::new(
            Duration::minutes(self.full_refund_mins as i64),
            Duration::minutes(self.grace_mins as i64),
        )
        .with_partial_ratio(self.partial_refund_ratio)
    }
}

fn validate_refund_windows(cfg: &RefundConfig) -> Result<(), ValidationError> {
    if cfg.grace_mins < cfg.full_refund_mins {
        return Err(ValidationError::new("grace_shorter_than_full_refund_window"));
    }
    Ok(())
}

// ── Predictor ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_predictor"))]
pub struct PredictorConfig {
    #[validate(range(min = 0.0))]
    pub peak_multiplier: f64,
    #[validate(range(min = 0.0))]
    pub late_night_multiplier: f64,
    #[validate(range(min = 0.0))]
    pub midday_multiplier: f64,
    #[validate(range(min = 0.0))]
    pub weekend_factor: f64,
    #[validate(range(min = 0.0))]
    pub jitter_min: f64,
    #[validate(range(min = 0.0))]
    pub jitter_max: f64,
    /// Capacity reported for stations without a pattern
    #[validate(range(min = 1))]
    pub unknown_station_capacity: u32,
    pub thresholds: StatusThresholds,
    /// Fixed seed for reproducible predictions; OS entropy when absent
    pub seed: Option<u64>,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            peak_multiplier: 1.6,
            late_night_multiplier: 0.3,
            midday_multiplier: 1.2,
            weekend_factor: 0.7,
            jitter_min: 0.8,
            jitter_max: 1.2,
            unknown_station_capacity: 8,
            thresholds: StatusThresholds::default(),
            seed: None,
        }
    }
}

fn validate_predictor(cfg: &PredictorConfig) -> Result<(), ValidationError> {
    if cfg.jitter_min > cfg.jitter_max {
        return Err(ValidationError::new("jitter_min_above_jitter_max"));
    }
    let t = &cfg.thresholds;
    if !(t.moderate <= t.busy && t.busy <= t.full) {
        return Err(ValidationError::new("status_thresholds_not_ascending"));
    }
    Ok(())
}

// ── Simulation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated seconds per wall-clock second
    #[validate(range(min = 0.1, max = 3600.0))]
    pub speed: f64,
    #[validate(range(min = 10))]
    pub tick_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            tick_interval_ms: 1000,
        }
    }
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::milliseconds(self.tick_interval_ms as i64)
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error (or a full filter directive)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
