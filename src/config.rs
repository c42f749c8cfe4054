// Copyright (c) 2026 Omen Fan Utility Contributors
// Licensed under the MIT License

//! Configuration file handling.
//!
//! Curve breakpoints and control tuning are read from TOML.
//! Default path: `/etc/omen-fan/config.toml`

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/omen-fan/config.toml";

/// Default cooldown before a speed decrease is honoured, in seconds.
pub const DEFAULT_COOLDOWN_SECS: u64 = 15;

/// Default EMA smoothing factor.
pub const DEFAULT_SMOOTHING: f64 = 0.3;

/// Default deadband in duty percent.
pub const DEFAULT_DEADBAND: f64 = 3.0;

/// Default interval between periodic status log lines, in seconds.
pub const DEFAULT_LOG_INTERVAL_SECS: u64 = 5;

/// Default maximum raw register value per fan.
pub const DEFAULT_FAN_MAX: u8 = 50;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
}

/// Curve and control-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Temperature breakpoints in degrees Celsius, strictly increasing.
    pub temp_curve: Vec<i64>,

    /// Duty percentages (0-100), index-aligned with `temp_curve`.
    pub speed_curve: Vec<i64>,

    /// Duty percentage used below the first breakpoint.
    pub idle_speed: i64,

    /// Seconds between temperature polls.
    pub poll_interval: u64,

    /// Seconds a speed decrease is delayed after an increase.
    #[serde(default = "default_cooldown")]
    pub cooldown: u64,

    /// EMA smoothing factor, 0 < f <= 1.
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,

    /// Minimum percentage change that triggers an actuation.
    #[serde(default = "default_deadband")]
    pub deadband: f64,

    /// Maximum raw register value for fan 1.
    #[serde(default = "default_fan_max")]
    pub fan1_max: u8,

    /// Maximum raw register value for fan 2.
    #[serde(default = "default_fan_max")]
    pub fan2_max: u8,

    /// Whether the diagnostic log file is written at all.
    #[serde(default)]
    pub enable_logging: bool,

    /// Seconds between periodic status log lines.
    #[serde(default = "default_log_interval")]
    pub log_interval: u64,
}

impl ServiceConfig {
    /// Cross-field validation beyond what serde can express. Curve
    /// consistency is checked again by [`crate::curve::SpeedCurve::new`];
    /// this covers the loop timing knobs.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval == 0 {
            return Err("poll_interval must be at least 1 second".to_string());
        }
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(format!(
                "smoothing ({}) must be in (0, 1]",
                self.smoothing
            ));
        }
        if self.deadband < 0.0 {
            return Err(format!("deadband ({}) must not be negative", self.deadband));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load config from a TOML file.
///
/// A missing or malformed file is an error: the daemon must not start
/// with a curve it cannot trust.
pub fn load_config(path: &Path) -> io::Result<Config> {
    let contents = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse config: {e}"),
        )
    })?;

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Resolve the config file path from CLI arg or default.
pub fn resolve_config_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_smoothing() -> f64 {
    DEFAULT_SMOOTHING
}

fn default_deadband() -> f64 {
    DEFAULT_DEADBAND
}

fn default_log_interval() -> u64 {
    DEFAULT_LOG_INTERVAL_SECS
}

fn default_fan_max() -> u8 {
    DEFAULT_FAN_MAX
}
