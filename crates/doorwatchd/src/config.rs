//! Daemon configuration.
//!
//! Loaded from a TOML file; every field is optional and falls back to its
//! default. Example:
//!
//! ```toml
//! psm = 0x1001
//! max_devices = 10
//! heartbeat_timeout_secs = 60
//!
//! [lock_sensor]
//! value_path = "/sys/class/gpio/gpio17/value"
//!
//! [notifier]
//! command = "/usr/local/bin/send-door-reminder"
//! args = ["--project", "doorwatch"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::FrameProcessor;
use crate::heartbeat::HeartbeatSettings;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "DOORWATCH_CONFIG";

/// Lowest dynamic LE PSM.
pub const MIN_PSM: u16 = 0x1001;

/// Hard upper bound on tracked devices.
pub const MAX_DEVICES_LIMIT: usize = 100;

/// Largest L2CAP SDU.
pub const MAX_FRAME_BUFFER_SIZE: usize = 65_535;

/// Upper bound on the heartbeat timeout and sweep interval (one day).
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Upper bound on the lock sensor poll interval.
pub const MAX_LOCK_POLL_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// L2CAP protocol/service multiplexer beacons connect to.
    pub psm: u16,
    pub max_devices: usize,
    /// Largest accepted frame in bytes.
    pub frame_buffer_size: usize,
    pub heartbeat_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    /// Upper bound on one wait of the server loop.
    pub poll_timeout_secs: u64,
    /// Shorter tokens are treated as garbage.
    pub min_token_length: usize,
    /// Refuse to start unless running as root.
    pub require_root: bool,
    pub lock_sensor: LockSensorConfig,
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockSensorConfig {
    /// GPIO value file; without it the lock state stays unknown.
    pub value_path: Option<PathBuf>,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifierConfig {
    /// Program run with the delivery token as its last argument.
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            psm: MIN_PSM,
            max_devices: 10,
            frame_buffer_size: 1024,
            heartbeat_timeout_secs: 60,
            sweep_interval_secs: 10,
            poll_timeout_secs: 5,
            min_token_length: 140,
            require_root: true,
            lock_sensor: LockSensorConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl Default for LockSensorConfig {
    fn default() -> Self {
        Self {
            value_path: None,
            poll_interval_ms: 50,
        }
    }
}

impl DaemonConfig {
    /// Picks the config file: the explicit path, else `DOORWATCH_CONFIG`.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
        explicit.or_else(|| {
            std::env::var_os(CONFIG_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
    }

    /// Loads and validates the file at `path`, or returns validated defaults.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Read` if the file cannot be read
    /// - `ConfigError::Parse` if it is not valid TOML for this schema
    /// - `ConfigError::Invalid` if a value is out of range
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML without validating.
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` on syntax errors, unknown fields, or wrong types.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks every value is within its supported range.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.psm < MIN_PSM {
            return Err(invalid("psm", format!("must be between {MIN_PSM:#06x} and 0xffff")));
        }
        if self.max_devices == 0 || self.max_devices > MAX_DEVICES_LIMIT {
            return Err(invalid(
                "max_devices",
                format!("must be between 1 and {MAX_DEVICES_LIMIT}"),
            ));
        }
        if !(1..=MAX_FRAME_BUFFER_SIZE).contains(&self.frame_buffer_size) {
            return Err(invalid(
                "frame_buffer_size",
                format!("must be between 1 and {MAX_FRAME_BUFFER_SIZE}"),
            ));
        }
        if !(1..=MAX_INTERVAL_SECS).contains(&self.heartbeat_timeout_secs) {
            return Err(invalid(
                "heartbeat_timeout_secs",
                format!("must be between 1 and {MAX_INTERVAL_SECS}"),
            ));
        }
        if !(1..=MAX_INTERVAL_SECS).contains(&self.sweep_interval_secs) {
            return Err(invalid(
                "sweep_interval_secs",
                format!("must be between 1 and {MAX_INTERVAL_SECS}"),
            ));
        }
        if !(1..=60).contains(&self.poll_timeout_secs) {
            return Err(invalid("poll_timeout_secs", "must be between 1 and 60"));
        }
        if self.min_token_length == 0 || self.min_token_length > self.frame_buffer_size {
            return Err(invalid(
                "min_token_length",
                "must be positive and fit in frame_buffer_size",
            ));
        }
        if !(1..=MAX_LOCK_POLL_INTERVAL_MS).contains(&self.lock_sensor.poll_interval_ms) {
            return Err(invalid(
                "lock_sensor.poll_interval_ms",
                format!("must be between 1 and {MAX_LOCK_POLL_INTERVAL_MS}"),
            ));
        }
        if self.notifier.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(invalid("notifier.command", "must not be empty"));
        }
        Ok(())
    }

    pub fn heartbeat(&self) -> HeartbeatSettings {
        HeartbeatSettings {
            interval: Duration::from_secs(self.sweep_interval_secs),
            timeout: Duration::from_secs(self.heartbeat_timeout_secs),
        }
    }

    pub fn frame_processor(&self) -> FrameProcessor {
        FrameProcessor::new(self.min_token_length, self.frame_buffer_size)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_sensor.poll_interval_ms)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
