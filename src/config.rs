use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors. All of these are fatal at startup — tracking and
/// channel faults are recovered locally, bad configuration is not.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_stability_threshold() -> f64 {
    10.0
}

fn default_stability_duration() -> f64 {
    2.0
}

fn default_grace_period() -> f64 {
    0.5
}

fn default_endpoint_uri() -> String {
    "ws://localhost:8080/".to_string()
}

fn default_reconnect_interval() -> f64 {
    5.0
}

/// Runtime configuration for the bridge.
///
/// Loaded from an optional JSON file and overridden per-field from the CLI.
/// All duration-like fields are plain seconds in the file; accessors expose
/// them as `Duration` for the tracking and channel code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Maximum centroid movement (pixels) tolerated within the stability window.
    pub stability_threshold: f64,
    /// How long a marker must hold still before triggering, in seconds.
    pub stability_duration: f64,
    /// Tolerated detection gap before a tracked marker reverts to Searching,
    /// in seconds.
    pub grace_period: f64,
    /// WebSocket server URI for the control channel.
    pub endpoint_uri: String,
    /// Delay between reconnect attempts, in seconds.
    pub reconnect_interval: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            stability_threshold: default_stability_threshold(),
            stability_duration: default_stability_duration(),
            grace_period: default_grace_period(),
            endpoint_uri: default_endpoint_uri(),
            reconnect_interval: default_reconnect_interval(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON file.
    ///
    /// Missing fields fall back to defaults; unknown fields are rejected so
    /// a typo does not silently leave a setting at its default.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Validate all fields, failing fast on the first bad value.
    pub fn validate(&self) -> Result<()> {
        // NaN fails every comparison, so each check spells it out explicitly.
        if self.stability_threshold.is_nan() || self.stability_threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "stability_threshold",
                reason: format!("must be > 0, got {}", self.stability_threshold),
            });
        }
        if self.stability_duration.is_nan() || self.stability_duration <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "stability_duration",
                reason: format!("must be > 0, got {}", self.stability_duration),
            });
        }
        if self.grace_period.is_nan() || self.grace_period < 0.0 {
            return Err(ConfigError::Invalid {
                field: "grace_period",
                reason: format!("must be >= 0, got {}", self.grace_period),
            });
        }
        if self.reconnect_interval.is_nan() || self.reconnect_interval <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "reconnect_interval",
                reason: format!("must be > 0, got {}", self.reconnect_interval),
            });
        }
        if !self.endpoint_uri.starts_with("ws://") && !self.endpoint_uri.starts_with("wss://") {
            return Err(ConfigError::Invalid {
                field: "endpoint_uri",
                reason: format!("expected a ws:// or wss:// URI, got '{}'", self.endpoint_uri),
            });
        }
        Ok(())
    }

    /// Stability window as a `Duration`.
    pub fn stability_duration(&self) -> Duration {
        Duration::from_secs_f64(self.stability_duration)
    }

    /// Absence grace period as a `Duration`.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs_f64(self.grace_period)
    }

    /// Reconnect backoff as a `Duration`.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs_f64(self.reconnect_interval)
    }
}
