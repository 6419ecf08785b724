//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BayeuxError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Timeout configuration
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| BayeuxError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| BayeuxError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("BAYEUX_MAX_PENDING_REQUESTS") {
            if let Ok(val) = val.parse() {
                config.session.max_pending_requests = val;
            }
        }

        if let Ok(val) = std::env::var("BAYEUX_REQUEST_TIMEOUT_MS") {
            if let Ok(val) = val.parse() {
                config.timeouts.request_ms = val;
            }
        }
        if let Ok(val) = std::env::var("BAYEUX_DISCONNECT_TIMEOUT_MS") {
            if let Ok(val) = val.parse() {
                config.timeouts.disconnect_ms = val;
            }
        }
        if let Ok(val) = std::env::var("BAYEUX_DEFAULT_INTERVAL_MS") {
            if let Ok(val) = val.parse() {
                config.timeouts.default_interval_ms = val;
            }
        }

        config
    }

    /// Merge with another config (other takes precedence for non-default values)
    pub fn merge(self, other: Self) -> Self {
        let session_defaults = SessionConfig::default();
        let timeout_defaults = TimeoutConfig::default();
        Self {
            session: SessionConfig {
                max_pending_requests: if other.session.max_pending_requests
                    != session_defaults.max_pending_requests
                {
                    other.session.max_pending_requests
                } else {
                    self.session.max_pending_requests
                },
            },
            timeouts: TimeoutConfig {
                request_ms: if other.timeouts.request_ms != timeout_defaults.request_ms {
                    other.timeouts.request_ms
                } else {
                    self.timeouts.request_ms
                },
                disconnect_ms: if other.timeouts.disconnect_ms != timeout_defaults.disconnect_ms {
                    other.timeouts.disconnect_ms
                } else {
                    self.timeouts.disconnect_ms
                },
                default_interval_ms: if other.timeouts.default_interval_ms
                    != timeout_defaults.default_interval_ms
                {
                    other.timeouts.default_interval_ms
                } else {
                    self.timeouts.default_interval_ms
                },
            },
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on in-flight request correlation entries
    pub max_pending_requests: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_pending_requests: 64,
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum wait for a meta request's reply, in milliseconds
    pub request_ms: u64,

    /// Maximum wait for the disconnect reply before forcing teardown
    pub disconnect_ms: u64,

    /// Reconnect interval applied when the server advice omits one
    pub default_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 10_000,
            disconnect_ms: 5_000,
            default_interval_ms: 0,
        }
    }
}

impl TimeoutConfig {
    /// Request timeout as a [`Duration`]
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    /// Disconnect timeout as a [`Duration`]
    pub fn disconnect(&self) -> Duration {
        Duration::from_millis(self.disconnect_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.max_pending_requests, 64);
        assert_eq!(config.timeouts.request_ms, 10_000);
        assert_eq!(config.timeouts.disconnect_ms, 5_000);
        assert_eq!(config.timeouts.default_interval_ms, 0);
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [session]
            max_pending_requests = 16

            [timeouts]
            request_ms = 2000
            disconnect_ms = 1000
            default_interval_ms = 250
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.session.max_pending_requests, 16);
        assert_eq!(config.timeouts.request_ms, 2000);
        assert_eq!(config.timeouts.disconnect_ms, 1000);
        assert_eq!(config.timeouts.default_interval_ms, 250);
    }

    #[test]
    fn test_config_partial_toml_uses_defaults() {
        let toml = r#"
            [timeouts]
            disconnect_ms = 750
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.session.max_pending_requests, 64);
        assert_eq!(config.timeouts.request_ms, 10_000);
        assert_eq!(config.timeouts.disconnect_ms, 750);
    }

    #[test]
    fn test_config_merge() {
        let base = Config::default();
        let mut override_config = Config::default();
        override_config.timeouts.request_ms = 3000;

        let merged = base.merge(override_config);
        assert_eq!(merged.timeouts.request_ms, 3000);
        assert_eq!(merged.timeouts.disconnect_ms, 5_000);
    }
}
