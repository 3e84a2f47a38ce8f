//! Media Handler configuration.
//!
//! Configuration is loaded from environment variables with defaults for
//! everything, so a consumer can be built without any environment at all.

use common::config::{ObservabilityConfig, DEFAULT_LOG_FILTER};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default upper bound for a single worker request, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default capacity of each consumer's observer event bus.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 64;

/// Media Handler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Upper bound for a single worker request (default: 10s).
    pub request_timeout: Duration,

    /// Observer bus capacity per consumer (default: 64).
    /// Lagging observers lose the oldest events beyond this.
    pub observer_capacity: usize,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            observer_capacity: DEFAULT_OBSERVER_CAPACITY,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let request_timeout_ms = match vars.get("MH_REQUEST_TIMEOUT_MS") {
            Some(raw) => {
                let ms: u64 = raw.parse().map_err(|e| {
                    ConfigError::InvalidValue(format!("MH_REQUEST_TIMEOUT_MS={raw}: {e}"))
                })?;
                if ms == 0 {
                    return Err(ConfigError::InvalidValue(
                        "MH_REQUEST_TIMEOUT_MS must be greater than 0".to_string(),
                    ));
                }
                ms
            }
            None => DEFAULT_REQUEST_TIMEOUT_MS,
        };

        let observer_capacity = match vars.get("MH_OBSERVER_CAPACITY") {
            Some(raw) => {
                let capacity: usize = raw.parse().map_err(|e| {
                    ConfigError::InvalidValue(format!("MH_OBSERVER_CAPACITY={raw}: {e}"))
                })?;
                if capacity == 0 {
                    return Err(ConfigError::InvalidValue(
                        "MH_OBSERVER_CAPACITY must be at least 1".to_string(),
                    ));
                }
                capacity
            }
            None => DEFAULT_OBSERVER_CAPACITY,
        };

        let log_level = vars
            .get("MH_LOG_FILTER")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let json_logs = match vars.get("MH_LOG_JSON").map(String::as_str) {
            None => true,
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "MH_LOG_JSON must be true or false, got {other}"
                )))
            }
        };

        Ok(Self {
            request_timeout: Duration::from_millis(request_timeout_ms),
            observer_capacity,
            observability: ObservabilityConfig {
                log_level,
                json_logs,
            },
        })
    }

    /// Settings handed to every consumer built under this configuration.
    #[must_use]
    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            request_timeout: self.request_timeout,
            observer_capacity: self.observer_capacity,
        }
    }
}

/// Per-consumer tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Upper bound for a single worker request.
    pub request_timeout: Duration,
    /// Capacity of the observer event bus.
    pub observer_capacity: usize,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Config::default().consumer_settings()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_with_empty_environment() {
        let config = Config::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.observer_capacity, 64);
        assert!(config.observability.json_logs);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(&vars(&[
            ("MH_REQUEST_TIMEOUT_MS", "2500"),
            ("MH_OBSERVER_CAPACITY", "8"),
            ("MH_LOG_FILTER", "media_handler=debug"),
            ("MH_LOG_JSON", "false"),
        ]))
        .unwrap();

        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.observer_capacity, 8);
        assert_eq!(config.observability.log_level, "media_handler=debug");
        assert!(!config.observability.json_logs);

        let settings = config.consumer_settings();
        assert_eq!(settings.request_timeout, Duration::from_millis(2500));
        assert_eq!(settings.observer_capacity, 8);
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let result = Config::from_vars(&vars(&[("MH_REQUEST_TIMEOUT_MS", "soon")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));

        let result = Config::from_vars(&vars(&[("MH_REQUEST_TIMEOUT_MS", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_zero_observer_capacity_rejected() {
        let result = Config::from_vars(&vars(&[("MH_OBSERVER_CAPACITY", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_invalid_log_json_rejected() {
        let result = Config::from_vars(&vars(&[("MH_LOG_JSON", "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_default_consumer_settings() {
        let settings = ConsumerSettings::default();
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.observer_capacity, DEFAULT_OBSERVER_CAPACITY);
    }
}
