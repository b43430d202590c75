//! Application-level configuration loading for the lifecycle engine.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUESTLINE_BACK_CONFIG_PATH";

/// Fallback interval between reconciliation passes over running records.
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
/// Time a WebSocket client gets to identify itself before being dropped.
const DEFAULT_IDENTIFICATION_TIMEOUT_SECS: u64 = 10;
/// Broadcast channel capacity for the public event feed.
const DEFAULT_FEED_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    reconcile_interval: Duration,
    identification_timeout: Duration,
    feed_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        reconcile_interval_secs = app_config.reconcile_interval.as_secs(),
                        "loaded configuration from file"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Interval between reconciliation passes over running records.
    pub fn reconcile_interval(&self) -> Duration {
        self.reconcile_interval
    }

    /// How long a WebSocket client may stay unidentified.
    pub fn identification_timeout(&self) -> Duration {
        self.identification_timeout
    }

    /// Capacity of the public event feed broadcast channel.
    pub fn feed_capacity(&self) -> usize {
        self.feed_capacity
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            identification_timeout: Duration::from_secs(DEFAULT_IDENTIFICATION_TIMEOUT_SECS),
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    reconcile_interval_secs: Option<u64>,
    identification_timeout_secs: Option<u64>,
    feed_capacity: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            reconcile_interval: value
                .reconcile_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_interval),
            identification_timeout: value
                .identification_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.identification_timeout),
            feed_capacity: value.feed_capacity.unwrap_or(defaults.feed_capacity),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let raw: RawConfig = serde_json::from_str(r#"{"reconcile_interval_secs": 5}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.reconcile_interval(), Duration::from_secs(5));
        assert_eq!(
            config.identification_timeout(),
            Duration::from_secs(DEFAULT_IDENTIFICATION_TIMEOUT_SECS)
        );
        assert_eq!(config.feed_capacity(), DEFAULT_FEED_CAPACITY);
    }
}
