//! Configuration for the laundry status hub.

use crate::core::ClassifierConfig;
use crate::hub::HubConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Main configuration for the hub.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the HTTP server listens
    pub server: ServerSettings,

    /// Occupancy classification tuning
    pub classifier: ClassifierConfig,

    /// Subscriber buffering and stream keep-alive
    pub hub: HubConfig,
}

impl Config {
    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("laundry-status-hub")
            .join("config.json")
    }
}

/// Listen address of the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: IpAddr,
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration, stored as whole seconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ThresholdMode, WarmupPolicy};
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.classifier.window_size, 3);
        assert_eq!(config.classifier.debounce_samples, 1);
        assert_eq!(config.classifier.warmup, WarmupPolicy::UntilWindowFull);
        assert_eq!(config.hub.keep_alive, Duration::from_secs(5));
        assert_eq!(config.hub.retry, Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "server": { "host": "127.0.0.1", "port": 8080 },
                "classifier": {
                    "threshold": 0.02,
                    "window_size": 5,
                    "debounce_samples": 2,
                    "warmup": "immediate",
                    "mode": { "kind": "calibrated", "calibration_samples": 5 }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.server.addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.classifier.warmup, WarmupPolicy::Immediate);
        assert_eq!(
            config.classifier.mode,
            ThresholdMode::Calibrated {
                calibration_samples: 5
            }
        );
        assert_eq!(config.hub.subscriber_buffer, 64);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = std::env::temp_dir().join(format!("laundry-hub-config-{}", std::process::id()));
        let path = dir.join("config.json");

        let mut config = Config::default();
        config.server.port = 4321;
        config.hub.keep_alive = Duration::from_secs(15);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 4321);
        assert_eq!(loaded.hub.keep_alive, Duration::from_secs(15));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("laundry-hub-does-not-exist.json");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let path = std::env::temp_dir().join(format!("laundry-hub-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));

        let _ = std::fs::remove_file(&path);
    }
}
