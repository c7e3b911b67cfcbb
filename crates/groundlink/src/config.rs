//! Configuration management for groundlink.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.
//!
//! Configuration is loaded once at process start and is immutable for the
//! process lifetime. Changing it requires a restart; there is no live reload.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "groundlink";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "telemetry.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `GROUNDLINK_`)
/// 2. TOML config file at `~/.config/groundlink/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame source configuration.
    pub source: SourceConfig,
    /// Telemetry store configuration.
    pub store: StoreConfig,
    /// Record sink configuration.
    pub sink: SinkConfig,
    /// Broadcast server configuration.
    pub server: ServerConfig,
}

/// Which frame source variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Physical serial link.
    Serial,
    /// Loopback TCP test channel.
    Loopback,
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Loopback => write!(f, "loopback"),
        }
    }
}

/// Frame source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source variant to run.
    pub mode: SourceMode,
    /// Serial port path (serial mode).
    pub port: String,
    /// Serial baud rate (serial mode).
    pub baudrate: u32,
    /// Host the loopback channel connects to (loopback mode).
    pub host: String,
    /// Port the loopback channel connects to (loopback mode).
    pub listen_port: u16,
    /// Initial reconnect backoff delay in milliseconds.
    pub reconnect_initial_ms: u64,
    /// Maximum reconnect backoff delay in milliseconds.
    pub reconnect_max_ms: u64,
    /// Reconnect attempts before the source is declared lost.
    /// Set to 0 for unlimited.
    pub reconnect_max_attempts: u32,
}

/// Telemetry store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of most recent records held in the in-memory cache.
    pub cache_capacity: usize,
    /// Path to the durable log database.
    /// Defaults to `~/.local/share/groundlink/telemetry.db`
    pub database_path: Option<PathBuf>,
}

/// Record sink configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Flush the write buffer after this many records.
    pub flush_every: usize,
    /// Flush the write buffer at least this often, bounding the data-loss
    /// window on abrupt termination.
    pub flush_interval_ms: u64,
}

/// Broadcast server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the viewer-facing listener binds to.
    pub bind: String,
    /// Outbound queue capacity per viewer. When full, the oldest queued
    /// record is dropped and the viewer's drop counter increments.
    pub viewer_queue_capacity: usize,
    /// Number of recent records returned by the diagnostic snapshot.
    pub snapshot_len: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Serial,
            port: "/dev/ttyUSB0".to_string(),
            baudrate: 115_200,
            host: "127.0.0.1".to_string(),
            listen_port: 9900,
            reconnect_initial_ms: 250,
            reconnect_max_ms: 10_000,
            reconnect_max_attempts: 20,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 300,
            database_path: None, // Will be resolved to default at runtime
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            flush_every: 50,
            flush_interval_ms: 1000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9870".to_string(),
            viewer_queue_capacity: 256,
            snapshot_len: 50,
        }
    }
}

impl Default for SourceMode {
    fn default() -> Self {
        Self::Serial
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `GROUNDLINK_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("GROUNDLINK_").split("_"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        match self.source.mode {
            SourceMode::Serial => {
                if self.source.port.is_empty() {
                    return Err(Error::ConfigValidation {
                        message: "source.port must be set in serial mode".to_string(),
                    });
                }
                if self.source.baudrate == 0 {
                    return Err(Error::ConfigValidation {
                        message: "source.baudrate must be greater than 0".to_string(),
                    });
                }
            }
            SourceMode::Loopback => {
                if self.source.listen_port == 0 {
                    return Err(Error::ConfigValidation {
                        message: "source.listen_port must be greater than 0 in loopback mode"
                            .to_string(),
                    });
                }
            }
        }

        if self.source.reconnect_initial_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "source.reconnect_initial_ms must be greater than 0".to_string(),
            });
        }
        if self.source.reconnect_max_ms < self.source.reconnect_initial_ms {
            return Err(Error::ConfigValidation {
                message: format!(
                    "source.reconnect_max_ms ({}) cannot be less than reconnect_initial_ms ({})",
                    self.source.reconnect_max_ms, self.source.reconnect_initial_ms
                ),
            });
        }

        if self.store.cache_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "store.cache_capacity must be greater than 0".to_string(),
            });
        }

        if self.sink.flush_every == 0 {
            return Err(Error::ConfigValidation {
                message: "sink.flush_every must be greater than 0".to_string(),
            });
        }
        if self.sink.flush_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "sink.flush_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.server.viewer_queue_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "server.viewer_queue_capacity must be greater than 0".to_string(),
            });
        }
        if self.server.snapshot_len == 0 {
            return Err(Error::ConfigValidation {
                message: "server.snapshot_len must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the sink flush interval as a Duration.
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.sink.flush_interval_ms)
    }

    /// Get the initial reconnect backoff delay as a Duration.
    #[must_use]
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.source.reconnect_initial_ms)
    }

    /// Get the maximum reconnect backoff delay as a Duration.
    #[must_use]
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.source.reconnect_max_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.source.mode, SourceMode::Serial);
        assert_eq!(config.source.baudrate, 115_200);
        assert_eq!(config.store.cache_capacity, 300);
        assert_eq!(config.sink.flush_every, 50);
        assert_eq!(config.server.viewer_queue_capacity, 256);
    }

    #[test]
    fn test_source_mode_display() {
        assert_eq!(SourceMode::Serial.to_string(), "serial");
        assert_eq!(SourceMode::Loopback.to_string(), "loopback");
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_serial_port() {
        let mut config = Config::default();
        config.source.port = String::new();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("source.port"));
    }

    #[test]
    fn test_validate_zero_baudrate() {
        let mut config = Config::default();
        config.source.baudrate = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("baudrate"));
    }

    #[test]
    fn test_validate_loopback_ignores_serial_fields() {
        let mut config = Config::default();
        config.source.mode = SourceMode::Loopback;
        config.source.port = String::new();
        config.source.baudrate = 0;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_loopback_zero_port() {
        let mut config = Config::default();
        config.source.mode = SourceMode::Loopback;
        config.source.listen_port = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("listen_port"));
    }

    #[test]
    fn test_validate_zero_cache_capacity() {
        let mut config = Config::default();
        config.store.cache_capacity = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cache_capacity"));
    }

    #[test]
    fn test_validate_zero_flush_every() {
        let mut config = Config::default();
        config.sink.flush_every = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_flush_interval() {
        let mut config = Config::default();
        config.sink.flush_interval_ms = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_backoff_ordering() {
        let mut config = Config::default();
        config.source.reconnect_initial_ms = 5000;
        config.source.reconnect_max_ms = 1000;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("reconnect_max_ms"));
    }

    #[test]
    fn test_validate_zero_viewer_queue_capacity() {
        let mut config = Config::default();
        config.server.viewer_queue_capacity = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_snapshot_len() {
        let mut config = Config::default();
        config.server.snapshot_len = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("telemetry.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.store.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_flush_interval() {
        let config = Config::default();
        assert_eq!(config.flush_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_reconnect_durations() {
        let config = Config::default();
        assert_eq!(config.reconnect_initial(), Duration::from_millis(250));
        assert_eq!(config.reconnect_max(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("groundlink"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_default_data_dir() {
        let path = Config::default_data_dir();
        assert!(path.to_string_lossy().contains("groundlink"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_source_config_serialize() {
        let source = SourceConfig::default();
        let json = serde_json::to_string(&source).unwrap();
        assert!(json.contains("baudrate"));
        assert!(json.contains("\"serial\""));
    }

    #[test]
    fn test_source_config_deserialize() {
        let json = r#"{"mode": "loopback", "listen_port": 7000}"#;
        let source: SourceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(source.mode, SourceMode::Loopback);
        assert_eq!(source.listen_port, 7000);
        // Unspecified fields fall back to defaults
        assert_eq!(source.baudrate, 115_200);
    }

    #[test]
    fn test_store_config_deserialize() {
        let json = r#"{"cache_capacity": 500}"#;
        let store: StoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(store.cache_capacity, 500);
    }

    #[test]
    fn test_server_config_serialize() {
        let server = ServerConfig::default();
        let json = serde_json::to_string(&server).unwrap();
        assert!(json.contains("viewer_queue_capacity"));
    }

    #[test]
    fn test_config_clone() {
        let config = Config::default();
        let cloned = config.clone();
        assert_eq!(config, cloned);
    }
}
