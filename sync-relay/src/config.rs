//! Configuration loading for sync-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! section and every key is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use sync_types::ClientVersion;

/// Root configuration for sync-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Cleanup task configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API (default: 0.0.0.0:3222).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Largest accepted request body in bytes (default: 10 MiB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Oldest client version allowed to sync (default: 0.1.0).
    #[serde(default = "default_min_client_version")]
    pub min_client_version: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Sync requests per owner per minute (default: 60).
    #[serde(default = "default_syncs_per_minute")]
    pub syncs_per_minute: u32,
    /// Sync requests per second across all owners (default: 200).
    #[serde(default = "default_global_per_second")]
    pub global_per_second: u32,
}

/// Cleanup task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Cleanup interval in seconds (default: 3600 = 1 hour).
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Enable cleanup task (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
    /// Accounts that have not synced for this many days are forgotten (default: 180).
    #[serde(default = "default_account_retention_days")]
    pub account_retention_days: u64,
    /// Sync log rows older than this many days are dropped (default: 30).
    #[serde(default = "default_sync_log_retention_days")]
    pub sync_log_retention_days: u64,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:3222".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024 // 10 MiB
}

fn default_min_client_version() -> String {
    "0.1.0".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("relay.db")
}

fn default_syncs_per_minute() -> u32 {
    60
}

fn default_global_per_second() -> u32 {
    200
}

fn default_cleanup_interval() -> u64 {
    3600 // 1 hour
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_account_retention_days() -> u64 {
    180
}

fn default_sync_log_retention_days() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_body_bytes: default_max_body_bytes(),
            min_client_version: default_min_client_version(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            syncs_per_minute: default_syncs_per_minute(),
            global_per_second: default_global_per_second(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            enabled: default_cleanup_enabled(),
            account_retention_days: default_account_retention_days(),
            sync_log_retention_days: default_sync_log_retention_days(),
        }
    }
}

impl ServerConfig {
    /// Parsed version floor.
    ///
    /// Only meaningful after [`Config::validate`] has passed; an unparseable
    /// floor falls back to `0.0.0`.
    pub fn version_floor(&self) -> ClientVersion {
        ClientVersion::parse(&self.min_client_version).unwrap_or(ClientVersion {
            major: 0,
            minor: 0,
            patch: 0,
        })
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if ClientVersion::parse(&self.server.min_client_version).is_none() {
            return Err(ConfigError::Invalid(format!(
                "server.min_client_version {:?} is not a x.y.z version",
                self.server.min_client_version
            )));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be positive".into(),
            ));
        }
        if self.limits.syncs_per_minute == 0 || self.limits.global_per_second == 0 {
            return Err(ConfigError::Invalid("rate limits must be positive".into()));
        }
        if self.cleanup.enabled && self.cleanup.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "cleanup.interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:3222");
        assert_eq!(config.server.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.cleanup.account_retention_days, 180);
        config.validate().unwrap();
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:5000"
min_client_version = "0.2.0"

[storage]
database = "/data/relay.db"

[limits]
syncs_per_minute = 5

[cleanup]
interval_secs = 1800
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:5000");
        assert_eq!(
            config.server.version_floor(),
            ClientVersion::parse("0.2.0").unwrap()
        );
        assert_eq!(config.storage.database, PathBuf::from("/data/relay.db"));
        assert_eq!(config.limits.syncs_per_minute, 5);
        assert_eq!(config.limits.global_per_second, 200);
        assert_eq!(config.cleanup.interval_secs, 1800);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.min_client_version, "0.1.0");
        assert_eq!(config.storage.database, PathBuf::from("relay.db"));
        assert!(config.cleanup.enabled);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("relay.toml")).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:3222");
    }

    #[test]
    fn unparseable_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[server\n").unwrap();

        let err = Config::load_or_default(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("relay.toml"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.server.min_client_version = "latest".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.limits.syncs_per_minute = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cleanup.interval_secs = 0;
        assert!(config.validate().is_err());
        config.cleanup.enabled = false;
        config.validate().unwrap();
    }
}
