//! Configuration management for Rentora.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for every minute-valued session setting (one week).
pub const MAX_SESSION_MINUTES: u64 = 7 * 24 * 60;

/// Main application configuration.
///
/// This is loaded from `~/.config/rentora/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General application settings
    pub general: GeneralConfig,
    /// Remote auth service settings
    pub api: ApiConfig,
    /// Session lifetime and lockout policy
    pub session: SessionConfig,
    /// Persistent key-value store settings
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults if
    /// the file does not exist.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();

        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `RENTORA_API_URL`: Override the auth service base URL
    /// - `RENTORA_SESSION_TIMEOUT_MINUTES`: Override the inactivity timeout
    /// - `RENTORA_DEBUG`: Enable debug introspection (true/false)
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `RENTORA_*` environment overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RENTORA_API_URL") {
            if !val.trim().is_empty() {
                tracing::debug!("Override api.base_url from env: {}", val);
                self.api.base_url = val;
            }
        }

        if let Ok(val) = std::env::var("RENTORA_SESSION_TIMEOUT_MINUTES") {
            if let Ok(minutes) = val.parse() {
                self.session.timeout_minutes = minutes;
                tracing::debug!("Override session.timeout_minutes from env: {}", minutes);
            }
        }

        if let Ok(val) = std::env::var("RENTORA_DEBUG") {
            if let Ok(flag) = val.parse::<bool>() {
                self.general.debug = flag;
                tracing::debug!("Override general.debug from env: {}", flag);
            }
        }
    }

    /// Reject values the session core cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.session.timeout_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.timeout_minutes".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        for (field, minutes) in [
            ("session.timeout_minutes", self.session.timeout_minutes),
            ("session.refresh_threshold_minutes", self.session.refresh_threshold_minutes),
            ("session.lockout_minutes", self.session.lockout_minutes),
            ("session.fallback_ttl_hours", self.session.fallback_ttl_hours.saturating_mul(60)),
            ("session.expiry_poll_secs", self.session.expiry_poll_secs / 60),
            ("session.activity_throttle_secs", self.session.activity_throttle_secs / 60),
        ] {
            if minutes > MAX_SESSION_MINUTES {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("must not exceed {MAX_SESSION_MINUTES} minutes"),
                });
            }
        }
        if self.session.max_login_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_login_attempts".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.session.expiry_poll_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.expiry_poll_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.storage.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.namespace".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/rentora/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "rentora", "rentora").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/rentora`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "rentora", "rentora").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Resolve the file backing the persistent session store.
    ///
    /// An explicit `storage.path` wins; otherwise `<data_dir>/session.json`.
    pub fn storage_path(&self) -> ConfigResult<PathBuf> {
        match &self.storage.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("session.json")),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Expose session debug snapshots
    pub debug: bool,
}

/// Remote auth service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every `/auth/...` path is appended to
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User agent reported to the login endpoint
    pub user_agent: String,
    /// Device description reported to the login endpoint
    pub device_info: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_secs: 30,
            user_agent: format!("Rentora/{}", env!("CARGO_PKG_VERSION")),
            device_info: std::env::consts::OS.to_string(),
        }
    }
}

impl ApiConfig {
    /// Request timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session lifetime and lockout policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity timeout in minutes
    pub timeout_minutes: u64,
    /// Lead time before expiry at which the session is ended proactively
    pub refresh_threshold_minutes: u64,
    /// How often the expiry watcher runs, in seconds
    pub expiry_poll_secs: u64,
    /// Minimum spacing between activity-driven refreshes, in seconds
    pub activity_throttle_secs: u64,
    /// Failed logins allowed before lockout
    pub max_login_attempts: u32,
    /// Lockout duration in minutes
    pub lockout_minutes: u64,
    /// Session lifetime used when the server omits `expiresAt`, in hours
    pub fallback_ttl_hours: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 30,
            refresh_threshold_minutes: 5,
            expiry_poll_secs: 60,
            activity_throttle_secs: 30,
            max_login_attempts: 5,
            lockout_minutes: 15,
            fallback_ttl_hours: 8,
        }
    }
}

impl SessionConfig {
    /// Inactivity timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }

    /// Refresh threshold.
    #[must_use]
    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_minutes.saturating_mul(60))
    }

    /// Expiry watcher period.
    #[must_use]
    pub fn expiry_poll_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_poll_secs)
    }

    /// Activity throttle window.
    #[must_use]
    pub fn activity_throttle(&self) -> Duration {
        Duration::from_secs(self.activity_throttle_secs)
    }

    /// Lockout duration.
    #[must_use]
    pub fn lockout(&self) -> Duration {
        Duration::from_secs(self.lockout_minutes.saturating_mul(60))
    }

    /// Fallback session lifetime.
    #[must_use]
    pub fn fallback_ttl(&self) -> Duration {
        Duration::from_secs(self.fallback_ttl_hours.saturating_mul(60 * 60))
    }
}

/// Persistent key-value store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Prefix for every persisted key
    pub namespace: String,
    /// Explicit store file; defaults to the XDG data directory
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: "rentora".to_string(),
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(!config.general.debug);
        assert_eq!(config.api.base_url, "http://localhost:8080/api");
        assert_eq!(config.session.timeout_minutes, 30);
        assert_eq!(config.session.refresh_threshold_minutes, 5);
        assert_eq!(config.session.max_login_attempts, 5);
        assert_eq!(config.session.lockout_minutes, 15);
        assert_eq!(config.storage.namespace, "rentora");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations() {
        let session = SessionConfig::default();
        assert_eq!(session.timeout(), Duration::from_secs(30 * 60));
        assert_eq!(session.refresh_threshold(), Duration::from_secs(5 * 60));
        assert_eq!(session.lockout(), Duration::from_secs(15 * 60));
        assert_eq!(session.fallback_ttl(), Duration::from_secs(8 * 60 * 60));
        assert_eq!(session.activity_throttle(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[api]"));
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[storage]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.api.base_url, config.api.base_url);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");

        let mut config = AppConfig::default();
        config.api.base_url = "https://rentals.example.com/api".to_string();
        config.session.timeout_minutes = 45;

        let contents = toml::to_string_pretty(&config).expect("serialize config");
        fs::write(&config_path, contents).expect("write config file");

        let loaded = AppConfig::load_from(&config_path).expect("load config");
        assert_eq!(loaded.api.base_url, "https://rentals.example.com/api");
        assert_eq!(loaded.session.timeout_minutes, 45);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let loaded = AppConfig::load_from(tmp.path().join("absent.toml")).expect("load config");
        assert_eq!(loaded.session.timeout_minutes, 30);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[api]
base_url = "https://staging.example.com/api"

[session]
timeout_minutes = 10
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.api.base_url, "https://staging.example.com/api");
        assert_eq!(config.session.timeout_minutes, 10);
        // These should be defaults
        assert_eq!(config.session.max_login_attempts, 5);
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.session.timeout_minutes = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "session.timeout_minutes"
        ));

        let mut config = AppConfig::default();
        config.storage.namespace = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_minutes_rejected_without_overflow() {
        let mut config = AppConfig::default();
        config.session.timeout_minutes = u64::MAX;
        config.session.fallback_ttl_hours = u64::MAX;

        assert_eq!(config.session.timeout(), Duration::from_secs(u64::MAX));
        assert_eq!(config.session.fallback_ttl(), Duration::from_secs(u64::MAX));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "session.timeout_minutes"
        ));

        let mut config = AppConfig::default();
        config.session.lockout_minutes = MAX_SESSION_MINUTES + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "session.lockout_minutes"
        ));

        config.session.lockout_minutes = MAX_SESSION_MINUTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("RENTORA_API_URL", "https://env.example.com/api");
        std::env::set_var("RENTORA_SESSION_TIMEOUT_MINUTES", "60");
        std::env::set_var("RENTORA_DEBUG", "true");

        let mut config = AppConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.api.base_url, "https://env.example.com/api");
        assert_eq!(config.session.timeout_minutes, 60);
        assert!(config.general.debug);

        std::env::set_var("RENTORA_DEBUG", "not-a-bool");
        config.general.debug = false;
        config.apply_env_overrides();
        assert!(!config.general.debug);

        std::env::remove_var("RENTORA_API_URL");
        std::env::remove_var("RENTORA_SESSION_TIMEOUT_MINUTES");
        std::env::remove_var("RENTORA_DEBUG");
    }

    #[test]
    fn test_explicit_storage_path() {
        let mut config = AppConfig::default();
        config.storage.path = Some(PathBuf::from("/tmp/rentora-session.json"));
        assert_eq!(
            config.storage_path().expect("storage path"),
            PathBuf::from("/tmp/rentora-session.json")
        );
    }
}
