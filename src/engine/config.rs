//! Wardgate Configuration Module
//! Handles loading and validating wardgate.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "wardgate.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Where the remote permission document lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_permissions_path")]
    pub permissions_path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Bearer token issued by the authentication service
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_true")]
    pub reload_on_broadcast: bool,
}

fn default_base_url() -> String {
    "http://127.0.0.1:54321".to_string()
}

fn default_permissions_path() -> String {
    "/system-settings/permissions".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_refresh_interval_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            permissions_path: default_permissions_path(),
            timeout_ms: default_timeout_ms(),
            auth_token: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            reload_on_broadcast: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            endpoint: EndpointConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl EndpointConfig {
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    /// Full URL of the permissions document
    pub fn permissions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.permissions_path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }
}

impl SyncConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults
    pub fn load_or_default(project_dir: &Path) -> Result<Self, ConfigError> {
        match Self::load(project_dir) {
            Err(ConfigError::NotFound(path)) => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint.base_url is empty".to_string()));
        }
        if self.endpoint.timeout_ms == 0 {
            return Err(ConfigError::Invalid("endpoint.timeout_ms must be > 0".to_string()));
        }
        if self.sync.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync.refresh_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Project directory, falling back to the user config dir then cwd
    pub fn default_dir() -> PathBuf {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        if cwd.join(CONFIG_FILE).exists() {
            return cwd;
        }
        dirs::config_dir()
            .map(|dir| dir.join("wardgate"))
            .filter(|dir| dir.join(CONFIG_FILE).exists())
            .unwrap_or(cwd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.endpoint.auth_token = Some("secret".to_string());
        config.sync.refresh_interval_ms = 2500;
        config.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.endpoint.auth_token.as_deref(), Some("secret"));
        assert_eq!(loaded.sync.refresh_interval(), Duration::from_millis(2500));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"version": "0.1.0", "endpoint": {"base_url": "https://ops.example.org/api/"}}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(
            config.endpoint.permissions_url(),
            "https://ops.example.org/api/system-settings/permissions"
        );
        assert_eq!(config.sync.refresh_interval_ms, 10_000);
        assert!(config.sync.reload_on_broadcast);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Config::load(dir.path()), Err(ConfigError::NotFound(_))));
        assert!(Config::load_or_default(dir.path()).is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"version": "0.1.0", "endpoint": {}, "sync": {"refresh_interval_ms": 0}}"#,
        )
        .unwrap();
        assert!(matches!(Config::load(dir.path()), Err(ConfigError::Invalid(_))));
    }
}
