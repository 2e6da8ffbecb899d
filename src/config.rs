//! Configuration Management
//!
//! Handles persistent configuration storage for lms. Credentials are only
//! read here and handed to [`Credentials`]; nothing else inspects them.

use crate::api::auth::Credentials;
use crate::api::http::DEFAULT_API_ROOT;
use crate::api::client::DEFAULT_LIMIT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment override for the consumer key
pub const KEY_ENV: &str = "LMS_SCHOOLOGY_KEY";
/// Environment override for the consumer secret
pub const SECRET_ENV: &str = "LMS_SCHOOLOGY_SECRET";

/// Schoology API settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SchoologyConfig {
    /// OAuth consumer key
    #[serde(default)]
    pub key: Option<String>,
    /// OAuth consumer secret
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_secret: Option<String>,
    /// API root URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_root: Option<String>,
    /// Default `limit` query parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub schoology: SchoologyConfig,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lms").join("config.json"))
    }

    /// Load configuration from disk, then apply environment overrides.
    ///
    /// A missing file yields the defaults; an unreadable one is an error.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from a specific file, without overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Override credentials from the environment
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(KEY_ENV).filter(|v| !v.is_empty()) {
            self.schoology.key = Some(key);
        }
        if let Some(secret) = lookup(SECRET_ENV).filter(|v| !v.is_empty()) {
            self.schoology.secret = Some(secret);
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("No configuration directory available")?;
        self.save_to(&path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }

    /// Credentials for the transport; fails when key or secret is missing
    pub fn credentials(&self) -> Result<Credentials> {
        let conf = &self.schoology;
        let key = conf
            .key
            .as_deref()
            .with_context(|| format!("No Schoology key configured (set {} or edit the config file)", KEY_ENV))?;
        let secret = conf
            .secret
            .as_deref()
            .with_context(|| format!("No Schoology secret configured (set {} or edit the config file)", SECRET_ENV))?;

        let mut credentials = Credentials::new(key, secret)?;
        if let (Some(token), Some(token_secret)) = (&conf.access_token, &conf.access_token_secret) {
            credentials = credentials.with_access_token(token, token_secret);
        }
        Ok(credentials)
    }

    /// Get effective API root (config > default)
    pub fn api_root(&self) -> &str {
        self.schoology.api_root.as_deref().unwrap_or(DEFAULT_API_ROOT)
    }

    /// Get effective page size (config > default)
    pub fn limit(&self) -> usize {
        self.schoology.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Copy safe to print: secrets replaced by asterisks
    pub fn masked(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "********".to_string());
        let mut copy = self.clone();
        copy.schoology.secret = mask(&self.schoology.secret);
        copy.schoology.access_token_secret = mask(&self.schoology.access_token_secret);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: Option<&str>, secret: Option<&str>) -> Config {
        Config {
            schoology: SchoologyConfig {
                key: key.map(String::from),
                secret: secret.map(String::from),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_root(), DEFAULT_API_ROOT);
        assert_eq!(config.limit(), DEFAULT_LIMIT);
        assert!(config.credentials().is_err());
    }

    #[test]
    fn test_parse_minimal_file() {
        let config: Config = serde_json::from_str(r#"{"schoology": {"key": "k", "secret": "s", "limit": 20}}"#).unwrap();
        assert_eq!(config.limit(), 20);
        assert_eq!(config.credentials().unwrap().consumer_key(), "k");

        let empty: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, Config::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = config(Some("file-key"), Some("file-secret"));
        config.apply_env(|name| match name {
            KEY_ENV => Some("env-key".to_string()),
            SECRET_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.schoology.key.as_deref(), Some("env-key"));
        assert_eq!(config.schoology.secret.as_deref(), Some("file-secret"));
    }

    #[test]
    fn test_access_token_is_optional() {
        let mut config = config(Some("k"), Some("s"));
        assert!(!config.credentials().unwrap().has_access_token());

        config.schoology.access_token = Some("t".to_string());
        config.schoology.access_token_secret = Some("ts".to_string());
        assert!(config.credentials().unwrap().has_access_token());
    }

    #[test]
    fn test_masked_hides_secrets() {
        let config = config(Some("k"), Some("s"));
        let masked = config.masked();
        assert_eq!(masked.schoology.key.as_deref(), Some("k"));
        assert_eq!(masked.schoology.secret.as_deref(), Some("********"));
        assert_eq!(masked.schoology.access_token_secret, None);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("lms-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        let config = config(Some("k"), Some("s"));

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
