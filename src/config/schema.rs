//! Configuration schema for the Layer SDK
//!
//! Configuration is stored at `~/.config/layer/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Local artifact cache settings
    pub cache: CacheConfig,

    /// Object storage settings
    pub storage: StorageConfig,

    /// Transfer tuning
    pub transfer: TransferConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache fetched artifacts locally (false behaves like `--no-cache`)
    pub enabled: bool,

    /// Cache root directory (default: platform cache dir)
    pub dir: Option<PathBuf>,

    /// How long to wait for another process populating the same key
    pub lock_timeout_secs: u64,

    /// Interval between lock attempts while waiting
    pub lock_poll_ms: u64,
}

impl CacheConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms.max(1))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            lock_timeout_secs: 1800,
            lock_poll_ms: 100,
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// HTTP storage gateway URL
    pub endpoint: Option<String>,

    /// Directory-backed store root (takes precedence over `endpoint`)
    pub local_root: Option<PathBuf>,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Inline API key (prefer the environment variable)
    pub api_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            local_root: None,
            api_key_env: "LAYER_API_KEY".to_string(),
            api_key: None,
        }
    }
}

/// Transfer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Parallel object transfers per call
    pub workers: usize,

    /// Attempts per object, including the first
    pub max_attempts: u32,

    /// First retry delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound on retry delay in milliseconds
    pub max_backoff_ms: u64,

    /// Whole-call timeout in seconds (0 = disabled)
    pub timeout_secs: u64,
}

impl TransferConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            timeout_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[transfer]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.storage.api_key_env, "LAYER_API_KEY");
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [transfer]
            workers = 2
            timeout_secs = 30
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.transfer.workers, 2);
        assert_eq!(config.transfer.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.transfer.max_attempts, 5); // default preserved
    }

    #[test]
    fn zero_timeout_disables() {
        assert_eq!(TransferConfig::default().timeout(), None);
    }
}
