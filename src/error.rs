//! Error types for the Layer SDK
//!
//! All modules use `LayerResult<T>` as their return type.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for Layer SDK operations
pub type LayerResult<T> = Result<T, LayerError>;

/// All errors that can occur in the Layer SDK
#[derive(Error, Debug)]
pub enum LayerError {
    // Transfer errors
    #[error("Transfer failed for {location}: {reason}")]
    Transfer { location: String, reason: String },

    #[error("Invalid remote location {location:?}: {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("Object storage is not configured")]
    StorageNotConfigured,

    // Cache errors
    #[error("Timed out after {}s waiting for cache lock on {key}", waited.as_secs())]
    CacheLock { key: String, waited: Duration },

    #[error("Invalid cache key {key:?}: {reason}")]
    InvalidCacheKey { key: String, reason: String },

    // Flavor errors
    #[error("Failed to load {flavor} artifact: {reason}")]
    FlavorLoad { flavor: String, reason: String },

    #[error("Failed to save {flavor} artifact: {reason}")]
    FlavorSave { flavor: String, reason: String },

    // Credential errors
    #[error("No credentials found in {source_name}")]
    CredentialsMissing { source_name: String },

    #[error("Credentials expired, refresh required")]
    CredentialExpired,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl LayerError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a transfer error
    pub fn transfer(location: impl ToString, reason: impl Into<String>) -> Self {
        Self::Transfer {
            location: location.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a flavor load error
    pub fn flavor_load(flavor: impl ToString, reason: impl Into<String>) -> Self {
        Self::FlavorLoad {
            flavor: flavor.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a flavor save error
    pub fn flavor_save(flavor: impl ToString, reason: impl Into<String>) -> Self {
        Self::FlavorSave {
            flavor: flavor.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if the whole operation may succeed when retried later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transfer { .. } | Self::CacheLock { .. } | Self::CredentialExpired
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::StorageNotConfigured => {
                Some("Set storage.endpoint or storage.local_root in the config file")
            }
            Self::CredentialsMissing { .. } => Some("Export LAYER_API_KEY or set storage.api_key"),
            Self::CredentialExpired => Some("Generate a new API key and log in again"),
            Self::CacheLock { .. } => Some(
                "Another process is fetching this artifact; retry or raise cache.lock_timeout_secs",
            ),
            Self::FlavorLoad { .. } => Some("Run with --no-cache to rule out a stale cache entry"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LayerError::transfer("s3://bucket/models/", "object list was empty");
        assert_eq!(
            err.to_string(),
            "Transfer failed for s3://bucket/models/: object list was empty"
        );
    }

    #[test]
    fn cache_lock_display_uses_seconds() {
        let err = LayerError::CacheLock {
            key: "a7c0".to_string(),
            waited: Duration::from_millis(2500),
        };
        assert!(err.to_string().contains("after 2s"));
        assert!(err.to_string().contains("a7c0"));
    }

    #[test]
    fn error_hint() {
        assert!(LayerError::StorageNotConfigured.hint().is_some());
        assert!(LayerError::Internal("boom".into()).hint().is_none());
    }

    #[test]
    fn error_retryable() {
        assert!(LayerError::transfer("x", "y").is_retryable());
        assert!(!LayerError::flavor_load("json", "bad").is_retryable());
    }
}
