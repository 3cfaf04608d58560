//! Credential providers for the storage gateway
//!
//! The transfer layer only ever asks "give me valid credentials"; how the
//! token was obtained (login flow, API key, guest access) stays outside.

mod providers;

pub use providers::{AnonymousCredentials, EnvCredentials, StaticCredentials};

use crate::config::schema::StorageConfig;
use crate::error::LayerResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// A bearer token and its optional expiry
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Token sent as `Authorization: Bearer <token>`
    pub token: String,

    /// When the token expires, if known
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Create credentials that never expire
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Set the expiry time
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check if credentials are expired
    pub fn is_expired(&self) -> bool {
        // 60 second buffer so a token does not lapse mid-request
        self.expires_at
            .is_some_and(|at| Utc::now() >= at - chrono::Duration::seconds(60))
    }
}

/// Source of credentials for object storage requests
pub trait CredentialProvider: Send + Sync {
    /// Current credentials, or `None` for anonymous access
    fn credentials(&self) -> LayerResult<Option<Credentials>>;
}

/// Build the provider described by the storage configuration
///
/// An inline key wins over the environment variable; with neither set the
/// provider is anonymous (public artifacts only).
pub fn from_config(config: &StorageConfig) -> Arc<dyn CredentialProvider> {
    if let Some(ref key) = config.api_key {
        debug!("Using inline API key from config");
        return Arc::new(StaticCredentials::new(Credentials::new(key.clone())));
    }

    if std::env::var_os(&config.api_key_env).is_some() {
        debug!("Using API key from ${}", config.api_key_env);
        return Arc::new(EnvCredentials::new(config.api_key_env.clone()));
    }

    debug!("No API key configured, using anonymous access");
    Arc::new(AnonymousCredentials)
}
