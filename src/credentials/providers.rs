//! Built-in credential providers

use super::{CredentialProvider, Credentials};
use crate::error::{LayerError, LayerResult};

/// Fixed credentials supplied by the caller
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> LayerResult<Option<Credentials>> {
        if self.credentials.is_expired() {
            return Err(LayerError::CredentialExpired);
        }
        Ok(Some(self.credentials.clone()))
    }
}

/// API key read from an environment variable on every request
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> LayerResult<Option<Credentials>> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(Some(Credentials::new(token.trim()))),
            _ => Err(LayerError::CredentialsMissing {
                source_name: format!("${}", self.var),
            }),
        }
    }
}

/// Guest access without a token
pub struct AnonymousCredentials;

impl CredentialProvider for AnonymousCredentials {
    fn credentials(&self) -> LayerResult<Option<Credentials>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serial_test::serial;

    #[test]
    fn static_expired_is_error() {
        let provider = StaticCredentials::new(
            Credentials::new("tok").with_expiry(Utc::now() - chrono::Duration::hours(1)),
        );
        assert!(matches!(
            provider.credentials(),
            Err(LayerError::CredentialExpired)
        ));
    }

    #[test]
    #[serial]
    fn env_reads_and_trims() {
        std::env::set_var("LAYER_TEST_ENV_KEY", "  secret\n");
        let creds = EnvCredentials::new("LAYER_TEST_ENV_KEY")
            .credentials()
            .unwrap()
            .unwrap();
        assert_eq!(creds.token, "secret");
        std::env::remove_var("LAYER_TEST_ENV_KEY");
    }

    #[test]
    #[serial]
    fn env_missing_is_error() {
        std::env::remove_var("LAYER_TEST_ENV_MISSING");
        let err = EnvCredentials::new("LAYER_TEST_ENV_MISSING")
            .credentials()
            .unwrap_err();
        assert!(err.to_string().contains("LAYER_TEST_ENV_MISSING"));
    }

    #[test]
    fn anonymous_has_no_token() {
        assert!(AnonymousCredentials.credentials().unwrap().is_none());
    }
}
