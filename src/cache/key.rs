//! Cache keys
//!
//! A key names one immutable remote artifact version (typically a train
//! UUID) and doubles as its directory name under the cache root, so it is
//! restricted to characters that are safe in a path component and it may
//! not start with `.`, which is reserved for internal directories.

use crate::error::{LayerError, LayerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_KEY_LEN: usize = 200;

/// Stable identifier for one immutable artifact version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> LayerResult<Self> {
        let key = key.into();
        let invalid = |reason: &str| LayerError::InvalidCacheKey {
            key: key.clone(),
            reason: reason.to_string(),
        };

        if key.is_empty() {
            return Err(invalid("key is empty"));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(invalid("key is too long"));
        }
        if key.starts_with('.') {
            return Err(invalid("key must not start with '.'"));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid("only ASCII letters, digits, '-', '_' and '.' are allowed"));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CacheKey {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = LayerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
