//! Object storage abstraction
//!
//! An `ObjectStore` moves single objects. Directory semantics, parallelism,
//! retries and progress live in the transport on top of it.

use crate::error::{LayerError, LayerResult};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

const SCHEMES: &[&str] = &["s3", "gs", "layer"];

/// A bucket and key prefix addressing a directory of objects
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteLocation {
    scheme: String,
    bucket: String,
    prefix: String,
}

impl RemoteLocation {
    /// Parse `scheme://bucket/prefix`
    pub fn parse(input: &str) -> LayerResult<Self> {
        let invalid = |reason: &str| LayerError::InvalidLocation {
            location: input.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| invalid("expected scheme://bucket/prefix"))?;
        if !SCHEMES.contains(&scheme) {
            return Err(invalid("unsupported scheme, expected s3, gs or layer"));
        }

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(invalid("missing bucket"));
        }
        if !bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid("bucket contains invalid characters"));
        }

        let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(invalid("prefix must not contain '.' or '..' segments"));
        }
        if prefix.contains('\\') {
            return Err(invalid("prefix must use '/' separators"));
        }

        let mut prefix = segments.join("/");
        if !prefix.is_empty() {
            prefix.push('/');
        }

        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            prefix,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix, empty or ending with `/`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full object key for a path relative to this location
    pub fn key_for(&self, relative: &str) -> String {
        format!("{}{}", self.prefix, relative.trim_start_matches('/'))
    }

    /// Path of `key` relative to this location, if it lies underneath it
    pub fn relative_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
            .filter(|rel| !rel.is_empty())
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.prefix)
    }
}

impl FromStr for RemoteLocation {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A single listed object
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ObjectInfo {
    /// Full key within the bucket
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Hex-encoded SHA-256 of the content, when the store knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Failure of a single store request
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("checksum mismatch for {key}: expected {expected}, got {actual}")]
    Checksum {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("invalid object key {0:?}")]
    InvalidKey(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether retrying the same request may succeed
    ///
    /// Throttling, server errors, dropped connections and corrupted bodies
    /// are transient. Client errors and missing objects are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::Network(_) | Self::Checksum { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::UnexpectedEof
            ),
            Self::NotFound(_) | Self::Auth(_) | Self::InvalidKey(_) | Self::Request(_) => false,
        }
    }
}

/// Single-object storage backend
pub trait ObjectStore: Send + Sync {
    /// List every object under `location`
    fn list(&self, location: &RemoteLocation) -> Result<Vec<ObjectInfo>, StoreError>;

    /// Stream object `key` into `sink`, returning the number of bytes written
    fn get(
        &self,
        location: &RemoteLocation,
        key: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, StoreError>;

    /// Upload `size` bytes from `source` as object `key`
    fn put(
        &self,
        location: &RemoteLocation,
        key: &str,
        source: &mut dyn Read,
        size: u64,
    ) -> Result<(), StoreError>;
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    /// Read back an object
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStore {
    fn list(&self, location: &RemoteLocation) -> Result<Vec<ObjectInfo>, StoreError> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects
            .iter()
            .filter(|((bucket, key), _)| {
                bucket == location.bucket() && key.starts_with(location.prefix())
            })
            .map(|((_, key), data)| ObjectInfo {
                key: key.clone(),
                size: data.len() as u64,
                sha256: None,
            })
            .collect())
    }

    fn get(
        &self,
        location: &RemoteLocation,
        key: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, StoreError> {
        let data = self
            .object(location.bucket(), key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        sink.write_all(&data)
            .map_err(|e| StoreError::io(format!("writing {key}"), e))?;
        Ok(data.len() as u64)
    }

    fn put(
        &self,
        location: &RemoteLocation,
        key: &str,
        source: &mut dyn Read,
        size: u64,
    ) -> Result<(), StoreError> {
        let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        source
            .read_to_end(&mut data)
            .map_err(|e| StoreError::io(format!("reading upload for {key}"), e))?;
        self.insert(location.bucket(), key, data);
        Ok(())
    }
}
