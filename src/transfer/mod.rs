//! Resource transfer subsystem
//!
//! Chunked, retried, progress-tracked directory transfers between the local
//! filesystem and object storage.

pub mod fs_store;
pub mod http_store;
pub mod retry;
pub mod state;
pub mod store;
pub mod transport;

pub use fs_store::FsStore;
pub use http_store::HttpStore;
pub use retry::RetryPolicy;
pub use state::{format_bytes, TransferSnapshot, TransferState, TransferStatus};
pub use store::{MemoryStore, ObjectInfo, ObjectStore, RemoteLocation, StoreError};
pub use transport::{TransferOptions, Transport};

use crate::config::Config;
use crate::credentials;
use crate::error::{LayerError, LayerResult};
use std::sync::Arc;
use tracing::debug;

/// Create the object store described by the configuration
///
/// A `local_root` wins over an HTTP `endpoint`.
pub fn create_store(config: &Config) -> LayerResult<Arc<dyn ObjectStore>> {
    if let Some(ref root) = config.storage.local_root {
        debug!("Using directory-backed store at {}", root.display());
        return Ok(Arc::new(FsStore::new(root.clone())));
    }

    if let Some(ref endpoint) = config.storage.endpoint {
        debug!("Using HTTP storage gateway at {}", endpoint);
        let provider = credentials::from_config(&config.storage);
        let store = HttpStore::new(endpoint, provider)?
            .with_request_timeout(config.transfer.timeout());
        return Ok(Arc::new(store));
    }

    Err(LayerError::StorageNotConfigured)
}

/// Create a transport using the configured store and tuning
pub fn create_transport(config: &Config) -> LayerResult<Transport> {
    Ok(Transport::with_options(
        create_store(config)?,
        TransferOptions::from_config(&config.transfer),
    ))
}
