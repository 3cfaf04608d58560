//! Layer SDK - artifact cache and object storage transfer
//!
//! Fetches trained models and datasets from object storage into a local,
//! process-safe cache and loads them with the flavor they were saved in.
//!
//! ```rust,ignore
//! use layer_sdk::{ArtifactDescriptor, ArtifactLoader, FlavorKind, TransferState};
//!
//! let loader = ArtifactLoader::from_config(&config)?;
//! let descriptor = ArtifactDescriptor::parse("s3://models/churn/a7c0", "a7c0", FlavorKind::Json)?;
//! let loaded = loader.load(&descriptor, &TransferState::new())?;
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod dataset;
pub mod error;
pub mod flavor;
pub mod loader;
pub mod transfer;
pub mod ui;

pub use cache::{CacheKey, LocalCache};
pub use dataset::{DatasetDescriptor, DatasetFile, LoadedDataset};
pub use error::{LayerError, LayerResult};
pub use flavor::{FlavorKind, ModelFlavor, ModelObject};
pub use loader::{ArtifactDescriptor, ArtifactLoader, LoadedArtifact};
pub use transfer::{RemoteLocation, TransferState, TransferStatus, Transport};
