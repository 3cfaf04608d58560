//! Artifact loading: cache lookup, download on miss, flavor deserialization
//!
//! ```text
//! load(descriptor)
//!   no_cache  -> download into a scratch dir -> load_from_directory -> drop scratch
//!   otherwise -> cache.reserve_and_populate(key, download_dir) -> load_from_directory
//! ```

use crate::cache::{CacheKey, LocalCache};
use crate::config::Config;
use crate::error::LayerResult;
use crate::flavor::{FlavorKind, ModelObject};
use crate::transfer::{self, RemoteLocation, TransferState, Transport};
use std::path::PathBuf;
use tracing::{debug, info};

/// Where an artifact lives, how it is keyed locally, and how to read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub location: RemoteLocation,
    pub key: CacheKey,
    pub flavor: FlavorKind,
}

impl ArtifactDescriptor {
    pub fn new(location: RemoteLocation, key: CacheKey, flavor: FlavorKind) -> Self {
        Self {
            location,
            key,
            flavor,
        }
    }

    /// Build a descriptor from catalog strings
    pub fn parse(location: &str, key: &str, flavor: FlavorKind) -> LayerResult<Self> {
        Ok(Self::new(
            RemoteLocation::parse(location)?,
            CacheKey::new(key)?,
            flavor,
        ))
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.key
    }
}

/// A deserialized artifact
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedArtifact {
    pub object: ModelObject,
    /// Cache entry the object was read from; `None` for `no_cache` loads
    pub path: Option<PathBuf>,
    /// True when no download was needed
    pub from_cache: bool,
}

/// Loads artifacts through the local cache
#[derive(Clone)]
pub struct ArtifactLoader {
    cache: LocalCache,
    transport: Transport,
    no_cache: bool,
}

impl ArtifactLoader {
    pub fn new(cache: LocalCache, transport: Transport) -> Self {
        Self {
            cache,
            transport,
            no_cache: false,
        }
    }

    /// Loader for the configured store and cache. `cache.enabled = false`
    /// turns on `no_cache`.
    pub fn from_config(config: &Config) -> LayerResult<Self> {
        Ok(Self::new(
            LocalCache::from_config(config),
            transfer::create_transport(config)?,
        )
        .with_no_cache(!config.cache.enabled))
    }

    /// Bypass the cache: every load downloads into a disposable directory
    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn no_cache(&self) -> bool {
        self.no_cache
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Load the artifact, downloading it unless a completed entry exists
    ///
    /// `state` receives download progress. It is left untouched on a hit.
    pub fn load(
        &self,
        descriptor: &ArtifactDescriptor,
        state: &TransferState,
    ) -> LayerResult<LoadedArtifact> {
        let flavor = descriptor.flavor.flavor();

        if self.no_cache {
            info!(
                "Fetching {} from {} without cache",
                descriptor.key, descriptor.location
            );
            let scratch = self.cache.scratch_dir()?;
            self.transport
                .download_dir(&descriptor.location, scratch.path(), state)?;
            let object = flavor.load_from_directory(scratch.path())?;
            return Ok(LoadedArtifact {
                object,
                path: None,
                from_cache: false,
            });
        }

        let (path, downloaded) = self.populate(&descriptor.key, &descriptor.location, state)?;
        debug!("Loading {} artifact from {}", descriptor.flavor, path.display());
        let object = flavor.load_from_directory(&path)?;
        Ok(LoadedArtifact {
            object,
            path: Some(path),
            from_cache: !downloaded,
        })
    }

    /// Make sure the artifact is cached and return its directory
    ///
    /// Always goes through the cache, regardless of `no_cache`.
    pub fn fetch_dir(
        &self,
        descriptor: &ArtifactDescriptor,
        state: &TransferState,
    ) -> LayerResult<PathBuf> {
        self.populate(&descriptor.key, &descriptor.location, state)
            .map(|(path, _)| path)
    }

    /// Cached directory for `key`, downloading `location` on a miss.
    /// The flag is true when this call did the download.
    pub(crate) fn populate(
        &self,
        key: &CacheKey,
        location: &RemoteLocation,
        state: &TransferState,
    ) -> LayerResult<(PathBuf, bool)> {
        let mut downloaded = false;
        let path = self.cache.reserve_and_populate(key, |staging| {
            downloaded = true;
            info!("Downloading {} from {}", key, location);
            self.transport.download_dir(location, staging, state)
        })?;
        Ok((path, downloaded))
    }

    /// Save `object` with `flavor` and upload the result to `location`
    pub fn publish(
        &self,
        object: &ModelObject,
        flavor: FlavorKind,
        location: &RemoteLocation,
        state: &TransferState,
    ) -> LayerResult<()> {
        let scratch = self.cache.scratch_dir()?;
        flavor.flavor().save_to_directory(object, scratch.path())?;
        info!("Publishing {} artifact to {}", flavor, location);
        self.transport.upload_dir(scratch.path(), location, state)
    }

    /// Delete every cached artifact
    pub fn clear_cache(&self) -> LayerResult<()> {
        self.cache.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LayerError;
    use crate::flavor::{JsonFlavor, ModelFlavor, METADATA_FILE};
    use crate::transfer::{MemoryStore, ObjectInfo, ObjectStore, StoreError, TransferStatus};
    use serde_json::json;
    use std::fs;
    use std::io::{Read, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const TRAIN_ID: &str = "a7c02598-7910-4f96-b8e6-bc6b62bd214f";

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        lists: AtomicUsize,
        gets: AtomicUsize,
    }

    impl ObjectStore for CountingStore {
        fn list(&self, location: &RemoteLocation) -> Result<Vec<ObjectInfo>, StoreError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list(location)
        }

        fn get(
            &self,
            location: &RemoteLocation,
            key: &str,
            sink: &mut dyn Write,
        ) -> Result<u64, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(location, key, sink)
        }

        fn put(
            &self,
            location: &RemoteLocation,
            key: &str,
            source: &mut dyn Read,
            size: u64,
        ) -> Result<(), StoreError> {
            self.inner.put(location, key, source, size)
        }
    }

    struct Fixture {
        _temp: TempDir,
        store: Arc<CountingStore>,
        loader: ArtifactLoader,
        descriptor: ArtifactDescriptor,
        model: ModelObject,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(CountingStore::default());
        let loader = ArtifactLoader::new(
            LocalCache::new(temp.path().join("cache")),
            Transport::new(store.clone()),
        );
        let descriptor = ArtifactDescriptor::parse(
            &format!("s3://models/churn/{TRAIN_ID}"),
            TRAIN_ID,
            FlavorKind::Json,
        )
        .unwrap();
        let model = ModelObject::Json(json!({"coef": [0.25, 0.5], "classes": ["stay", "churn"]}));

        loader
            .publish(&model, FlavorKind::Json, &descriptor.location, &TransferState::new())
            .unwrap();

        Fixture {
            _temp: temp,
            store,
            loader,
            descriptor,
            model,
        }
    }

    #[test]
    fn publish_uploads_model_and_metadata() {
        let f = fixture();
        let prefix = format!("churn/{TRAIN_ID}/");
        assert!(f.store.inner.object("models", &format!("{prefix}model.json")).is_some());
        assert!(f
            .store
            .inner
            .object("models", &format!("{prefix}{METADATA_FILE}"))
            .is_some());
    }

    #[test]
    fn miss_downloads_once_then_hits() {
        let f = fixture();

        let state = TransferState::new();
        let first = f.loader.load(&f.descriptor, &state).unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.object, f.model);
        let path = first.path.clone().unwrap();
        assert_eq!(path, f.loader.cache().root().join(TRAIN_ID));
        assert_eq!(state.status(), TransferStatus::Completed);
        assert_eq!(f.store.lists.load(Ordering::SeqCst), 1);
        let gets = f.store.gets.load(Ordering::SeqCst);

        let state = TransferState::new();
        let second = f.loader.load(&f.descriptor, &state).unwrap();
        assert!(second.from_cache);
        assert_eq!(second.path, Some(path));
        assert_eq!(second.object, f.model);
        assert_eq!(state.status(), TransferStatus::NotStarted);
        assert_eq!(f.store.lists.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.gets.load(Ordering::SeqCst), gets);
    }

    #[test]
    fn no_cache_downloads_every_time_and_never_caches() {
        let f = fixture();
        let loader = f.loader.clone().with_no_cache(true);

        for round in 1..=2 {
            let loaded = loader.load(&f.descriptor, &TransferState::new()).unwrap();
            assert_eq!(loaded.object, f.model);
            assert!(loaded.path.is_none());
            assert!(!loaded.from_cache);
            assert_eq!(f.store.lists.load(Ordering::SeqCst), round);
        }
        assert!(!loader.cache().root().exists());
        assert!(loader.cache().get_path(&f.descriptor.key).is_none());
    }

    #[test]
    fn fetch_dir_populates_without_loading() {
        let f = fixture();
        let path = f.loader.fetch_dir(&f.descriptor, &TransferState::new()).unwrap();
        assert!(path.join("model.json").is_file());
        assert_eq!(f.loader.cache().get_path(&f.descriptor.key), Some(path));
    }

    #[test]
    fn failed_download_leaves_no_entry() {
        let f = fixture();
        let missing = ArtifactDescriptor::parse("s3://models/churn/none", "none", FlavorKind::Json)
            .unwrap();

        let state = TransferState::new();
        let err = f.loader.load(&missing, &state).unwrap_err();
        assert!(matches!(err, LayerError::Transfer { .. }));
        assert_eq!(state.status(), TransferStatus::Failed);
        assert!(f.loader.cache().get_path(&missing.key).is_none());
    }

    #[test]
    fn malformed_location_is_rejected() {
        let err = ArtifactDescriptor::parse("ftp://models/x", TRAIN_ID, FlavorKind::Json)
            .unwrap_err();
        assert!(matches!(err, LayerError::InvalidLocation { .. }));
    }

    #[test]
    fn flavor_mismatch_is_a_load_error() {
        let f = fixture();
        let wrong = ArtifactDescriptor {
            flavor: FlavorKind::Safetensors,
            ..f.descriptor.clone()
        };

        let err = f.loader.load(&wrong, &TransferState::new()).unwrap_err();
        assert!(matches!(err, LayerError::FlavorLoad { .. }));
        // The bytes were fine, so the entry stays cached
        assert!(f.loader.cache().get_path(&wrong.key).is_some());
    }

    #[test]
    fn clear_cache_forces_download() {
        let f = fixture();
        f.loader.load(&f.descriptor, &TransferState::new()).unwrap();
        f.loader.clear_cache().unwrap();

        let again = f.loader.load(&f.descriptor, &TransferState::new()).unwrap();
        assert!(!again.from_cache);
        assert_eq!(f.store.lists.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cached_entry_matches_saved_layout() {
        let f = fixture();
        let path = f.loader.fetch_dir(&f.descriptor, &TransferState::new()).unwrap();

        let local = TempDir::new().unwrap();
        JsonFlavor.save_to_directory(&f.model, local.path()).unwrap();
        assert_eq!(
            fs::read(path.join("model.json")).unwrap(),
            fs::read(local.path().join("model.json")).unwrap()
        );
    }
}
