//! On-disk artifact cache
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   <key>/                      completed entry (contains .layer-entry.json)
//!   .staging/<key>~<random>/    population in progress, never a hit
//! <root>.locks/<key>.lock       per-key advisory lock
//! ```
//!
//! An entry becomes visible only through a rename from `.staging/` into
//! place, and the completion marker is written before that rename. A crash
//! at any point therefore leaves either nothing at `<root>/<key>` or a
//! complete entry.
//!
//! Locks live outside the root so that `clear` cannot unlink a lock file
//! while it is held. A fresh file at the same path would be a second,
//! independent lock.

use super::entry::{CacheEntry, CompletionMarker};
use super::key::CacheKey;
use super::lock::KeyLock;
use crate::config::{Config, ConfigManager};
use crate::error::{LayerError, LayerResult};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{Builder, TempDir};
use tracing::{debug, info, warn};

const STAGING_DIR: &str = ".staging";
const LOCKS_SUFFIX: &str = ".locks";
const STAGING_SEPARATOR: char = '~';
const SCRATCH_PREFIX: &str = "layer-nocache-";

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const DEFAULT_LOCK_POLL: Duration = Duration::from_millis(100);

/// Cache of fetched artifact directories, keyed by `CacheKey`
#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
    lock_timeout: Duration,
    lock_poll: Duration,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_poll: DEFAULT_LOCK_POLL,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ConfigManager::cache_dir(config))
            .with_lock_wait(config.cache.lock_timeout(), config.cache.lock_poll())
    }

    /// Bound how long `reserve_and_populate` waits for another populator
    pub fn with_lock_wait(mut self, timeout: Duration, poll: Duration) -> Self {
        self.lock_timeout = timeout;
        self.lock_poll = poll.max(Duration::from_millis(1));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of `key`, whether or not it exists yet
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Sibling of the root holding the lock files
    fn lock_root(&self) -> PathBuf {
        match self.root.file_name() {
            Some(name) => {
                let mut name = OsString::from(name);
                name.push(LOCKS_SUFFIX);
                self.root.with_file_name(name)
            }
            None => self.root.join(LOCKS_SUFFIX),
        }
    }

    fn lock_path(&self, key: &CacheKey) -> PathBuf {
        self.lock_root().join(format!("{key}.lock"))
    }

    fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn acquire(&self, key: &CacheKey) -> LayerResult<KeyLock> {
        KeyLock::acquire(
            &self.lock_path(key),
            key.as_str(),
            self.lock_timeout,
            self.lock_poll,
        )
    }

    /// Path of the completed entry for `key`, if there is one
    pub fn get_path(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.entry_path(key);
        if !path.is_dir() {
            return None;
        }
        match CompletionMarker::read(&path) {
            Some(marker) if marker.key == *key => Some(path),
            _ => None,
        }
    }

    /// Return the entry for `key`, running `populate` to create it on a miss
    ///
    /// `populate` receives an empty private staging directory. At most one
    /// caller per key runs `populate` at a time, across threads and
    /// processes; the others block on the key's lock and then see the
    /// published entry. If `populate` fails nothing is published and the
    /// error is returned.
    pub fn reserve_and_populate<F>(&self, key: &CacheKey, populate: F) -> LayerResult<PathBuf>
    where
        F: FnOnce(&Path) -> LayerResult<()>,
    {
        if let Some(path) = self.get_path(key) {
            debug!("Cache hit for {}", key);
            return Ok(path);
        }

        let _lock = self.acquire(key)?;

        // Someone else may have published while we waited
        if let Some(path) = self.get_path(key) {
            debug!("Cache hit for {} after waiting on lock", key);
            return Ok(path);
        }

        let final_path = self.entry_path(key);
        if final_path.exists() {
            warn!(
                "Removing incomplete cache entry at {}",
                final_path.display()
            );
            remove_path(&final_path)?;
        }
        self.sweep_staging(key);

        let staging = self.create_staging(key)?;
        info!("Populating cache entry {}", key);
        populate(staging.path())?;

        CompletionMarker::for_dir(key, staging.path())?.write(staging.path())?;
        if let Err(err) = publish(staging.path(), &final_path) {
            // A complete entry that appeared anyway is as good as ours
            if let Some(path) = self.get_path(key) {
                warn!("Entry {} was published concurrently, discarding ours", key);
                return Ok(path);
            }
            return Err(err);
        }
        // The directory now lives at the final path
        let _ = staging.keep();

        debug!("Published cache entry {} at {}", key, final_path.display());
        Ok(final_path)
    }

    /// Private staging directory for `key`, removed on drop unless kept
    fn create_staging(&self, key: &CacheKey) -> LayerResult<TempDir> {
        let staging_root = self.staging_root();
        fs::create_dir_all(&staging_root).map_err(|e| {
            LayerError::io(format!("creating {}", staging_root.display()), e)
        })?;
        Builder::new()
            .prefix(&format!("{key}{STAGING_SEPARATOR}"))
            .tempdir_in(&staging_root)
            .map_err(|e| LayerError::io(format!("creating staging for {key}"), e))
    }

    /// Remove leftovers of earlier populations of `key`. Caller holds the lock.
    fn sweep_staging(&self, key: &CacheKey) {
        let Ok(dir) = fs::read_dir(self.staging_root()) else {
            return;
        };
        for entry in dir.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let owner = name.rsplit_once(STAGING_SEPARATOR).map(|(k, _)| k);
            if owner == Some(key.as_str()) {
                debug!("Discarding stale staging directory {}", name);
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    warn!("Failed to remove stale staging {}: {}", name, e);
                }
            }
        }
    }

    /// Delete one entry. Returns whether it existed.
    pub fn remove(&self, key: &CacheKey) -> LayerResult<bool> {
        let _lock = self.acquire(key)?;
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(false);
        }
        remove_path(&path)?;
        info!("Removed cache entry {}", key);
        Ok(true)
    }

    /// Delete the whole cache root
    ///
    /// Does not take per-key locks, so it succeeds while other processes
    /// hold them. Their in-flight populations lose their staging directory
    /// and fail; the lock files survive, so waiters stay serialized.
    pub fn clear(&self) -> LayerResult<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                info!("Cleared cache at {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LayerError::io(
                format!("clearing cache {}", self.root.display()),
                e,
            )),
        }
    }

    /// All completed entries, sorted by key
    pub fn entries(&self) -> LayerResult<Vec<CacheEntry>> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LayerError::io(
                    format!("reading cache {}", self.root.display()),
                    e,
                ))
            }
        };

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| {
                LayerError::io(format!("reading cache {}", self.root.display()), e)
            })?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(key) = CacheKey::new(name) else { continue };
            let path = entry.path();
            match CompletionMarker::read(&path) {
                Some(marker) if marker.key == key => entries.push(CacheEntry::new(path, marker)),
                _ => debug!("Skipping incomplete entry {}", path.display()),
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// A disposable directory for fetches that bypass the cache
    pub fn scratch_dir(&self) -> LayerResult<ScratchDir> {
        ScratchDir::new()
    }
}

/// Temporary directory outside the cache, deleted on drop
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn new() -> LayerResult<Self> {
        let dir = Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(|e| LayerError::io("creating scratch directory", e))?;
        debug!("Using scratch directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn remove_path(path: &Path) -> LayerResult<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| LayerError::io(format!("removing {}", path.display()), e))
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(windows)]
fn is_cross_device(err: &io::Error) -> bool {
    const ERROR_NOT_SAME_DEVICE: i32 = 17;
    err.raw_os_error() == Some(ERROR_NOT_SAME_DEVICE)
}

/// Atomically move a populated staging directory to its final path
fn publish(staging: &Path, final_path: &Path) -> LayerResult<()> {
    match fs::rename(staging, final_path) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!("Staging is on another device, publishing by copy");
            publish_by_copy(staging, final_path)
                .map_err(|e| LayerError::io(format!("publishing {}", final_path.display()), e))
        }
        Err(e) => Err(LayerError::io(
            format!("publishing {}", final_path.display()),
            e,
        )),
    }
}

/// Publish across filesystems
///
/// The tree is copied and synced into a hidden sibling of `final_path`, so
/// the step that makes it visible is still a rename within one volume.
fn publish_by_copy(staging: &Path, final_path: &Path) -> io::Result<()> {
    let parent = final_path.parent().unwrap_or(Path::new("."));
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sibling = Builder::new()
        .prefix(&format!(".{name}{STAGING_SEPARATOR}"))
        .tempdir_in(parent)?;

    copy_tree(staging, sibling.path())?;
    fs::rename(sibling.path(), final_path)?;
    let _ = sibling.keep();

    fs::remove_dir_all(staging)
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            File::open(&target)?.sync_all()?;
        }
    }
    Ok(())
}
