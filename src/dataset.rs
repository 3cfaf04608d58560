//! Datasets: immutable file sets fetched through the same cache as models
//!
//! A dataset build never changes once written, so its build id is the
//! cache key. There is no flavor to deserialize; callers get the files.

use crate::cache::{CacheKey, ScratchDir, MARKER_FILE};
use crate::error::{LayerError, LayerResult};
use crate::loader::ArtifactLoader;
use crate::transfer::{RemoteLocation, TransferState};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where a dataset build lives and which build it is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub location: RemoteLocation,
    pub build_id: CacheKey,
}

impl DatasetDescriptor {
    pub fn new(location: RemoteLocation, build_id: CacheKey) -> Self {
        Self { location, build_id }
    }

    pub fn parse(location: &str, build_id: &str) -> LayerResult<Self> {
        Ok(Self::new(
            RemoteLocation::parse(location)?,
            CacheKey::new(build_id)?,
        ))
    }
}

/// One file of a dataset build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetFile {
    /// Path relative to the dataset root, `/`-separated
    pub name: String,
    pub size: u64,
}

#[derive(Debug)]
enum DatasetRoot {
    Cached(PathBuf),
    Scratch(ScratchDir),
}

impl DatasetRoot {
    fn path(&self) -> &Path {
        match self {
            Self::Cached(path) => path,
            Self::Scratch(scratch) => scratch.path(),
        }
    }
}

/// A fetched dataset build
///
/// For `no_cache` fetches the files live in a scratch directory owned by
/// this value and are deleted when it is dropped.
#[derive(Debug)]
pub struct LoadedDataset {
    root: DatasetRoot,
    files: Vec<DatasetFile>,
    from_cache: bool,
}

impl LoadedDataset {
    fn scan(root: DatasetRoot, from_cache: bool) -> LayerResult<Self> {
        let dir = root.path();
        let mut files = Vec::new();
        collect_files(dir, dir, &mut files)
            .map_err(|e| LayerError::io(format!("scanning dataset {}", dir.display()), e))?;
        files.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Dataset at {} has {} file(s)", dir.display(), files.len());
        Ok(Self {
            root,
            files,
            from_cache,
        })
    }

    /// Directory holding the files
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Cache entry path, `None` for `no_cache` fetches
    pub fn cached_path(&self) -> Option<&Path> {
        match self.root {
            DatasetRoot::Cached(ref path) => Some(path),
            DatasetRoot::Scratch(_) => None,
        }
    }

    pub fn files(&self) -> &[DatasetFile] {
        &self.files
    }

    /// True when no download was needed
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Contents of one file of the dataset
    pub fn read(&self, name: &str) -> LayerResult<Vec<u8>> {
        if !self.files.iter().any(|f| f.name == name) {
            return Err(LayerError::User(format!(
                "'{name}' is not part of this dataset"
            )));
        }
        let path = self.path().join(name);
        fs::read(&path).map_err(|e| LayerError::io(format!("reading {}", path.display()), e))
    }
}

fn collect_files(dir: &Path, base: &Path, out: &mut Vec<DatasetFile>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&path, base, out)?;
            continue;
        }
        if !file_type.is_file() || (dir == base && entry.file_name() == MARKER_FILE) {
            continue;
        }
        let name = path
            .strip_prefix(base)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push(DatasetFile {
            name,
            size: entry.metadata()?.len(),
        });
    }
    Ok(())
}

impl ArtifactLoader {
    /// Fetch a dataset build, downloading it unless a completed entry exists
    ///
    /// Honors `no_cache` the same way `load` does.
    pub fn load_dataset(
        &self,
        descriptor: &DatasetDescriptor,
        state: &TransferState,
    ) -> LayerResult<LoadedDataset> {
        if self.no_cache() {
            info!(
                "Fetching dataset {} from {} without cache",
                descriptor.build_id, descriptor.location
            );
            let scratch = self.cache().scratch_dir()?;
            self.transport()
                .download_dir(&descriptor.location, scratch.path(), state)?;
            return LoadedDataset::scan(DatasetRoot::Scratch(scratch), false);
        }

        let (path, downloaded) =
            self.populate(&descriptor.build_id, &descriptor.location, state)?;
        LoadedDataset::scan(DatasetRoot::Cached(path), !downloaded)
    }
}
