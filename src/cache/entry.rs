//! Completed cache entries and their completion marker

use super::key::CacheKey;
use crate::error::{LayerError, LayerResult};
use crate::transfer::format_bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File written into an entry as the last step before it is published
pub const MARKER_FILE: &str = ".layer-entry.json";

/// Contents of the completion marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub key: CacheKey,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub file_count: u64,
}

impl CompletionMarker {
    /// Measure `dir` and describe it as the entry for `key`
    pub fn for_dir(key: &CacheKey, dir: &Path) -> LayerResult<Self> {
        let (size_bytes, file_count) = measure(dir)
            .map_err(|e| LayerError::io(format!("measuring {}", dir.display()), e))?;
        Ok(Self {
            key: key.clone(),
            created_at: Utc::now(),
            size_bytes,
            file_count,
        })
    }

    /// Write the marker into `dir` and flush it to disk
    pub fn write(&self, dir: &Path) -> LayerResult<()> {
        let path = dir.join(MARKER_FILE);
        let json = serde_json::to_vec_pretty(self)?;
        let mut file = File::create(&path)
            .map_err(|e| LayerError::io(format!("creating {}", path.display()), e))?;
        file.write_all(&json)
            .and_then(|()| file.sync_all())
            .map_err(|e| LayerError::io(format!("writing {}", path.display()), e))
    }

    /// Read the marker from `dir`, `None` if missing or unreadable
    pub fn read(dir: &Path) -> Option<Self> {
        let bytes = fs::read(dir.join(MARKER_FILE)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// A completed, published cache entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub file_count: u64,
}

impl CacheEntry {
    pub(crate) fn new(path: PathBuf, marker: CompletionMarker) -> Self {
        Self {
            key: marker.key,
            path,
            created_at: marker.created_at,
            size_bytes: marker.size_bytes,
            file_count: marker.file_count,
        }
    }

    pub fn size_display(&self) -> String {
        format_bytes(self.size_bytes)
    }
}

/// Total size and file count of a directory tree, excluding the marker
fn measure(dir: &Path) -> io::Result<(u64, u64)> {
    let mut size = 0;
    let mut files = 0;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() && entry.file_name() != MARKER_FILE {
                size += entry.metadata()?.len();
                files += 1;
            }
        }
    }
    Ok((size, files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn marker_measures_nested_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("weights")).unwrap();
        fs::write(temp.path().join("model.json"), b"{}").unwrap();
        fs::write(temp.path().join("weights/part-0"), vec![0u8; 100]).unwrap();

        let key = CacheKey::new("k1").unwrap();
        let marker = CompletionMarker::for_dir(&key, temp.path()).unwrap();
        assert_eq!(marker.size_bytes, 102);
        assert_eq!(marker.file_count, 2);

        marker.write(temp.path()).unwrap();
        // Re-measuring must not count the marker itself
        let again = CompletionMarker::for_dir(&key, temp.path()).unwrap();
        assert_eq!(again.file_count, 2);

        assert_eq!(CompletionMarker::read(temp.path()), Some(marker));
    }

    #[test]
    fn corrupt_marker_reads_as_missing() {
        let temp = TempDir::new().unwrap();
        assert!(CompletionMarker::read(temp.path()).is_none());

        fs::write(temp.path().join(MARKER_FILE), b"{not json").unwrap();
        assert!(CompletionMarker::read(temp.path()).is_none());
    }
}
