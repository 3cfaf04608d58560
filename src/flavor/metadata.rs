//! `flavor.json`: which flavor wrote a directory and in which format version

use super::FlavorKind;
use crate::error::{LayerError, LayerResult};
use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub const METADATA_FILE: &str = "flavor.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorMetadata {
    pub flavor: FlavorKind,
    pub format_version: Version,
    pub created_at: DateTime<Utc>,
}

impl FlavorMetadata {
    pub fn new(flavor: FlavorKind, format_version: Version) -> Self {
        Self {
            flavor,
            format_version,
            created_at: Utc::now(),
        }
    }

    pub fn write(&self, directory: &Path) -> LayerResult<()> {
        let path = directory.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|e| LayerError::io(format!("writing {}", path.display()), e))
    }

    /// Read and validate the metadata in `directory` for `expected`
    ///
    /// Fails with `FlavorLoad` when the file is missing, names another
    /// flavor, or carries a format version outside `supported`.
    pub fn read_checked(
        directory: &Path,
        expected: FlavorKind,
        supported: &VersionReq,
    ) -> LayerResult<Self> {
        let path = directory.join(METADATA_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LayerError::flavor_load(
                    expected,
                    format!("{} not found in {}", METADATA_FILE, directory.display()),
                ))
            }
            Err(e) => return Err(LayerError::io(format!("reading {}", path.display()), e)),
        };

        let metadata: Self = serde_json::from_str(&content).map_err(|e| {
            LayerError::flavor_load(expected, format!("invalid {}: {}", METADATA_FILE, e))
        })?;

        if metadata.flavor != expected {
            return Err(LayerError::flavor_load(
                expected,
                format!("directory holds a {} artifact", metadata.flavor),
            ));
        }
        if !supported.matches(&metadata.format_version) {
            return Err(LayerError::flavor_load(
                expected,
                format!(
                    "format version {} is not supported (requires {})",
                    metadata.format_version, supported
                ),
            ));
        }
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn req(s: &str) -> VersionReq {
        VersionReq::parse(s).unwrap()
    }

    #[test]
    fn write_then_check() {
        let temp = TempDir::new().unwrap();
        FlavorMetadata::new(FlavorKind::Json, Version::new(1, 2, 0))
            .write(temp.path())
            .unwrap();

        let read = FlavorMetadata::read_checked(temp.path(), FlavorKind::Json, &req("^1")).unwrap();
        assert_eq!(read.format_version, Version::new(1, 2, 0));
    }

    #[test]
    fn newer_major_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        FlavorMetadata::new(FlavorKind::Safetensors, Version::new(2, 0, 0))
            .write(temp.path())
            .unwrap();

        let err = FlavorMetadata::read_checked(temp.path(), FlavorKind::Safetensors, &req("^1"))
            .unwrap_err();
        assert!(err.to_string().contains("2.0.0"));
    }

    #[test]
    fn missing_metadata_is_a_load_error() {
        let temp = TempDir::new().unwrap();
        let err =
            FlavorMetadata::read_checked(temp.path(), FlavorKind::Bytes, &req("^1")).unwrap_err();
        assert!(matches!(err, LayerError::FlavorLoad { .. }));
    }
}
