//! Object store backed by a local directory tree
//!
//! Objects live at `<root>/<bucket>/<key>`. Useful for on-prem mirrors,
//! air-gapped setups and tests. Uploads land in hidden `.upload-*` files
//! next to their target and are renamed into place; listings skip them.

use super::store::{ObjectInfo, ObjectStore, RemoteLocation, StoreError};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::Builder;
use tracing::debug;

const UPLOAD_PREFIX: &str = ".upload-";

/// Directory-backed object store
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(key);
        if key.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(bucket).join(rel))
    }
}

/// Recursively collect files under `dir`, keyed relative to `base`
fn walk(dir: &Path, base: &Path, out: &mut Vec<ObjectInfo>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_name().to_string_lossy().starts_with(UPLOAD_PREFIX) {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&path, base, out)?;
        } else if file_type.is_file() {
            let rel = path.strip_prefix(base).unwrap_or(&path);
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(ObjectInfo {
                key,
                size: entry.metadata()?.len(),
                sha256: None,
            });
        }
    }
    Ok(())
}

/// Write `source` to `path` so readers never observe a half-written object
fn write_atomic(parent: &Path, path: &Path, source: &mut dyn Read) -> io::Result<()> {
    let mut tmp = Builder::new().prefix(UPLOAD_PREFIX).tempfile_in(parent)?;
    io::copy(source, &mut tmp)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl ObjectStore for FsStore {
    fn list(&self, location: &RemoteLocation) -> Result<Vec<ObjectInfo>, StoreError> {
        let bucket_dir = self.root.join(location.bucket());
        let start = bucket_dir.join(location.prefix());
        if !start.is_dir() {
            return Ok(vec![]);
        }

        let mut objects = Vec::new();
        walk(&start, &bucket_dir, &mut objects)
            .map_err(|e| StoreError::io(format!("listing {}", start.display()), e))?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        debug!("Listed {} objects under {}", objects.len(), location);
        Ok(objects)
    }

    fn get(
        &self,
        location: &RemoteLocation,
        key: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, StoreError> {
        let path = self.object_path(location.bucket(), key)?;
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::io(format!("opening {}", path.display()), e),
        })?;
        io::copy(&mut file, sink).map_err(|e| StoreError::io(format!("reading {key}"), e))
    }

    fn put(
        &self,
        location: &RemoteLocation,
        key: &str,
        source: &mut dyn Read,
        _size: u64,
    ) -> Result<(), StoreError> {
        let path = self.object_path(location.bucket(), key)?;
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)
            .map_err(|e| StoreError::io(format!("creating {}", parent.display()), e))?;

        write_atomic(parent, &path, source)
            .map_err(|e| StoreError::io(format!("writing {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(files: &[(&str, &str)]) -> (FsStore, TempDir) {
        let temp = TempDir::new().unwrap();
        for (key, content) in files {
            let path = temp.path().join("bucket").join(key);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        (FsStore::new(temp.path()), temp)
    }

    #[test]
    fn list_walks_nested_dirs() {
        let (store, _temp) = store_with(&[
            ("models/m1/model.json", "{}"),
            ("models/m1/sub/extra.bin", "abc"),
            ("models/m2/model.json", "{}"),
        ]);
        let loc = RemoteLocation::parse("s3://bucket/models/m1").unwrap();
        let objects = store.list(&loc).unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "models/m1/model.json");
        assert_eq!(objects[1].key, "models/m1/sub/extra.bin");
        assert_eq!(objects[1].size, 3);
    }

    #[test]
    fn list_skips_uploads_in_flight() {
        let (store, temp) = store_with(&[("models/m1/model.json", "{}")]);
        let dir = temp.path().join("bucket/models/m1");
        fs::write(dir.join(".upload-x7Qp2a"), "half").unwrap();
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("sub/.upload-9zLm0b"), "half").unwrap();

        let loc = RemoteLocation::parse("s3://bucket/models/m1").unwrap();
        let keys: Vec<_> = store.list(&loc).unwrap().into_iter().map(|o| o.key).collect();
        assert_eq!(keys, ["models/m1/model.json"]);
    }

    #[test]
    fn put_leaves_no_temp_files() {
        let (store, temp) = store_with(&[]);
        let loc = RemoteLocation::parse("s3://bucket/up").unwrap();
        let mut data: &[u8] = b"payload";
        store.put(&loc, "up/model.bin", &mut data, 7).unwrap();

        let names: Vec<_> = fs::read_dir(temp.path().join("bucket/up"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["model.bin"]);
    }

    #[test]
    fn list_missing_prefix_is_empty() {
        let (store, _temp) = store_with(&[]);
        let loc = RemoteLocation::parse("s3://bucket/nothing").unwrap();
        assert!(store.list(&loc).unwrap().is_empty());
    }

    #[test]
    fn put_then_get() {
        let (store, _temp) = store_with(&[]);
        let loc = RemoteLocation::parse("s3://bucket/up").unwrap();
        let mut data: &[u8] = b"payload";
        store.put(&loc, "up/a/b.bin", &mut data, 7).unwrap();

        let mut out = Vec::new();
        assert_eq!(store.get(&loc, "up/a/b.bin", &mut out).unwrap(), 7);
        assert_eq!(out, b"payload");
    }

    #[test]
    fn get_missing_is_not_found() {
        let (store, _temp) = store_with(&[]);
        let loc = RemoteLocation::parse("s3://bucket/x").unwrap();
        let err = store.get(&loc, "x/missing", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let (store, _temp) = store_with(&[]);
        let loc = RemoteLocation::parse("s3://bucket/x").unwrap();
        let err = store.get(&loc, "../secret", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
