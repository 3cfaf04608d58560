//! Opaque flavor for framework-native blobs the SDK does not interpret

use super::metadata::FlavorMetadata;
use super::{expect_kind, FlavorKind, ModelFlavor, ModelObject};
use crate::error::{LayerError, LayerResult};
use semver::{Version, VersionReq};
use std::fs;
use std::io;
use std::path::Path;

const MODEL_FILE: &str = "model.bin";
const FORMAT_VERSION: Version = Version::new(1, 0, 0);

#[derive(Debug, Clone, Copy, Default)]
pub struct BytesFlavor;

impl ModelFlavor for BytesFlavor {
    fn kind(&self) -> FlavorKind {
        FlavorKind::Bytes
    }

    fn save_to_directory(&self, object: &ModelObject, directory: &Path) -> LayerResult<()> {
        expect_kind(self.kind(), object)?;
        if let ModelObject::Bytes(bytes) = object {
            let path = directory.join(MODEL_FILE);
            fs::write(&path, bytes)
                .map_err(|e| LayerError::io(format!("writing {}", path.display()), e))?;
        }
        FlavorMetadata::new(self.kind(), FORMAT_VERSION).write(directory)
    }

    fn load_from_directory(&self, directory: &Path) -> LayerResult<ModelObject> {
        let supported = VersionReq::parse("^1").map_err(|e| LayerError::Internal(e.to_string()))?;
        FlavorMetadata::read_checked(directory, self.kind(), &supported)?;

        let path = directory.join(MODEL_FILE);
        match fs::read(&path) {
            Ok(bytes) => Ok(ModelObject::Bytes(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(LayerError::flavor_load(
                self.kind(),
                format!("{MODEL_FILE} is missing"),
            )),
            Err(e) => Err(LayerError::io(format!("reading {}", path.display()), e)),
        }
    }
}
