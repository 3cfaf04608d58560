//! JSON flavor: a single `model.json` document

use super::metadata::FlavorMetadata;
use super::{expect_kind, FlavorKind, ModelFlavor, ModelObject};
use crate::error::{LayerError, LayerResult};
use semver::{Version, VersionReq};
use std::fs;
use std::io;
use std::path::Path;

const MODEL_FILE: &str = "model.json";
const FORMAT_VERSION: Version = Version::new(1, 0, 0);
const SUPPORTED: &str = "^1";

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFlavor;

impl ModelFlavor for JsonFlavor {
    fn kind(&self) -> FlavorKind {
        FlavorKind::Json
    }

    fn save_to_directory(&self, object: &ModelObject, directory: &Path) -> LayerResult<()> {
        expect_kind(self.kind(), object)?;
        if let ModelObject::Json(value) = object {
            let path = directory.join(MODEL_FILE);
            let json = serde_json::to_vec_pretty(value)?;
            fs::write(&path, json)
                .map_err(|e| LayerError::io(format!("writing {}", path.display()), e))?;
        }
        FlavorMetadata::new(self.kind(), FORMAT_VERSION).write(directory)
    }

    fn load_from_directory(&self, directory: &Path) -> LayerResult<ModelObject> {
        let supported =
            VersionReq::parse(SUPPORTED).map_err(|e| LayerError::Internal(e.to_string()))?;
        FlavorMetadata::read_checked(directory, self.kind(), &supported)?;

        let path = directory.join(MODEL_FILE);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                LayerError::flavor_load(self.kind(), format!("{MODEL_FILE} is missing"))
            }
            _ => LayerError::io(format!("reading {}", path.display()), e),
        })?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| LayerError::flavor_load(self.kind(), format!("{MODEL_FILE}: {e}")))?;
        Ok(ModelObject::Json(value))
    }
}
