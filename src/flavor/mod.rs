//! Model serialization flavors
//!
//! A flavor is the native on-disk format of a trained model object. Every
//! flavor can save a `ModelObject` into a directory and load it back, and
//! records itself in a `flavor.json` metadata file so a directory written
//! by one flavor is never silently read by another.

pub mod bytes;
pub mod json;
pub mod metadata;
pub mod tensors;

pub use bytes::BytesFlavor;
pub use json::JsonFlavor;
pub use metadata::{FlavorMetadata, METADATA_FILE};
pub use tensors::{DType, SafetensorsFlavor, Tensor, TensorMap};

use crate::error::{LayerError, LayerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Supported flavors, keyed by their identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlavorKind {
    /// JSON document, e.g. exported estimator parameters
    Json,
    /// Named tensors in the safetensors format
    Safetensors,
    /// Opaque framework-native blob
    Bytes,
}

impl FlavorKind {
    pub const ALL: [FlavorKind; 3] = [Self::Json, Self::Safetensors, Self::Bytes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Safetensors => "safetensors",
            Self::Bytes => "bytes",
        }
    }

    /// Implementation for this flavor
    pub fn flavor(&self) -> Box<dyn ModelFlavor> {
        match self {
            Self::Json => Box::new(JsonFlavor),
            Self::Safetensors => Box::new(SafetensorsFlavor),
            Self::Bytes => Box::new(BytesFlavor),
        }
    }
}

impl fmt::Display for FlavorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlavorKind {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                LayerError::User(format!(
                    "Unknown flavor '{s}' (expected one of: json, safetensors, bytes)"
                ))
            })
    }
}

/// In-memory model, one variant per flavor
#[derive(Debug, Clone, PartialEq)]
pub enum ModelObject {
    Json(serde_json::Value),
    Tensors(TensorMap),
    Bytes(Vec<u8>),
}

impl ModelObject {
    /// The flavor that natively stores this object
    pub fn kind(&self) -> FlavorKind {
        match self {
            Self::Json(_) => FlavorKind::Json,
            Self::Tensors(_) => FlavorKind::Safetensors,
            Self::Bytes(_) => FlavorKind::Bytes,
        }
    }
}

/// Save/load capability shared by all flavors
pub trait ModelFlavor: Send + Sync {
    fn kind(&self) -> FlavorKind;

    /// Serialize `object` into `directory`, which must already exist
    fn save_to_directory(&self, object: &ModelObject, directory: &Path) -> LayerResult<()>;

    /// Deserialize the object stored in `directory`
    fn load_from_directory(&self, directory: &Path) -> LayerResult<ModelObject>;
}

/// Reject objects that belong to another flavor
pub(crate) fn expect_kind(flavor: FlavorKind, object: &ModelObject) -> LayerResult<()> {
    if object.kind() == flavor {
        Ok(())
    } else {
        Err(LayerError::flavor_save(
            flavor,
            format!("cannot store a {} object", object.kind()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn identifiers_round_trip() {
        for kind in FlavorKind::ALL {
            assert_eq!(kind.as_str().parse::<FlavorKind>().unwrap(), kind);
            assert_eq!(kind.flavor().kind(), kind);
        }
        assert_eq!("JSON".parse::<FlavorKind>().unwrap(), FlavorKind::Json);
        assert!("pickle".parse::<FlavorKind>().is_err());
    }

    #[test]
    fn serde_uses_identifier() {
        assert_eq!(
            serde_json::to_string(&FlavorKind::Safetensors).unwrap(),
            "\"safetensors\""
        );
    }

    #[test]
    fn flavor_refuses_foreign_object() {
        let temp = TempDir::new().unwrap();
        let err = FlavorKind::Json
            .flavor()
            .save_to_directory(&ModelObject::Bytes(vec![1, 2]), temp.path())
            .unwrap_err();
        assert!(matches!(err, LayerError::FlavorSave { .. }));
    }

    #[test]
    fn loading_with_wrong_flavor_fails() {
        let temp = TempDir::new().unwrap();
        FlavorKind::Bytes
            .flavor()
            .save_to_directory(&ModelObject::Bytes(b"weights".to_vec()), temp.path())
            .unwrap();

        let err = FlavorKind::Json
            .flavor()
            .load_from_directory(temp.path())
            .unwrap_err();
        assert!(matches!(err, LayerError::FlavorLoad { ref flavor, .. } if flavor == "json"));
    }
}
