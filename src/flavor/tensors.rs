//! Safetensors flavor: named tensors in a single `model.safetensors` file

use super::metadata::FlavorMetadata;
use super::{expect_kind, FlavorKind, ModelFlavor, ModelObject};
use crate::error::{LayerError, LayerResult};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use semver::{Version, VersionReq};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

const MODEL_FILE: &str = "model.safetensors";
const FORMAT_VERSION: Version = Version::new(1, 0, 0);

/// Tensors by name
pub type TensorMap = BTreeMap<String, Tensor>;

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    F16,
    BF16,
    U32,
    I32,
    F32,
    U64,
    I64,
    F64,
}

impl DType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 | Self::F16 | Self::BF16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    fn to_safetensors(self) -> Dtype {
        match self {
            Self::Bool => Dtype::BOOL,
            Self::U8 => Dtype::U8,
            Self::I8 => Dtype::I8,
            Self::U16 => Dtype::U16,
            Self::I16 => Dtype::I16,
            Self::F16 => Dtype::F16,
            Self::BF16 => Dtype::BF16,
            Self::U32 => Dtype::U32,
            Self::I32 => Dtype::I32,
            Self::F32 => Dtype::F32,
            Self::U64 => Dtype::U64,
            Self::I64 => Dtype::I64,
            Self::F64 => Dtype::F64,
        }
    }

    fn from_safetensors(dtype: Dtype) -> Option<Self> {
        Some(match dtype {
            Dtype::BOOL => Self::Bool,
            Dtype::U8 => Self::U8,
            Dtype::I8 => Self::I8,
            Dtype::U16 => Self::U16,
            Dtype::I16 => Self::I16,
            Dtype::F16 => Self::F16,
            Dtype::BF16 => Self::BF16,
            Dtype::U32 => Self::U32,
            Dtype::I32 => Self::I32,
            Dtype::F32 => Self::F32,
            Dtype::U64 => Self::U64,
            Dtype::I64 => Self::I64,
            Dtype::F64 => Self::F64,
            _ => return None,
        })
    }
}

/// Dense tensor stored as little-endian bytes
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl Tensor {
    /// Fails unless `data` holds exactly `shape.product()` elements of `dtype`
    pub fn new(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> LayerResult<Self> {
        let expected = shape
            .iter()
            .try_fold(dtype.size_in_bytes(), |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                LayerError::User(format!("tensor shape {:?} is too large", shape))
            })?;
        if data.len() != expected {
            return Err(LayerError::User(format!(
                "tensor of shape {:?} and type {:?} needs {} bytes, got {}",
                shape,
                dtype,
                expected,
                data.len()
            )));
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> LayerResult<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(DType::F32, shape, data)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Element values, `None` unless the tensor is `F32`
    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        if self.dtype != DType::F32 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetensorsFlavor;

impl ModelFlavor for SafetensorsFlavor {
    fn kind(&self) -> FlavorKind {
        FlavorKind::Safetensors
    }

    fn save_to_directory(&self, object: &ModelObject, directory: &Path) -> LayerResult<()> {
        expect_kind(self.kind(), object)?;
        if let ModelObject::Tensors(tensors) = object {
            let views = tensors
                .iter()
                .map(|(name, tensor)| {
                    TensorView::new(
                        tensor.dtype.to_safetensors(),
                        tensor.shape.clone(),
                        &tensor.data,
                    )
                    .map(|view| (name.as_str(), view))
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| LayerError::flavor_save(self.kind(), e.to_string()))?;

            let path = directory.join(MODEL_FILE);
            safetensors::serialize_to_file(views, &None, &path)
                .map_err(|e| LayerError::flavor_save(self.kind(), e.to_string()))?;
        }
        FlavorMetadata::new(self.kind(), FORMAT_VERSION).write(directory)
    }

    fn load_from_directory(&self, directory: &Path) -> LayerResult<ModelObject> {
        let supported = VersionReq::parse("^1").map_err(|e| LayerError::Internal(e.to_string()))?;
        FlavorMetadata::read_checked(directory, self.kind(), &supported)?;

        let path = directory.join(MODEL_FILE);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                LayerError::flavor_load(self.kind(), format!("{MODEL_FILE} is missing"))
            }
            _ => LayerError::io(format!("reading {}", path.display()), e),
        })?;
        let file = SafeTensors::deserialize(&bytes)
            .map_err(|e| LayerError::flavor_load(self.kind(), e.to_string()))?;

        let mut tensors = TensorMap::new();
        for (name, view) in file.tensors() {
            let dtype = DType::from_safetensors(view.dtype()).ok_or_else(|| {
                LayerError::flavor_load(
                    self.kind(),
                    format!("tensor '{}' has unsupported type {:?}", name, view.dtype()),
                )
            })?;
            let tensor = Tensor::new(dtype, view.shape().to_vec(), view.data().to_vec())
                .map_err(|e| LayerError::flavor_load(self.kind(), e.to_string()))?;
            tensors.insert(name, tensor);
        }
        Ok(ModelObject::Tensors(tensors))
    }
}
