//! Weight file formats.
//!
//! Model weights are read either from a `CheckpointRecord` (bincode) or from
//! a `.safetensors` file. Floating-point and integer safetensors dtypes are
//! converted to `f32` (index buffers hold exact small integers); 8-bit float
//! formats are rejected.

use super::state::CheckpointRecord;
use crate::tensor::{StateDict, Tensor};
use crate::{CheckpointError, Result};
use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const SAFETENSORS_EXTENSION: &str = "safetensors";

/// Whether `path` names a safetensors file.
pub fn is_safetensors(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .map_or(false, |ext| ext == SAFETENSORS_EXTENSION)
}

/// Read the model state from a record or safetensors file.
pub fn read_model_state(path: impl AsRef<Path>) -> Result<StateDict> {
    let path = path.as_ref();
    if is_safetensors(path) {
        read_safetensors(path)
    } else {
        Ok(CheckpointRecord::read(path)?.model)
    }
}

/// Read every tensor of a safetensors file as `f32`.
pub fn read_safetensors(path: impl AsRef<Path>) -> Result<StateDict> {
    let buffer = fs::read(path.as_ref())?;
    let tensors = SafeTensors::deserialize(&buffer)?;

    let mut state = StateDict::new();
    for (name, view) in tensors.tensors() {
        let values = decode(&name, &view)?;
        let tensor = ArrayD::from_shape_vec(IxDyn(view.shape()), values)?;
        state.insert(name, tensor);
    }

    tracing::debug!(path = %path.as_ref().display(), tensors = state.len(), "Read safetensors");
    Ok(state)
}

fn decode(name: &str, view: &TensorView<'_>) -> Result<Vec<f32>> {
    let data = view.data();
    let values = match view.dtype() {
        Dtype::F32 => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Dtype::F64 => data
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
        Dtype::F16 => data
            .chunks_exact(2)
            .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        Dtype::BF16 => data
            .chunks_exact(2)
            .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        Dtype::BOOL | Dtype::U8 => data.iter().map(|&b| b as f32).collect(),
        Dtype::I8 => data.iter().map(|&b| b as i8 as f32).collect(),
        Dtype::I16 => data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32)
            .collect(),
        Dtype::U16 => data
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) as f32)
            .collect(),
        Dtype::I32 => data
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
            .collect(),
        Dtype::U32 => data
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
            .collect(),
        Dtype::I64 => data
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
        Dtype::U64 => data
            .chunks_exact(8)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
        other => {
            return Err(CheckpointError::UnsupportedDtype {
                name: name.to_string(),
                dtype: format!("{:?}", other),
            })
        }
    };
    Ok(values)
}

/// Write a state dict as an `f32` safetensors file.
pub fn write_safetensors(state: &StateDict, path: impl AsRef<Path>) -> Result<()> {
    let encoded: Vec<(String, Vec<usize>, Vec<u8>)> = state
        .iter()
        .map(|(name, tensor)| (name.clone(), tensor.shape().to_vec(), to_le_bytes(tensor)))
        .collect();

    let mut views = Vec::with_capacity(encoded.len());
    for (name, shape, bytes) in &encoded {
        views.push((name.as_str(), TensorView::new(Dtype::F32, shape.clone(), bytes)?));
    }

    let metadata: HashMap<String, String> =
        [("format".to_string(), "pt".to_string())].into_iter().collect();
    let bytes = safetensors::serialize(views, &Some(metadata))?;
    fs::write(path.as_ref(), bytes)?;
    Ok(())
}

fn to_le_bytes(tensor: &Tensor) -> Vec<u8> {
    tensor.iter().flat_map(|v| v.to_le_bytes()).collect()
}
