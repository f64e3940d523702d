//! ImageNet-22K to ImageNet-1K class index table.

use crate::tensor::Tensor;
use crate::{CheckpointError, Result};
use ndarray::Axis;
use std::fs;
use std::path::Path;

/// Number of classes in an ImageNet-22K classifier head.
pub const IMAGENET_22K_CLASSES: usize = 21841;

/// Number of classes in an ImageNet-1K classifier head.
pub const IMAGENET_1K_CLASSES: usize = 1000;

/// For each 1K class, the row of the 22K head that represents it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassMap {
    indices: Vec<usize>,
}

impl ClassMap {
    /// Build a map from explicit indices, checking count and range.
    pub fn from_indices(indices: Vec<usize>) -> Result<Self> {
        if indices.len() != IMAGENET_1K_CLASSES {
            return Err(CheckpointError::InvalidClassMap(format!(
                "expected {} entries, found {}",
                IMAGENET_1K_CLASSES,
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= IMAGENET_22K_CLASSES) {
            return Err(CheckpointError::InvalidClassMap(format!(
                "index {} out of range for {} classes",
                bad, IMAGENET_22K_CLASSES
            )));
        }
        Ok(Self { indices })
    }

    /// Parse one integer per line; blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let indices = text
            .lines()
            .enumerate()
            .map(|(n, line)| (n, line.trim()))
            .filter(|(_, line)| !line.is_empty())
            .map(|(n, line)| {
                line.parse::<usize>().map_err(|_| {
                    CheckpointError::InvalidClassMap(format!("line {}: {:?}", n + 1, line))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_indices(indices)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Gather rows along the first axis in map order.
    pub fn select_rows(&self, tensor: &Tensor) -> Result<Tensor> {
        let rows = tensor.shape().first().copied().unwrap_or(0);
        if tensor.ndim() == 0 || self.indices.iter().any(|&i| i >= rows) {
            let mut expected = tensor.shape().to_vec();
            if expected.is_empty() {
                expected.push(IMAGENET_22K_CLASSES);
            } else {
                expected[0] = IMAGENET_22K_CLASSES;
            }
            return Err(CheckpointError::ShapeMismatch {
                name: "head".to_string(),
                expected,
                actual: tensor.shape().to_vec(),
            });
        }
        Ok(tensor.select(Axis(0), &self.indices))
    }
}
