//! Named tensor store implementing `Module`.

use crate::tensor::{Module, StateDict, Tensor};
use std::collections::{BTreeMap, BTreeSet};

/// A flat collection of named parameters and buffers.
///
/// Buffers are tensors derived from the architecture (index tables, masks);
/// they are part of the state dict but excluded from `parameters()`.
#[derive(Clone, Debug, Default)]
pub struct ParamStore {
    tensors: BTreeMap<String, Tensor>,
    buffers: BTreeSet<String>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trainable parameter.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: Tensor) {
        let name = name.into();
        self.buffers.remove(&name);
        self.tensors.insert(name, value);
    }

    /// Register a persistent buffer.
    pub fn add_buffer(&mut self, name: impl Into<String>, value: Tensor) {
        let name = name.into();
        self.buffers.insert(name.clone());
        self.tensors.insert(name, value);
    }

    pub fn is_buffer(&self, name: &str) -> bool {
        self.buffers.contains(name)
    }

    /// Trainable parameters only.
    pub fn parameters(&self) -> StateDict {
        self.tensors
            .iter()
            .filter(|(name, _)| !self.buffers.contains(*name))
            .map(|(name, t)| (name.clone(), t.clone()))
            .collect()
    }

    /// Write trainable parameters back, e.g. after an optimizer step.
    ///
    /// Unknown names and buffers are ignored.
    pub fn set_parameters(&mut self, params: &StateDict) {
        for (name, value) in params.iter() {
            if self.buffers.contains(name) {
                continue;
            }
            if let Some(current) = self.tensors.get_mut(name) {
                if current.shape() == value.shape() {
                    current.assign(value);
                }
            }
        }
    }

    /// Number of scalar elements across trainable parameters.
    pub fn num_parameters(&self) -> usize {
        self.tensors
            .iter()
            .filter(|(name, _)| !self.buffers.contains(*name))
            .map(|(_, t)| t.len())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl Module for ParamStore {
    fn tensor_names(&self) -> Vec<String> {
        self.tensors.keys().cloned().collect()
    }

    fn tensor(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    fn tensor_mut(&mut self, name: &str) -> Option<&mut Tensor> {
        self.tensors.get_mut(name)
    }
}
