//! Checkpoint record and trait definitions.

use crate::tensor::StateDict;
use crate::{CheckpointError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Trait for components that can be checkpointed.
///
/// Implement this trait to enable save/restore functionality for your training components.
///
/// # Example
///
/// ```ignore
/// impl Checkpointable for MyScheduler {
///     fn save_state(&self) -> Result<Vec<u8>> {
///         Ok(bincode::serialize(&self.state)?)
///     }
///
///     fn load_state(&mut self, data: &[u8]) -> Result<()> {
///         self.state = bincode::deserialize(data)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Checkpointable {
    /// Serialize the component's state to bytes.
    fn save_state(&self) -> Result<Vec<u8>>;

    /// Restore the component's state from bytes.
    fn load_state(&mut self, data: &[u8]) -> Result<()>;
}

/// A training checkpoint: model weights plus named state blobs.
///
/// The blobs are opaque `Checkpointable` payloads keyed by names such as
/// `opt_cls` or `scaler_spl`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CheckpointRecord {
    /// Model state dict
    pub model: StateDict,
    /// Epoch the record was written at, if it is a training checkpoint
    pub epoch: Option<u64>,
    /// Library version that wrote the record
    pub version: String,
    entries: BTreeMap<String, Vec<u8>>,
}

impl CheckpointRecord {
    /// Key under which the model state is reported.
    pub const MODEL_KEY: &'static str = "model";

    /// Create a weights-only record.
    pub fn new(model: StateDict) -> Self {
        Self {
            model,
            epoch: None,
            version: crate::VERSION.to_string(),
            entries: BTreeMap::new(),
        }
    }

    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Store a serialized component under `key`.
    pub fn insert_entry(&mut self, key: impl Into<String>, data: Vec<u8>) {
        self.entries.insert(key.into(), data);
    }

    /// Look up a serialized component; absence is an error.
    pub fn entry(&self, key: &str) -> Result<&[u8]> {
        self.entries
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| CheckpointError::MissingKey(key.to_string()))
    }

    pub fn has_entry(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.entries.iter()
    }

    /// All top-level keys, `model` first.
    pub fn keys(&self) -> Vec<String> {
        std::iter::once(Self::MODEL_KEY.to_string())
            .chain(self.entries.keys().cloned())
            .collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }

    /// Read a record from disk.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Self::from_bytes(&data)
    }

    /// Write the record with a single write call.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self.to_bytes()?;
        fs::write(path.as_ref(), data)?;
        Ok(())
    }
}
