//! Checkpoint locations.

use crate::{CheckpointError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const EPOCH_PREFIX: &str = "ckpt_epoch_";
const EPOCH_EXTENSION: &str = ".pth";

/// File name of the best-so-far checkpoint inside `resume_path`.
pub const BEST_CHECKPOINT: &str = "ckpt_best.pth";

/// Default location of the ImageNet-22K to 1K class index table.
pub const DEFAULT_CLASS_MAP: &str = "data/map22kto1k.txt";

/// Configuration for checkpoint management.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Directory holding training checkpoints
    pub resume_path: PathBuf,
    /// Epoch to resume from; the latest checkpoint when unset
    pub resume_epoch: Option<u64>,
    /// Directory holding pretrained weights
    pub pretrained_path: PathBuf,
    /// Pretrained weight file name inside `pretrained_path`
    pub pretrained_model: Option<String>,
    /// Class index table used when fine-tuning 22K weights on 1K classes
    pub class_map_path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            resume_path: PathBuf::from("output"),
            resume_epoch: None,
            pretrained_path: PathBuf::from("pretrained"),
            pretrained_model: None,
            class_map_path: PathBuf::from(DEFAULT_CLASS_MAP),
        }
    }
}

impl CheckpointConfig {
    /// Create a new config with the given checkpoint directory.
    pub fn new(resume_path: impl Into<PathBuf>) -> Self {
        Self {
            resume_path: resume_path.into(),
            ..Default::default()
        }
    }

    /// Set the epoch to resume from.
    pub fn with_resume_epoch(mut self, epoch: u64) -> Self {
        self.resume_epoch = Some(epoch);
        self
    }

    /// Set the pretrained weight location.
    pub fn with_pretrained(mut self, dir: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        self.pretrained_path = dir.into();
        self.pretrained_model = Some(model.into());
        self
    }

    /// Set the class index table location.
    pub fn with_class_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.class_map_path = path.into();
        self
    }

    /// Path of the checkpoint written at `epoch`.
    pub fn epoch_path(&self, epoch: u64) -> PathBuf {
        self.resume_path
            .join(format!("{}{}{}", EPOCH_PREFIX, epoch, EPOCH_EXTENSION))
    }

    /// Path of the best-so-far checkpoint.
    pub fn best_path(&self) -> PathBuf {
        self.resume_path.join(BEST_CHECKPOINT)
    }

    /// Full path of the pretrained weight file.
    pub fn pretrained_file(&self) -> Result<PathBuf> {
        self.pretrained_model
            .as_ref()
            .map(|model| self.pretrained_path.join(model))
            .ok_or_else(|| CheckpointError::Config("pretrained_model is not set".into()))
    }

    /// Parse the epoch out of a checkpoint file name such as `ckpt_epoch_12.pth`.
    pub fn parse_epoch(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(EPOCH_PREFIX)?
            .strip_suffix(EPOCH_EXTENSION)?
            .parse()
            .ok()
    }
}
