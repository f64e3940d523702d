//! Checkpoint manager for resumable training and pretrained initialisation.

use super::config::CheckpointConfig;
use super::format::read_model_state;
use super::pretrained::{adapt_pretrained, AdaptReport};
use super::stage::{Stage, StageKind};
use super::state::CheckpointRecord;
use crate::tensor::{LoadReport, Module};
use crate::{CheckpointError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Manages the checkpoint lifecycle.
///
/// Handles epoch checkpoints, best checkpoint tracking, resuming the two
/// training stages, and loading pretrained weights for fine-tuning.
///
/// # Example
///
/// ```ignore
/// let config = CheckpointConfig::new("./output").with_resume_epoch(30);
/// let manager = CheckpointManager::new(config);
///
/// let mut stages = [
///     Stage::new(&mut opt_cls, &mut lrs_cls, &mut scaler_cls),
///     Stage::new(&mut opt_spl, &mut lrs_spl, &mut scaler_spl),
/// ];
///
/// // To resume:
/// let (epoch, _) = manager.load_checkpoint(&mut model, &mut stages)?;
///
/// // In training loop:
/// manager.save_checkpoint(epoch + 1, &model, &stages, is_best)?;
/// ```
pub struct CheckpointManager {
    config: CheckpointConfig,
}

impl CheckpointManager {
    /// Create a new checkpoint manager.
    pub fn new(config: CheckpointConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Get the checkpoint directory path.
    pub fn checkpoint_dir(&self) -> &Path {
        &self.config.resume_path
    }

    /// Save the model and both stages as `ckpt_epoch_{epoch}.pth`.
    ///
    /// When `is_best` is set the file is also copied to `ckpt_best.pth`.
    pub fn save_checkpoint(
        &self,
        epoch: u64,
        model: &dyn Module,
        stages: &[Stage<'_>; 2],
        is_best: bool,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.resume_path)?;
        let path = self.config.epoch_path(epoch);
        tracing::info!(path = %path.display(), "Saving checkpoint");

        let mut record = CheckpointRecord::new(model.state_dict()).with_epoch(epoch);
        for (kind, stage) in StageKind::ALL.iter().zip(stages.iter()) {
            stage.save_into(*kind, &mut record)?;
        }
        record.write(&path)?;
        tracing::info!(path = %path.display(), epoch, "Saved checkpoint");

        if is_best {
            let best_path = self.config.best_path();
            fs::copy(&path, &best_path)?;
            tracing::info!(path = %best_path.display(), epoch, "New best checkpoint!");
        }

        Ok(path)
    }

    /// Resume the model and both stages from a training checkpoint.
    ///
    /// Uses `resume_epoch` when set, otherwise the latest epoch found in the
    /// checkpoint directory. Returns the epoch and the model load report.
    pub fn load_checkpoint(
        &self,
        model: &mut dyn Module,
        stages: &mut [Stage<'_>; 2],
    ) -> Result<(u64, LoadReport)> {
        let epoch = match self.config.resume_epoch {
            Some(epoch) => epoch,
            None => self.latest_epoch()?.ok_or_else(|| {
                CheckpointError::Config(format!(
                    "no checkpoint found in {}",
                    self.config.resume_path.display()
                ))
            })?,
        };

        let path = self.config.epoch_path(epoch);
        tracing::info!(path = %path.display(), "Resuming from checkpoint");

        let record = CheckpointRecord::read(&path)?;
        let report = model.load_state_dict(&record.model, false)?;
        tracing::info!("{}", report);

        for (kind, stage) in StageKind::ALL.iter().zip(stages.iter_mut()) {
            stage.restore_from(*kind, &record)?;
        }

        tracing::info!(path = %path.display(), epoch, "Loaded successfully (epoch {})", epoch);
        drop(record);
        tracing::debug!("Released checkpoint buffers");

        Ok((epoch, report))
    }

    /// Load model weights only, from any record or safetensors file.
    pub fn load_weights(&self, path: impl AsRef<Path>, model: &mut dyn Module) -> Result<LoadReport> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading weights");

        let state = read_model_state(path)?;
        let report = model.load_state_dict(&state, false)?;
        tracing::info!("{}", report);
        tracing::info!(path = %path.display(), "Loaded weights successfully");

        Ok(report)
    }

    /// Load `{pretrained_path}/{pretrained_model}` for fine-tuning.
    pub fn load_pretrained(&self, model: &mut dyn Module) -> Result<AdaptReport> {
        let path = self.config.pretrained_file()?;
        tracing::info!(path = %path.display(), "Loading weight for fine-tuning");

        let mut state = read_model_state(&path)?;
        let report = adapt_pretrained(&mut state, model, &self.config.class_map_path)?;
        tracing::info!(path = %path.display(), "Loaded pretrained weight successfully");

        drop(state);
        tracing::debug!("Released pretrained buffers");
        Ok(report)
    }

    /// List epoch checkpoints, ordered by epoch.
    pub fn list_checkpoints(&self) -> Result<Vec<(u64, PathBuf)>> {
        let entries = match fs::read_dir(&self.config.resume_path) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut checkpoints: Vec<(u64, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter_map(|p| {
                let epoch = p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(CheckpointConfig::parse_epoch)?;
                Some((epoch, p))
            })
            .collect();

        checkpoints.sort();
        Ok(checkpoints)
    }

    /// Highest saved epoch, if any.
    pub fn latest_epoch(&self) -> Result<Option<u64>> {
        Ok(self.list_checkpoints()?.last().map(|(epoch, _)| *epoch))
    }
}
