//! Optimizer / scheduler / scaler triples.

use super::state::{CheckpointRecord, Checkpointable};
use crate::Result;

/// The two independently optimized parts of the training pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Classifier stage, index 0
    Classifier,
    /// Spline stage, index 1
    Spline,
}

impl StageKind {
    /// Stages in checkpoint order.
    pub const ALL: [StageKind; 2] = [StageKind::Classifier, StageKind::Spline];

    /// Key suffix used in checkpoint records.
    pub fn suffix(self) -> &'static str {
        match self {
            StageKind::Classifier => "cls",
            StageKind::Spline => "spl",
        }
    }

    pub fn optimizer_key(self) -> String {
        format!("opt_{}", self.suffix())
    }

    pub fn scheduler_key(self) -> String {
        format!("lrs_{}", self.suffix())
    }

    pub fn scaler_key(self) -> String {
        format!("scaler_{}", self.suffix())
    }
}

/// Borrowed training state of one stage.
pub struct Stage<'a> {
    pub optimizer: &'a mut dyn Checkpointable,
    pub scheduler: &'a mut dyn Checkpointable,
    pub scaler: &'a mut dyn Checkpointable,
}

impl<'a> Stage<'a> {
    pub fn new(
        optimizer: &'a mut dyn Checkpointable,
        scheduler: &'a mut dyn Checkpointable,
        scaler: &'a mut dyn Checkpointable,
    ) -> Self {
        Self {
            optimizer,
            scheduler,
            scaler,
        }
    }

    pub(crate) fn save_into(&self, kind: StageKind, record: &mut CheckpointRecord) -> Result<()> {
        record.insert_entry(kind.optimizer_key(), self.optimizer.save_state()?);
        record.insert_entry(kind.scheduler_key(), self.scheduler.save_state()?);
        record.insert_entry(kind.scaler_key(), self.scaler.save_state()?);
        Ok(())
    }

    pub(crate) fn restore_from(&mut self, kind: StageKind, record: &CheckpointRecord) -> Result<()> {
        self.optimizer.load_state(record.entry(&kind.optimizer_key())?)?;
        self.scheduler.load_state(record.entry(&kind.scheduler_key())?)?;
        self.scaler.load_state(record.entry(&kind.scaler_key())?)?;
        Ok(())
    }
}
