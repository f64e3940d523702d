//! Learning rate schedules.

use crate::checkpoint::Checkpointable;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Trait for epoch-driven learning rate schedules.
pub trait LrScheduler {
    /// Advance one epoch and return the new learning rate.
    fn step(&mut self) -> f64;

    /// Learning rate for the current epoch.
    fn current_lr(&self) -> f64;
}

/// Linear warm-up followed by cosine decay.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CosineScheduler {
    /// Peak learning rate reached after warm-up
    pub base_lr: f64,
    /// Floor of the cosine decay
    pub lr_min: f64,
    /// Learning rate at epoch 0
    pub warmup_lr_init: f64,
    /// Warm-up length in epochs
    pub warmup_epochs: u64,
    /// Total schedule length in epochs
    pub total_epochs: u64,
    last_epoch: u64,
}

impl Default for CosineScheduler {
    fn default() -> Self {
        Self {
            base_lr: 5e-4,
            lr_min: 5e-6,
            warmup_lr_init: 5e-7,
            warmup_epochs: 20,
            total_epochs: 300,
            last_epoch: 0,
        }
    }
}

impl CosineScheduler {
    pub fn new(base_lr: f64, total_epochs: u64) -> Self {
        Self {
            base_lr,
            total_epochs,
            ..Default::default()
        }
    }

    pub fn with_warmup(mut self, epochs: u64, lr_init: f64) -> Self {
        self.warmup_epochs = epochs;
        self.warmup_lr_init = lr_init;
        self
    }

    pub fn with_lr_min(mut self, lr_min: f64) -> Self {
        self.lr_min = lr_min;
        self
    }

    pub fn last_epoch(&self) -> u64 {
        self.last_epoch
    }

    /// Learning rate at an arbitrary epoch.
    pub fn lr_at(&self, epoch: u64) -> f64 {
        if epoch < self.warmup_epochs {
            let progress = epoch as f64 / self.warmup_epochs as f64;
            return self.warmup_lr_init + progress * (self.base_lr - self.warmup_lr_init);
        }

        let decay_epochs = self.total_epochs.saturating_sub(self.warmup_epochs);
        let t = epoch - self.warmup_epochs;
        if decay_epochs == 0 || t >= decay_epochs {
            return self.lr_min;
        }

        let progress = t as f64 / decay_epochs as f64;
        self.lr_min + 0.5 * (self.base_lr - self.lr_min) * (1.0 + (PI * progress).cos())
    }
}

impl LrScheduler for CosineScheduler {
    fn step(&mut self) -> f64 {
        self.last_epoch += 1;
        self.current_lr()
    }

    fn current_lr(&self) -> f64 {
        self.lr_at(self.last_epoch)
    }
}

impl Checkpointable for CosineScheduler {
    fn save_state(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        *self = bincode::deserialize(data)?;
        Ok(())
    }
}
