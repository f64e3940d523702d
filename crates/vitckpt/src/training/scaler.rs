//! Dynamic loss scaling for mixed-precision training.

use crate::checkpoint::Checkpointable;
use crate::tensor::StateDict;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Helper for Automatic Mixed Precision (AMP) to prevent underflow.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GradScaler {
    scale: f64,
    growth_factor: f64,
    backoff_factor: f64,
    growth_interval: usize,
    growth_tracker: usize,
    enabled: bool,
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new(65536.0)
    }
}

impl GradScaler {
    pub fn new(initial_scale: f64) -> Self {
        Self {
            scale: initial_scale,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
            growth_tracker: 0,
            enabled: true,
        }
    }

    /// A scaler that passes values through unchanged.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            scale: 1.0,
            ..Self::new(1.0)
        }
    }

    pub fn with_growth_interval(mut self, interval: usize) -> Self {
        self.growth_interval = interval.max(1);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get_scale(&self) -> f64 {
        self.scale
    }

    /// Scale a loss value.
    pub fn scale(&self, loss: f32) -> f32 {
        if self.enabled {
            loss * self.scale as f32
        } else {
            loss
        }
    }

    /// Unscales gradients in place.
    /// Returns true if no overflows were detected and the optimizer step should proceed.
    pub fn unscale(&self, grads: &mut StateDict) -> bool {
        let inv_scale = (1.0 / self.scale) as f32;
        let mut finite = true;
        for (_, grad) in grads.iter_mut() {
            if self.enabled {
                grad.mapv_inplace(|g| g * inv_scale);
            }
            finite &= grad.iter().all(|g| g.is_finite());
        }
        finite
    }

    /// Adjust the scale after a step.
    pub fn update(&mut self, found_inf: bool) {
        if !self.enabled {
            return;
        }
        if found_inf {
            self.scale *= self.backoff_factor;
            self.growth_tracker = 0;
            tracing::debug!(scale = self.scale, "Non-finite gradients, backing off loss scale");
        } else {
            self.growth_tracker += 1;
            if self.growth_tracker >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.growth_tracker = 0;
            }
        }
    }
}

impl Checkpointable for GradScaler {
    fn save_state(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        *self = bincode::deserialize(data)?;
        Ok(())
    }
}
