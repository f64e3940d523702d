//! Optimizer interface and AdamW.

use crate::checkpoint::Checkpointable;
use crate::tensor::{StateDict, Tensor};
use crate::{CheckpointError, Result};
use serde::{Deserialize, Serialize};

/// Trait for back-end agnostic optimizers.
pub trait Optimizer {
    /// Apply one update to `params` using `grads`.
    ///
    /// Parameters without a gradient are left untouched.
    fn step(&mut self, params: &mut StateDict, grads: &StateDict) -> Result<()>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);
}

/// AdamW hyper-parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AdamWConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdamWConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.05,
        }
    }
}

/// Adam with decoupled weight decay.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AdamW {
    config: AdamWConfig,
    step: u64,
    exp_avg: StateDict,
    exp_avg_sq: StateDict,
}

impl AdamW {
    pub fn new(config: AdamWConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &AdamWConfig {
        &self.config
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> u64 {
        self.step
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut StateDict, grads: &StateDict) -> Result<()> {
        for (name, grad) in grads.iter() {
            if let Some(param) = params.get(name) {
                if param.shape() != grad.shape() {
                    return Err(CheckpointError::ShapeMismatch {
                        name: name.clone(),
                        expected: param.shape().to_vec(),
                        actual: grad.shape().to_vec(),
                    });
                }
            }
        }

        self.step += 1;
        let AdamWConfig {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        } = self.config;
        let bias1 = 1.0 - beta1.powi(self.step as i32);
        let bias2 = 1.0 - beta2.powi(self.step as i32);

        for (name, grad) in grads.iter() {
            let Some(param) = params.get_mut(name) else {
                continue;
            };

            if !self.exp_avg.contains_key(name) {
                self.exp_avg.insert(name.clone(), Tensor::zeros(param.raw_dim()));
                self.exp_avg_sq.insert(name.clone(), Tensor::zeros(param.raw_dim()));
            }
            let (Some(m), Some(v)) = (self.exp_avg.get_mut(name), self.exp_avg_sq.get_mut(name))
            else {
                continue;
            };

            param.mapv_inplace(|p| p * (1.0 - (lr * weight_decay) as f32));
            m.zip_mut_with(grad, |m, &g| *m = beta1 as f32 * *m + (1.0 - beta1) as f32 * g);
            v.zip_mut_with(grad, |v, &g| *v = beta2 as f32 * *v + (1.0 - beta2) as f32 * g * g);

            let step_size = (lr / bias1) as f32;
            let denom_scale = bias2.sqrt() as f32;
            ndarray::Zip::from(param)
                .and(&*m)
                .and(&*v)
                .for_each(|p, &m, &v| {
                    *p -= step_size * m / (v.sqrt() / denom_scale + eps as f32);
                });
        }

        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.config.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.lr = lr;
    }
}

impl Checkpointable for AdamW {
    fn save_state(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        *self = bincode::deserialize(data)?;
        Ok(())
    }
}
