//! Training state that travels with checkpoints.
//!
//! Each type here implements `Checkpointable`, so the optimizer, learning
//! rate schedule and loss scaler of a stage can be restored exactly.

mod optimizer;
mod scaler;
mod scheduler;

pub use optimizer::{AdamW, AdamWConfig, Optimizer};
pub use scaler::GradScaler;
pub use scheduler::{CosineScheduler, LrScheduler};
