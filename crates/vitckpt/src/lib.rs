//! # vitckpt
//!
//! Checkpoint persistence and pretrained-weight adaptation for vision
//! transformer training.
//!
//! ## Overview
//!
//! vitckpt provides:
//! - An `ndarray`-backed [`StateDict`](tensor::StateDict) and a [`Module`](tensor::Module)
//!   trait with strict / non-strict loading
//! - Training checkpoints holding model weights plus two optimizer / scheduler /
//!   gradient-scaler stages (`cls` and `spl`)
//! - Pretrained-weight adaptation: bicubic resizing of relative position bias
//!   tables and absolute position embeddings, ImageNet-22K to 1K head remapping,
//!   and classifier re-initialisation
//! - A Swin-style parameter layout builder for producing compatible models
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vitckpt::prelude::*;
//!
//! let config = CheckpointConfig::new("./output").with_pretrained("./weights", "swin_base_22k.pth");
//! let manager = CheckpointManager::new(config);
//!
//! let mut model = SwinConfig::default().build()?;
//! manager.load_pretrained(&mut model)?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod model;
pub mod tensor;
pub mod training;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{
        adapt_pretrained, AdaptReport, CheckpointConfig, CheckpointManager, CheckpointRecord,
        Checkpointable, ClassMap, HeadAction, Stage, StageKind,
    };
    pub use crate::config::ExperimentConfig;
    pub use crate::model::{ParamStore, SwinConfig};
    pub use crate::tensor::{LoadReport, Module, StateDict, Tensor};
    pub use crate::training::{AdamW, CosineScheduler, GradScaler, LrScheduler, Optimizer};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("SafeTensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing checkpoint entry: {0}")]
    MissingKey(String),

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Incompatible keys: missing_keys={missing:?}, unexpected_keys={unexpected:?}")]
    IncompatibleKeys {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Cannot arrange {0} positions as a square grid")]
    InvalidGrid(usize),

    #[error("Invalid class map: {0}")]
    InvalidClassMap(String),

    #[error("Unsupported dtype for {name}: {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl From<::config::ConfigError> for CheckpointError {
    fn from(err: ::config::ConfigError) -> Self {
        CheckpointError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CheckpointError>;
