//! Checkpointing system for resumable training and fine-tuning.
//!
//! Provides:
//! - `Checkpointable` trait for components that can be saved/restored
//! - `CheckpointRecord`, the on-disk training checkpoint
//! - `CheckpointManager` for saving, resuming and loading pretrained weights
//! - `adapt_pretrained` for reconciling a pretrained state with a new architecture

mod class_map;
mod config;
mod format;
mod manager;
mod pretrained;
mod stage;
mod state;

pub use class_map::{ClassMap, IMAGENET_1K_CLASSES, IMAGENET_22K_CLASSES};
pub use self::config::{CheckpointConfig, BEST_CHECKPOINT, DEFAULT_CLASS_MAP};
pub use format::{is_safetensors, read_model_state, read_safetensors, write_safetensors};
pub use manager::CheckpointManager;
pub use pretrained::{adapt_pretrained, AdaptReport, HeadAction};
pub use stage::{Stage, StageKind};
pub use state::{CheckpointRecord, Checkpointable};
