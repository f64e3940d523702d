//! Model containers.
//!
//! - `ParamStore` holds named parameters and persistent buffers
//! - `SwinConfig` builds a Swin-style layout with computed attention buffers

mod param_store;
mod swin;

pub use param_store::ParamStore;
pub use swin::{attention_mask, relative_position_index, SwinConfig};
