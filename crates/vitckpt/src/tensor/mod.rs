//! Tensor primitives.
//!
//! Provides:
//! - `Tensor`, the `f32` n-dimensional array used for every weight and buffer
//! - `StateDict` for named tensor collections
//! - `Module` trait with strict / non-strict state loading
//! - Bicubic resampling for positional tables

mod interpolate;
mod module;
mod state_dict;

pub use interpolate::{
    interpolate_bicubic, resize_abs_pos_embed, resize_bias_table, square_side,
};
pub use module::{LoadReport, Module};
pub use state_dict::StateDict;

/// Dense `f32` tensor with dynamic rank.
pub type Tensor = ndarray::ArrayD<f32>;
