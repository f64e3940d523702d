//! Bicubic resampling of positional tables.
//!
//! Matches `torch.nn.functional.interpolate(mode="bicubic", align_corners=False)`:
//! half-pixel source coordinates, the cubic convolution kernel with
//! `A = -0.75`, and neighbour indices clamped at the border.

use super::Tensor;
use crate::{CheckpointError, Result};
use ndarray::Array4;

const CUBIC_A: f32 = -0.75;

/// Side length of a square grid holding `len` positions, if `len` is a perfect square.
pub fn square_side(len: usize) -> Option<usize> {
    let side = (len as f64).sqrt() as usize;
    [side.saturating_sub(1), side, side + 1]
        .into_iter()
        .find(|s| s * s == len)
}

fn grid_side(len: usize) -> Result<usize> {
    square_side(len)
        .filter(|&side| side > 0)
        .ok_or(CheckpointError::InvalidGrid(len))
}

fn cubic_weights(t: f32) -> [f32; 4] {
    let a = CUBIC_A;
    // |x| <= 1
    let near = |x: f32| ((a + 2.0) * x - (a + 3.0)) * x * x + 1.0;
    // 1 < |x| < 2
    let far = |x: f32| ((a * x - 5.0 * a) * x + 8.0 * a) * x - 4.0 * a;
    [far(t + 1.0), near(t), near(1.0 - t), far(2.0 - t)]
}

/// Source indices and weights contributing to one output coordinate.
#[derive(Clone, Copy, Debug)]
struct Taps {
    index: [usize; 4],
    weight: [f32; 4],
}

fn taps(in_size: usize, out_size: usize) -> Vec<Taps> {
    let scale = in_size as f32 / out_size as f32;
    let last = in_size as isize - 1;

    (0..out_size)
        .map(|dst| {
            let src = scale * (dst as f32 + 0.5) - 0.5;
            let floor = src.floor();
            let base = floor as isize;
            let mut index = [0usize; 4];
            for (k, slot) in index.iter_mut().enumerate() {
                *slot = (base - 1 + k as isize).clamp(0, last) as usize;
            }
            Taps {
                index,
                weight: cubic_weights(src - floor),
            }
        })
        .collect()
}

/// Resize the two trailing (spatial) axes of an `(N, C, H, W)` array.
pub fn interpolate_bicubic(input: &Array4<f32>, size: (usize, usize)) -> Array4<f32> {
    let (n, c, in_h, in_w) = input.dim();
    let (out_h, out_w) = size;

    if (in_h, in_w) == size {
        return input.clone();
    }
    if in_h == 0 || in_w == 0 {
        return Array4::zeros((n, c, out_h, out_w));
    }

    let rows = taps(in_h, out_h);
    let cols = taps(in_w, out_w);

    Array4::from_shape_fn((n, c, out_h, out_w), |(b, ch, y, x)| {
        let ty = rows[y];
        let tx = cols[x];
        let mut acc = 0.0f32;
        for (&iy, &wy) in ty.index.iter().zip(ty.weight.iter()) {
            let mut row = 0.0f32;
            for (&ix, &wx) in tx.index.iter().zip(tx.weight.iter()) {
                row += wx * input[[b, ch, iy, ix]];
            }
            acc += wy * row;
        }
        acc
    })
}

/// Resize a `(L, nH)` relative position bias table to `(target_len, nH)`.
///
/// Each head's column is treated as a square `sqrt(L) x sqrt(L)` grid.
pub fn resize_bias_table(table: &Tensor, target_len: usize) -> Result<Tensor> {
    let shape = table.shape();
    if shape.len() != 2 {
        return Err(CheckpointError::ShapeMismatch {
            name: "relative_position_bias_table".into(),
            expected: vec![target_len, 0],
            actual: shape.to_vec(),
        });
    }
    let (len, heads) = (shape[0], shape[1]);
    let src = grid_side(len)?;
    let dst = grid_side(target_len)?;

    let grid = table
        .t()
        .as_standard_layout()
        .into_owned()
        .into_shape((1, heads, src, src))?;
    let resized = interpolate_bicubic(&grid, (dst, dst)).into_shape((heads, target_len))?;

    Ok(resized.reversed_axes().as_standard_layout().into_owned().into_dyn())
}

/// Resize an `(N, L, C)` absolute position embedding to `(N, target_len, C)`.
pub fn resize_abs_pos_embed(embed: &Tensor, target_len: usize) -> Result<Tensor> {
    let shape = embed.shape();
    if shape.len() != 3 {
        return Err(CheckpointError::ShapeMismatch {
            name: "absolute_pos_embed".into(),
            expected: vec![1, target_len, 0],
            actual: shape.to_vec(),
        });
    }
    let (n, len, channels) = (shape[0], shape[1], shape[2]);
    let src = grid_side(len)?;
    let dst = grid_side(target_len)?;

    let grid = embed
        .as_standard_layout()
        .into_owned()
        .into_shape((n, src, src, channels))?
        .permuted_axes([0, 3, 1, 2])
        .as_standard_layout()
        .into_owned();

    let resized = interpolate_bicubic(&grid, (dst, dst))
        .permuted_axes([0, 2, 3, 1])
        .as_standard_layout()
        .into_owned()
        .into_shape((n, target_len, channels))?;

    Ok(resized.into_dyn())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-5,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_square_side() {
        assert_eq!(square_side(49), Some(7));
        assert_eq!(square_side(196), Some(14));
        assert_eq!(square_side(169), Some(13));
        assert_eq!(square_side(1), Some(1));
        assert_eq!(square_side(0), Some(0));
        assert_eq!(square_side(50), None);
    }

    #[test]
    fn test_kernel_is_partition_of_unity() {
        for t in [0.0f32, 0.25, 0.5, 0.75, 0.9] {
            let sum: f32 = cubic_weights(t).iter().sum();
            assert_close(sum, 1.0);
        }
    }

    #[test]
    fn test_same_size_is_identity() {
        let input = Array4::from_shape_fn((1, 2, 3, 3), |(_, c, y, x)| (c * 9 + y * 3 + x) as f32);
        let output = interpolate_bicubic(&input, (3, 3));
        assert_eq!(input, output);
    }

    #[test]
    fn test_empty_spatial_axis_yields_zeros() {
        let input = Array4::<f32>::zeros((1, 1, 0, 3));
        let output = interpolate_bicubic(&input, (2, 2));
        assert_eq!(output, Array4::<f32>::zeros((1, 1, 2, 2)));
    }

    #[test]
    fn test_downsample_matches_reference_values() {
        // Each row is [0, 1, 2, 3]; bicubic 4 -> 2 with border clamping.
        let input = Array4::from_shape_fn((1, 1, 4, 4), |(_, _, _, x)| x as f32);
        let output = interpolate_bicubic(&input, (2, 2));

        assert_eq!(output.dim(), (1, 1, 2, 2));
        for y in 0..2 {
            assert_close(output[[0, 0, y, 0]], 0.40625);
            assert_close(output[[0, 0, y, 1]], 2.59375);
        }
    }

    #[test]
    fn test_constant_grid_stays_constant() {
        let input = Array4::from_elem((1, 1, 7, 7), 3.5f32);
        let output = interpolate_bicubic(&input, (12, 12));
        assert!(output.iter().all(|&v| (v - 3.5).abs() < 1e-5));
    }

    #[test]
    fn test_resize_bias_table_keeps_heads_apart() {
        // (196, 3) table where head h holds the constant h.
        let table = Array2::from_shape_fn((196, 3), |(_, h)| h as f32).into_dyn();
        let resized = resize_bias_table(&table, 49).unwrap();

        assert_eq!(resized.shape(), &[49, 3]);
        for ((_, h), &v) in resized
            .into_dimensionality::<ndarray::Ix2>()
            .unwrap()
            .indexed_iter()
        {
            assert_close(v, h as f32);
        }
    }

    #[test]
    fn test_resize_bias_table_rejects_non_square() {
        let table = Array2::<f32>::zeros((50, 2)).into_dyn();
        let err = resize_bias_table(&table, 49).unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidGrid(50)));
    }

    #[test]
    fn test_resize_abs_pos_embed_preserves_channels() {
        let embed = Array3::from_shape_fn((1, 16, 5), |(_, _, c)| c as f32 * 0.5).into_dyn();
        let resized = resize_abs_pos_embed(&embed, 64).unwrap();

        assert_eq!(resized.shape(), &[1, 64, 5]);
        for ((_, _, c), &v) in resized
            .into_dimensionality::<ndarray::Ix3>()
            .unwrap()
            .indexed_iter()
        {
            assert_close(v, c as f32 * 0.5);
        }
    }

    #[test]
    fn test_resize_abs_pos_embed_follows_spatial_layout() {
        // Position p = y * 4 + x holds x in channel 0 and y in channel 1.
        let embed = Array3::from_shape_fn((1, 16, 2), |(_, p, c)| {
            if c == 0 {
                (p % 4) as f32
            } else {
                (p / 4) as f32
            }
        })
        .into_dyn();
        let resized = resize_abs_pos_embed(&embed, 4).unwrap();

        assert_eq!(resized.shape(), &[1, 4, 2]);
        // Output (y=0, x=1) sits at position 1.
        assert_close(resized[[0, 1, 0]], 2.59375);
        assert_close(resized[[0, 1, 1]], 0.40625);
    }
}
