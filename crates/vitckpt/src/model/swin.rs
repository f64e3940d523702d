//! Swin transformer parameter layout.
//!
//! Builds a `ParamStore` whose names and shapes follow the reference Swin
//! implementation, so pretrained state dicts line up key for key. Derived
//! buffers (relative position index, shifted-window attention mask) are
//! computed here rather than loaded.

use super::ParamStore;
use crate::tensor::Tensor;
use crate::{CheckpointError, Result};
use ndarray::{Array2, Array3, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Fill value for attention logits between tokens of different shifted regions.
const MASK_FILL: f32 = -100.0;

/// Std of the truncated normal used for weight init.
const INIT_STD: f32 = 0.02;

/// Architecture description of a Swin model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwinConfig {
    /// Input image side length in pixels
    pub img_size: usize,
    /// Patch side length in pixels
    pub patch_size: usize,
    /// Input channels
    pub in_chans: usize,
    /// Classifier outputs (0 = no head)
    pub num_classes: usize,
    /// Channel width of the first stage
    pub embed_dim: usize,
    /// Blocks per stage
    pub depths: Vec<usize>,
    /// Attention heads per stage
    pub num_heads: Vec<usize>,
    /// Attention window side length
    pub window_size: usize,
    /// MLP hidden width relative to the stage width
    pub mlp_ratio: f64,
    /// Learn an absolute position embedding
    pub ape: bool,
    /// Seed for parameter init
    pub seed: u64,
}

impl Default for SwinConfig {
    fn default() -> Self {
        // Swin-T, 224px, ImageNet-1K
        Self {
            img_size: 224,
            patch_size: 4,
            in_chans: 3,
            num_classes: 1000,
            embed_dim: 96,
            depths: vec![2, 2, 6, 2],
            num_heads: vec![3, 6, 12, 24],
            window_size: 7,
            mlp_ratio: 4.0,
            ape: false,
            seed: 0,
        }
    }
}

impl SwinConfig {
    pub fn with_img_size(mut self, img_size: usize) -> Self {
        self.img_size = img_size;
        self
    }

    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    pub fn with_embed_dim(mut self, embed_dim: usize) -> Self {
        self.embed_dim = embed_dim;
        self
    }

    pub fn with_stages(mut self, depths: Vec<usize>, num_heads: Vec<usize>) -> Self {
        self.depths = depths;
        self.num_heads = num_heads;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_ape(mut self, ape: bool) -> Self {
        self.ape = ape;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Patch grid side length at the first stage.
    pub fn patches_resolution(&self) -> usize {
        self.img_size / self.patch_size.max(1)
    }

    /// Channel width after the last stage.
    pub fn num_features(&self) -> usize {
        self.embed_dim << self.depths.len().saturating_sub(1)
    }

    /// Window side length and shift used by a stage at `resolution`.
    ///
    /// A stage no larger than the window attends globally without shifting.
    pub fn stage_window(&self, resolution: usize) -> (usize, usize) {
        if resolution <= self.window_size {
            (resolution, 0)
        } else {
            (self.window_size, self.window_size / 2)
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(CheckpointError::Config(msg));

        if self.patch_size == 0 || self.img_size % self.patch_size != 0 {
            return fail(format!(
                "img_size {} is not a multiple of patch_size {}",
                self.img_size, self.patch_size
            ));
        }
        if self.depths.is_empty() || self.depths.len() != self.num_heads.len() {
            return fail(format!(
                "depths ({}) and num_heads ({}) must be non-empty and equal length",
                self.depths.len(),
                self.num_heads.len()
            ));
        }
        if self.embed_dim == 0 || self.window_size == 0 {
            return fail("embed_dim and window_size must be positive".into());
        }

        let stages = self.depths.len();
        for (i, &heads) in self.num_heads.iter().enumerate() {
            let resolution = self.patches_resolution() >> i;
            let dim = self.embed_dim << i;
            if resolution == 0 {
                return fail(format!("stage {} has an empty patch grid", i));
            }
            if i + 1 < stages && resolution % 2 != 0 {
                return fail(format!(
                    "stage {} resolution {} cannot be patch-merged",
                    i, resolution
                ));
            }
            if heads == 0 || dim % heads != 0 {
                return fail(format!("stage {} width {} not divisible by {} heads", i, dim, heads));
            }
            let (window, _) = self.stage_window(resolution);
            if resolution % window != 0 {
                return fail(format!(
                    "stage {} resolution {} not divisible by window {}",
                    i, resolution, window
                ));
            }
        }
        Ok(())
    }

    /// Build a freshly initialised parameter store.
    pub fn build(&self) -> Result<ParamStore> {
        self.validate()?;

        let mut init = Init::new(self.seed)?;
        let mut store = ParamStore::new();
        let c = self.embed_dim;
        let p = self.patch_size;

        store.add_parameter(
            "patch_embed.proj.weight",
            init.normal(&[c, self.in_chans, p, p]),
        );
        store.add_parameter("patch_embed.proj.bias", zeros(&[c]));
        add_layer_norm(&mut store, "patch_embed.norm", c);

        if self.ape {
            let num_patches = self.patches_resolution().pow(2);
            store.add_parameter("absolute_pos_embed", init.normal(&[1, num_patches, c]));
        }

        let stages = self.depths.len();
        for (i, (&depth, &heads)) in self.depths.iter().zip(&self.num_heads).enumerate() {
            let dim = c << i;
            let resolution = self.patches_resolution() >> i;
            let (window, shift) = self.stage_window(resolution);
            let hidden = (dim as f64 * self.mlp_ratio) as usize;

            for j in 0..depth {
                let prefix = format!("layers.{}.blocks.{}", i, j);
                add_layer_norm(&mut store, &format!("{}.norm1", prefix), dim);

                store.add_parameter(
                    format!("{}.attn.relative_position_bias_table", prefix),
                    init.normal(&[(2 * window - 1).pow(2), heads]),
                );
                store.add_buffer(
                    format!("{}.attn.relative_position_index", prefix),
                    relative_position_index(window),
                );
                add_linear(&mut store, &mut init, &format!("{}.attn.qkv", prefix), dim, 3 * dim, true);
                add_linear(&mut store, &mut init, &format!("{}.attn.proj", prefix), dim, dim, true);

                add_layer_norm(&mut store, &format!("{}.norm2", prefix), dim);
                add_linear(&mut store, &mut init, &format!("{}.mlp.fc1", prefix), dim, hidden, true);
                add_linear(&mut store, &mut init, &format!("{}.mlp.fc2", prefix), hidden, dim, true);

                if j % 2 == 1 && shift > 0 {
                    store.add_buffer(
                        format!("{}.attn_mask", prefix),
                        attention_mask(resolution, window, shift),
                    );
                }
            }

            if i + 1 < stages {
                let prefix = format!("layers.{}.downsample", i);
                add_linear(&mut store, &mut init, &format!("{}.reduction", prefix), 4 * dim, 2 * dim, false);
                add_layer_norm(&mut store, &format!("{}.norm", prefix), 4 * dim);
            }
        }

        let features = self.num_features();
        add_layer_norm(&mut store, "norm", features);
        if self.num_classes > 0 {
            add_linear(&mut store, &mut init, "head", features, self.num_classes, true);
        }

        tracing::debug!(
            tensors = store.len(),
            parameters = store.num_parameters(),
            "Built Swin layout"
        );
        Ok(store)
    }
}

/// Seeded weight initialiser.
struct Init {
    rng: StdRng,
    dist: Normal<f32>,
}

impl Init {
    fn new(seed: u64) -> Result<Self> {
        let dist = Normal::new(0.0, INIT_STD)
            .map_err(|e| CheckpointError::Config(format!("invalid init distribution: {}", e)))?;
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            dist,
        })
    }

    /// Normal(0, std) resampled to within two standard deviations.
    fn normal(&mut self, shape: &[usize]) -> Tensor {
        let bound = 2.0 * INIT_STD;
        ArrayD::from_shape_simple_fn(IxDyn(shape), || loop {
            let v = self.dist.sample(&mut self.rng);
            if v.abs() <= bound {
                break v;
            }
        })
    }
}

fn zeros(shape: &[usize]) -> Tensor {
    ArrayD::zeros(IxDyn(shape))
}

fn add_layer_norm(store: &mut ParamStore, prefix: &str, dim: usize) {
    store.add_parameter(format!("{}.weight", prefix), ArrayD::ones(IxDyn(&[dim])));
    store.add_parameter(format!("{}.bias", prefix), zeros(&[dim]));
}

fn add_linear(
    store: &mut ParamStore,
    init: &mut Init,
    prefix: &str,
    in_features: usize,
    out_features: usize,
    bias: bool,
) {
    store.add_parameter(
        format!("{}.weight", prefix),
        init.normal(&[out_features, in_features]),
    );
    if bias {
        store.add_parameter(format!("{}.bias", prefix), zeros(&[out_features]));
    }
}

/// Pairwise relative position index for a `window x window` attention window.
///
/// Entry `(i, j)` indexes the `(2W-1)^2` bias table with the offset between
/// tokens `i` and `j`.
pub fn relative_position_index(window: usize) -> Tensor {
    let tokens = window * window;
    let span = 2 * window - 1;
    Array2::from_shape_fn((tokens, tokens), |(i, j)| {
        let (hi, wi) = (i / window, i % window);
        let (hj, wj) = (j / window, j % window);
        let dh = hi + window - 1 - hj;
        let dw = wi + window - 1 - wj;
        (dh * span + dw) as f32
    })
    .into_dyn()
}

/// Attention mask for shifted windows: `(num_windows, W*W, W*W)`.
///
/// Tokens from different regions of the cyclically shifted feature map get
/// a large negative bias so they do not attend to each other.
pub fn attention_mask(resolution: usize, window: usize, shift: usize) -> Tensor {
    let region = |coord: usize| -> usize {
        if coord < resolution - window {
            0
        } else if coord < resolution - shift {
            1
        } else {
            2
        }
    };

    let per_side = resolution / window;
    let tokens = window * window;

    // Region id of every token, window by window.
    let ids = Array2::from_shape_fn((per_side * per_side, tokens), |(n, t)| {
        let (wy, wx) = (n / per_side, n % per_side);
        let (py, px) = (t / window, t % window);
        region(wy * window + py) * 3 + region(wx * window + px)
    });

    Array3::from_shape_fn((per_side * per_side, tokens, tokens), |(n, a, b)| {
        if ids[[n, a]] == ids[[n, b]] {
            0.0
        } else {
            MASK_FILL
        }
    })
    .into_dyn()
}
