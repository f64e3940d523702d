//! Pretrained-weight adaptation.
//!
//! Reconciles a pretrained state dict with a model whose resolution, window
//! size or class count differs:
//! - derived buffers are dropped so the model keeps its own
//! - relative position bias tables and absolute position embeddings are
//!   bicubically resized to the model's grid
//! - a 22K classifier head is narrowed to 1K classes, and any other head
//!   mismatch re-initialises the model's head to zero

use super::class_map::{ClassMap, IMAGENET_1K_CLASSES, IMAGENET_22K_CLASSES};
use crate::tensor::{resize_abs_pos_embed, resize_bias_table, square_side, LoadReport, Module, StateDict};
use crate::{CheckpointError, Result};
use std::path::Path;

/// Buffers recomputed by the model from its own geometry.
pub const DERIVED_BUFFERS: [&str; 3] = ["relative_position_index", "relative_coords_table", "attn_mask"];

const BIAS_TABLE: &str = "relative_position_bias_table";
const ABS_POS_EMBED: &str = "absolute_pos_embed";
const HEAD_WEIGHT: &str = "head.weight";
const HEAD_BIAS: &str = "head.bias";

/// What happened to the classifier head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadAction {
    /// Class counts matched; loaded as is
    Kept,
    /// 22K head narrowed to 1K classes through the class map
    Remapped,
    /// Class counts differed; model head zeroed and pretrained head discarded
    Reinitialized,
}

/// Decisions taken while adapting a pretrained state.
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptReport {
    /// Derived buffers removed from the pretrained state
    pub removed_buffers: Vec<String>,
    /// Keys resized to the model's grid
    pub resized: Vec<String>,
    /// Keys dropped so the model keeps its own value
    pub skipped: Vec<String>,
    pub head: HeadAction,
    /// Report of the final non-strict load
    pub load: LoadReport,
}

/// Adapt `state` to `model` and load it non-strictly.
///
/// `class_map_path` is only read when a 21841-class head meets a
/// 1000-class model.
pub fn adapt_pretrained(
    state: &mut StateDict,
    model: &mut dyn Module,
    class_map_path: &Path,
) -> Result<AdaptReport> {
    let mut removed_buffers = Vec::new();
    for pattern in DERIVED_BUFFERS {
        removed_buffers.extend(state.remove_containing(pattern));
    }
    tracing::debug!(count = removed_buffers.len(), "Removed derived buffers");

    let mut resized = Vec::new();
    let mut skipped = Vec::new();

    for key in state.keys_containing(BIAS_TABLE) {
        match adapt_bias_table(state, &*model, &key)? {
            Outcome::Unchanged => {}
            Outcome::Resized => resized.push(key),
            Outcome::Skipped => skipped.push(key),
        }
    }

    for key in state.keys_containing(ABS_POS_EMBED) {
        match adapt_abs_pos_embed(state, &*model, &key)? {
            Outcome::Unchanged => {}
            Outcome::Resized => resized.push(key),
            Outcome::Skipped => skipped.push(key),
        }
    }

    let head = adapt_head(state, &*model, class_map_path)?;

    let load = model.load_state_dict(state, false)?;
    if !load.is_clean() {
        tracing::warn!("{}", load);
    }

    // Head is zeroed only once the load has succeeded.
    if head == HeadAction::Reinitialized {
        for key in [HEAD_WEIGHT, HEAD_BIAS] {
            if let Some(tensor) = model.tensor_mut(key) {
                tensor.fill(0.0);
            }
        }
    }

    Ok(AdaptReport {
        removed_buffers,
        resized,
        skipped,
        head,
        load,
    })
}

enum Outcome {
    Unchanged,
    Resized,
    Skipped,
}

fn skip(state: &mut StateDict, key: &str) -> Outcome {
    tracing::warn!("Error in loading {}, passing", key);
    state.remove(key);
    Outcome::Skipped
}

/// A non-empty square token count.
fn has_grid(len: usize) -> bool {
    square_side(len).map_or(false, |side| side > 0)
}

fn adapt_bias_table(state: &mut StateDict, model: &dyn Module, key: &str) -> Result<Outcome> {
    let (Some(pretrained), Some(current)) = (state.get(key), model.tensor(key)) else {
        return Ok(Outcome::Unchanged);
    };
    let (&[l1, h1], &[l2, h2]) = (pretrained.shape(), current.shape()) else {
        return Ok(skip(state, key));
    };

    if h1 != h2 {
        return Ok(skip(state, key));
    }
    if l1 == l2 {
        return Ok(Outcome::Unchanged);
    }
    if !has_grid(l1) || !has_grid(l2) {
        return Ok(skip(state, key));
    }

    let table = resize_bias_table(pretrained, l2)?;
    tracing::debug!(key, from = l1, to = l2, "Resized relative position bias table");
    state.insert(key, table);
    Ok(Outcome::Resized)
}

fn adapt_abs_pos_embed(state: &mut StateDict, model: &dyn Module, key: &str) -> Result<Outcome> {
    let (Some(pretrained), Some(current)) = (state.get(key), model.tensor(key)) else {
        return Ok(Outcome::Unchanged);
    };
    let (&[n1, l1, c1], &[n2, l2, c2]) = (pretrained.shape(), current.shape()) else {
        return Ok(skip(state, key));
    };

    if n1 != n2 || c1 != c2 {
        return Ok(skip(state, key));
    }
    if l1 == l2 {
        return Ok(Outcome::Unchanged);
    }
    if !has_grid(l1) || !has_grid(l2) {
        return Ok(skip(state, key));
    }

    let embed = resize_abs_pos_embed(pretrained, l2)?;
    tracing::debug!(key, from = l1, to = l2, "Resized absolute position embedding");
    state.insert(key, embed);
    Ok(Outcome::Resized)
}

fn head_classes(tensor: Option<&crate::tensor::Tensor>, source: &str) -> Result<usize> {
    tensor
        .and_then(|t| t.shape().first().copied())
        .ok_or_else(|| CheckpointError::MissingKey(format!("{} ({})", HEAD_BIAS, source)))
}

fn adapt_head(state: &mut StateDict, model: &dyn Module, class_map_path: &Path) -> Result<HeadAction> {
    let pretrained_classes = head_classes(state.get(HEAD_BIAS), "pretrained")?;
    let model_classes = head_classes(model.tensor(HEAD_BIAS), "model")?;

    if pretrained_classes == model_classes {
        return Ok(HeadAction::Kept);
    }

    if pretrained_classes == IMAGENET_22K_CLASSES && model_classes == IMAGENET_1K_CLASSES {
        tracing::info!("Loading ImageNet-22K weight to ImageNet-1K");
        let map = ClassMap::load(class_map_path)?;
        for key in [HEAD_WEIGHT, HEAD_BIAS] {
            let head = state
                .get(key)
                .ok_or_else(|| CheckpointError::MissingKey(key.to_string()))?;
            let narrowed = map.select_rows(head)?;
            state.insert(key, narrowed);
        }
        return Ok(HeadAction::Remapped);
    }

    for key in [HEAD_WEIGHT, HEAD_BIAS] {
        state.remove(key);
    }
    tracing::warn!(
        pretrained = pretrained_classes,
        model = model_classes,
        "Error in loading classifier head, re-init classifier head to 0"
    );
    Ok(HeadAction::Reinitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParamStore;
    use ndarray::{ArrayD, IxDyn};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    const TABLE: &str = "layers.0.blocks.0.attn.relative_position_bias_table";

    fn model(table_len: usize, heads: usize, classes: usize) -> ParamStore {
        let mut store = ParamStore::new();
        store.add_parameter(TABLE, ArrayD::from_elem(IxDyn(&[table_len, heads]), -1.0));
        store.add_buffer(
            "layers.0.blocks.0.attn.relative_position_index",
            ArrayD::zeros(IxDyn(&[4, 4])),
        );
        store.add_parameter(HEAD_WEIGHT, ArrayD::from_elem(IxDyn(&[classes, 4]), 3.0));
        store.add_parameter(HEAD_BIAS, ArrayD::from_elem(IxDyn(&[classes]), 3.0));
        store
    }

    fn pretrained(table_len: usize, heads: usize, classes: usize) -> StateDict {
        let mut state = StateDict::new();
        state.insert(
            TABLE,
            ArrayD::from_shape_fn(IxDyn(&[table_len, heads]), |ix| ix[1] as f32),
        );
        state.insert(
            "layers.0.blocks.0.attn.relative_position_index",
            ArrayD::from_elem(IxDyn(&[9, 9]), 7.0),
        );
        state.insert("layers.0.blocks.1.attn_mask", ArrayD::zeros(IxDyn(&[1, 9, 9])));
        state.insert(
            HEAD_WEIGHT,
            ArrayD::from_shape_fn(IxDyn(&[classes, 4]), |ix| ix[0] as f32),
        );
        state.insert(
            HEAD_BIAS,
            ArrayD::from_shape_fn(IxDyn(&[classes]), |ix| ix[0] as f32),
        );
        state
    }

    /// Collects the messages of WARN events.
    #[derive(Clone, Default)]
    struct WarnCapture(Arc<Mutex<Vec<String>>>);

    struct MessageVisitor<'a>(&'a mut String);

    impl Visit for MessageVisitor<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                *self.0 = format!("{:?}", value);
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for WarnCapture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                let mut message = String::new();
                event.record(&mut MessageVisitor(&mut message));
                self.0.lock().unwrap().push(message);
            }
        }
    }

    fn warnings_during<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        let capture = WarnCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let value = tracing::subscriber::with_default(subscriber, f);
        let messages = capture.0.lock().unwrap().clone();
        (value, messages)
    }

    #[test]
    fn test_derived_buffers_removed() {
        let mut model = model(9, 2, 5);
        let mut state = pretrained(9, 2, 5);

        let report = adapt_pretrained(&mut state, &mut model, Path::new("unused")).unwrap();

        assert_eq!(report.removed_buffers.len(), 2);
        assert_eq!(report.head, HeadAction::Kept);
        assert!(report.load.unexpected_keys.is_empty());
        assert_eq!(
            report.load.missing_keys,
            vec!["layers.0.blocks.0.attn.relative_position_index".to_string()]
        );
        let index = model
            .tensor("layers.0.blocks.0.attn.relative_position_index")
            .unwrap();
        assert_eq!(index.shape(), &[4, 4]);
    }

    #[test]
    fn test_bias_table_resized() {
        let mut model = model(49, 3, 5);
        let mut state = pretrained(196, 3, 5);

        let report = adapt_pretrained(&mut state, &mut model, Path::new("unused")).unwrap();

        assert_eq!(report.resized, vec![TABLE.to_string()]);
        let table = model.tensor(TABLE).unwrap();
        assert_eq!(table.shape(), &[49, 3]);
        // Each head column is constant, so resizing preserves it.
        for row in 0..49 {
            for head in 0..3 {
                assert!((table[[row, head]] - head as f32).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_head_count_mismatch_keeps_model_table() {
        let mut model = model(49, 3, 5);
        let mut state = pretrained(49, 4, 5);

        let report = adapt_pretrained(&mut state, &mut model, Path::new("unused")).unwrap();

        assert_eq!(report.skipped, vec![TABLE.to_string()]);
        assert!(model.tensor(TABLE).unwrap().iter().all(|&v| v == -1.0));
        assert!(report.load.missing_keys.contains(&TABLE.to_string()));
    }

    #[test]
    fn test_head_count_mismatch_warns_with_key() {
        let mut model = model(49, 3, 5);
        let mut state = pretrained(49, 4, 5);

        let (report, warnings) =
            warnings_during(|| adapt_pretrained(&mut state, &mut model, Path::new("unused")));

        assert_eq!(report.unwrap().skipped, vec![TABLE.to_string()]);
        assert!(
            warnings.contains(&format!("Error in loading {}, passing", TABLE)),
            "warnings: {:?}",
            warnings
        );
    }

    #[test]
    fn test_empty_model_table_skipped() {
        let mut model = model(0, 2, 5);
        let mut state = pretrained(49, 2, 5);

        let report = adapt_pretrained(&mut state, &mut model, Path::new("unused")).unwrap();

        assert_eq!(report.skipped, vec![TABLE.to_string()]);
        assert!(report.resized.is_empty());
        assert_eq!(model.tensor(TABLE).unwrap().shape(), &[0, 2]);
    }

    #[test]
    fn test_non_square_table_skipped() {
        let mut model = model(49, 2, 5);
        let mut state = pretrained(50, 2, 5);

        let report = adapt_pretrained(&mut state, &mut model, Path::new("unused")).unwrap();
        assert_eq!(report.skipped, vec![TABLE.to_string()]);
        assert!(model.tensor(TABLE).unwrap().iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_abs_pos_embed_resized() {
        let mut model = model(9, 2, 5);
        model.add_parameter(ABS_POS_EMBED, ArrayD::zeros(IxDyn(&[1, 49, 6])));
        let mut state = pretrained(9, 2, 5);
        state.insert(ABS_POS_EMBED, ArrayD::from_elem(IxDyn(&[1, 196, 6]), 0.5));

        let report = adapt_pretrained(&mut state, &mut model, Path::new("unused")).unwrap();

        assert_eq!(report.resized, vec![ABS_POS_EMBED.to_string()]);
        let embed = model.tensor(ABS_POS_EMBED).unwrap();
        assert_eq!(embed.shape(), &[1, 49, 6]);
        assert!(embed.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_abs_pos_embed_channel_mismatch_skipped() {
        let mut model = model(9, 2, 5);
        model.add_parameter(ABS_POS_EMBED, ArrayD::zeros(IxDyn(&[1, 49, 6])));
        let mut state = pretrained(9, 2, 5);
        state.insert(ABS_POS_EMBED, ArrayD::from_elem(IxDyn(&[1, 196, 8]), 0.5));

        let report = adapt_pretrained(&mut state, &mut model, Path::new("unused")).unwrap();

        assert_eq!(report.skipped, vec![ABS_POS_EMBED.to_string()]);
        assert!(model.tensor(ABS_POS_EMBED).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_head_reinitialized() {
        let mut model = model(9, 2, 10);
        let mut state = pretrained(9, 2, 7);

        let report = adapt_pretrained(&mut state, &mut model, Path::new("unused")).unwrap();

        assert_eq!(report.head, HeadAction::Reinitialized);
        assert!(model.tensor(HEAD_WEIGHT).unwrap().iter().all(|&v| v == 0.0));
        assert!(model.tensor(HEAD_BIAS).unwrap().iter().all(|&v| v == 0.0));
        assert!(report.load.missing_keys.contains(&HEAD_BIAS.to_string()));
    }

    #[test]
    fn test_failed_load_leaves_head_untouched() {
        let mut model = model(9, 2, 10);
        model.add_parameter("fc.weight", ArrayD::zeros(IxDyn(&[2, 3])));
        let mut state = pretrained(9, 2, 7);
        state.insert("fc.weight", ArrayD::zeros(IxDyn(&[3, 2])));

        let err = adapt_pretrained(&mut state, &mut model, Path::new("unused")).unwrap_err();

        assert!(matches!(err, CheckpointError::ShapeMismatch { .. }));
        assert!(model.tensor(HEAD_WEIGHT).unwrap().iter().all(|&v| v == 3.0));
        assert!(model.tensor(HEAD_BIAS).unwrap().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_head_remapped() {
        let dir = tempdir().unwrap();
        let map_path = dir.path().join("map22kto1k.txt");
        let text: String = (0..IMAGENET_1K_CLASSES).map(|i| format!("{}\n", i * 21)).collect();
        std::fs::write(&map_path, text).unwrap();

        let mut model = model(9, 2, IMAGENET_1K_CLASSES);
        let mut state = pretrained(9, 2, IMAGENET_22K_CLASSES);

        let report = adapt_pretrained(&mut state, &mut model, &map_path).unwrap();

        assert_eq!(report.head, HeadAction::Remapped);
        let bias = model.tensor(HEAD_BIAS).unwrap();
        assert_eq!(bias[[0]], 0.0);
        assert_eq!(bias[[1]], 21.0);
        assert_eq!(bias[[999]], (999 * 21) as f32);
        assert_eq!(model.tensor(HEAD_WEIGHT).unwrap()[[2, 3]], 42.0);
    }

    #[test]
    fn test_head_remap_requires_class_map() {
        let mut model = model(9, 2, IMAGENET_1K_CLASSES);
        let mut state = pretrained(9, 2, IMAGENET_22K_CLASSES);

        let err = adapt_pretrained(&mut state, &mut model, Path::new("/nonexistent/map.txt"))
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Io(_)));
    }

    #[test]
    fn test_missing_head_bias_is_error() {
        let mut model = model(9, 2, 5);
        let mut state = pretrained(9, 2, 5);
        state.remove(HEAD_BIAS);

        let err = adapt_pretrained(&mut state, &mut model, Path::new("unused")).unwrap_err();
        assert!(matches!(err, CheckpointError::MissingKey(_)));
    }
}
