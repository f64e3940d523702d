//! Experiment configuration.
//!
//! Loads checkpoint locations and the model layout from a TOML or JSON file,
//! with `VITCKPT__SECTION__KEY` environment variables taking precedence, e.g.
//! `VITCKPT__CHECKPOINT__RESUME_EPOCH=30`.

use crate::checkpoint::CheckpointConfig;
use crate::model::SwinConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENV_PREFIX: &str = "VITCKPT";
const ENV_SEPARATOR: &str = "__";

/// Top-level configuration of a training or fine-tuning run.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExperimentConfig {
    pub checkpoint: CheckpointConfig,
    pub model: SwinConfig,
}

impl ExperimentConfig {
    /// Load configuration from a file plus environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Parse TOML text, without environment overrides.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    const TOML: &str = r#"
[checkpoint]
resume_path = "runs/swin_t"
pretrained_path = "weights"
pretrained_model = "swin_tiny_patch4_window7_224_22k.pth"

[model]
img_size = 384
window_size = 12
num_classes = 1000
"#;

    #[test]
    fn test_from_toml_str() {
        let config = ExperimentConfig::from_toml_str(TOML).unwrap();

        assert_eq!(config.checkpoint.resume_path, PathBuf::from("runs/swin_t"));
        assert_eq!(config.checkpoint.resume_epoch, None);
        assert_eq!(
            config.checkpoint.pretrained_file().unwrap(),
            PathBuf::from("weights/swin_tiny_patch4_window7_224_22k.pth")
        );
        assert_eq!(config.model.img_size, 384);
        assert_eq!(config.model.window_size, 12);
        assert_eq!(config.model.embed_dim, SwinConfig::default().embed_dim);
    }

    #[test]
    fn test_empty_is_default() {
        let config = ExperimentConfig::from_toml_str("").unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("experiment.toml");
        std::fs::write(&path, TOML).unwrap();

        let config = ExperimentConfig::load(&path).unwrap();
        assert_eq!(config.model.img_size, 384);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ExperimentConfig::load("/nonexistent/experiment.toml").unwrap_err();
        assert!(matches!(err, crate::CheckpointError::Config(_)));
    }
}
