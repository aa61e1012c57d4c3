use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lime::FeatureSelection;

// ---------------------------------------------------------------------------
// Settings document
// ---------------------------------------------------------------------------

/// Project settings, read once at startup.
///
/// Only the sections used for explanation experiments are modelled; any other
/// section of the project config file (training, HPO, ...) is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    pub lime: LimeConfig,
    pub paths: PathsConfig,
    pub data: DataConfig,
    pub prediction: PredictionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LimeConfig {
    /// Number of perturbed images drawn per explanation.
    pub num_samples: usize,
    /// Maximum number of superpixels kept in the surrogate model.
    pub num_features: usize,
    pub kernel_width: f64,
    pub feature_selection: FeatureSelection,
    /// Perturbed images scored per classifier call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_top_labels")]
    pub top_labels: usize,
    /// Fixed seed for sampling; entropy-seeded when absent.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PathsConfig {
    pub images: PathBuf,
    pub test_imgs: PathBuf,
    pub train_set: PathBuf,
    pub test_set: PathBuf,
    pub lime_explainer: PathBuf,
    pub model_to_load: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DataConfig {
    /// Target `[height, width]` every image is resized to.
    pub img_dim: [u32; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PredictionConfig {
    pub threshold: f32,
}

fn default_batch_size() -> usize {
    10
}

fn default_top_labels() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load and validate a settings file.  Dispatch by extension.
    ///
    /// * `.yml` / `.yaml` – YAML document (the project default)
    /// * `.json`          – the same structure as JSON
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = match ext.as_str() {
            "yml" | "yaml" => Self::from_yaml_str(&text),
            "json" => serde_json::from_str(&text).map_err(|e| e.to_string()),
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
        .map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        config.validate()?;
        Ok(config)
    }

    fn from_yaml_str(text: &str) -> Result<Self, String> {
        serde_yaml::from_str(text).map_err(|e| e.to_string())
    }

    /// Reject values that would make an explanation meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key, message: &str| ConfigError::Invalid {
            key,
            message: message.to_string(),
        };

        if self.lime.num_samples == 0 {
            return Err(invalid("LIME.NUM_SAMPLES", "must be positive"));
        }
        if self.lime.num_features == 0 {
            return Err(invalid("LIME.NUM_FEATURES", "must be positive"));
        }
        if !(self.lime.kernel_width.is_finite() && self.lime.kernel_width > 0.0) {
            return Err(invalid("LIME.KERNEL_WIDTH", "must be a positive number"));
        }
        if self.lime.batch_size == 0 {
            return Err(invalid("LIME.BATCH_SIZE", "must be positive"));
        }
        if self.lime.top_labels == 0 {
            return Err(invalid("LIME.TOP_LABELS", "must be positive"));
        }
        if self.data.img_dim.contains(&0) {
            return Err(invalid("DATA.IMG_DIM", "height and width must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.prediction.threshold) {
            return Err(invalid("PREDICTION.THRESHOLD", "must lie in [0, 1]"));
        }
        Ok(())
    }

    /// `(height, width)` target size.
    pub fn target_size(&self) -> (u32, u32) {
        (self.data.img_dim[0], self.data.img_dim[1])
    }
}
