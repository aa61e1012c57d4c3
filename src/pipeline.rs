use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use ndarray::Array3;

use crate::adapter::ProbabilityAdapter;
use crate::classifier::{BinaryClassifier, OnnxClassifier};
use crate::config::Config;
use crate::data::{load_table, CellValue, ExampleTable, ImageSequence};
use crate::error::Error;
use crate::lime::{ExplainParams, ImageExplanation, LimeImageExplainer};

/// Index of the positive class in a two-class probability row.
const POSITIVE_CLASS: usize = 1;

// ---------------------------------------------------------------------------
// Explanation context
// ---------------------------------------------------------------------------

/// Everything an explanation run needs, built once per process.
pub struct ExplainContext<C = OnnxClassifier> {
    pub config: Config,
    pub train_set: ExampleTable,
    pub test_set: ExampleTable,
    /// Test images in table order, batch size 1.
    pub sequence: ImageSequence,
    pub explainer: LimeImageExplainer,
    pub classifier: C,
}

impl ExplainContext<OnnxClassifier> {
    /// Load config, tables, sequence, explainer and model, in that order.
    ///
    /// The explainer is persisted to `PATHS.LIME_EXPLAINER` before the model
    /// is loaded.
    pub fn setup(config_path: &Path) -> Result<Self> {
        let config = Config::load(config_path)
            .with_context(|| format!("loading config {}", config_path.display()))?;
        log::info!("Loaded config from {}", config_path.display());

        let train_set = load_table(&config.paths.train_set)?;
        let test_set = load_table(&config.paths.test_set)?;
        log_split("train", &train_set);
        log_split("test", &test_set);
        let sequence = build_sequence(&config, &test_set);

        let explainer = build_explainer(&config);
        explainer.save(&config.paths.lime_explainer)?;

        let model_path = &config.paths.model_to_load;
        if !model_path.is_file() {
            bail!("model file not found: {}", model_path.display());
        }
        let classifier = OnnxClassifier::load(model_path)?;

        Ok(ExplainContext {
            config,
            train_set,
            test_set,
            sequence,
            explainer,
            classifier,
        })
    }
}

impl<C: BinaryClassifier> ExplainContext<C> {
    /// Assemble a context from already-loaded tables and a classifier.
    /// Nothing is written to disk.
    pub fn from_parts(
        config: Config,
        train_set: ExampleTable,
        test_set: ExampleTable,
        classifier: C,
    ) -> Self {
        let sequence = build_sequence(&config, &test_set);
        let explainer = build_explainer(&config);
        ExplainContext {
            config,
            train_set,
            test_set,
            sequence,
            explainer,
            classifier,
        }
    }

    pub fn params(&self) -> ExplainParams {
        let lime = &self.config.lime;
        ExplainParams {
            num_features: lime.num_features,
            num_samples: lime.num_samples,
            batch_size: lime.batch_size,
            top_labels: lime.top_labels,
            hide_color: None,
        }
    }

    /// Explain the `idx`-th test image.
    pub fn explain_example(&self, idx: usize) -> Result<ImageExplanation> {
        let (image, label) = self.sequence.get(idx)?.into_single()?;
        self.explain_labelled(idx, &image, &label)
    }

    /// Same as [`explain_example`](Self::explain_example), reaching the image
    /// by walking the sequence from the start.
    pub fn explain_example_sequential(&self, idx: usize) -> Result<ImageExplanation> {
        let mut current = None;
        for batch in self.sequence.iter().take(idx + 1) {
            current = Some(batch?);
        }
        let batch = current
            .filter(|_| idx < self.sequence.len())
            .ok_or(Error::IndexOutOfRange {
                index: idx,
                len: self.sequence.len(),
            })?;
        let (image, label) = batch.into_single()?;
        self.explain_labelled(idx, &image, &label)
    }

    fn explain_labelled(
        &self,
        idx: usize,
        image: &Array3<f32>,
        label: &CellValue,
    ) -> Result<ImageExplanation> {
        log::info!(
            "Explaining test example {idx} ({}, label {label})",
            self.sequence.rows()[idx].filename
        );
        let explanation = self.explain_image(image)?;

        let probability = explanation
            .prediction
            .get(POSITIVE_CLASS)
            .copied()
            .unwrap_or(0.0);
        let predicted = u8::from(probability >= self.config.prediction.threshold as f64);
        log::info!(
            "Predicted class {predicted} (p = {probability:.4}, threshold {})",
            self.config.prediction.threshold
        );
        if let Ok(top) = explanation.top_segments(POSITIVE_CLASS, 5) {
            log::info!("Top superpixels for class {POSITIVE_CLASS}: {top:?}");
        }
        Ok(explanation)
    }

    /// Explain a preprocessed `(height, width, 3)` image and report how long
    /// it took.
    pub fn explain_image(&self, image: &Array3<f32>) -> Result<ImageExplanation> {
        let adapter = ProbabilityAdapter::new(&self.classifier);
        let start = Instant::now();
        let explanation = self
            .explainer
            .explain_instance(image, &adapter, &self.params())?;
        let elapsed = start.elapsed().as_secs_f64();

        println!("Explanation time = {elapsed} seconds");
        Ok(explanation)
    }
}

fn log_split(name: &str, table: &ExampleTable) {
    let counts: Vec<String> = table
        .label_counts()
        .into_iter()
        .map(|(label, n)| format!("{label}: {n}"))
        .collect();
    log::info!("{name} split: {} rows ({})", table.len(), counts.join(", "));
}

fn build_sequence(config: &Config, test_set: &ExampleTable) -> ImageSequence {
    ImageSequence::new(test_set, &config.paths.test_imgs, config.target_size(), 1)
}

fn build_explainer(config: &Config) -> LimeImageExplainer {
    LimeImageExplainer::new(config.lime.kernel_width, config.lime.feature_selection)
        .with_verbose(true)
        .with_random_seed(config.lime.random_seed)
}
