use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array1, Array2, Array3, Array4, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::explanation::{ImageExplanation, LabelExplanation};
use super::regression::WeightedRidge;
use super::segmentation::{segment_count, QuickShift, Segmenter};
use super::selection::FeatureSelection;
use crate::adapter::ScoreBatch;
use crate::error::{Error, Result};

/// Ridge penalty of the final surrogate.
const SURROGATE_ALPHA: f64 = 1.0;

// ---------------------------------------------------------------------------
// Per-call parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplainParams {
    /// Maximum number of superpixels in each surrogate.
    pub num_features: usize,
    /// Size of the perturbation set, including the unperturbed image.
    pub num_samples: usize,
    /// Perturbed images per scoring call.
    pub batch_size: usize,
    /// Number of most probable classes to explain.
    pub top_labels: usize,
    /// Fill value for switched-off superpixels; their mean colour when `None`.
    pub hide_color: Option<f32>,
}

impl Default for ExplainParams {
    fn default() -> Self {
        ExplainParams {
            num_features: 100_000,
            num_samples: 1000,
            batch_size: 10,
            top_labels: 5,
            hide_color: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Explainer
// ---------------------------------------------------------------------------

/// LIME for images: perturb superpixels, score the perturbations, and fit a
/// locally weighted linear surrogate per class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimeImageExplainer {
    /// Bandwidth of the proximity kernel over cosine distance.
    pub kernel_width: f64,
    pub feature_selection: FeatureSelection,
    /// Log surrogate diagnostics for every explained class.
    pub verbose: bool,
    /// Fixed sampling seed; every call is reproducible when set.
    pub random_seed: Option<u64>,
}

impl Default for LimeImageExplainer {
    fn default() -> Self {
        LimeImageExplainer::new(0.25, FeatureSelection::Auto)
    }
}

impl LimeImageExplainer {
    pub fn new(kernel_width: f64, feature_selection: FeatureSelection) -> Self {
        LimeImageExplainer {
            kernel_width,
            feature_selection,
            verbose: false,
            random_seed: None,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_random_seed(mut self, seed: Option<u64>) -> Self {
        self.random_seed = seed;
        self
    }

    /// `sqrt(exp(-d² / width²))`
    pub fn kernel(&self, distance: f64) -> f64 {
        (-(distance * distance) / (self.kernel_width * self.kernel_width))
            .exp()
            .sqrt()
    }

    // -- persistence --

    /// Write the explainer as JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let persist_err = |message: String| Error::Persist {
            path: path.to_path_buf(),
            message,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| persist_err(e.to_string()))?;
        }
        let file = std::fs::File::create(path).map_err(|e| persist_err(e.to_string()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)
            .map_err(|e| persist_err(e.to_string()))?;
        log::info!("Saved LIME explainer to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let persist_err = |message: String| Error::Persist {
            path: path.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| persist_err(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| persist_err(e.to_string()))
    }

    // -- explanation --

    /// Explain `image` (`(height, width, channels)`) using quickshift
    /// superpixels.
    pub fn explain_instance<S: ScoreBatch + ?Sized>(
        &self,
        image: &Array3<f32>,
        scorer: &S,
        params: &ExplainParams,
    ) -> Result<ImageExplanation> {
        let mut rng = self.rng();
        let segmenter = QuickShift::default().with_seed(rng.gen_range(0..1000));
        self.explain_with_rng(image, scorer, params, &segmenter, &mut rng)
    }

    /// Explain `image` with a caller-chosen segmentation.
    pub fn explain_instance_with_segmenter<S: ScoreBatch + ?Sized>(
        &self,
        image: &Array3<f32>,
        scorer: &S,
        params: &ExplainParams,
        segmenter: &dyn Segmenter,
    ) -> Result<ImageExplanation> {
        let mut rng = self.rng();
        self.explain_with_rng(image, scorer, params, segmenter, &mut rng)
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn explain_with_rng<S: ScoreBatch + ?Sized>(
        &self,
        image: &Array3<f32>,
        scorer: &S,
        params: &ExplainParams,
        segmenter: &dyn Segmenter,
        rng: &mut ChaCha8Rng,
    ) -> Result<ImageExplanation> {
        if image.is_empty() {
            return Err(Error::EmptyImage);
        }
        let num_samples = params.num_samples.max(1);

        let segments = segmenter.segment(image.view());
        if segments.dim() != (image.dim().0, image.dim().1) {
            return Err(Error::shape(
                format!("segment map {:?}", (image.dim().0, image.dim().1)),
                format!("{:?}", segments.dim()),
            ));
        }
        let n_features = segment_count(&segments);
        log::debug!("Segmented image into {n_features} superpixels");

        let fudged = fudged_image(image, &segments, n_features, params.hide_color);

        let mut data = Array2::<f64>::from_shape_fn((num_samples, n_features), |_| {
            rng.gen_range(0..2) as f64
        });
        data.row_mut(0).fill(1.0);

        let labels = self.score_perturbations(image, &fudged, &segments, &data, scorer, params)?;

        let distances = cosine_distances(&data);
        let weights = distances.mapv(|d| self.kernel(d));

        let prediction: Vec<f64> = labels.row(0).to_vec();
        let mut order: Vec<usize> = (0..prediction.len()).collect();
        order.sort_by(|&a, &b| prediction[b].total_cmp(&prediction[a]));
        order.truncate(params.top_labels);

        let mut explained = BTreeMap::new();
        for &label in &order {
            let fit = self.fit_label(&data, &labels, &weights, label, params.num_features);
            explained.insert(label, fit);
        }

        Ok(ImageExplanation {
            image: image.clone(),
            segments,
            prediction,
            top_labels: order,
            labels: explained,
        })
    }

    /// Score every perturbation row; returns `(num_samples, n_classes)`.
    fn score_perturbations<S: ScoreBatch + ?Sized>(
        &self,
        image: &Array3<f32>,
        fudged: &Array3<f32>,
        segments: &Array2<usize>,
        data: &Array2<f64>,
        scorer: &S,
        params: &ExplainParams,
    ) -> Result<Array2<f64>> {
        let (height, width, channels) = image.dim();
        let num_samples = data.nrows();
        let batch_size = params.batch_size.max(1);
        let mut scored: Vec<f64> = Vec::with_capacity(num_samples * 2);
        let mut n_classes: Option<usize> = None;

        for start in (0..num_samples).step_by(batch_size) {
            let end = (start + batch_size).min(num_samples);
            let mut batch = Array4::<f32>::zeros((end - start, height, width, channels));

            for (slot, row) in data.rows().into_iter().skip(start).take(end - start).enumerate() {
                let mut target = batch.index_axis_mut(Axis(0), slot);
                for ((y, x), &segment) in segments.indexed_iter() {
                    let source = if row[segment] == 0.0 { fudged } else { image };
                    for c in 0..channels {
                        target[[y, x, c]] = source[[y, x, c]];
                    }
                }
            }

            let probs = scorer.score_batch(&batch)?;
            if probs.nrows() != end - start {
                return Err(Error::shape(
                    format!("{} score rows", end - start),
                    format!("{} score rows", probs.nrows()),
                ));
            }
            match n_classes {
                Some(n) if n != probs.ncols() => {
                    return Err(Error::shape(
                        format!("{n} classes"),
                        format!("{} classes", probs.ncols()),
                    ));
                }
                _ => n_classes = Some(probs.ncols()),
            }
            scored.extend(probs.iter().map(|&p| p as f64));
            log::debug!("Scored {end}/{num_samples} perturbations");
        }

        let n_classes = n_classes.unwrap_or(0);
        Array2::from_shape_vec((num_samples, n_classes), scored)
            .map_err(|e| Error::shape(format!("{num_samples} x {n_classes} scores"), e))
    }

    fn fit_label(
        &self,
        data: &Array2<f64>,
        labels: &Array2<f64>,
        weights: &Array1<f64>,
        label: usize,
        num_features: usize,
    ) -> LabelExplanation {
        let target = labels.column(label).to_owned();
        let used = self
            .feature_selection
            .select(data, &target, weights, num_features);

        let x = data.select(Axis(1), &used);
        let model = WeightedRidge::fit(&x, &target, weights, SURROGATE_ALPHA);
        let score = model.score(&x, &target, weights);
        let local_pred = model.predict_row(x.row(0));

        let mut contributions: Vec<(usize, f64)> =
            used.iter().copied().zip(model.coef.iter().copied()).collect();
        contributions.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

        if self.verbose {
            log::info!("Label {label}: intercept {:.6}", model.intercept);
            log::info!("Label {label}: prediction_local {local_pred:.6}");
            log::info!("Label {label}: right {:.6}", target[0]);
        }

        LabelExplanation {
            intercept: model.intercept,
            weights: contributions,
            score,
            local_pred,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Image used for switched-off superpixels: a constant, or each segment's
/// mean colour.
fn fudged_image(
    image: &Array3<f32>,
    segments: &Array2<usize>,
    n_segments: usize,
    hide_color: Option<f32>,
) -> Array3<f32> {
    if let Some(value) = hide_color {
        return Array3::from_elem(image.dim(), value);
    }
    let channels = image.dim().2;
    let mut sums = Array2::<f64>::zeros((n_segments, channels));
    let mut counts = vec![0usize; n_segments];
    for ((y, x), &segment) in segments.indexed_iter() {
        counts[segment] += 1;
        for c in 0..channels {
            sums[[segment, c]] += image[[y, x, c]] as f64;
        }
    }
    Array3::from_shape_fn(image.dim(), |(y, x, c)| {
        let segment = segments[[y, x]];
        (sums[[segment, c]] / counts[segment].max(1) as f64) as f32
    })
}

/// Cosine distance of every row to row 0.  An all-zero row is at distance 1.
fn cosine_distances(data: &Array2<f64>) -> Array1<f64> {
    let reference = data.row(0);
    let ref_norm = reference.dot(&reference).sqrt();
    data.rows()
        .into_iter()
        .map(|row| {
            let norm = row.dot(&row).sqrt();
            if norm == 0.0 || ref_norm == 0.0 {
                1.0
            } else {
                (1.0 - row.dot(&reference) / (norm * ref_norm)).max(0.0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ProbabilityAdapter;
    use crate::classifier::BinaryClassifier;
    use crate::lime::segmentation::GridSegmenter;
    use ndarray::array;

    /// Probability rises with the brightness of the top-left quadrant.
    struct TopLeftBrightness;

    impl BinaryClassifier for TopLeftBrightness {
        fn predict(&self, batch: &Array4<f32>) -> Result<Array1<f32>> {
            Ok(batch
                .outer_iter()
                .map(|img| {
                    let (h, w, _) = img.dim();
                    let quadrant = img.slice(ndarray::s![..h / 2, ..w / 2, ..]);
                    quadrant.mean().unwrap_or(0.0).clamp(0.0, 1.0)
                })
                .collect())
        }
    }

    fn test_image() -> Array3<f32> {
        Array3::from_shape_fn((8, 8, 3), |(y, x, _)| if y < 4 && x < 4 { 0.9 } else { 0.1 })
    }

    fn explainer() -> LimeImageExplainer {
        LimeImageExplainer::new(0.25, FeatureSelection::Auto).with_random_seed(Some(11))
    }

    /// Switched-off superpixels go black, so uniform segments still matter.
    fn params(num_features: usize, num_samples: usize) -> ExplainParams {
        ExplainParams {
            num_features,
            num_samples,
            hide_color: Some(0.0),
            ..ExplainParams::default()
        }
    }

    #[test]
    fn kernel_is_one_at_zero_and_decays() {
        let exp = explainer();
        assert_eq!(exp.kernel(0.0), 1.0);
        assert!(exp.kernel(0.5) < exp.kernel(0.1));
    }

    #[test]
    fn cosine_distance_to_reference_row() {
        let data = array![[1.0, 1.0], [1.0, 0.0], [0.0, 0.0], [1.0, 1.0]];
        let d = cosine_distances(&data);
        assert!(d[0].abs() < 1e-12);
        assert!((d[1] - (1.0 - 1.0 / 2f64.sqrt())).abs() < 1e-12);
        assert_eq!(d[2], 1.0);
        assert!(d[3].abs() < 1e-12);
    }

    #[test]
    fn fudged_image_uses_segment_means() {
        let image = Array3::from_shape_fn((1, 4, 1), |(_, x, _)| x as f32);
        let segments = array![[0, 0, 1, 1]];
        let fudged = fudged_image(&image, &segments, 2, None);
        assert_eq!(fudged.iter().copied().collect::<Vec<_>>(), vec![0.5, 0.5, 2.5, 2.5]);
        let hidden = fudged_image(&image, &segments, 2, Some(0.0));
        assert!(hidden.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn explanation_points_at_the_informative_segment() {
        let clf = TopLeftBrightness;
        let adapter = ProbabilityAdapter::new(&clf);
        let grid = GridSegmenter { rows: 2, cols: 2 };

        let exp = explainer()
            .explain_instance_with_segmenter(&test_image(), &adapter, &params(5, 100), &grid)
            .unwrap();

        assert_eq!(exp.top_labels, vec![1, 0]);
        assert!((exp.prediction[0] + exp.prediction[1] - 1.0).abs() < 1e-6);
        let top = exp.top_segments(1, 1).unwrap();
        assert_eq!(top[0].0, 0);
        assert!(top[0].1 > 0.0);
        let opposite = exp.top_segments(0, 1).unwrap();
        assert_eq!(opposite[0].0, 0);
        assert!(opposite[0].1 < 0.0);
        assert!(exp.nonzero_segments(1).unwrap() <= 5);
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let clf = TopLeftBrightness;
        let adapter = ProbabilityAdapter::new(&clf);
        let image = test_image();

        let a = explainer().explain_instance(&image, &adapter, &params(3, 60)).unwrap();
        let b = explainer().explain_instance(&image, &adapter, &params(3, 60)).unwrap();
        assert_eq!(a.segments, b.segments);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn feature_budget_caps_every_label() {
        let clf = TopLeftBrightness;
        let adapter = ProbabilityAdapter::new(&clf);
        let grid = GridSegmenter { rows: 4, cols: 4 };

        for method in [
            FeatureSelection::Auto,
            FeatureSelection::HighestWeights,
            FeatureSelection::LassoPath,
            FeatureSelection::ForwardSelection,
        ] {
            let exp = LimeImageExplainer::new(0.25, method)
                .with_random_seed(Some(5))
                .explain_instance_with_segmenter(&test_image(), &adapter, &params(3, 80), &grid)
                .unwrap();
            for label in &exp.top_labels {
                assert!(exp.label(*label).unwrap().weights.len() <= 3, "{method}");
            }
        }
    }

    #[test]
    fn scorer_row_mismatch_is_reported() {
        struct Short;
        impl ScoreBatch for Short {
            fn score_batch(&self, _batch: &Array4<f32>) -> Result<Array2<f32>> {
                Ok(Array2::zeros((1, 2)))
            }
        }
        let err = explainer()
            .explain_instance_with_segmenter(
                &test_image(),
                &Short,
                &ExplainParams {
                    batch_size: 4,
                    ..params(2, 10)
                },
                &GridSegmenter { rows: 2, cols: 2 },
            )
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn empty_image_is_rejected() {
        let clf = TopLeftBrightness;
        let err = explainer()
            .explain_instance(
                &Array3::zeros((0, 0, 3)),
                &ProbabilityAdapter::new(&clf),
                &params(2, 10),
            )
            .unwrap_err();
        assert!(matches!(err, Error::EmptyImage));
    }

    #[test]
    fn explainer_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/lime_explainer.json");
        let exp = LimeImageExplainer::new(1.75, FeatureSelection::LassoPath)
            .with_verbose(true)
            .with_random_seed(Some(3));
        exp.save(&path).unwrap();
        assert_eq!(LimeImageExplainer::load(&path).unwrap(), exp);
    }
}
