use ndarray::{Array2, Array4, Axis};

use crate::classifier::BinaryClassifier;
use crate::error::{Error, Result};

/// Scores a batch of images with one probability per class.
pub trait ScoreBatch {
    /// Returns an `(N, n_classes)` matrix for `N` images.
    fn score_batch(&self, batch: &Array4<f32>) -> Result<Array2<f32>>;
}

/// Turns a single-output binary classifier into a two-class scorer.
///
/// Row `i` is `[1 - p_i, p_i]`, where `p_i` is the classifier's sigmoid output
/// for image `i`.
#[derive(Debug)]
pub struct ProbabilityAdapter<'a, C: ?Sized> {
    classifier: &'a C,
}

impl<'a, C: BinaryClassifier + ?Sized> ProbabilityAdapter<'a, C> {
    pub fn new(classifier: &'a C) -> Self {
        ProbabilityAdapter { classifier }
    }
}

impl<C: BinaryClassifier + ?Sized> ScoreBatch for ProbabilityAdapter<'_, C> {
    fn score_batch(&self, batch: &Array4<f32>) -> Result<Array2<f32>> {
        let n = batch.len_of(Axis(0));
        let p = self.classifier.predict(batch)?;
        if p.len() != n {
            return Err(Error::shape(
                format!("{n} scores"),
                format!("{} scores", p.len()),
            ));
        }
        Ok(two_class(&p))
    }
}

/// Stack `[1 - p, p]` column-wise.
pub fn two_class(p: &ndarray::Array1<f32>) -> Array2<f32> {
    Array2::from_shape_fn((p.len(), 2), |(i, j)| if j == 1 { p[i] } else { 1.0 - p[i] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    /// Returns the mean of the first channel of each image.
    struct MeanRed;

    impl BinaryClassifier for MeanRed {
        fn predict(&self, batch: &Array4<f32>) -> Result<Array1<f32>> {
            Ok(batch
                .outer_iter()
                .map(|img| img.index_axis(Axis(2), 0).mean().unwrap_or(0.0))
                .collect())
        }
    }

    struct Constant(Vec<f32>);

    impl BinaryClassifier for Constant {
        fn predict(&self, _batch: &Array4<f32>) -> Result<Array1<f32>> {
            Ok(Array1::from_vec(self.0.clone()))
        }
    }

    #[test]
    fn single_prediction_becomes_complement_pair() {
        let clf = Constant(vec![0.8]);
        let out = ProbabilityAdapter::new(&clf)
            .score_batch(&Array4::zeros((1, 2, 2, 3)))
            .unwrap();
        assert_eq!(out.shape(), &[1, 2]);
        assert!((out[[0, 0]] - 0.2).abs() < 1e-6);
        assert!((out[[0, 1]] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn rows_sum_to_one_for_every_batch_size() {
        for n in [1usize, 3, 10, 17] {
            let batch = Array4::from_shape_fn((n, 4, 4, 3), |(i, y, x, _)| {
                ((i + y + x) % 11) as f32 / 10.0
            });
            let out = ProbabilityAdapter::new(&MeanRed).score_batch(&batch).unwrap();
            assert_eq!(out.shape(), &[n, 2]);
            for row in out.rows() {
                assert!((row.sum() - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn extremes_are_preserved() {
        let out = two_class(&array![0.0, 1.0]);
        assert_eq!(out, array![[1.0, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn wrong_number_of_scores_is_a_shape_error() {
        let clf = Constant(vec![0.1, 0.2]);
        let err = ProbabilityAdapter::new(&clf)
            .score_batch(&Array4::zeros((3, 2, 2, 3)))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn classifier_errors_propagate() {
        struct Failing;
        impl BinaryClassifier for Failing {
            fn predict(&self, _batch: &Array4<f32>) -> Result<Array1<f32>> {
                Err(Error::model("failing", "boom"))
            }
        }
        let err = ProbabilityAdapter::new(&Failing)
            .score_batch(&Array4::zeros((1, 2, 2, 3)))
            .unwrap_err();
        assert!(matches!(err, Error::Model { .. }));
    }
}
