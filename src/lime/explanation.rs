use std::collections::BTreeMap;

use ndarray::{Array2, Array3, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Surrogate fit for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelExplanation {
    pub intercept: f64,
    /// `(segment, weight)` sorted by descending absolute weight.
    pub weights: Vec<(usize, f64)>,
    /// Weighted R² of the surrogate on the perturbation set.
    pub score: f64,
    /// Surrogate prediction for the unperturbed image.
    pub local_pred: f64,
}

/// Which contributions [`ImageExplanation::image_and_mask`] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskSign {
    Positive,
    Negative,
    Both,
}

/// Result of explaining one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageExplanation {
    pub image: Array3<f32>,
    /// Superpixel label of every pixel.
    pub segments: Array2<usize>,
    /// Model output for the unperturbed image, one entry per class.
    pub prediction: Vec<f64>,
    /// Explained classes, most probable first.
    pub top_labels: Vec<usize>,
    pub labels: BTreeMap<usize, LabelExplanation>,
}

impl ImageExplanation {
    pub fn label(&self, label: usize) -> Result<&LabelExplanation> {
        self.labels.get(&label).ok_or(Error::UnknownLabel(label))
    }

    /// The `n` most influential segments for `label`.
    pub fn top_segments(&self, label: usize, n: usize) -> Result<Vec<(usize, f64)>> {
        Ok(self.label(label)?.weights.iter().copied().take(n).collect())
    }

    /// Segments with a non-zero weight for `label`.
    pub fn nonzero_segments(&self, label: usize) -> Result<usize> {
        Ok(self
            .label(label)?
            .weights
            .iter()
            .filter(|(_, w)| *w != 0.0)
            .count())
    }

    /// Image with the chosen superpixels highlighted, and a mask marking them
    /// (`1` for positive, `-1` for negative weight).
    ///
    /// With `hide_rest` every other pixel is zeroed.  With [`MaskSign::Both`]
    /// selected segments are also tinted: the green channel for positive
    /// weights, red for negative ones.
    pub fn image_and_mask(
        &self,
        label: usize,
        sign: MaskSign,
        hide_rest: bool,
        num_features: usize,
        min_weight: f64,
    ) -> Result<(Array3<f32>, Array2<i8>)> {
        let weights = &self.label(label)?.weights;
        let mut mask = Array2::<i8>::zeros(self.segments.dim());
        let mut out = if hide_rest {
            Array3::zeros(self.image.dim())
        } else {
            self.image.clone()
        };

        let chosen: Vec<(usize, f64)> = match sign {
            MaskSign::Positive => weights
                .iter()
                .copied()
                .filter(|&(_, w)| w > 0.0 && w > min_weight)
                .take(num_features)
                .collect(),
            MaskSign::Negative => weights
                .iter()
                .copied()
                .filter(|&(_, w)| w < 0.0 && w.abs() > min_weight)
                .take(num_features)
                .collect(),
            MaskSign::Both => weights
                .iter()
                .copied()
                .take(num_features)
                .filter(|&(_, w)| w.abs() >= min_weight)
                .collect(),
        };

        let brightest = self.image.iter().copied().fold(0.0_f32, f32::max);
        for (segment, weight) in chosen {
            let marker = if weight < 0.0 { -1 } else { 1 };
            let tint = (sign == MaskSign::Both).then_some(if weight < 0.0 { 0 } else { 1 });

            Zip::from(&mut mask)
                .and(&self.segments)
                .for_each(|m, &s| {
                    if s == segment {
                        *m = marker;
                    }
                });
            for ((y, x), &s) in self.segments.indexed_iter() {
                if s != segment {
                    continue;
                }
                let mut pixel = out.index_axis_mut(Axis(0), y);
                let mut pixel = pixel.index_axis_mut(Axis(0), x);
                pixel.assign(&self.image.index_axis(Axis(0), y).index_axis(Axis(0), x));
                if let Some(channel) = tint {
                    pixel[channel] = brightest;
                }
            }
        }
        Ok((out, mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explanation() -> ImageExplanation {
        let segments = Array2::from_shape_fn((2, 4), |(_, x)| x);
        let mut image = Array3::from_elem((2, 4, 3), 0.25);
        image[[1, 3, 2]] = 1.0;
        let mut labels = BTreeMap::new();
        labels.insert(
            1,
            LabelExplanation {
                intercept: 0.1,
                weights: vec![(2, 0.4), (0, -0.3), (3, 0.05), (1, 0.0)],
                score: 0.9,
                local_pred: 0.7,
            },
        );
        ImageExplanation {
            image,
            segments,
            prediction: vec![0.3, 0.7],
            top_labels: vec![1],
            labels,
        }
    }

    #[test]
    fn top_segments_follow_weight_order() {
        let exp = explanation();
        assert_eq!(exp.top_segments(1, 2).unwrap(), vec![(2, 0.4), (0, -0.3)]);
        assert_eq!(exp.nonzero_segments(1).unwrap(), 3);
        assert!(matches!(exp.top_segments(0, 2), Err(Error::UnknownLabel(0))));
    }

    #[test]
    fn positive_mask_hides_the_rest() {
        let exp = explanation();
        let (img, mask) = exp
            .image_and_mask(1, MaskSign::Positive, true, 5, 0.1)
            .unwrap();
        assert_eq!(mask.row(0).to_vec(), vec![0, 0, 1, 0]);
        assert_eq!(img[[0, 2, 0]], 0.25);
        assert_eq!(img[[0, 0, 0]], 0.0);
    }

    #[test]
    fn both_signs_are_tinted() {
        let exp = explanation();
        let (img, mask) = exp.image_and_mask(1, MaskSign::Both, false, 2, 0.0).unwrap();
        assert_eq!(mask.row(1).to_vec(), vec![-1, 0, 1, 0]);
        assert_eq!(img[[0, 0, 0]], 1.0);
        assert_eq!(img[[0, 0, 1]], 0.25);
        assert_eq!(img[[0, 2, 1]], 1.0);
        assert_eq!(img[[0, 1, 1]], 0.25);
    }

    #[test]
    fn explanation_serialises() {
        let exp = explanation();
        let json = serde_json::to_string(&exp).unwrap();
        let back: ImageExplanation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.labels, exp.labels);
        assert_eq!(back.segments, exp.segments);
    }
}
