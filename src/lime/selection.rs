use std::fmt;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::regression::{lasso_path, WeightedRidge};

/// How the surrogate model picks which superpixels it may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSelection {
    /// Forward selection for small budgets, highest weights otherwise.
    #[default]
    Auto,
    /// Keep every superpixel.
    #[serde(rename = "none")]
    All,
    ForwardSelection,
    HighestWeights,
    LassoPath,
}

/// Budget at or below which `auto` uses forward selection.
const FORWARD_SELECTION_LIMIT: usize = 6;

impl fmt::Display for FeatureSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureSelection::Auto => "auto",
            FeatureSelection::All => "none",
            FeatureSelection::ForwardSelection => "forward_selection",
            FeatureSelection::HighestWeights => "highest_weights",
            FeatureSelection::LassoPath => "lasso_path",
        };
        f.write_str(name)
    }
}

impl FeatureSelection {
    /// Column indices of `data` to fit the surrogate on, at most
    /// `num_features` of them.
    ///
    /// `data` is the binary perturbation matrix whose first row is the
    /// unperturbed instance; `labels` the model output for one class.
    pub fn select(
        self,
        data: &Array2<f64>,
        labels: &Array1<f64>,
        weights: &Array1<f64>,
        num_features: usize,
    ) -> Vec<usize> {
        match self {
            FeatureSelection::All => (0..data.ncols()).collect(),
            FeatureSelection::ForwardSelection => {
                forward_selection(data, labels, weights, num_features)
            }
            FeatureSelection::HighestWeights => highest_weights(data, labels, weights, num_features),
            FeatureSelection::LassoPath => lasso_selection(data, labels, weights, num_features),
            FeatureSelection::Auto => {
                let method = if num_features <= FORWARD_SELECTION_LIMIT {
                    FeatureSelection::ForwardSelection
                } else {
                    FeatureSelection::HighestWeights
                };
                method.select(data, labels, weights, num_features)
            }
        }
    }
}

/// Greedily add the column that most improves the weighted R² of an
/// unpenalised fit.
fn forward_selection(
    data: &Array2<f64>,
    labels: &Array1<f64>,
    weights: &Array1<f64>,
    num_features: usize,
) -> Vec<usize> {
    let mut used: Vec<usize> = Vec::new();
    for _ in 0..num_features.min(data.ncols()) {
        let mut best: Option<(usize, f64)> = None;
        for feature in 0..data.ncols() {
            if used.contains(&feature) {
                continue;
            }
            let mut candidate = used.clone();
            candidate.push(feature);
            let x = data.select(Axis(1), &candidate);
            let score = WeightedRidge::fit(&x, labels, weights, 0.0).score(&x, labels, weights);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((feature, score));
            }
        }
        match best {
            Some((feature, _)) => used.push(feature),
            None => break,
        }
    }
    used
}

/// Rank columns by `|coef * instance|` under a lightly penalised fit.
fn highest_weights(
    data: &Array2<f64>,
    labels: &Array1<f64>,
    weights: &Array1<f64>,
    num_features: usize,
) -> Vec<usize> {
    let model = WeightedRidge::fit(data, labels, weights, 0.01);
    let instance = data.row(0);
    let mut ranked: Vec<(usize, f64)> = model
        .coef
        .iter()
        .zip(instance.iter())
        .map(|(c, x)| c * x)
        .enumerate()
        .collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    ranked.into_iter().take(num_features).map(|(i, _)| i).collect()
}

/// Densest lasso solution with at most `num_features` non-zero coefficients.
fn lasso_selection(
    data: &Array2<f64>,
    labels: &Array1<f64>,
    weights: &Array1<f64>,
    num_features: usize,
) -> Vec<usize> {
    let total = weights.sum();
    if total <= 0.0 || data.ncols() == 0 {
        return Vec::new();
    }
    let sqrt_w = weights.mapv(f64::sqrt);
    let data_mean = data.t().dot(weights) / total;
    let label_mean = weights.dot(labels) / total;

    let weighted_data = (data - &data_mean) * &sqrt_w.view().insert_axis(Axis(1));
    let weighted_labels = (labels - label_mean) * &sqrt_w;

    let path = lasso_path(&weighted_data, &weighted_labels);
    let support = |coef: &Array1<f64>| -> Vec<usize> {
        coef.iter()
            .enumerate()
            .filter(|(_, c)| **c != 0.0)
            .map(|(i, _)| i)
            .collect()
    };

    // Walk from the densest end; stop at the first small enough support.
    let mut chosen = Vec::new();
    for coef in path.iter().skip(1).rev() {
        chosen = support(coef);
        if chosen.len() <= num_features {
            break;
        }
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    /// Label depends on columns 2 and 5 only.
    fn fixture() -> (Array2<f64>, Array1<f64>, Array1<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut data = Array2::from_shape_fn((200, 8), |_| rng.gen_range(0..2) as f64);
        data.row_mut(0).fill(1.0);
        let labels = data.map_axis(Axis(1), |r| 0.1 + 0.6 * r[2] + 0.25 * r[5]);
        let weights = Array1::from_shape_fn(200, |i| 1.0 / (1.0 + i as f64 / 100.0));
        (data, labels, weights)
    }

    #[test]
    fn every_strategy_respects_the_budget() {
        let (data, labels, weights) = fixture();
        for method in [
            FeatureSelection::Auto,
            FeatureSelection::ForwardSelection,
            FeatureSelection::HighestWeights,
            FeatureSelection::LassoPath,
        ] {
            for budget in [1, 2, 3, 20] {
                let mut used = method.select(&data, &labels, &weights, budget);
                assert!(used.len() <= budget.min(8), "{method} with {budget}");
                used.sort_unstable();
                used.dedup();
                assert!(used.len() <= budget);
                assert!(used.iter().all(|&i| i < 8));
            }
        }
        assert_eq!(FeatureSelection::All.select(&data, &labels, &weights, 1).len(), 8);
    }

    #[test]
    fn informative_columns_come_first() {
        let (data, labels, weights) = fixture();
        for method in [
            FeatureSelection::ForwardSelection,
            FeatureSelection::HighestWeights,
            FeatureSelection::LassoPath,
        ] {
            let mut used = method.select(&data, &labels, &weights, 2);
            used.sort_unstable();
            assert_eq!(used, vec![2, 5], "{method}");
        }
        assert_eq!(
            FeatureSelection::ForwardSelection.select(&data, &labels, &weights, 1),
            vec![2]
        );
    }

    #[test]
    fn lasso_path_fills_the_budget() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let data = Array2::from_shape_fn((400, 20), |_| rng.gen_range(0..2) as f64);
        let truth = Array1::from_shape_fn(20, |j| 0.8_f64.powi(j as i32));
        let labels = data.dot(&truth);
        let weights = Array1::from_shape_fn(400, |i| 1.0 / (1.0 + i as f64 / 200.0));

        for budget in [3, 7, 10, 15] {
            let used = FeatureSelection::LassoPath.select(&data, &labels, &weights, budget);
            assert_eq!(used.len(), budget, "budget {budget}");
        }
    }

    #[test]
    fn names_round_trip_through_serde() {
        let parsed: FeatureSelection = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, FeatureSelection::All);
        let parsed: FeatureSelection = serde_json::from_str("\"lasso_path\"").unwrap();
        assert_eq!(parsed, FeatureSelection::LassoPath);
        assert_eq!(
            serde_json::to_string(&FeatureSelection::ForwardSelection).unwrap(),
            "\"forward_selection\""
        );
    }
}
