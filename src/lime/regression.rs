//! Weighted linear surrogates: ridge regression, weighted R² and a
//! LARS-lasso path.

use ndarray::{Array1, Array2, ArrayView1, Axis};

// ---------------------------------------------------------------------------
// Weighted ridge
// ---------------------------------------------------------------------------

/// Ridge regression with an intercept, fitted under per-sample weights.
#[derive(Debug, Clone)]
pub struct WeightedRidge {
    pub coef: Array1<f64>,
    pub intercept: f64,
}

impl WeightedRidge {
    /// Minimise `Σ w_i (y_i - b0 - x_i·b)² + alpha |b|²`.
    ///
    /// The intercept is not penalised: data is centred on weighted means first.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, weights: &Array1<f64>, alpha: f64) -> Self {
        let n_features = x.ncols();
        let total: f64 = weights.sum();
        let weights = if total > 0.0 {
            weights.clone()
        } else {
            Array1::ones(y.len())
        };
        let total = weights.sum();

        let y_mean = weights.dot(y) / total;
        if n_features == 0 {
            return WeightedRidge {
                coef: Array1::zeros(0),
                intercept: y_mean,
            };
        }
        let x_mean = x.t().dot(&weights) / total;

        let sqrt_w = weights.mapv(f64::sqrt);
        let xw = (x - &x_mean) * &sqrt_w.view().insert_axis(Axis(1));
        let yw = (y - y_mean) * &sqrt_w;

        let mut gram = xw.t().dot(&xw);
        for i in 0..n_features {
            gram[[i, i]] += alpha;
        }
        let rhs = xw.t().dot(&yw);

        let coef = cholesky_solve(&gram, &rhs).unwrap_or_else(|| Array1::zeros(n_features));
        let intercept = y_mean - x_mean.dot(&coef);
        WeightedRidge { coef, intercept }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.intercept + row.dot(&self.coef)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.coef) + self.intercept
    }

    /// Weighted coefficient of determination on `(x, y)`.
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>, weights: &Array1<f64>) -> f64 {
        weighted_r2(y, &self.predict(x), weights)
    }
}

/// Weighted R².  A constant target scores 1.0 when fitted exactly, else 0.0.
pub fn weighted_r2(y: &Array1<f64>, pred: &Array1<f64>, weights: &Array1<f64>) -> f64 {
    let total = weights.sum();
    if total <= 0.0 {
        return 0.0;
    }
    let y_mean = weights.dot(y) / total;
    let mut residual = 0.0;
    let mut spread = 0.0;
    for ((&yi, &pi), &wi) in y.iter().zip(pred.iter()).zip(weights.iter()) {
        residual += wi * (yi - pi).powi(2);
        spread += wi * (yi - y_mean).powi(2);
    }
    if spread == 0.0 {
        return if residual == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - residual / spread
}

// ---------------------------------------------------------------------------
// Cholesky
// ---------------------------------------------------------------------------

/// Solve the symmetric positive-definite system `a x = b`.
///
/// A near-singular `a` is retried once with a small diagonal jitter.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    cholesky_solve_inner(a, b).or_else(|| {
        let n = a.nrows();
        let scale = a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
        let mut a_reg = a.clone();
        for k in 0..n {
            a_reg[[k, k]] += 1e-8 * scale.max(1.0);
        }
        cholesky_solve_inner(&a_reg, b)
    })
}

fn cholesky_solve_inner(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Lᵀ x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

// ---------------------------------------------------------------------------
// Lasso path
// ---------------------------------------------------------------------------

/// Knot budget, as a multiple of the feature count (drops add knots).
const MAX_KNOTS_PER_FEATURE: usize = 8;
/// Correlations below this fraction of the starting maximum count as zero.
const CORRELATION_FLOOR: f64 = 1e-10;
/// Steps shorter than this fraction of the full step are ignored.
const STEP_FLOOR: f64 = 1e-12;

/// Lasso coefficients at every knot of the LARS-lasso path.
///
/// No intercept is fitted (callers centre the data).  The first entry is the
/// all-zero solution, the last the least-squares fit on the final active set.
/// Between consecutive knots one feature enters or one leaves, so every
/// support size up to the final one appears on the path.
pub fn lasso_path(x: &Array2<f64>, y: &Array1<f64>) -> Vec<Array1<f64>> {
    let (n_samples, n_features) = x.dim();
    let mut coef = Array1::<f64>::zeros(n_features);
    let mut path = vec![coef.clone()];
    if n_samples == 0 || n_features == 0 {
        return path;
    }

    let mut residual = y.clone();
    let mut active: Vec<usize> = Vec::new();
    let mut entering: Option<usize> = None;
    let mut just_dropped: Option<usize> = None;
    let mut corr_floor = None;

    for _ in 0..MAX_KNOTS_PER_FEATURE * n_features {
        let corr = x.t().dot(&residual);
        if let Some(j) = entering.take() {
            active.push(j);
        } else if active.is_empty() {
            match strongest(&corr) {
                Some(j) => active.push(j),
                None => break,
            }
        }

        let c_max = active.iter().fold(0.0_f64, |acc, &j| acc.max(corr[j].abs()));
        let floor = *corr_floor.get_or_insert(c_max * CORRELATION_FLOOR);
        if c_max == 0.0 || c_max <= floor {
            break;
        }

        // Equiangular direction over the sign-adjusted active columns.
        let signs: Vec<f64> = active.iter().map(|&j| corr[j].signum()).collect();
        let k = active.len();
        let gram = Array2::from_shape_fn((k, k), |(a, b)| {
            signs[a] * signs[b] * x.column(active[a]).dot(&x.column(active[b]))
        });
        let Some(g_inv_ones) = cholesky_solve(&gram, &Array1::ones(k)) else {
            break;
        };
        let norm = g_inv_ones.sum();
        if norm <= 0.0 {
            break;
        }
        let a_norm = norm.powf(-0.5);
        let direction: Vec<f64> = g_inv_ones
            .iter()
            .zip(&signs)
            .map(|(g, s)| g * a_norm * s)
            .collect();

        let mut u = Array1::<f64>::zeros(n_samples);
        for (&j, &d) in active.iter().zip(&direction) {
            u.scaled_add(d, &x.column(j));
        }
        let a = x.t().dot(&u);

        let full_step = c_max / a_norm;
        let min_step = full_step * STEP_FLOOR;
        let mut gamma = full_step;
        let mut next = None;
        for j in 0..n_features {
            if active.contains(&j) || just_dropped == Some(j) {
                continue;
            }
            for candidate in [
                (c_max - corr[j]) / (a_norm - a[j]),
                (c_max + corr[j]) / (a_norm + a[j]),
            ] {
                if candidate.is_finite()
                    && candidate > min_step
                    && candidate < gamma
                    && candidate < full_step * (1.0 - 1e-9)
                {
                    gamma = candidate;
                    next = Some(j);
                }
            }
        }

        // An active coefficient crossing zero leaves the set.
        let mut leaving = None;
        for (idx, (&j, &d)) in active.iter().zip(&direction).enumerate() {
            if d == 0.0 {
                continue;
            }
            let crossing = -coef[j] / d;
            if crossing > min_step && crossing < gamma {
                gamma = crossing;
                leaving = Some(idx);
            }
        }

        for (&j, &d) in active.iter().zip(&direction) {
            coef[j] += gamma * d;
        }
        residual.scaled_add(-gamma, &u);
        just_dropped = None;

        if let Some(idx) = leaving {
            let j = active.remove(idx);
            coef[j] = 0.0;
            just_dropped = Some(j);
            path.push(coef.clone());
            continue;
        }
        path.push(coef.clone());
        match next {
            Some(j) => entering = Some(j),
            None => break,
        }
    }
    path
}

/// Index of the largest absolute correlation, if any is non-zero.
fn strongest(corr: &Array1<f64>) -> Option<usize> {
    corr.iter()
        .enumerate()
        .filter(|(_, c)| c.abs() > 0.0)
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(j, _)| j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn linear_fixture() -> (Array2<f64>, Array1<f64>) {
        // y = 1.5 + 2 x0 - 3 x1
        let x = array![
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
            [2.0, 1.0],
            [1.0, 3.0],
        ];
        let y = x.map_axis(Axis(1), |r| 1.5 + 2.0 * r[0] - 3.0 * r[1]);
        (x, y)
    }

    #[test]
    fn unpenalised_fit_recovers_linear_target() {
        let (x, y) = linear_fixture();
        let w = Array1::from(vec![1.0, 0.5, 2.0, 1.0, 0.3, 1.2]);
        let model = WeightedRidge::fit(&x, &y, &w, 0.0);

        assert!((model.coef[0] - 2.0).abs() < 1e-6);
        assert!((model.coef[1] + 3.0).abs() < 1e-6);
        assert!((model.intercept - 1.5).abs() < 1e-6);
        assert!((model.score(&x, &y, &w) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn penalty_shrinks_coefficients() {
        let (x, y) = linear_fixture();
        let w = Array1::ones(6);
        let free = WeightedRidge::fit(&x, &y, &w, 0.0);
        let ridge = WeightedRidge::fit(&x, &y, &w, 10.0);
        assert!(ridge.coef.dot(&ridge.coef) < free.coef.dot(&free.coef));
    }

    #[test]
    fn no_features_fits_weighted_mean() {
        let x = Array2::zeros((3, 0));
        let y = array![1.0, 2.0, 4.0];
        let w = array![1.0, 1.0, 2.0];
        let model = WeightedRidge::fit(&x, &y, &w, 1.0);
        assert!((model.intercept - 2.75).abs() < 1e-12);
        assert_eq!(model.predict_row(ndarray::ArrayView1::from(&[] as &[f64])), 2.75);
    }

    #[test]
    fn r2_of_constant_target() {
        let y = array![2.0, 2.0];
        let w = array![1.0, 1.0];
        assert_eq!(weighted_r2(&y, &array![2.0, 2.0], &w), 1.0);
        assert_eq!(weighted_r2(&y, &array![1.0, 2.0], &w), 0.0);
    }

    #[test]
    fn lasso_path_adds_one_feature_per_knot() {
        let (x, y) = linear_fixture();
        let x_mean = x.mean_axis(Axis(0)).unwrap();
        let y_mean = y.mean().unwrap();
        let xc = &x - &x_mean;
        let yc = &y - y_mean;

        let path = lasso_path(&xc, &yc);
        assert!(path[0].iter().all(|&c| c == 0.0));

        let support = |c: &Array1<f64>| c.iter().filter(|v| **v != 0.0).count();
        let sizes: Vec<usize> = path.iter().map(support).collect();
        assert_eq!(&sizes[..2], &[0, 1]);
        assert_eq!(sizes.last(), Some(&2));

        let last = path.last().unwrap();
        assert!((last[0] - 2.0).abs() < 1e-6);
        assert!((last[1] + 3.0).abs() < 1e-6);
    }

    #[test]
    fn lasso_path_support_never_jumps() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let x = Array2::from_shape_fn((120, 10), |_| rng.gen_range(0..2) as f64);
        let truth = Array1::from_shape_fn(10, |j| 0.7_f64.powi(j as i32));
        let y = x.dot(&truth);
        let xc = &x - &x.mean_axis(Axis(0)).unwrap();
        let yc = &y - y.mean().unwrap();

        let path = lasso_path(&xc, &yc);
        let support = |c: &Array1<f64>| c.iter().filter(|v| **v != 0.0).count();
        for pair in path.windows(2) {
            let (a, b) = (support(&pair[0]), support(&pair[1]));
            assert!(a.abs_diff(b) <= 1, "{a} -> {b}");
        }
        assert_eq!(support(path.last().unwrap()), 10);
    }
}
