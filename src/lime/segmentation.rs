//! Superpixel segmentation.
//!
//! Every segmenter returns a label map with the image's height and width,
//! labels numbered contiguously from zero.

use ndarray::{Array2, Array3, ArrayView3, Axis};
use palette::{IntoColor, Lab, Srgb};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

pub trait Segmenter {
    /// Label map `(height, width)` for an `(height, width, channels)` image.
    fn segment(&self, image: ArrayView3<f32>) -> Array2<usize>;
}

// ---------------------------------------------------------------------------
// Quickshift
// ---------------------------------------------------------------------------

/// Quickshift mode seeking over a joint colour + position space.
///
/// Each pixel links to the nearest pixel (within `3 * kernel_size`) that has a
/// higher Parzen density; links longer than `max_dist` are cut and every tree
/// of the resulting forest becomes a superpixel.
#[derive(Debug, Clone)]
pub struct QuickShift {
    pub kernel_size: f64,
    pub max_dist: f64,
    /// Weight of colour distance relative to spatial distance.
    pub ratio: f64,
    /// Convert RGB in `[0, 1]` to CIELAB before segmenting.
    pub convert_to_lab: bool,
    /// Seed for the density tie-breaking noise.
    pub seed: u64,
}

impl Default for QuickShift {
    fn default() -> Self {
        QuickShift {
            kernel_size: 4.0,
            max_dist: 200.0,
            ratio: 0.2,
            convert_to_lab: true,
            seed: 0,
        }
    }
}

impl QuickShift {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Colour features scaled by `ratio`, in Lab when requested.
    fn features(&self, image: ArrayView3<f32>) -> Array3<f64> {
        let (height, width, channels) = image.dim();
        if self.convert_to_lab && channels == 3 {
            let mut out = Array3::zeros((height, width, 3));
            for y in 0..height {
                for x in 0..width {
                    let rgb = Srgb::new(image[[y, x, 0]], image[[y, x, 1]], image[[y, x, 2]]);
                    let lab: Lab = rgb.into_linear().into_color();
                    out[[y, x, 0]] = lab.l as f64 * self.ratio;
                    out[[y, x, 1]] = lab.a as f64 * self.ratio;
                    out[[y, x, 2]] = lab.b as f64 * self.ratio;
                }
            }
            out
        } else {
            image.mapv(|v| v as f64 * self.ratio)
        }
    }
}

impl Segmenter for QuickShift {
    fn segment(&self, image: ArrayView3<f32>) -> Array2<usize> {
        let (height, width, _) = image.dim();
        if height == 0 || width == 0 {
            return Array2::zeros((height, width));
        }
        let features = self.features(image);
        let kernel_size = self.kernel_size.max(1.0);
        let inv_kernel_sqr = -0.5 / (kernel_size * kernel_size);
        let window = (3.0 * kernel_size).ceil() as isize;

        let dist_sq = |y: usize, x: usize, yy: usize, xx: usize| -> f64 {
            let dy = y as f64 - yy as f64;
            let dx = x as f64 - xx as f64;
            let mut d = dy * dy + dx * dx;
            for (a, b) in features
                .index_axis(Axis(0), y)
                .index_axis(Axis(0), x)
                .iter()
                .zip(features.index_axis(Axis(0), yy).index_axis(Axis(0), xx).iter())
            {
                d += (a - b) * (a - b);
            }
            d
        };
        let neighbours = |y: usize, x: usize| {
            let y0 = (y as isize - window).max(0) as usize;
            let y1 = ((y as isize + window + 1) as usize).min(height);
            let x0 = (x as isize - window).max(0) as usize;
            let x1 = ((x as isize + window + 1) as usize).min(width);
            (y0..y1).flat_map(move |yy| (x0..x1).map(move |xx| (yy, xx)))
        };

        // Parzen density, plus tiny noise to break ties between equal pixels.
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut density = Array2::<f64>::zeros((height, width));
        for y in 0..height {
            for x in 0..width {
                let mut total = 0.0;
                for (yy, xx) in neighbours(y, x) {
                    total += (dist_sq(y, x, yy, xx) * inv_kernel_sqr).exp();
                }
                density[[y, x]] = total + rng.gen_range(-1e-5..1e-5);
            }
        }

        // Link to the closest denser neighbour.
        let mut parent: Vec<usize> = (0..height * width).collect();
        for y in 0..height {
            for x in 0..width {
                let current = density[[y, x]];
                let mut closest = f64::INFINITY;
                for (yy, xx) in neighbours(y, x) {
                    if density[[yy, xx]] > current {
                        let d = dist_sq(y, x, yy, xx);
                        if d < closest {
                            closest = d;
                            parent[y * width + x] = yy * width + xx;
                        }
                    }
                }
                if closest.sqrt() > self.max_dist {
                    parent[y * width + x] = y * width + x;
                }
            }
        }

        // Follow links to the roots.
        loop {
            let next: Vec<usize> = parent.iter().map(|&p| parent[p]).collect();
            if next == parent {
                break;
            }
            parent = next;
        }

        relabel(Array2::from_shape_vec((height, width), parent).unwrap_or_else(|_| {
            Array2::zeros((height, width))
        }))
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Regular `rows x cols` tiling.  Cheap and deterministic.
#[derive(Debug, Clone, Copy)]
pub struct GridSegmenter {
    pub rows: usize,
    pub cols: usize,
}

impl Segmenter for GridSegmenter {
    fn segment(&self, image: ArrayView3<f32>) -> Array2<usize> {
        let (height, width, _) = image.dim();
        let rows = self.rows.clamp(1, height.max(1));
        let cols = self.cols.clamp(1, width.max(1));
        let labels = Array2::from_shape_fn((height, width), |(y, x)| {
            (y * rows / height) * cols + x * cols / width
        });
        relabel(labels)
    }
}

/// Renumber labels to `0..n` in ascending order of the original label.
pub fn relabel(labels: Array2<usize>) -> Array2<usize> {
    let mut unique: Vec<usize> = labels.iter().copied().collect();
    unique.sort_unstable();
    unique.dedup();
    labels.mapv(|l| unique.binary_search(&l).unwrap_or(0))
}

/// Number of segments in a contiguous label map.
pub fn segment_count(segments: &Array2<usize>) -> usize {
    segments.iter().max().map_or(0, |m| m + 1)
}
