use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{Array3, Array4, Axis};

use super::filter::validated_indices;
use super::model::{CellValue, ExampleRow, ExampleTable};
use crate::error::{Error, Result};

/// Pixel scale applied after decoding (8-bit → `[0, 1]`).
pub const RESCALE: f32 = 1.0 / 255.0;

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// One step of the sequence: `images` is `(batch, height, width, 3)`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array4<f32>,
    pub labels: Vec<CellValue>,
}

impl Batch {
    /// Drop the batch dimension of a size-1 batch.
    pub fn into_single(self) -> Result<(Array3<f32>, CellValue)> {
        if self.images.len_of(Axis(0)) != 1 || self.labels.len() != 1 {
            return Err(Error::shape(
                "batch of 1",
                format!("batch of {}", self.images.len_of(Axis(0))),
            ));
        }
        let image = self.images.index_axis_move(Axis(0), 0);
        let label = self.labels.into_iter().next().unwrap_or(CellValue::Null);
        Ok((image, label))
    }
}

// ---------------------------------------------------------------------------
// ImageSequence
// ---------------------------------------------------------------------------

/// Ordered, non-shuffled `(image, label)` sequence over an image directory
/// and an example table.  Labels are yielded raw.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    directory: PathBuf,
    rows: Vec<ExampleRow>,
    /// `(height, width)`
    target_size: (u32, u32),
    batch_size: usize,
}

impl ImageSequence {
    /// Build a sequence over the rows of `table` whose files exist.
    pub fn new(
        table: &ExampleTable,
        directory: impl Into<PathBuf>,
        target_size: (u32, u32),
        batch_size: usize,
    ) -> Self {
        let directory = directory.into();
        let rows = validated_indices(table, &directory)
            .into_iter()
            .map(|i| table.rows[i].clone())
            .collect();
        ImageSequence {
            directory,
            rows,
            target_size,
            batch_size: batch_size.max(1),
        }
    }

    /// Number of batches.
    pub fn len(&self) -> usize {
        self.rows.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that survived validation, in yield order.
    pub fn rows(&self) -> &[ExampleRow] {
        &self.rows
    }

    /// Batch `idx`, read directly without walking earlier batches.
    pub fn get(&self, idx: usize) -> Result<Batch> {
        if idx >= self.len() {
            return Err(Error::IndexOutOfRange {
                index: idx,
                len: self.len(),
            });
        }
        let start = idx * self.batch_size;
        let end = (start + self.batch_size).min(self.rows.len());
        let (height, width) = self.target_size;

        let mut images = Array4::zeros((end - start, height as usize, width as usize, 3));
        let mut labels = Vec::with_capacity(end - start);
        for (slot, row) in self.rows[start..end].iter().enumerate() {
            let image = load_image(&self.directory.join(&row.filename), self.target_size)?;
            images.index_axis_mut(Axis(0), slot).assign(&image);
            labels.push(row.label.clone());
        }
        Ok(Batch { images, labels })
    }

    /// Walk the sequence from the start.
    pub fn iter(&self) -> SequenceIter<'_> {
        SequenceIter {
            sequence: self,
            next: 0,
        }
    }
}

pub struct SequenceIter<'a> {
    sequence: &'a ImageSequence,
    next: usize,
}

impl Iterator for SequenceIter<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.sequence.len() {
            return None;
        }
        let batch = self.sequence.get(self.next);
        self.next += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.sequence.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

// ---------------------------------------------------------------------------
// Image decoding
// ---------------------------------------------------------------------------

/// Decode an image as RGB, resize it (nearest neighbour) to
/// `(height, width)` and scale to `[0, 1]`.
pub fn load_image(path: &Path, target_size: (u32, u32)) -> Result<Array3<f32>> {
    let decoded = image::open(path).map_err(|source| Error::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = decoded.to_rgb8();
    let (height, width) = target_size;
    let rgb = if rgb.dimensions() == (width, height) {
        rgb
    } else {
        image::imageops::resize(&rgb, width, height, FilterType::Nearest)
    };
    Ok(rgb_to_array(&rgb))
}

/// `(height, width, 3)` array with values scaled by [`RESCALE`].
pub fn rgb_to_array(rgb: &RgbImage) -> Array3<f32> {
    let (width, height) = rgb.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        rgb.get_pixel(x as u32, y as u32).0[c] as f32 * RESCALE
    })
}
