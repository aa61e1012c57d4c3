/// Data layer: split tables, filename validation and the image sequence.
///
/// Architecture:
/// ```text
///  train_set.csv / test_set.csv (.json / .parquet)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → ExampleTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  drop rows whose image is missing → validated indices
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ ImageSequence │  decode + resize + rescale → (image, label) batches
///   └──────────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod sequence;

pub use loader::load_table;
pub use model::{CellValue, ExampleRow, ExampleTable};
pub use sequence::{Batch, ImageSequence};
