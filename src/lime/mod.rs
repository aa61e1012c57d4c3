//! Local Interpretable Model-agnostic Explanations for images.
//!
//! ```text
//!  image ──► segmentation ──► superpixels
//!                                │
//!             random on/off masks (row 0 = all on)
//!                                │
//!                                ▼
//!            perturbed images ──► ScoreBatch ──► class probabilities
//!                                │
//!        cosine distance to row 0 ─► kernel weights
//!                                │
//!                                ▼
//!      feature selection ──► weighted ridge per class ──► ImageExplanation
//! ```

mod explainer;
mod explanation;
pub mod regression;
pub mod segmentation;
mod selection;

pub use explainer::{ExplainParams, LimeImageExplainer};
pub use explanation::{ImageExplanation, LabelExplanation, MaskSign};
pub use segmentation::{GridSegmenter, QuickShift, Segmenter};
pub use selection::FeatureSelection;
