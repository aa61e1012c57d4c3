//! LIME superpixel explanations for a binary chest X-ray classifier.
//!
//! Construction order is fixed: config → tables → image sequence →
//! explainer → model, all held by [`ExplainContext`].

pub mod adapter;
pub mod classifier;
pub mod config;
pub mod data;
pub mod error;
pub mod lime;
pub mod pipeline;

pub use adapter::{ProbabilityAdapter, ScoreBatch};
pub use classifier::{BinaryClassifier, OnnxClassifier};
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use lime::{ExplainParams, FeatureSelection, ImageExplanation, LimeImageExplainer};
pub use pipeline::ExplainContext;
