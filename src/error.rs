use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed document or missing key (the message names the key).
    #[error("parsing config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported config extension: .{0}")]
    UnsupportedFormat(String),

    #[error("invalid config value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Errors raised by the explanation pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("loading image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("model '{model}': {message}")]
    Model { model: String, message: String },

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("cannot explain an empty image")]
    EmptyImage,

    #[error("label {0} is not part of this explanation")]
    UnknownLabel(usize),

    #[error("persisting explainer to {path}: {message}")]
    Persist { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn model(model: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Model {
            model: model.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn shape(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> Self {
        Error::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
