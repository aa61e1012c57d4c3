//! Binary image classifiers.
//!
//! [`BinaryClassifier`] is the seam the rest of the crate depends on;
//! [`OnnxClassifier`] is the production implementation backed by ONNX Runtime.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::{Array1, Array4};
use ort::logging::LogLevel;
use ort::session::{Session, SessionInputs};
use ort::value::TensorRef;

use crate::error::{Error, Result};

/// A model producing one sigmoid probability per image.
pub trait BinaryClassifier {
    /// Score a `(batch, height, width, 3)` batch; returns one value per image.
    fn predict(&self, batch: &Array4<f32>) -> Result<Array1<f32>>;
}

impl<C: BinaryClassifier + ?Sized> BinaryClassifier for &C {
    fn predict(&self, batch: &Array4<f32>) -> Result<Array1<f32>> {
        (**self).predict(batch)
    }
}

impl<C: BinaryClassifier + ?Sized> BinaryClassifier for Box<C> {
    fn predict(&self, batch: &Array4<f32>) -> Result<Array1<f32>> {
        (**self).predict(batch)
    }
}

// ---------------------------------------------------------------------------
// ONNX Runtime classifier
// ---------------------------------------------------------------------------

/// Inference-only classifier loaded from an ONNX export of the trained model.
///
/// The export carries the forward graph only, so nothing from training
/// (optimizer state, loss) is loaded.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    model_path: PathBuf,
    model_name: String,
    input_name: String,
    output_name: String,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("model_path", &self.model_path)
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .finish()
    }
}

impl OnnxClassifier {
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self> {
        let path = model_path.as_ref();
        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();
        let load_err = |e: ort::Error| {
            Error::model(
                &model_name,
                format!("failed to create ONNX session from {}: {e}", path.display()),
            )
        };

        let session = Session::builder()
            .and_then(|b| b.with_log_level(LogLevel::Error))
            .and_then(|b| b.commit_from_file(path))
            .map_err(load_err)?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| Error::model(&model_name, "model declares no inputs"))?;
        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| Error::model(&model_name, "model declares no outputs"))?;

        log::info!(
            "Loaded model '{model_name}' from {} (input '{input_name}', output '{output_name}')",
            path.display()
        );

        Ok(OnnxClassifier {
            session: Mutex::new(session),
            model_path: path.to_path_buf(),
            model_name,
            input_name,
            output_name,
        })
    }
}

impl BinaryClassifier for OnnxClassifier {
    fn predict(&self, batch: &Array4<f32>) -> Result<Array1<f32>> {
        let n = batch.len_of(ndarray::Axis(0));
        let contiguous = batch.as_standard_layout();
        let data = contiguous
            .as_slice()
            .ok_or_else(|| Error::model(&self.model_name, "input batch is not contiguous"))?;
        let dims: Vec<i64> = batch.shape().iter().map(|&d| d as i64).collect();
        let tensor = TensorRef::from_array_view((dims, data))
            .map_err(|e| Error::model(&self.model_name, format!("building input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::model(&self.model_name, "session lock poisoned"))?;

        let inputs: SessionInputs<'_, '_, 0> =
            SessionInputs::ValueMap(vec![(Cow::Borrowed(self.input_name.as_str()), tensor.into())]);
        let outputs = session.run(inputs).map_err(|e| {
            Error::model(
                &self.model_name,
                format!("forward pass failed for input shape {:?}: {e}", batch.shape()),
            )
        })?;

        let (shape, values) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::model(&self.model_name, format!("reading output: {e}")))?;
        let shape: Vec<i64> = shape.iter().copied().collect();
        check_output_shape(&shape, n)?;
        Ok(Array1::from_vec(values.to_vec()))
    }
}

/// Accept one score per image: `[N]` or `[N, 1]`.
fn check_output_shape(shape: &[i64], n: usize) -> Result<()> {
    let single_column = match shape {
        [rows] | [rows, 1] => usize::try_from(*rows).is_ok_and(|rows| rows == n),
        _ => false,
    };
    if single_column {
        Ok(())
    } else {
        Err(Error::shape(format!("[{n}] or [{n}, 1]"), format!("{shape:?}")))
    }
}
