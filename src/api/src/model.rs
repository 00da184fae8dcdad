//! Top-3 classifier loading and inference.

use anyhow::{Context, Result};
use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::FEATURE_NAMES;

/// Number of input features
pub const NUM_FEATURES: usize = FEATURE_NAMES.len();

/// A binary classifier returning P(horse finishes in the top 3) per row.
pub trait Top3Model: Send + Sync {
    /// Predict top-3 probabilities for a batch of horses.
    ///
    /// # Arguments
    /// * `features` - 2D array of shape (n_horses, NUM_FEATURES)
    fn predict_proba(&self, features: Array2<f32>) -> Result<Vec<f64>>;

    /// Short label for diagnostics.
    fn kind(&self) -> &'static str;
}

/// ONNX export of the trained classifier.
///
/// The graph must expose the class probabilities as its second output with
/// shape `[n, 2]` (export with the zipmap disabled).
pub struct OnnxModel {
    session: Mutex<Session>,
}

impl OnnxModel {
    /// Load ONNX model from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path.as_ref())
            .context("Failed to load ONNX model")?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl Top3Model for OnnxModel {
    fn predict_proba(&self, features: Array2<f32>) -> Result<Vec<f64>> {
        let n_horses = features.nrows();
        let input_tensor = Tensor::from_array(features)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock session: {}", e))?;

        let outputs = session.run(ort::inputs![input_tensor])?;

        // Output 0 is the predicted label, output 1 the class probabilities
        if outputs.len() < 2 {
            anyhow::bail!("Expected at least 2 outputs from model");
        }

        let (shape, probs_data) = outputs[1]
            .try_extract_tensor::<f32>()
            .context("Failed to extract probability tensor")?;

        let shape_dims: Vec<i64> = shape.iter().copied().collect();
        if shape_dims.len() != 2 || shape_dims[0] as usize != n_horses || shape_dims[1] < 2 {
            anyhow::bail!(
                "Unexpected output shape: {:?}, expected [{}, 2]",
                shape_dims,
                n_horses
            );
        }

        let n_cols = shape_dims[1] as usize;
        Ok((0..n_horses)
            .map(|i| (probs_data[i * n_cols + 1] as f64).clamp(0.0, 1.0))
            .collect())
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }
}

/// Constant-probability classifier predicting the training prior for every horse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorModel {
    pub prior: f64,
}

impl PriorModel {
    pub fn new(prior: f64) -> Self {
        Self {
            prior: prior.clamp(0.0, 1.0),
        }
    }

    /// Load from JSON file: `{"prior": 0.75}`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let model: PriorModel = serde_json::from_str(&content)?;
        Ok(Self::new(model.prior))
    }
}

impl Top3Model for PriorModel {
    fn predict_proba(&self, features: Array2<f32>) -> Result<Vec<f64>> {
        if features.ncols() != NUM_FEATURES {
            anyhow::bail!(
                "Expected {} features, got {}",
                NUM_FEATURES,
                features.ncols()
            );
        }
        Ok(vec![self.prior; features.nrows()])
    }

    fn kind(&self) -> &'static str {
        "prior"
    }
}

/// Thread-safe model handle for use in web handlers.
pub type SharedModel = Arc<dyn Top3Model>;

/// Load a model, choosing the backend from the file extension.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<SharedModel> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("onnx") => Ok(Arc::new(OnnxModel::load(path)?)),
        Some("json") => Ok(Arc::new(PriorModel::from_file(path)?)),
        _ => anyhow::bail!("Unsupported model format: {}", path.display()),
    }
}
