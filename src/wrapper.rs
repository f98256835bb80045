//! The uniform model contract.
//!
//! Every fitted backend exposes the same prediction, inspection, and
//! deployment surface regardless of which library sits underneath.
//! Handles reach the fitted state through exactly one of two paths —
//! training or loading persisted artifacts — so an unfitted handle has
//! no `predict` to misuse.

use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::classical::FittedImageClassifier;
use crate::error::ModelError;
use crate::models::factory;
use crate::serve::{self, ServeConfig};

/// Output of a prediction: the arg-max class index over the whole
/// probability matrix plus the full per-sample probability rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_class: usize,
    pub probabilities: Vec<Vec<f32>>,
}

impl Prediction {
    /// Build the record from a `(samples, classes)` probability matrix.
    ///
    /// `predicted_class` is the flat row-major arg-max index, matching
    /// how callers of a single-sample batch read off the class directly.
    pub fn from_probabilities(probs: &ndarray::Array2<f32>) -> Self {
        let mut predicted_class = 0;
        let mut best = f32::NEG_INFINITY;
        for (i, &p) in probs.iter().enumerate() {
            if p > best {
                best = p;
                predicted_class = i;
            }
        }
        Self {
            predicted_class,
            probabilities: probs.rows().into_iter().map(|row| row.to_vec()).collect(),
        }
    }
}

/// Capability contract for fitted models.
pub trait ModelWrapper: Send + Sync + 'static {
    /// Run a batch of images (NCHW) through the model.
    fn predict(&self, images: &Array4<f32>) -> Result<Prediction>;

    /// Backend-native objects keyed by logical name (`"model"`,
    /// `"scaler"`, …), for inspection outside the contract.
    fn raw(&self) -> HashMap<&'static str, &dyn Any>;

    /// Serve the model over HTTP; blocks until externally terminated.
    fn deploy(self: Arc<Self>, config: ServeConfig) -> Result<()>
    where
        Self: Sized,
    {
        serve::run(self, &config)
    }
}

/// Reconstruct a fitted handle from persisted artifacts, dispatching on
/// the model name across backend registries.
pub fn load(out_dir: &Path, model_name: &str) -> Result<Box<dyn ModelWrapper>> {
    if factory::is_supported(model_name) {
        Ok(Box::new(FittedImageClassifier::load(out_dir, model_name)?))
    } else {
        Err(ModelError::UnknownModel(model_name.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn predicted_class_is_the_flat_argmax() {
        let probs = array![[0.1, 0.2, 0.7], [0.05, 0.9, 0.05]];
        let prediction = Prediction::from_probabilities(&probs);
        // 0.9 sits at flat index 4 (row 1, column 1)
        assert_eq!(prediction.predicted_class, 4);
        assert_eq!(prediction.probabilities.len(), 2);
        assert_eq!(prediction.probabilities[0], vec![0.1, 0.2, 0.7]);
    }

    #[test]
    fn prediction_serializes_as_a_flat_record() {
        let probs = array![[0.25, 0.75]];
        let prediction = Prediction::from_probabilities(&probs);
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["predicted_class"], 1);
        assert!(json["probabilities"].is_array());
    }
}
