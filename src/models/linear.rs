//! Online linear classifiers: perceptron, log-loss SGD, and
//! passive-aggressive (PA-I).
//!
//! All three share a weight matrix with one row per class and predict by
//! arg-max margin. The perceptron and passive-aggressive variants are
//! margin-only models: they reject the `probability` construction option
//! and convert decision scores with a softmax when probabilities are
//! requested.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::error::ModelError;
use crate::models::classifier::{self, Classifier};

/// Fitted state shared by the linear models.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearState {
    weights: Array2<f32>,
    bias: Array1<f32>,
    classes: Vec<usize>,
}

impl LinearState {
    fn zeros(k: usize, d: usize, classes: Vec<usize>) -> Self {
        Self {
            weights: Array2::zeros((k, d)),
            bias: Array1::zeros(k),
            classes,
        }
    }

    fn margins(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weights.t()) + &self.bias
    }

    fn proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        classifier::check_features(self.weights.ncols(), x)?;
        Ok(classifier::softmax_rows(self.margins(x)))
    }
}

fn fitted(state: &Option<LinearState>) -> Result<&LinearState, ModelError> {
    state.as_ref().ok_or(ModelError::NotFitted)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Perceptron {
    epochs: usize,
    state: Option<LinearState>,
}

impl Perceptron {
    pub const NAME: &'static str = "perceptron";
    const KNOWN_OPTIONS: &'static [&'static str] = &["epochs", "seed"];

    pub fn from_config(config: &TrainConfig, dry_run: bool) -> Result<Self, ModelError> {
        config.check_known(Self::KNOWN_OPTIONS)?;
        Ok(Self {
            epochs: if dry_run {
                1
            } else {
                config.get_usize("epochs", 50)?
            },
            state: None,
        })
    }
}

impl Classifier for Perceptron {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError> {
        classifier::check_fit_inputs(x, y)?;
        let classes = classifier::sorted_classes(y);
        let class_of = classifier::class_indices(y, &classes);
        let mut state = LinearState::zeros(classes.len(), x.ncols(), classes);

        for _ in 0..self.epochs {
            for (i, x_i) in x.rows().into_iter().enumerate() {
                let scores = state.weights.dot(&x_i) + &state.bias;
                let predicted = classifier::argmax(scores.view());
                let truth = class_of[i];
                if predicted != truth {
                    state.weights.row_mut(truth).scaled_add(1.0, &x_i);
                    state.bias[truth] += 1.0;
                    state.weights.row_mut(predicted).scaled_add(-1.0, &x_i);
                    state.bias[predicted] -= 1.0;
                }
            }
        }

        self.state = Some(state);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        fitted(&self.state)?.proba(x)
    }

    fn classes(&self) -> &[usize] {
        match &self.state {
            Some(state) => &state.classes,
            None => &[],
        }
    }

    fn n_features(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.weights.ncols())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Linear classifier trained with per-sample gradient steps on the
/// softmax log loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SgdClassifier {
    learning_rate: f32,
    epochs: usize,
    state: Option<LinearState>,
}

impl SgdClassifier {
    pub const NAME: &'static str = "sgd";
    const KNOWN_OPTIONS: &'static [&'static str] =
        &["probability", "learning_rate", "epochs", "seed"];

    pub fn from_config(config: &TrainConfig, dry_run: bool) -> Result<Self, ModelError> {
        config.check_known(Self::KNOWN_OPTIONS)?;
        Ok(Self {
            learning_rate: config.get_f32("learning_rate", 0.01)?,
            epochs: if dry_run {
                1
            } else {
                config.get_usize("epochs", 20)?
            },
            state: None,
        })
    }
}

impl Classifier for SgdClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError> {
        classifier::check_fit_inputs(x, y)?;
        let classes = classifier::sorted_classes(y);
        let class_of = classifier::class_indices(y, &classes);
        let k = classes.len();
        let mut state = LinearState::zeros(k, x.ncols(), classes);

        for _ in 0..self.epochs {
            for (i, x_i) in x.rows().into_iter().enumerate() {
                let mut probs = state.weights.dot(&x_i) + &state.bias;
                classifier::softmax_inplace(&mut probs);
                for c in 0..k {
                    let diff = probs[c] - if c == class_of[i] { 1.0 } else { 0.0 };
                    state
                        .weights
                        .row_mut(c)
                        .scaled_add(-self.learning_rate * diff, &x_i);
                    state.bias[c] -= self.learning_rate * diff;
                }
            }
        }

        self.state = Some(state);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        fitted(&self.state)?.proba(x)
    }

    fn classes(&self) -> &[usize] {
        match &self.state {
            Some(state) => &state.classes,
            None => &[],
        }
    }

    fn n_features(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.weights.ncols())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Multiclass passive-aggressive classifier (PA-I updates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassiveAggressive {
    aggressiveness: f32,
    epochs: usize,
    state: Option<LinearState>,
}

impl PassiveAggressive {
    pub const NAME: &'static str = "passive-aggressive";
    const KNOWN_OPTIONS: &'static [&'static str] = &["c", "epochs", "seed"];

    pub fn from_config(config: &TrainConfig, dry_run: bool) -> Result<Self, ModelError> {
        config.check_known(Self::KNOWN_OPTIONS)?;
        Ok(Self {
            aggressiveness: config.get_f32("c", 1.0)?,
            epochs: if dry_run {
                1
            } else {
                config.get_usize("epochs", 50)?
            },
            state: None,
        })
    }
}

impl Classifier for PassiveAggressive {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError> {
        classifier::check_fit_inputs(x, y)?;
        let classes = classifier::sorted_classes(y);
        let class_of = classifier::class_indices(y, &classes);
        let k = classes.len();
        let mut state = LinearState::zeros(k, x.ncols(), classes);

        if k > 1 {
            for _ in 0..self.epochs {
                for (i, x_i) in x.rows().into_iter().enumerate() {
                    let scores = state.weights.dot(&x_i) + &state.bias;
                    let truth = class_of[i];
                    let mut rival = if truth == 0 { 1 } else { 0 };
                    for c in 0..k {
                        if c != truth && scores[c] > scores[rival] {
                            rival = c;
                        }
                    }
                    let loss = (1.0 - (scores[truth] - scores[rival])).max(0.0);
                    if loss > 0.0 {
                        let norm_sq: f32 = x_i.dot(&x_i);
                        let tau = (loss / (2.0 * norm_sq + f32::EPSILON))
                            .min(self.aggressiveness);
                        state.weights.row_mut(truth).scaled_add(tau, &x_i);
                        state.bias[truth] += tau;
                        state.weights.row_mut(rival).scaled_add(-tau, &x_i);
                        state.bias[rival] -= tau;
                    }
                }
            }
        }

        self.state = Some(state);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        fitted(&self.state)?.proba(x)
    }

    fn classes(&self) -> &[usize] {
        match &self.state {
            Some(state) => &state.classes,
            None => &[],
        }
    }

    fn n_features(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.weights.ncols())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn clusters() -> (Array2<f32>, Vec<usize>) {
        (
            array![
                [2.0, 0.1],
                [1.8, -0.2],
                [2.2, 0.0],
                [-2.0, 0.2],
                [-1.9, -0.1],
                [-2.1, 0.1],
            ],
            vec![0, 0, 0, 1, 1, 1],
        )
    }

    fn assert_learns(model: &mut dyn Classifier) {
        let (x, y) = clusters();
        model.fit(&x, &y).unwrap();
        let probs = model.predict_proba(&x).unwrap();
        for (row, &label) in probs.rows().into_iter().zip(&y) {
            assert_eq!(model.classes()[classifier::argmax(row)], label);
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn perceptron_learns_separable_data() {
        let mut model = Perceptron::from_config(&TrainConfig::new(), false).unwrap();
        assert_learns(&mut model);
    }

    #[test]
    fn sgd_learns_separable_data() {
        let mut model = SgdClassifier::from_config(&TrainConfig::new(), false).unwrap();
        assert_learns(&mut model);
    }

    #[test]
    fn passive_aggressive_learns_separable_data() {
        let mut model = PassiveAggressive::from_config(&TrainConfig::new(), false).unwrap();
        assert_learns(&mut model);
    }

    #[test]
    fn margin_models_reject_probability_option() {
        let config = TrainConfig::new().with("probability", true);
        let err = Perceptron::from_config(&config, false).unwrap_err();
        assert_eq!(err, ModelError::UnsupportedOption("probability".to_string()));
        let err = PassiveAggressive::from_config(&config, false).unwrap_err();
        assert_eq!(err, ModelError::UnsupportedOption("probability".to_string()));
    }

    #[test]
    fn sgd_accepts_probability_option() {
        let config = TrainConfig::new().with("probability", true);
        assert!(SgdClassifier::from_config(&config, false).is_ok());
    }

    #[test]
    fn single_class_training_yields_certain_predictions() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = vec![5, 5];
        let mut model = PassiveAggressive::from_config(&TrainConfig::new(), false).unwrap();
        model.fit(&x, &y).unwrap();
        let probs = model.predict_proba(&x).unwrap();
        assert_eq!(probs.dim(), (2, 1));
        assert_eq!(probs[[0, 0]], 1.0);
    }
}
