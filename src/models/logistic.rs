//! Multinomial logistic regression trained with full-batch gradient
//! descent on the softmax cross-entropy.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::error::ModelError;
use crate::models::classifier::{self, Classifier};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    learning_rate: f32,
    max_iter: usize,
    weights: Option<Array2<f32>>,
    bias: Option<Array1<f32>>,
    classes: Vec<usize>,
}

impl SoftmaxRegression {
    pub const NAME: &'static str = "logistic-regression";
    const KNOWN_OPTIONS: &'static [&'static str] =
        &["probability", "learning_rate", "max_iter", "seed"];

    pub fn from_config(config: &TrainConfig, dry_run: bool) -> Result<Self, ModelError> {
        config.check_known(Self::KNOWN_OPTIONS)?;
        Ok(Self {
            learning_rate: config.get_f32("learning_rate", 0.1)?,
            max_iter: if dry_run {
                1
            } else {
                config.get_usize("max_iter", 200)?
            },
            weights: None,
            bias: None,
            classes: Vec::new(),
        })
    }
}

impl Classifier for SoftmaxRegression {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError> {
        classifier::check_fit_inputs(x, y)?;
        let classes = classifier::sorted_classes(y);
        let class_of = classifier::class_indices(y, &classes);
        let (n, d) = x.dim();
        let k = classes.len();

        let mut weights = Array2::<f32>::zeros((k, d));
        let mut bias = Array1::<f32>::zeros(k);
        let scale = self.learning_rate / n as f32;
        for _ in 0..self.max_iter {
            let scores = x.dot(&weights.t()) + &bias;
            let mut diff = classifier::softmax_rows(scores);
            for (i, &c) in class_of.iter().enumerate() {
                diff[[i, c]] -= 1.0;
            }
            let grad_w = diff.t().dot(x);
            let grad_b = diff.sum_axis(Axis(0));
            weights.scaled_add(-scale, &grad_w);
            bias.scaled_add(-scale, &grad_b);
        }

        self.weights = Some(weights);
        self.bias = Some(bias);
        self.classes = classes;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        let (weights, bias) = match (&self.weights, &self.bias) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(ModelError::NotFitted),
        };
        classifier::check_features(weights.ncols(), x)?;
        Ok(classifier::softmax_rows(x.dot(&weights.t()) + bias))
    }

    fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn n_features(&self) -> Option<usize> {
        self.weights.as_ref().map(|w| w.ncols())
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

    #[test]
    fn separates_two_clusters() {
        let x = array![
            [1.0, 0.0],
            [1.2, 0.1],
            [0.9, -0.1],
            [-1.0, 0.0],
            [-1.1, 0.2],
            [-0.8, -0.2],
        ];
        let y = vec![3, 3, 3, 8, 8, 8];

        let mut model =
            SoftmaxRegression::from_config(&TrainConfig::new().with("max_iter", 500), false)
                .unwrap();
        model.fit(&x, &y).unwrap();

        assert_eq!(model.classes(), &[3, 8]);
        let probs = model.predict_proba(&x).unwrap();
        for (row, &label) in probs.rows().into_iter().zip(&y) {
            let predicted = model.classes()[classifier::argmax(row)];
            assert_eq!(predicted, label);
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn predict_before_fit_fails() {
        let model = SoftmaxRegression::from_config(&TrainConfig::new(), false).unwrap();
        let err = model.predict_proba(&array![[0.0, 0.0]]).unwrap_err();
        assert_eq!(err, ModelError::NotFitted);
    }

    #[test]
    fn rejects_unknown_option() {
        let config = TrainConfig::new().with("n_estimators", 5);
        let err = SoftmaxRegression::from_config(&config, false).unwrap_err();
        assert_eq!(
            err,
            ModelError::UnsupportedOption("n_estimators".to_string())
        );
    }
}
