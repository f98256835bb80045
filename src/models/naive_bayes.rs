//! Gaussian naive Bayes.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::error::ModelError;
use crate::models::classifier::{self, Classifier};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNb {
    var_smoothing: f32,
    state: Option<NbState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NbState {
    classes: Vec<usize>,
    log_priors: Vec<f32>,
    /// Per-class feature means, one row per class.
    theta: Array2<f32>,
    /// Per-class feature variances with the smoothing term added.
    sigma2: Array2<f32>,
}

impl GaussianNb {
    pub const NAME: &'static str = "gaussian-nb";
    const KNOWN_OPTIONS: &'static [&'static str] = &["probability", "var_smoothing", "seed"];

    pub fn from_config(config: &TrainConfig, _dry_run: bool) -> Result<Self, ModelError> {
        config.check_known(Self::KNOWN_OPTIONS)?;
        Ok(Self {
            var_smoothing: config.get_f32("var_smoothing", 1e-9)?,
            state: None,
        })
    }
}

impl Classifier for GaussianNb {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError> {
        classifier::check_fit_inputs(x, y)?;
        let classes = classifier::sorted_classes(y);
        let class_of = classifier::class_indices(y, &classes);
        let (n, d) = x.dim();
        let k = classes.len();

        // Largest feature variance over the whole training set scales the
        // smoothing term, so near-constant features stay numerically sane.
        let mut global_mean = vec![0.0f32; d];
        for row in x.rows() {
            for (j, v) in row.iter().enumerate() {
                global_mean[j] += *v;
            }
        }
        for v in global_mean.iter_mut() {
            *v /= n as f32;
        }
        let mut max_var = 0.0f32;
        for j in 0..d {
            let mut var = 0.0;
            for row in x.rows() {
                let diff = row[j] - global_mean[j];
                var += diff * diff;
            }
            max_var = max_var.max(var / n as f32);
        }
        let eps = if max_var > 0.0 {
            self.var_smoothing * max_var
        } else {
            self.var_smoothing
        };

        let mut counts = vec![0usize; k];
        let mut theta = Array2::<f32>::zeros((k, d));
        let mut sigma2 = Array2::<f32>::zeros((k, d));
        for (i, row) in x.rows().into_iter().enumerate() {
            let c = class_of[i];
            counts[c] += 1;
            for (j, v) in row.iter().enumerate() {
                theta[[c, j]] += *v;
            }
        }
        for c in 0..k {
            for j in 0..d {
                theta[[c, j]] /= counts[c] as f32;
            }
        }
        for (i, row) in x.rows().into_iter().enumerate() {
            let c = class_of[i];
            for (j, v) in row.iter().enumerate() {
                let diff = *v - theta[[c, j]];
                sigma2[[c, j]] += diff * diff;
            }
        }
        for c in 0..k {
            for j in 0..d {
                sigma2[[c, j]] = sigma2[[c, j]] / counts[c] as f32 + eps;
            }
        }

        let log_priors = counts
            .iter()
            .map(|&count| (count as f32 / n as f32).ln())
            .collect();

        self.state = Some(NbState {
            classes,
            log_priors,
            theta,
            sigma2,
        });
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        let state = self.state.as_ref().ok_or(ModelError::NotFitted)?;
        classifier::check_features(state.theta.ncols(), x)?;
        let k = state.classes.len();
        let d = state.theta.ncols();

        let mut scores = Array2::<f32>::zeros((x.nrows(), k));
        for (i, row) in x.rows().into_iter().enumerate() {
            for c in 0..k {
                let mut ll = state.log_priors[c];
                for j in 0..d {
                    let s2 = state.sigma2[[c, j]];
                    let diff = row[j] - state.theta[[c, j]];
                    ll -= 0.5 * (2.0 * std::f32::consts::PI * s2).ln();
                    ll -= diff * diff / (2.0 * s2);
                }
                scores[[i, c]] = ll;
            }
        }
        Ok(classifier::softmax_rows(scores))
    }

    fn classes(&self) -> &[usize] {
        match &self.state {
            Some(state) => &state.classes,
            None => &[],
        }
    }

    fn n_features(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.theta.ncols())
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
