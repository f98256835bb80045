//! K-nearest-neighbors classification.

use std::cmp::Ordering;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::error::ModelError;
use crate::models::classifier::{self, Classifier};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNeighborsClassifier {
    n_neighbors: usize,
    state: Option<KnnState>,
}

/// KNN keeps the full training set; its "fitted parameters" are the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KnnState {
    x: Array2<f32>,
    class_of: Vec<usize>,
    classes: Vec<usize>,
}

impl KNeighborsClassifier {
    pub const NAME: &'static str = "k-neighbors";
    const KNOWN_OPTIONS: &'static [&'static str] = &["probability", "n_neighbors", "seed"];

    pub fn from_config(config: &TrainConfig, _dry_run: bool) -> Result<Self, ModelError> {
        config.check_known(Self::KNOWN_OPTIONS)?;
        let n_neighbors = config.get_usize("n_neighbors", 5)?;
        if n_neighbors == 0 {
            return Err(ModelError::InvalidConfig {
                option: "n_neighbors".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            n_neighbors,
            state: None,
        })
    }
}

fn squared_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let mut dist = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = x - y;
        dist += d * d;
    }
    dist
}

impl Classifier for KNeighborsClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError> {
        classifier::check_fit_inputs(x, y)?;
        let classes = classifier::sorted_classes(y);
        let class_of = classifier::class_indices(y, &classes);
        self.state = Some(KnnState {
            x: x.clone(),
            class_of,
            classes,
        });
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        let state = self.state.as_ref().ok_or(ModelError::NotFitted)?;
        classifier::check_features(state.x.ncols(), x)?;
        let k = self.n_neighbors.min(state.x.nrows());
        let n_classes = state.classes.len();

        let mut probs = Array2::<f32>::zeros((x.nrows(), n_classes));
        for (i, query) in x.rows().into_iter().enumerate() {
            let mut distances: Vec<(f32, usize)> = state
                .x
                .rows()
                .into_iter()
                .enumerate()
                .map(|(j, row)| (squared_distance(query, row), j))
                .collect();
            // ties broken by training index so votes are deterministic
            distances.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.1.cmp(&b.1))
            });
            for &(_, j) in distances.iter().take(k) {
                probs[[i, state.class_of[j]]] += 1.0;
            }
            for c in 0..n_classes {
                probs[[i, c]] /= k as f32;
            }
        }
        Ok(probs)
    }

    fn classes(&self) -> &[usize] {
        match &self.state {
            Some(state) => &state.classes,
            None => &[],
        }
    }

    fn n_features(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.x.ncols())
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
    fn single_neighbor_memorizes_training_data() {
        let x = array![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
        let y = vec![2, 5, 9];
        let config = TrainConfig::new().with("n_neighbors", 1);
        let mut model = KNeighborsClassifier::from_config(&config, false).unwrap();
        model.fit(&x, &y).unwrap();

        let probs = model.predict_proba(&x).unwrap();
        for (row, &label) in probs.rows().into_iter().zip(&y) {
            assert_eq!(model.classes()[classifier::argmax(row)], label);
            assert_eq!(row.iter().copied().fold(f32::MIN, f32::max), 1.0);
        }
    }

    #[test]
    fn vote_fractions_sum_to_one() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = vec![0, 0, 1, 1];
        let config = TrainConfig::new().with("n_neighbors", 3);
        let mut model = KNeighborsClassifier::from_config(&config, false).unwrap();
        model.fit(&x, &y).unwrap();

        let probs = model.predict_proba(&array![[1.4]]).unwrap();
        let sum: f32 = probs.row(0).iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        // neighbors 1.0, 2.0, 0.0 vote 2:1 for class 0
        assert!((probs[[0, 0]] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn zero_neighbors_is_invalid() {
        let config = TrainConfig::new().with("n_neighbors", 0);
        let err = KNeighborsClassifier::from_config(&config, false).unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig { .. }));
    }
}
