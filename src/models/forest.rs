//! Bagged random forest over the CART machinery in [`tree`](super::tree).

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::error::ModelError;
use crate::models::classifier::{self, Classifier};
use crate::models::tree::{best_gini_split, grow, GrowParams, Node};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_estimators: usize,
    max_depth: Option<usize>,
    seed: u64,
    trees: Vec<Node>,
    classes: Vec<usize>,
    n_features: Option<usize>,
}

impl RandomForest {
    pub const NAME: &'static str = "random-forest";
    const KNOWN_OPTIONS: &'static [&'static str] =
        &["probability", "n_estimators", "max_depth", "seed"];

    pub fn from_config(config: &TrainConfig, dry_run: bool) -> Result<Self, ModelError> {
        config.check_known(Self::KNOWN_OPTIONS)?;
        let n_estimators = if dry_run {
            1
        } else {
            config.get_usize("n_estimators", 10)?
        };
        if n_estimators == 0 {
            return Err(ModelError::InvalidConfig {
                option: "n_estimators".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            n_estimators,
            max_depth: config.get_usize_opt("max_depth")?,
            seed: config.get_u64("seed", 0)?,
            trees: Vec::new(),
            classes: Vec::new(),
            n_features: None,
        })
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError> {
        classifier::check_fit_inputs(x, y)?;
        let classes = classifier::sorted_classes(y);
        let class_of = classifier::class_indices(y, &classes);
        let n = x.nrows();
        let k = classes.len();
        let params = GrowParams {
            max_depth: self.max_depth.unwrap_or(usize::MAX),
            min_samples_split: 2,
        };

        // One RNG per tree, seeded from the base seed, so a forest of any
        // size reproduces exactly.
        let seed = self.seed;
        let trees: Vec<Node> = (0..self.n_estimators)
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                grow(
                    x,
                    &class_of,
                    k,
                    bootstrap,
                    0,
                    &params,
                    &mut |x, rows, class_of, k| best_gini_split(x, rows, class_of, k),
                )
            })
            .collect();

        self.trees = trees;
        self.classes = classes;
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::NotFitted);
        }
        let expected = self.n_features.ok_or(ModelError::NotFitted)?;
        classifier::check_features(expected, x)?;
        let k = self.classes.len();

        let mut probs = Array2::<f32>::zeros((x.nrows(), k));
        for (i, row) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                for (c, p) in tree.probs_for(row).iter().enumerate() {
                    probs[[i, c]] += *p;
                }
            }
        }
        probs /= self.trees.len() as f32;
        Ok(probs)
    }

    fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
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
                [0.0, 0.0],
                [0.2, 0.1],
                [-0.1, 0.2],
                [0.1, -0.2],
                [5.0, 5.0],
                [5.2, 4.9],
                [4.8, 5.1],
                [5.1, 5.2],
            ],
            vec![0, 0, 0, 0, 1, 1, 1, 1],
        )
    }

    #[test]
    fn forest_classifies_separable_clusters() {
        let (x, y) = clusters();
        let config = TrainConfig::new().with("n_estimators", 5);
        let mut model = RandomForest::from_config(&config, false).unwrap();
        model.fit(&x, &y).unwrap();

        let probs = model.predict_proba(&x).unwrap();
        for (row, &label) in probs.rows().into_iter().zip(&y) {
            assert_eq!(model.classes()[classifier::argmax(row)], label);
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn forest_is_reproducible_for_a_seed() {
        let (x, y) = clusters();
        let config = TrainConfig::new().with("n_estimators", 4).with("seed", 3);
        let mut a = RandomForest::from_config(&config, false).unwrap();
        let mut b = RandomForest::from_config(&config, false).unwrap();
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn zero_estimators_is_invalid() {
        let config = TrainConfig::new().with("n_estimators", 0);
        let err = RandomForest::from_config(&config, false).unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig { .. }));
    }
}
