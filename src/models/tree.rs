//! CART-style decision trees: the exhaustive-split variant and the
//! extremely-randomized variant, sharing one node representation and
//! growing routine. The random forest bags the same machinery.

use std::cmp::Ordering;

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::error::ModelError;
use crate::models::classifier::{self, Classifier};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Node {
    Leaf {
        probs: Vec<f32>,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub(crate) fn probs_for<'a>(&'a self, sample: ArrayView1<'_, f32>) -> &'a [f32] {
        match self {
            Node::Leaf { probs } => probs,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    left.probs_for(sample)
                } else {
                    right.probs_for(sample)
                }
            }
        }
    }
}

pub(crate) struct GrowParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
}

fn class_counts(rows: &[usize], class_of: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in rows {
        counts[class_of[i]] += 1;
    }
    counts
}

fn gini(counts: &[usize], total: usize) -> f32 {
    let t = total as f32;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f32 / t;
            p * p
        })
        .sum::<f32>()
}

/// Recursively grow a tree over `rows`. `choose_split` picks the split
/// (feature, threshold) or `None` when no useful split exists.
pub(crate) fn grow<F>(
    x: &Array2<f32>,
    class_of: &[usize],
    n_classes: usize,
    rows: Vec<usize>,
    depth: usize,
    params: &GrowParams,
    choose_split: &mut F,
) -> Node
where
    F: FnMut(&Array2<f32>, &[usize], &[usize], usize) -> Option<(usize, f32)>,
{
    let counts = class_counts(&rows, class_of, n_classes);
    let probs: Vec<f32> = counts
        .iter()
        .map(|&c| c as f32 / rows.len() as f32)
        .collect();

    let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
    if pure || depth >= params.max_depth || rows.len() < params.min_samples_split {
        return Node::Leaf { probs };
    }
    let Some((feature, threshold)) = choose_split(x, &rows, class_of, n_classes) else {
        return Node::Leaf { probs };
    };
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&i| x[[i, feature]] <= threshold);
    if left_rows.is_empty() || right_rows.is_empty() {
        return Node::Leaf { probs };
    }
    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(
            x,
            class_of,
            n_classes,
            left_rows,
            depth + 1,
            params,
            choose_split,
        )),
        right: Box::new(grow(
            x,
            class_of,
            n_classes,
            right_rows,
            depth + 1,
            params,
            choose_split,
        )),
    }
}

/// Exhaustive gini split: every feature, every boundary between distinct
/// consecutive values.
pub(crate) fn best_gini_split(
    x: &Array2<f32>,
    rows: &[usize],
    class_of: &[usize],
    n_classes: usize,
) -> Option<(usize, f32)> {
    let total = rows.len();
    let parent_counts = class_counts(rows, class_of, n_classes);
    let parent = gini(&parent_counts, total);
    let mut best: Option<(usize, f32, f32)> = None;

    for feature in 0..x.ncols() {
        let mut ordered: Vec<(f32, usize)> = rows
            .iter()
            .map(|&i| (x[[i, feature]], class_of[i]))
            .collect();
        ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let mut left = vec![0usize; n_classes];
        let mut right = parent_counts.clone();
        for i in 0..total - 1 {
            let (value, class) = ordered[i];
            left[class] += 1;
            right[class] -= 1;
            let next = ordered[i + 1].0;
            if next == value {
                continue;
            }
            let nl = i + 1;
            let nr = total - nl;
            let impurity =
                (nl as f32 * gini(&left, nl) + nr as f32 * gini(&right, nr)) / total as f32;
            let threshold = (value + next) / 2.0;
            match best {
                Some((_, _, b)) if impurity >= b => {}
                _ => best = Some((feature, threshold, impurity)),
            }
        }
    }

    best.and_then(|(feature, threshold, impurity)| {
        (impurity < parent - 1e-7).then_some((feature, threshold))
    })
}

/// Extra-trees split: one uniformly random threshold per non-constant
/// feature, keep the candidate with the lowest impurity.
pub(crate) fn random_split(
    x: &Array2<f32>,
    rows: &[usize],
    class_of: &[usize],
    n_classes: usize,
    rng: &mut StdRng,
) -> Option<(usize, f32)> {
    let total = rows.len();
    let parent_counts = class_counts(rows, class_of, n_classes);
    let parent = gini(&parent_counts, total);
    let mut best: Option<(usize, f32, f32)> = None;

    for feature in 0..x.ncols() {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &i in rows {
            let v = x[[i, feature]];
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if lo >= hi {
            continue;
        }
        let threshold = rng.gen_range(lo..hi);

        let mut left = vec![0usize; n_classes];
        let mut nl = 0usize;
        for &i in rows {
            if x[[i, feature]] <= threshold {
                left[class_of[i]] += 1;
                nl += 1;
            }
        }
        let nr = total - nl;
        if nl == 0 || nr == 0 {
            continue;
        }
        let right: Vec<usize> = parent_counts
            .iter()
            .zip(&left)
            .map(|(p, l)| p - l)
            .collect();
        let impurity =
            (nl as f32 * gini(&left, nl) + nr as f32 * gini(&right, nr)) / total as f32;
        match best {
            Some((_, _, b)) if impurity >= b => {}
            _ => best = Some((feature, threshold, impurity)),
        }
    }

    best.and_then(|(feature, threshold, impurity)| {
        (impurity < parent - 1e-7).then_some((feature, threshold))
    })
}

pub(crate) fn predict_with_tree(
    root: &Node,
    x: &Array2<f32>,
    n_classes: usize,
) -> Array2<f32> {
    let mut probs = Array2::<f32>::zeros((x.nrows(), n_classes));
    for (i, row) in x.rows().into_iter().enumerate() {
        for (c, p) in root.probs_for(row).iter().enumerate() {
            probs[[i, c]] = *p;
        }
    }
    probs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    max_depth: Option<usize>,
    min_samples_split: usize,
    root: Option<Node>,
    classes: Vec<usize>,
    n_features: Option<usize>,
}

impl DecisionTree {
    pub const NAME: &'static str = "decision-tree";
    const KNOWN_OPTIONS: &'static [&'static str] =
        &["probability", "max_depth", "min_samples_split", "seed"];

    pub fn from_config(config: &TrainConfig, dry_run: bool) -> Result<Self, ModelError> {
        config.check_known(Self::KNOWN_OPTIONS)?;
        Ok(Self {
            max_depth: if dry_run {
                Some(1)
            } else {
                config.get_usize_opt("max_depth")?
            },
            min_samples_split: config.get_usize("min_samples_split", 2)?,
            root: None,
            classes: Vec::new(),
            n_features: None,
        })
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError> {
        classifier::check_fit_inputs(x, y)?;
        let classes = classifier::sorted_classes(y);
        let class_of = classifier::class_indices(y, &classes);
        let params = GrowParams {
            max_depth: self.max_depth.unwrap_or(usize::MAX),
            min_samples_split: self.min_samples_split,
        };
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let root = grow(
            x,
            &class_of,
            classes.len(),
            rows,
            0,
            &params,
            &mut |x, rows, class_of, k| best_gini_split(x, rows, class_of, k),
        );
        self.root = Some(root);
        self.classes = classes;
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        let root = self.root.as_ref().ok_or(ModelError::NotFitted)?;
        let expected = self.n_features.ok_or(ModelError::NotFitted)?;
        classifier::check_features(expected, x)?;
        Ok(predict_with_tree(root, x, self.classes.len()))
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

/// Extremely randomized tree: thresholds are drawn at random rather than
/// searched, which keeps fitting cheap and decorrelates trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraTree {
    max_depth: Option<usize>,
    min_samples_split: usize,
    seed: u64,
    root: Option<Node>,
    classes: Vec<usize>,
    n_features: Option<usize>,
}

impl ExtraTree {
    pub const NAME: &'static str = "extra-tree";
    const KNOWN_OPTIONS: &'static [&'static str] =
        &["probability", "max_depth", "min_samples_split", "seed"];

    pub fn from_config(config: &TrainConfig, dry_run: bool) -> Result<Self, ModelError> {
        config.check_known(Self::KNOWN_OPTIONS)?;
        Ok(Self {
            max_depth: if dry_run {
                Some(1)
            } else {
                config.get_usize_opt("max_depth")?
            },
            min_samples_split: config.get_usize("min_samples_split", 2)?,
            seed: config.get_u64("seed", 0)?,
            root: None,
            classes: Vec::new(),
            n_features: None,
        })
    }
}

impl Classifier for ExtraTree {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError> {
        classifier::check_fit_inputs(x, y)?;
        let classes = classifier::sorted_classes(y);
        let class_of = classifier::class_indices(y, &classes);
        let params = GrowParams {
            max_depth: self.max_depth.unwrap_or(usize::MAX),
            min_samples_split: self.min_samples_split,
        };
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let root = grow(
            x,
            &class_of,
            classes.len(),
            rows,
            0,
            &params,
            &mut |x, rows, class_of, k| random_split(x, rows, class_of, k, &mut rng),
        );
        self.root = Some(root);
        self.classes = classes;
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        let root = self.root.as_ref().ok_or(ModelError::NotFitted)?;
        let expected = self.n_features.ok_or(ModelError::NotFitted)?;
        classifier::check_features(expected, x)?;
        Ok(predict_with_tree(root, x, self.classes.len()))
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

    // an AND gate needs two stacked splits, so it exercises recursion
    fn and_gate() -> (Array2<f32>, Vec<usize>) {
        (
            array![
                [0.0, 0.0],
                [0.0, 1.0],
                [1.0, 0.0],
                [1.0, 1.0],
                [0.1, 0.1],
                [0.1, 0.9],
                [0.9, 0.1],
                [0.9, 0.9],
            ],
            vec![0, 0, 0, 1, 0, 0, 0, 1],
        )
    }

    #[test]
    fn decision_tree_fits_its_training_data() {
        let (x, y) = and_gate();
        let mut model = DecisionTree::from_config(&TrainConfig::new(), false).unwrap();
        model.fit(&x, &y).unwrap();
        let probs = model.predict_proba(&x).unwrap();
        for (row, &label) in probs.rows().into_iter().zip(&y) {
            assert_eq!(model.classes()[classifier::argmax(row)], label);
        }
    }

    #[test]
    fn depth_one_tree_is_a_stump() {
        let (x, y) = and_gate();
        let config = TrainConfig::new().with("max_depth", 1);
        let mut model = DecisionTree::from_config(&config, false).unwrap();
        model.fit(&x, &y).unwrap();
        match model.root.as_ref().unwrap() {
            Node::Leaf { .. } => {}
            Node::Split { left, right, .. } => {
                assert!(matches!(**left, Node::Leaf { .. }));
                assert!(matches!(**right, Node::Leaf { .. }));
            }
        }
    }

    #[test]
    fn extra_tree_is_reproducible_for_a_seed() {
        let (x, y) = and_gate();
        let config = TrainConfig::new().with("seed", 9);
        let mut a = ExtraTree::from_config(&config, false).unwrap();
        let mut b = ExtraTree::from_config(&config, false).unwrap();
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(
            a.predict_proba(&x).unwrap(),
            b.predict_proba(&x).unwrap()
        );
    }

    #[test]
    fn identical_samples_with_identical_labels_stay_pure() {
        let x = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let y = vec![2, 2, 2];
        let mut model = DecisionTree::from_config(&TrainConfig::new(), false).unwrap();
        model.fit(&x, &y).unwrap();
        let probs = model.predict_proba(&x).unwrap();
        assert_eq!(probs[[0, 0]], 1.0);
    }

    #[test]
    fn conflicting_labels_on_identical_samples_become_fractions() {
        let x = array![[1.0], [1.0], [1.0], [1.0]];
        let y = vec![0, 0, 0, 1];
        let mut model = DecisionTree::from_config(&TrainConfig::new(), false).unwrap();
        model.fit(&x, &y).unwrap();
        let probs = model.predict_proba(&array![[1.0]]).unwrap();
        assert!((probs[[0, 0]] - 0.75).abs() < 1e-6);
    }
}
