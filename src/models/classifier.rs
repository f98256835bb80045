//! The classifier contract and numeric helpers shared by the
//! implementations in this module.

use std::any::Any;

use ndarray::{Array1, Array2, ArrayView1};

use crate::error::ModelError;

/// Contract for the classifier implementations in this module.
///
/// Probability columns follow `classes()`, the sorted distinct labels
/// seen during fitting. Implementations that only produce margins
/// convert them to probabilities (softmax over the per-class scores) so
/// `predict_proba` is uniformly available.
pub trait Classifier: std::fmt::Debug + Send + Sync {
    /// Fit the model on standardized features and class labels.
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError>;

    /// Per-sample class probabilities, one row per input sample.
    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError>;

    /// Class labels seen during fitting, in probability-column order.
    fn classes(&self) -> &[usize];

    /// Feature dimensionality the model was fitted on, if fitted.
    fn n_features(&self) -> Option<usize>;

    /// Registry name of the algorithm.
    fn name(&self) -> &'static str;

    /// Fitted parameters as a JSON value for persistence.
    fn to_value(&self) -> serde_json::Result<serde_json::Value>;

    fn as_any(&self) -> &dyn Any;
}

/// Sorted distinct labels of a training set.
pub(crate) fn sorted_classes(y: &[usize]) -> Vec<usize> {
    let mut classes = y.to_vec();
    classes.sort_unstable();
    classes.dedup();
    classes
}

/// Map each label to its column index in `classes`.
pub(crate) fn class_indices(y: &[usize], classes: &[usize]) -> Vec<usize> {
    y.iter()
        .map(|label| {
            classes
                .binary_search(label)
                .expect("labels were collected from this training set")
        })
        .collect()
}

pub(crate) fn check_fit_inputs(x: &Array2<f32>, y: &[usize]) -> Result<(), ModelError> {
    if x.nrows() == 0 {
        return Err(ModelError::InvalidDataset(
            "cannot fit on an empty matrix".to_string(),
        ));
    }
    if x.nrows() != y.len() {
        return Err(ModelError::InvalidDataset(format!(
            "{} samples paired with {} labels",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_features(expected: usize, x: &Array2<f32>) -> Result<(), ModelError> {
    if x.ncols() != expected {
        return Err(ModelError::ShapeMismatch {
            expected,
            actual: x.ncols(),
        });
    }
    Ok(())
}

/// Row-wise softmax with the usual max-subtraction for stability.
pub(crate) fn softmax_rows(mut scores: Array2<f32>) -> Array2<f32> {
    for mut row in scores.rows_mut() {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
    scores
}

pub(crate) fn softmax_inplace(scores: &mut Array1<f32>) {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in scores.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in scores.iter_mut() {
        *v /= sum;
    }
}

/// Index of the first maximum, so ties resolve deterministically.
pub(crate) fn argmax(row: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn softmax_rows_normalize() {
        let probs = softmax_rows(array![[0.0, 0.0], [10.0, 0.0]]);
        assert!((probs[[0, 0]] - 0.5).abs() < 1e-6);
        let sum: f32 = probs.row(1).iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[[1, 0]] > 0.99);
    }

    #[test]
    fn argmax_prefers_first_of_ties() {
        let row = array![1.0, 3.0, 3.0, 0.0];
        assert_eq!(argmax(row.view()), 1);
    }

    #[test]
    fn class_bookkeeping() {
        let y = vec![7, 2, 2, 9, 7];
        let classes = sorted_classes(&y);
        assert_eq!(classes, vec![2, 7, 9]);
        assert_eq!(class_indices(&y, &classes), vec![1, 0, 0, 2, 1]);
    }
}
