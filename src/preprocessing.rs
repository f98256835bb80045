//! Preprocessing shared by training and prediction.
//!
//! Provides a simple Scaler for mean/std standardization plus the
//! flatten and paired-shuffle helpers the image wrappers run before
//! fitting. The scaler is fitted on the training split only and applied
//! unchanged to every later input; it is one of the two persisted
//! artifacts, hence the serde derives.

use ndarray::{Array2, Array4};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Simple standard scaler (per-column mean/std).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Scaler {
    /// Minimum stddev to avoid division by zero when transforming.
    const MIN_STD: f32 = 1e-6;

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

/// Fit a `Scaler` from a matrix where rows are samples and columns are
/// features.
pub fn fit_scaler(x: &Array2<f32>) -> Scaler {
    let (nrows, ncols) = x.dim();
    assert!(
        nrows > 0 && ncols > 0,
        "fit_scaler requires non-empty matrix"
    );

    let mut mean = vec![0.0f32; ncols];
    for row in x.rows() {
        for (c, v) in row.iter().enumerate() {
            mean[c] += *v;
        }
    }
    let nrows_f = nrows as f32;
    for v in mean.iter_mut() {
        *v /= nrows_f;
    }

    let mut var = vec![0.0f32; ncols];
    for row in x.rows() {
        for (c, v) in row.iter().enumerate() {
            let d = *v - mean[c];
            var[c] += d * d;
        }
    }
    for v in var.iter_mut() {
        *v = (*v / nrows_f).sqrt().max(Scaler::MIN_STD);
    }

    Scaler { mean, std: var }
}

/// Transform all rows using the provided `Scaler` and return a new matrix.
pub fn transform_all(x: &Array2<f32>, sc: &Scaler) -> Array2<f32> {
    let (nrows, ncols) = x.dim();
    assert_eq!(
        ncols,
        sc.n_features(),
        "transform_all: scaler was fitted on a different feature count"
    );
    let mut out = Vec::with_capacity(nrows * ncols);

    for row in x.rows() {
        for (c, v) in row.iter().enumerate() {
            out.push((*v - sc.mean[c]) / sc.std[c]);
        }
    }

    Array2::from_shape_vec((nrows, ncols), out).expect("transform_all: shape mismatch")
}

/// Flatten an NCHW image batch into one feature vector per sample.
pub fn flatten_images(images: &Array4<f32>) -> Array2<f32> {
    let shape = images.shape();
    let (n, features) = (shape[0], shape[1] * shape[2] * shape[3]);
    let data: Vec<f32> = images.iter().copied().collect();
    Array2::from_shape_vec((n, features), data).expect("flatten_images: shape mismatch")
}

/// Shuffle samples and labels jointly, preserving their pairing.
pub fn shuffle_in_unison(
    x: &Array2<f32>,
    y: &[usize],
    rng: &mut StdRng,
) -> (Array2<f32>, Vec<usize>) {
    assert_eq!(
        x.nrows(),
        y.len(),
        "shuffle_in_unison requires one label per sample"
    );
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    order.shuffle(rng);

    let ncols = x.ncols();
    let mut data = Vec::with_capacity(x.nrows() * ncols);
    let mut labels = Vec::with_capacity(y.len());
    for &i in &order {
        data.extend(x.row(i).iter().copied());
        labels.push(y[i]);
    }
    let shuffled =
        Array2::from_shape_vec((x.nrows(), ncols), data).expect("shuffle_in_unison: shape mismatch");
    (shuffled, labels)
}
