//! Image datasets and the seeded synthetic generator used by tests and
//! demos.

use ndarray::Array4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ModelError;

/// Number of target classes for every dataset in this crate.
pub const NUM_CLASSES: usize = 10;

/// A batch of images (NCHW) paired one-to-one with integer class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    images: Array4<f32>,
    labels: Vec<usize>,
}

impl Dataset {
    /// Pair an image batch with its labels.
    pub fn new(images: Array4<f32>, labels: Vec<usize>) -> Result<Self, ModelError> {
        if images.shape()[0] != labels.len() {
            return Err(ModelError::InvalidDataset(format!(
                "{} images paired with {} labels",
                images.shape()[0],
                labels.len()
            )));
        }
        Ok(Self { images, labels })
    }

    /// Seeded synthetic dataset, see [`synthetic_image_data`].
    pub fn synthetic(grayscale: bool, num_samples: usize, seed: u64) -> Self {
        let (images, labels) = synthetic_image_data(grayscale, num_samples, seed);
        Self { images, labels }
    }

    pub fn images(&self) -> &Array4<f32> {
        &self.images
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Generate fake image-classification data: pixel values in `[0, 1)` and
/// labels drawn uniformly from the ten classes.
///
/// Grayscale batches are shaped `(n, 1, 28, 28)`, color batches
/// `(n, 3, 224, 224)`. The same seed always yields the same data.
pub fn synthetic_image_data(
    grayscale: bool,
    num_samples: usize,
    seed: u64,
) -> (Array4<f32>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (channels, side) = if grayscale { (1, 28) } else { (3, 224) };

    let len = num_samples * channels * side * side;
    let mut pixels = Vec::with_capacity(len);
    for _ in 0..len {
        pixels.push(rng.gen::<f32>());
    }
    let images = Array4::from_shape_vec((num_samples, channels, side, side), pixels)
        .expect("pixel buffer matches requested shape");

    let labels = (0..num_samples)
        .map(|_| rng.gen_range(0..NUM_CLASSES))
        .collect();

    (images, labels)
}
