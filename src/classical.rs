//! The classical image-classification backend: a registry of
//! feature-based classifiers behind flatten/standardize preprocessing,
//! persisted as a model/scaler artifact pair.

use std::any::Any;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::{Array2, Array4};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::data::Dataset;
use crate::error::ModelError;
use crate::metrics::MetricsSink;
use crate::models::classifier::{self, Classifier};
use crate::models::factory;
use crate::preprocessing::{fit_scaler, flatten_images, shuffle_in_unison, transform_all, Scaler};
use crate::wrapper::{ModelWrapper, Prediction};

/// File name of the persisted classifier artifact.
pub const MODEL_FILE: &str = "model.json";
/// File name of the persisted scaler artifact.
pub const SCALER_FILE: &str = "scaler.json";

/// An unfitted handle: knows which algorithm to build, nothing else.
///
/// Training consumes it and yields a [`FittedImageClassifier`]; the only
/// other way into the fitted state is [`FittedImageClassifier::load`].
#[derive(Debug, Clone)]
pub struct ClassicalImageClassifier {
    model_name: String,
}

impl ClassicalImageClassifier {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Train the selected classifier, evaluate it on the provided splits,
    /// report accuracies to both sinks, and persist the artifact pair
    /// into `out_dir`.
    ///
    /// `dry_run` abbreviates training (iteration-type hyperparameters are
    /// clamped to 1) but the run still fits, scores, reports, and saves.
    #[allow(clippy::too_many_arguments)]
    pub fn train(
        self,
        train_data: &Dataset,
        val_data: Option<&Dataset>,
        test_data: Option<&Dataset>,
        config: &TrainConfig,
        out_dir: &Path,
        writer: &mut dyn MetricsSink,
        experiment: &mut dyn MetricsSink,
        dry_run: bool,
    ) -> Result<FittedImageClassifier> {
        if train_data.is_empty() {
            return Err(ModelError::InvalidDataset(
                "training dataset has no samples".to_string(),
            )
            .into());
        }
        let mut model = factory::build_classifier(&self.model_name, config, dry_run)?;

        // The scaler is fitted on the training split only; val/test and
        // every later prediction reuse it unchanged.
        let train_x = flatten_images(train_data.images());
        let scaler = fit_scaler(&train_x);
        let train_x = transform_all(&train_x, &scaler);
        let mut rng = StdRng::seed_from_u64(config.get_u64("seed", 0)?);
        let (train_x, train_y) = shuffle_in_unison(&train_x, train_data.labels(), &mut rng);

        model.fit(&train_x, &train_y)?;

        let train_acc = accuracy(model.as_ref(), &train_x, &train_y)?;
        log::info!("{}: train accuracy {:.4}", self.model_name, train_acc);
        report(writer, experiment, "train_accuracy", train_acc);

        if let Some(val) = val_data {
            let val_x = preprocess_with(&scaler, val.images())?;
            let val_acc = accuracy(model.as_ref(), &val_x, val.labels())?;
            log::info!("{}: val accuracy {:.4}", self.model_name, val_acc);
            report(writer, experiment, "val_accuracy", val_acc);
        }
        if let Some(test) = test_data {
            let test_x = preprocess_with(&scaler, test.images())?;
            let test_acc = accuracy(model.as_ref(), &test_x, test.labels())?;
            log::info!("{}: test accuracy {:.4}", self.model_name, test_acc);
            report(writer, experiment, "test_accuracy", test_acc);
        }

        let fitted = FittedImageClassifier {
            model_name: self.model_name,
            model,
            scaler,
        };
        fitted.save(out_dir)?;
        Ok(fitted)
    }
}

/// A fitted handle owning the classifier and the scaler it was trained
/// with. Independent of the handle it was trained or loaded from.
#[derive(Debug)]
pub struct FittedImageClassifier {
    model_name: String,
    model: Box<dyn Classifier>,
    scaler: Scaler,
}

/// On-disk layout of [`MODEL_FILE`].
#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    model_name: String,
    model: serde_json::Value,
}

impl FittedImageClassifier {
    /// Reconstruct a fitted handle from the artifact pair in `out_dir`.
    ///
    /// Both artifacts must exist, deserialize, name the same algorithm as
    /// `model_name`, and agree on the feature dimensionality.
    pub fn load(out_dir: &Path, model_name: &str) -> Result<Self> {
        let model_path = out_dir.join(MODEL_FILE);
        let file = File::open(&model_path)
            .with_context(|| format!("failed to open {}", model_path.display()))?;
        let artifact: ModelArtifact = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("malformed model artifact {}", model_path.display()))?;
        if artifact.model_name != model_name {
            bail!(
                "artifacts in {} were trained as {:?}, not {:?}",
                out_dir.display(),
                artifact.model_name,
                model_name
            );
        }
        let model = factory::load_classifier(model_name, artifact.model)?;

        let scaler_path = out_dir.join(SCALER_FILE);
        let file = File::open(&scaler_path)
            .with_context(|| format!("failed to open {}", scaler_path.display()))?;
        let scaler: Scaler = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("malformed scaler artifact {}", scaler_path.display()))?;

        match model.n_features() {
            Some(n) if n == scaler.n_features() => {}
            Some(n) => bail!(
                "model expects {} features but the scaler was fitted on {}",
                n,
                scaler.n_features()
            ),
            None => bail!("model artifact in {} is unfitted", out_dir.display()),
        }

        Ok(Self {
            model_name: model_name.to_string(),
            model,
            scaler,
        })
    }

    /// Write the artifact pair, overwriting any previous training run.
    fn save(&self, out_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;

        let artifact = ModelArtifact {
            model_name: self.model_name.clone(),
            model: self
                .model
                .to_value()
                .context("failed to serialize fitted model")?,
        };
        write_json(&out_dir.join(MODEL_FILE), &artifact)?;
        write_json(&out_dir.join(SCALER_FILE), &self.scaler)?;
        log::info!(
            "saved {} artifacts to {}",
            self.model_name,
            out_dir.display()
        );
        Ok(())
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// The scaler fitted at training time. Prediction never refits it.
    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }
}

impl ModelWrapper for FittedImageClassifier {
    fn predict(&self, images: &Array4<f32>) -> Result<Prediction> {
        let x = preprocess_with(&self.scaler, images)?;
        let probs = self.model.predict_proba(&x)?;
        Ok(Prediction::from_probabilities(&probs))
    }

    fn raw(&self) -> HashMap<&'static str, &dyn Any> {
        HashMap::from([
            ("model", self.model.as_any()),
            ("scaler", &self.scaler as &dyn Any),
        ])
    }
}

/// Flatten and standardize a batch with an already-fitted scaler.
fn preprocess_with(scaler: &Scaler, images: &Array4<f32>) -> Result<Array2<f32>, ModelError> {
    let flat = flatten_images(images);
    if flat.ncols() != scaler.n_features() {
        return Err(ModelError::ShapeMismatch {
            expected: scaler.n_features(),
            actual: flat.ncols(),
        });
    }
    Ok(transform_all(&flat, scaler))
}

/// Fraction of samples whose arg-max class matches the label.
fn accuracy(model: &dyn Classifier, x: &Array2<f32>, y: &[usize]) -> Result<f64, ModelError> {
    let probs = model.predict_proba(x)?;
    let classes = model.classes();
    let mut hits = 0usize;
    for (row, &label) in probs.rows().into_iter().zip(y) {
        if classes[classifier::argmax(row)] == label {
            hits += 1;
        }
    }
    Ok(hits as f64 / y.len() as f64)
}

fn report(writer: &mut dyn MetricsSink, experiment: &mut dyn MetricsSink, name: &str, value: f64) {
    writer.log_scalar(name, value);
    experiment.log_scalar(name, value);
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}
