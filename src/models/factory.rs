//! Registry mapping model names to classifier constructors.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::TrainConfig;
use crate::error::ModelError;
use crate::models::classifier::Classifier;
use crate::models::forest::RandomForest;
use crate::models::linear::{PassiveAggressive, Perceptron, SgdClassifier};
use crate::models::logistic::SoftmaxRegression;
use crate::models::naive_bayes::GaussianNb;
use crate::models::neighbors::KNeighborsClassifier;
use crate::models::tree::{DecisionTree, ExtraTree};

/// Names accepted by [`build_classifier`], in registry order.
pub const SUPPORTED_MODELS: &[&str] = &[
    SoftmaxRegression::NAME,
    SgdClassifier::NAME,
    Perceptron::NAME,
    PassiveAggressive::NAME,
    GaussianNb::NAME,
    KNeighborsClassifier::NAME,
    DecisionTree::NAME,
    ExtraTree::NAME,
    RandomForest::NAME,
];

pub fn is_supported(model_name: &str) -> bool {
    SUPPORTED_MODELS.contains(&model_name)
}

fn construct(
    model_name: &str,
    config: &TrainConfig,
    dry_run: bool,
) -> Result<Box<dyn Classifier>, ModelError> {
    match model_name {
        SoftmaxRegression::NAME => Ok(Box::new(SoftmaxRegression::from_config(config, dry_run)?)),
        SgdClassifier::NAME => Ok(Box::new(SgdClassifier::from_config(config, dry_run)?)),
        Perceptron::NAME => Ok(Box::new(Perceptron::from_config(config, dry_run)?)),
        PassiveAggressive::NAME => Ok(Box::new(PassiveAggressive::from_config(config, dry_run)?)),
        GaussianNb::NAME => Ok(Box::new(GaussianNb::from_config(config, dry_run)?)),
        KNeighborsClassifier::NAME => {
            Ok(Box::new(KNeighborsClassifier::from_config(config, dry_run)?))
        }
        DecisionTree::NAME => Ok(Box::new(DecisionTree::from_config(config, dry_run)?)),
        ExtraTree::NAME => Ok(Box::new(ExtraTree::from_config(config, dry_run)?)),
        RandomForest::NAME => Ok(Box::new(RandomForest::from_config(config, dry_run)?)),
        _ => Err(ModelError::UnknownModel(model_name.to_string())),
    }
}

/// Build a classifier from the registry, probing for probability
/// estimation first.
///
/// Construction is attempted with `probability: true` added to the
/// config; a constructor that rejects exactly that option is retried
/// with the caller's config untouched. Every other failure propagates
/// unmodified.
pub fn build_classifier(
    model_name: &str,
    config: &TrainConfig,
    dry_run: bool,
) -> Result<Box<dyn Classifier>, ModelError> {
    let mut with_probability = config.clone();
    with_probability.insert("probability", true);
    match construct(model_name, &with_probability, dry_run) {
        Err(ModelError::UnsupportedOption(option)) if option == "probability" => {
            construct(model_name, config, dry_run)
        }
        result => result,
    }
}

/// Rebuild a fitted classifier from its persisted parameters.
pub fn load_classifier(model_name: &str, value: Value) -> Result<Box<dyn Classifier>> {
    fn revive<T>(model_name: &str, value: Value) -> Result<Box<dyn Classifier>>
    where
        T: Classifier + DeserializeOwned + 'static,
    {
        let model: T = serde_json::from_value(value)
            .with_context(|| format!("corrupt {} artifact", model_name))?;
        Ok(Box::new(model))
    }

    match model_name {
        SoftmaxRegression::NAME => revive::<SoftmaxRegression>(model_name, value),
        SgdClassifier::NAME => revive::<SgdClassifier>(model_name, value),
        Perceptron::NAME => revive::<Perceptron>(model_name, value),
        PassiveAggressive::NAME => revive::<PassiveAggressive>(model_name, value),
        GaussianNb::NAME => revive::<GaussianNb>(model_name, value),
        KNeighborsClassifier::NAME => revive::<KNeighborsClassifier>(model_name, value),
        DecisionTree::NAME => revive::<DecisionTree>(model_name, value),
        ExtraTree::NAME => revive::<ExtraTree>(model_name, value),
        RandomForest::NAME => revive::<RandomForest>(model_name, value),
        _ => Err(ModelError::UnknownModel(model_name.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_name_constructs() {
        for &name in SUPPORTED_MODELS {
            let model = build_classifier(name, &TrainConfig::new(), false)
                .unwrap_or_else(|err| panic!("{} failed to construct: {}", name, err));
            assert_eq!(model.name(), name);
            assert_eq!(model.n_features(), None);
        }
    }

    #[test]
    fn unknown_name_is_fatal() {
        let err = build_classifier("quantum-annealer", &TrainConfig::new(), false).unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownModel("quantum-annealer".to_string())
        );
    }

    #[test]
    fn only_the_probability_flag_is_retried() {
        // margin model: the injected flag is rejected, the retry succeeds
        assert!(build_classifier("perceptron", &TrainConfig::new(), false).is_ok());

        // a genuinely unknown option must propagate, not be retried away
        let config = TrainConfig::new().with("leaves", 4);
        let err = build_classifier("perceptron", &config, false).unwrap_err();
        assert_eq!(err, ModelError::UnsupportedOption("leaves".to_string()));
    }

    #[test]
    fn caller_supplied_probability_on_margin_model_propagates() {
        let config = TrainConfig::new().with("probability", true);
        let err = build_classifier("passive-aggressive", &config, false).unwrap_err();
        assert_eq!(
            err,
            ModelError::UnsupportedOption("probability".to_string())
        );
    }

    #[test]
    fn load_rejects_mismatched_parameters() {
        use ndarray::array;

        let mut model = GaussianNb::from_config(&TrainConfig::new(), false).unwrap();
        model.fit(&array![[0.0], [1.0]], &[0, 1]).unwrap();
        let value = model.to_value().unwrap();
        assert!(load_classifier("gaussian-nb", value.clone()).is_ok());
        assert!(load_classifier("random-forest", value).is_err());
    }
}
