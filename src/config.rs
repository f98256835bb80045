//! Training configuration: a flat map of hyperparameter names to values.
//!
//! The map is handed to the selected classifier constructor verbatim;
//! constructors read the options they know and reject the rest, so a
//! misspelled hyperparameter is a configuration error rather than a
//! silent no-op.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;

/// Flat hyperparameter map passed to a classifier constructor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainConfig {
    params: BTreeMap<String, Value>,
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mainly for tests and call sites that set a
    /// couple of options inline.
    pub fn with(mut self, option: &str, value: impl Into<Value>) -> Self {
        self.insert(option, value);
        self
    }

    pub fn insert(&mut self, option: &str, value: impl Into<Value>) {
        self.params.insert(option.to_string(), value.into());
    }

    pub fn contains(&self, option: &str) -> bool {
        self.params.contains_key(option)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get_f32(&self, option: &str, default: f32) -> Result<f32, ModelError> {
        match self.params.get(option) {
            None => Ok(default),
            Some(value) => value
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| invalid(option, value, "a number")),
        }
    }

    pub fn get_usize(&self, option: &str, default: usize) -> Result<usize, ModelError> {
        Ok(self.get_usize_opt(option)?.unwrap_or(default))
    }

    /// Like [`get_usize`](Self::get_usize) but with no default, for
    /// options such as `max_depth` where absence means "unlimited".
    pub fn get_usize_opt(&self, option: &str) -> Result<Option<usize>, ModelError> {
        match self.params.get(option) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(|v| Some(v as usize))
                .ok_or_else(|| invalid(option, value, "a non-negative integer")),
        }
    }

    pub fn get_u64(&self, option: &str, default: u64) -> Result<u64, ModelError> {
        match self.params.get(option) {
            None => Ok(default),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| invalid(option, value, "a non-negative integer")),
        }
    }

    pub fn get_bool(&self, option: &str, default: bool) -> Result<bool, ModelError> {
        match self.params.get(option) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| invalid(option, value, "a boolean")),
        }
    }

    /// Reject the first option not named in `known`.
    ///
    /// This is also what powers the probability capability probe: a
    /// constructor whose `known` list omits `probability` rejects the
    /// factory-injected flag with `UnsupportedOption("probability")`,
    /// which is the one condition the factory retries without.
    pub fn check_known(&self, known: &[&str]) -> Result<(), ModelError> {
        for option in self.params.keys() {
            if !known.contains(&option.as_str()) {
                return Err(ModelError::UnsupportedOption(option.clone()));
            }
        }
        Ok(())
    }
}

fn invalid(option: &str, value: &Value, expected: &str) -> ModelError {
    ModelError::InvalidConfig {
        option: option.to_string(),
        reason: format!("expected {}, got {}", expected, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_fall_back_to_defaults() {
        let config = TrainConfig::new();
        assert_eq!(config.get_f32("learning_rate", 0.5).unwrap(), 0.5);
        assert_eq!(config.get_usize("epochs", 7).unwrap(), 7);
        assert_eq!(config.get_usize_opt("max_depth").unwrap(), None);
        assert!(config.get_bool("probability", false).unwrap() == false);
    }

    #[test]
    fn accessors_read_typed_values() {
        let config = TrainConfig::new()
            .with("learning_rate", 0.25)
            .with("epochs", 3)
            .with("probability", true);
        assert_eq!(config.get_f32("learning_rate", 0.0).unwrap(), 0.25);
        assert_eq!(config.get_usize("epochs", 0).unwrap(), 3);
        assert!(config.get_bool("probability", false).unwrap());
    }

    #[test]
    fn wrong_value_type_is_invalid() {
        let config = TrainConfig::new().with("epochs", "three");
        let err = config.get_usize("epochs", 1).unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig { ref option, .. } if option == "epochs"));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let config = TrainConfig::new().with("epochs", 3).with("leaves", 5);
        let err = config.check_known(&["epochs", "seed"]).unwrap_err();
        assert_eq!(err, ModelError::UnsupportedOption("leaves".to_string()));
    }

    #[test]
    fn round_trips_through_json() {
        let config = TrainConfig::new().with("n_estimators", 20).with("seed", 1);
        let text = serde_json::to_string(&config).unwrap();
        let back: TrainConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
