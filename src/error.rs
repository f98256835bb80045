use std::error::Error;
use std::fmt;

/// Failures surfaced by model construction, training, and prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Requested model name is not in the registry.
    UnknownModel(String),
    /// A constructor was handed a hyperparameter it does not understand.
    UnsupportedOption(String),
    /// A hyperparameter was present but held an unusable value.
    InvalidConfig { option: String, reason: String },
    /// The classifier has not been fitted yet.
    NotFitted,
    /// Input feature dimensionality disagrees with the fitted state.
    ShapeMismatch { expected: usize, actual: usize },
    /// A dataset was empty, ragged, or had mismatched image/label counts.
    InvalidDataset(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelError::UnknownModel(name) => write!(f, "unknown model name: {}", name),
            ModelError::UnsupportedOption(option) => {
                write!(f, "unsupported configuration option: {}", option)
            }
            ModelError::InvalidConfig { option, reason } => {
                write!(f, "invalid value for option {}: {}", option, reason)
            }
            ModelError::NotFitted => write!(f, "model has not been fitted"),
            ModelError::ShapeMismatch { expected, actual } => write!(
                f,
                "input has {} features but the model was fitted on {}",
                actual, expected
            ),
            ModelError::InvalidDataset(reason) => write!(f, "invalid dataset: {}", reason),
        }
    }
}

impl Error for ModelError {}
