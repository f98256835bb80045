//! traintool: a thin, uniform wrapper around machine-learning models for
//! image classification.
//!
//! The crate standardizes the model lifecycle — construct, train,
//! persist, reload, predict, deploy — behind one contract so callers
//! never touch a backend's native API. One backend ships today: a
//! registry of classical classifiers with flatten/standardize
//! preprocessing and a JSON artifact pair for persistence. The contract
//! is object-safe so further backends can slot in behind the same
//! surface.
//!
//! The design favors small, testable modules; the unfitted and fitted
//! handle states are separate types, so predicting before training or
//! loading is not expressible.
pub mod classical;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod models;
pub mod preprocessing;
pub mod serve;
pub mod wrapper;
