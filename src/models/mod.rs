pub mod classifier;
pub mod factory;
pub mod forest;
pub mod linear;
pub mod logistic;
pub mod naive_bayes;
pub mod neighbors;
pub mod tree;
