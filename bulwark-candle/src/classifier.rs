//! Compiled MLP classifier.
mod base;
mod loss;
pub use base::MlpClassifier;
pub use loss::loss_tensor;
