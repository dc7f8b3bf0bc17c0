//! Multilayer perceptron built from an [`Architecture`](bulwark_core::Architecture).
mod base;
mod layer;
pub use base::Mlp;
pub use layer::{activation_forward, Layer};
