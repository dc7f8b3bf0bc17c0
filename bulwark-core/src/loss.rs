//! Loss functions.
use crate::error::BulwarkError;
use serde::{Deserialize, Serialize};

/// Scalar loss minimized during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// Cross entropy between one-hot targets and the softmax output.
    CategoricalCrossentropy,

    /// Mean squared error between targets and the softmax output.
    MeanSquaredError,
}

const REGISTRY: &[(&str, Loss)] = &[
    ("categorical_crossentropy", Loss::CategoricalCrossentropy),
    ("mean_squared_error", Loss::MeanSquaredError),
    ("mse", Loss::MeanSquaredError),
];

impl Loss {
    /// Resolves a loss from its identifier.
    pub fn resolve(identifier: &str) -> Result<Self, BulwarkError> {
        REGISTRY
            .iter()
            .find(|(id, _)| *id == identifier)
            .map(|(_, l)| *l)
            .ok_or_else(|| BulwarkError::config(format!("unknown loss '{}'", identifier)))
    }

    /// Canonical identifier.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CategoricalCrossentropy => "categorical_crossentropy",
            Self::MeanSquaredError => "mean_squared_error",
        }
    }
}
