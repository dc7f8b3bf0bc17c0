//! Evaluation metrics and scores.
use crate::error::BulwarkError;
use ndarray::{ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// Default `k` of [`Metric::TopKCategoricalAccuracy`].
pub const DEFAULT_TOP_K: usize = 5;

/// Metric reported by evaluation, after the loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Metric {
    /// Fraction of samples whose most probable class is the target class.
    Accuracy,

    /// Fraction of samples whose target class is among the `k` most probable.
    TopKCategoricalAccuracy {
        /// Number of candidate classes.
        k: usize,
    },

    /// Mean squared difference between probabilities and targets.
    MeanSquaredError,

    /// Mean absolute difference between probabilities and targets.
    MeanAbsoluteError,
}

const REGISTRY: &[(&str, Metric)] = &[
    ("accuracy", Metric::Accuracy),
    ("acc", Metric::Accuracy),
    (
        "top_k_categorical_accuracy",
        Metric::TopKCategoricalAccuracy { k: DEFAULT_TOP_K },
    ),
    ("mean_squared_error", Metric::MeanSquaredError),
    ("mse", Metric::MeanSquaredError),
    ("mean_absolute_error", Metric::MeanAbsoluteError),
    ("mae", Metric::MeanAbsoluteError),
];

fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

impl Metric {
    /// Resolves a metric from its identifier.
    pub fn resolve(identifier: &str) -> Result<Self, BulwarkError> {
        REGISTRY
            .iter()
            .find(|(id, _)| *id == identifier)
            .map(|(_, m)| *m)
            .ok_or_else(|| BulwarkError::config(format!("unknown metric '{}'", identifier)))
    }

    /// Checks parameter values.
    pub fn validate(&self) -> Result<(), BulwarkError> {
        match *self {
            Self::TopKCategoricalAccuracy { k: 0 } => Err(BulwarkError::config(
                "top_k_categorical_accuracy needs k >= 1",
            )),
            _ => Ok(()),
        }
    }

    /// Name under which the metric is reported.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::TopKCategoricalAccuracy { .. } => "top_k_categorical_accuracy",
            Self::MeanSquaredError => "mean_squared_error",
            Self::MeanAbsoluteError => "mean_absolute_error",
        }
    }

    /// Computes the metric from predicted probabilities and targets,
    /// both of shape `(n, nb_classes)`.
    pub fn compute(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
        let n = predictions.nrows();
        if n == 0 {
            return 0.0;
        }
        match self {
            Self::Accuracy => {
                let hits = predictions
                    .axis_iter(Axis(0))
                    .zip(targets.axis_iter(Axis(0)))
                    .filter(|(p, t)| argmax(p.view()) == argmax(t.view()))
                    .count();
                hits as f32 / n as f32
            }
            Self::TopKCategoricalAccuracy { k } => {
                let hits = predictions
                    .axis_iter(Axis(0))
                    .zip(targets.axis_iter(Axis(0)))
                    .filter(|(p, t)| {
                        let target = argmax(t.view());
                        let score = p[target];
                        // Rank of the target class among the predictions.
                        let above = p.iter().filter(|&&v| v > score).count();
                        above < *k
                    })
                    .count();
                hits as f32 / n as f32
            }
            Self::MeanSquaredError => {
                let d = &predictions - &targets;
                d.mapv(|v| v * v).mean().unwrap_or(0.0)
            }
            Self::MeanAbsoluteError => {
                let d = &predictions - &targets;
                d.mapv(f32::abs).mean().unwrap_or(0.0)
            }
        }
    }
}

/// Ordered results of an evaluation: the loss first, then each metric in
/// compile order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    names: Vec<String>,
    values: Vec<f32>,
}

impl Scores {
    /// Creates scores from the loss and `(metric, value)` pairs.
    pub fn new(loss: f32, metrics: impl IntoIterator<Item = (Metric, f32)>) -> Self {
        let mut names = vec!["loss".to_string()];
        let mut values = vec![loss];
        for (m, v) in metrics {
            names.push(m.name().to_string());
            values.push(v);
        }
        Self { names, values }
    }

    /// The loss.
    pub fn loss(&self) -> f32 {
        self.values[0]
    }

    /// Value reported under `name`.
    pub fn get(&self, name: &str) -> Option<f32> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    /// All values in order.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// All names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of values, including the loss.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`; scores carry at least the loss.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Element-wise comparison with relative tolerance `rtol`.
    pub fn approx_eq(&self, other: &Scores, rtol: f32) -> bool {
        self.names == other.names
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| (a - b).abs() <= rtol * a.abs().max(b.abs()).max(f32::EPSILON))
    }
}

impl Index<usize> for Scores {
    type Output = f32;

    fn index(&self, i: usize) -> &f32 {
        &self.values[i]
    }
}
