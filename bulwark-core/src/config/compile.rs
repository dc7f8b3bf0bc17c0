//! Compilation parameters: loss, optimizer and metrics.
use crate::{error::BulwarkError, loss::Loss, metric::Metric};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Gradient-based optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Adam.
    Adam,

    /// Adam with decoupled weight decay.
    AdamW,

    /// Plain stochastic gradient descent.
    Sgd,
}

const OPTIMIZERS: &[(&str, OptimizerKind)] = &[
    ("adam", OptimizerKind::Adam),
    ("adamw", OptimizerKind::AdamW),
    ("sgd", OptimizerKind::Sgd),
];

impl OptimizerKind {
    /// Resolves an optimizer from its identifier.
    pub fn resolve(identifier: &str) -> Result<Self, BulwarkError> {
        OPTIMIZERS
            .iter()
            .find(|(id, _)| *id == identifier)
            .map(|(_, o)| *o)
            .ok_or_else(|| BulwarkError::config(format!("unknown optimizer '{}'", identifier)))
    }

    /// Learning rate used when none is configured.
    pub fn default_learning_rate(&self) -> f64 {
        match self {
            Self::Adam | Self::AdamW => 1e-3,
            Self::Sgd => 1e-2,
        }
    }
}

/// Compilation parameters as given by the caller.
///
/// `loss` and `optimizer` are required; [`CompileConfig::resolve`] reports
/// them missing as configuration errors.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct CompileConfig {
    /// Loss identifier.
    #[serde(default)]
    pub loss: Option<String>,

    /// Optimizer identifier.
    #[serde(default)]
    pub optimizer: Option<String>,

    /// Metric identifiers, in reporting order.
    #[serde(default)]
    pub metrics: Vec<String>,

    /// Overrides the default learning rate of the optimizer.
    #[serde(default)]
    pub learning_rate: Option<f64>,
}

impl CompileConfig {
    /// Sets the loss.
    pub fn loss(mut self, v: impl Into<String>) -> Self {
        self.loss = Some(v.into());
        self
    }

    /// Sets the optimizer.
    pub fn optimizer(mut self, v: impl Into<String>) -> Self {
        self.optimizer = Some(v.into());
        self
    }

    /// Sets the metrics.
    pub fn metrics<S: Into<String>>(mut self, v: impl IntoIterator<Item = S>) -> Self {
        self.metrics = v.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the learning rate.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.learning_rate = Some(v);
        self
    }

    /// Resolves every identifier.
    pub fn resolve(&self) -> Result<CompileParams, BulwarkError> {
        let loss = self
            .loss
            .as_deref()
            .ok_or_else(|| BulwarkError::config("compile parameter 'loss' is missing"))?;
        let optimizer = self
            .optimizer
            .as_deref()
            .ok_or_else(|| BulwarkError::config("compile parameter 'optimizer' is missing"))?;
        let optimizer = OptimizerKind::resolve(optimizer)?;
        let learning_rate = self
            .learning_rate
            .unwrap_or_else(|| optimizer.default_learning_rate());

        let params = CompileParams {
            loss: Loss::resolve(loss)?,
            optimizer,
            learning_rate,
            metrics: self
                .metrics
                .iter()
                .map(|m| Metric::resolve(m))
                .collect::<Result<_, _>>()?,
        };
        params.validate()?;
        Ok(params)
    }

    /// Loads [`CompileConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load compile config from {:?}", path_);
        Ok(b)
    }

    /// Saves [`CompileConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save compile config into {:?}", path_);
        Ok(())
    }
}

/// Resolved compilation parameters.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CompileParams {
    /// Loss minimized by training.
    pub loss: Loss,

    /// Optimizer.
    pub optimizer: OptimizerKind,

    /// Learning rate of the optimizer.
    pub learning_rate: f64,

    /// Metrics reported after the loss.
    pub metrics: Vec<Metric>,
}

impl CompileParams {
    /// Checks the learning rate and metric parameters.
    ///
    /// Used on descriptions read from disk.
    pub fn validate(&self) -> Result<(), BulwarkError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(BulwarkError::config(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        self.metrics.iter().try_for_each(Metric::validate)
    }
}
