//! Configuration of an MLP classifier.
use crate::activation::ActivationParams;
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

fn default_activation() -> String {
    "relu".to_string()
}

fn default_nb_classes() -> usize {
    10
}

/// Configuration from which an [`Architecture`](crate::Architecture) is constructed.
///
/// Identifiers are kept as given and resolved by
/// [`construct`](crate::construct), which reports unknown ones as
/// configuration errors.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ClassifierConfig {
    /// Shape of one sample, without the batch axis.
    pub input_shape: Vec<usize>,

    /// Activation of hidden layers.
    #[serde(default = "default_activation")]
    pub activation: String,

    /// Parameters of the activation.
    #[serde(default)]
    pub activation_params: ActivationParams,

    /// Inserts batch normalization after the first activation.
    #[serde(default)]
    pub batch_norm: bool,

    /// Defence identifiers, applied in order.
    #[serde(default)]
    pub defences: Vec<String>,

    /// Dataset hint choosing the default hidden width.
    #[serde(default)]
    pub dataset: Option<String>,

    /// Widths of hidden layers, overriding the dataset default.
    #[serde(default)]
    pub units: Option<Vec<usize>>,

    /// Number of output classes.
    #[serde(default = "default_nb_classes")]
    pub nb_classes: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            input_shape: vec![],
            activation: default_activation(),
            activation_params: ActivationParams::new(),
            batch_norm: false,
            defences: vec![],
            dataset: None,
            units: None,
            nb_classes: default_nb_classes(),
        }
    }
}

impl ClassifierConfig {
    /// Creates a configuration for samples of the given shape.
    pub fn new(input_shape: impl Into<Vec<usize>>) -> Self {
        Self {
            input_shape: input_shape.into(),
            ..Self::default()
        }
    }

    /// Sets the activation.
    pub fn activation(mut self, v: impl Into<String>) -> Self {
        self.activation = v.into();
        self
    }

    /// Sets a parameter of the activation.
    pub fn activation_param(mut self, k: impl Into<String>, v: f64) -> Self {
        self.activation_params.insert(k.into(), v);
        self
    }

    /// Sets the batch-normalization flag.
    pub fn batch_norm(mut self, v: bool) -> Self {
        self.batch_norm = v;
        self
    }

    /// Sets the defences.
    pub fn defences<S: Into<String>>(mut self, v: impl IntoIterator<Item = S>) -> Self {
        self.defences = v.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the dataset hint.
    pub fn dataset(mut self, v: impl Into<String>) -> Self {
        self.dataset = Some(v.into());
        self
    }

    /// Sets the widths of hidden layers.
    pub fn units(mut self, v: impl Into<Vec<usize>>) -> Self {
        self.units = Some(v.into());
        self
    }

    /// Sets the number of output classes.
    pub fn nb_classes(mut self, v: usize) -> Self {
        self.nb_classes = v;
        self
    }

    /// Loads [`ClassifierConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load classifier config from {:?}", path_);
        Ok(b)
    }

    /// Saves [`ClassifierConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save classifier config into {:?}", path_);
        Ok(())
    }
}
