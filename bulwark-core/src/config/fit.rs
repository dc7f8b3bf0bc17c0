//! Configuration of a training run.
use crate::error::BulwarkError;
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

fn default_shuffle() -> bool {
    true
}

/// Configuration of [`Classifier::fit`](crate::Classifier::fit).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct FitConfig {
    /// Number of passes over the training set.
    pub epochs: usize,

    /// Number of samples per optimization step.
    pub batch_size: usize,

    /// Shuffles samples at the start of every epoch.
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,

    /// Seed of the shuffling; entropy is used when `None`.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 32,
            shuffle: true,
            seed: None,
        }
    }
}

impl FitConfig {
    /// Sets the number of epochs.
    pub fn epochs(mut self, v: usize) -> Self {
        self.epochs = v;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Enables or disables shuffling.
    pub fn shuffle(mut self, v: bool) -> Self {
        self.shuffle = v;
        self
    }

    /// Sets the shuffling seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = Some(v);
        self
    }

    /// Checks `epochs >= 1` and `batch_size >= 1`.
    pub fn validate(&self) -> Result<(), BulwarkError> {
        if self.epochs == 0 {
            return Err(BulwarkError::config("epochs must be >= 1"));
        }
        if self.batch_size == 0 {
            return Err(BulwarkError::config("batch_size must be >= 1"));
        }
        Ok(())
    }

    /// Constructs [`FitConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load fit config from {:?}", path_);
        Ok(b)
    }

    /// Saves [`FitConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save fit config into {:?}", path_);
        Ok(())
    }
}
