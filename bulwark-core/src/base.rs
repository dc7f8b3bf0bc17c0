//! Interface of trainable classifiers.
use crate::{
    architecture::Architecture, config::FitConfig, metric::Scores, record::Recorder,
};
use anyhow::Result;
use ndarray::{Array2, ArrayD};
use std::path::Path;

/// A compiled classifier bound to a numeric backend.
///
/// Inputs are arrays of shape `(n, input_shape...)` and targets one-hot
/// arrays of shape `(n, nb_classes)`.
pub trait Classifier {
    /// Layers and defences of the classifier.
    fn architecture(&self) -> &Architecture;

    /// Trains the classifier in place.
    ///
    /// One record per epoch is written to `recorder`.
    fn fit(
        &mut self,
        x: &ArrayD<f32>,
        y: &Array2<f32>,
        config: &FitConfig,
        recorder: &mut dyn Recorder,
    ) -> Result<()>;

    /// Returns the loss followed by the compiled metrics.
    fn evaluate(&self, x: &ArrayD<f32>, y: &Array2<f32>) -> Result<Scores>;

    /// Returns class probabilities of shape `(n, nb_classes)`.
    fn predict(&self, x: &ArrayD<f32>) -> Result<Array2<f32>>;

    /// Saves the model description and the weights in the given directory.
    fn save(&self, dir: &Path) -> Result<()>;
}
