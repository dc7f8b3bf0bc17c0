//! Layered model description and its construction from a [`ClassifierConfig`].
use crate::{
    activation::Activation,
    config::ClassifierConfig,
    defence::Defence,
    error::BulwarkError,
};
use anyhow::Result;
use log::debug;
use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Epsilon of batch normalization layers.
pub const BATCH_NORM_EPS: f64 = 1e-3;

/// Weight of the current batch when updating running statistics.
pub const BATCH_NORM_MOMENTUM: f64 = 0.1;

/// Index of the batch normalization layer when it is enabled.
pub const BATCH_NORM_LAYER_INDEX: usize = 3;

/// Hidden width used without a dataset hint.
pub const DEFAULT_UNITS: usize = 512;

/// Dataset the classifier is meant for; only picks the default hidden width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetHint {
    /// 28x28 grayscale digits.
    Mnist,

    /// 32x32 RGB images.
    Cifar10,
}

impl DatasetHint {
    /// Resolves a hint from its identifier.
    pub fn resolve(identifier: &str) -> Result<Self, BulwarkError> {
        match identifier {
            "mnist" => Ok(Self::Mnist),
            "cifar10" => Ok(Self::Cifar10),
            _ => Err(BulwarkError::config(format!(
                "unknown dataset hint '{}', expected mnist or cifar10",
                identifier
            ))),
        }
    }

    /// Default width of hidden layers.
    pub fn units(&self) -> usize {
        match self {
            Self::Mnist => 512,
            Self::Cifar10 => 1024,
        }
    }
}

/// Description of a single layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSpec {
    /// Flattens samples of shape `in_shape` into vectors.
    Flatten {
        /// Shape of one sample.
        in_shape: Vec<usize>,
    },

    /// Fully connected layer.
    Dense {
        /// Input width.
        in_dim: usize,
        /// Output width.
        out_dim: usize,
    },

    /// Element-wise activation.
    Activation {
        /// The function applied.
        activation: Activation,
    },

    /// Batch normalization over features.
    BatchNorm {
        /// Number of features.
        num_features: usize,
        /// Added to the variance.
        eps: f64,
        /// Weight of the current batch in the running statistics.
        momentum: f64,
    },

    /// Softmax over classes.
    Softmax,
}

impl LayerSpec {
    /// Name of the layer kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Flatten { .. } => "flatten",
            Self::Dense { .. } => "dense",
            Self::Activation { .. } => "activation",
            Self::BatchNorm { .. } => "batch_norm",
            Self::Softmax => "softmax",
        }
    }

    /// Numeric hyperparameters of the layer, keyed by name.
    pub fn config(&self) -> BTreeMap<String, f64> {
        match self {
            Self::Flatten { in_shape } => {
                BTreeMap::from([("out_dim".to_string(), in_shape.iter().product::<usize>() as f64)])
            }
            Self::Dense { in_dim, out_dim } => BTreeMap::from([
                ("in_dim".to_string(), *in_dim as f64),
                ("out_dim".to_string(), *out_dim as f64),
            ]),
            Self::Activation { activation } => activation.params(),
            Self::BatchNorm {
                num_features,
                eps,
                momentum,
            } => BTreeMap::from([
                ("num_features".to_string(), *num_features as f64),
                ("eps".to_string(), *eps),
                ("momentum".to_string(), *momentum),
            ]),
            Self::Softmax => BTreeMap::new(),
        }
    }

    /// The activation if this is an activation layer.
    pub fn activation(&self) -> Option<&Activation> {
        match self {
            Self::Activation { activation } => Some(activation),
            _ => None,
        }
    }

    /// Returns `true` for [`LayerSpec::BatchNorm`].
    pub fn is_batch_norm(&self) -> bool {
        matches!(self, Self::BatchNorm { .. })
    }

    /// Width of the output given the width of the input.
    fn out_dim(&self, in_dim: usize) -> usize {
        match self {
            Self::Flatten { in_shape } => in_shape.iter().product(),
            Self::Dense { out_dim, .. } => *out_dim,
            _ => in_dim,
        }
    }
}

/// Ordered layers of a classifier with its input defences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    input_shape: Vec<usize>,
    defences: Vec<Defence>,
    layers: Vec<LayerSpec>,
    nb_classes: usize,
}

impl Architecture {
    /// Shape of one sample.
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Number of scalars in one sample.
    pub fn input_dim(&self) -> usize {
        self.input_shape.iter().product()
    }

    /// Defences, in application order.
    pub fn defences(&self) -> &[Defence] {
        &self.defences
    }

    /// Layers, in forward order.
    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    /// Layer at index `i`.
    pub fn layer(&self, i: usize) -> Option<&LayerSpec> {
        self.layers.get(i)
    }

    /// Number of output classes.
    pub fn nb_classes(&self) -> usize {
        self.nb_classes
    }

    /// Checks that consecutive layers agree on their widths and that every
    /// activation and defence holds valid parameters.
    ///
    /// Used on descriptions read from disk.
    pub fn validate(&self) -> Result<(), BulwarkError> {
        if self.input_shape.is_empty() || self.input_shape.contains(&0) {
            return Err(BulwarkError::config(format!(
                "input_shape must be non-empty with positive entries, got {:?}",
                self.input_shape
            )));
        }
        match self.layers.first() {
            Some(LayerSpec::Flatten { in_shape }) if *in_shape == self.input_shape => {}
            _ => {
                return Err(BulwarkError::config(
                    "first layer must flatten the input shape",
                ))
            }
        }
        if self.nb_classes < 2 {
            return Err(BulwarkError::config(format!(
                "nb_classes must be >= 2, got {}",
                self.nb_classes
            )));
        }
        for defence in self.defences.iter() {
            defence.validate()?;
        }
        if self.layers.last() != Some(&LayerSpec::Softmax) {
            return Err(BulwarkError::config("last layer must be softmax"));
        }

        let mut dim = self.input_dim();
        for (i, layer) in self.layers.iter().enumerate() {
            match layer {
                LayerSpec::Dense { in_dim, out_dim } if *in_dim != dim || *out_dim == 0 => {
                    return Err(BulwarkError::config(format!(
                        "layer {} expects width {}, got {}",
                        i, in_dim, dim
                    )))
                }
                LayerSpec::BatchNorm { num_features, .. } if *num_features != dim => {
                    return Err(BulwarkError::config(format!(
                        "layer {} normalizes {} features, got {}",
                        i, num_features, dim
                    )))
                }
                LayerSpec::Activation { activation } => activation.validate()?,
                _ => {}
            }
            dim = layer.out_dim(dim);
        }
        if dim != self.nb_classes {
            return Err(BulwarkError::config(format!(
                "output width {} does not match nb_classes {}",
                dim, self.nb_classes
            )));
        }
        Ok(())
    }

    /// Checks that `x` holds samples of the input shape.
    pub fn check_inputs(&self, x: &ArrayD<f32>) -> Result<usize, BulwarkError> {
        let shape = x.shape();
        if shape.len() != self.input_shape.len() + 1 || shape[1..] != self.input_shape[..] {
            return Err(BulwarkError::training(format!(
                "inputs of shape {:?} do not match (n, {:?})",
                shape, self.input_shape
            )));
        }
        if shape[0] == 0 {
            return Err(BulwarkError::training("no samples given"));
        }
        Ok(shape[0])
    }

    /// Checks that `x` and `y` hold the same number of samples and that
    /// `y` has one column per class.
    pub fn check_data(&self, x: &ArrayD<f32>, y: &Array2<f32>) -> Result<usize, BulwarkError> {
        let n = self.check_inputs(x)?;
        if y.nrows() != n {
            return Err(BulwarkError::training(format!(
                "{} inputs but {} labels",
                n,
                y.nrows()
            )));
        }
        if y.ncols() != self.nb_classes {
            return Err(BulwarkError::training(format!(
                "labels have {} columns, expected {}",
                y.ncols(),
                self.nb_classes
            )));
        }
        Ok(n)
    }
}

/// Constructs the architecture described by `config`.
///
/// The layers are
/// `flatten, dense, activation, [batch_norm], dense, activation, ..., dense, softmax`,
/// so the first activation sits at index 2 and batch normalization, when
/// enabled, at [`BATCH_NORM_LAYER_INDEX`].
pub fn construct(config: &ClassifierConfig) -> Result<Architecture> {
    if config.input_shape.is_empty() || config.input_shape.contains(&0) {
        return Err(BulwarkError::config(format!(
            "input_shape must be non-empty with positive entries, got {:?}",
            config.input_shape
        ))
        .into());
    }
    if config.nb_classes < 2 {
        return Err(BulwarkError::config(format!(
            "nb_classes must be >= 2, got {}",
            config.nb_classes
        ))
        .into());
    }

    let activation = Activation::resolve(&config.activation, &config.activation_params)?;
    let defences = Defence::resolve_all(&config.defences)?;
    let hint = config
        .dataset
        .as_deref()
        .map(DatasetHint::resolve)
        .transpose()?;
    let units = match &config.units {
        Some(units) => {
            if units.is_empty() || units.contains(&0) {
                return Err(BulwarkError::config(format!(
                    "units must be non-empty with positive entries, got {:?}",
                    units
                ))
                .into());
            }
            units.clone()
        }
        None => {
            let w = hint.map_or(DEFAULT_UNITS, |h| h.units());
            vec![w, w]
        }
    };

    let mut layers = vec![LayerSpec::Flatten {
        in_shape: config.input_shape.clone(),
    }];
    let mut in_dim = config.input_shape.iter().product();
    for (i, &out_dim) in units.iter().enumerate() {
        layers.push(LayerSpec::Dense { in_dim, out_dim });
        layers.push(LayerSpec::Activation { activation });
        if i == 0 && config.batch_norm {
            layers.push(LayerSpec::BatchNorm {
                num_features: out_dim,
                eps: BATCH_NORM_EPS,
                momentum: BATCH_NORM_MOMENTUM,
            });
        }
        in_dim = out_dim;
    }
    layers.push(LayerSpec::Dense {
        in_dim,
        out_dim: config.nb_classes,
    });
    layers.push(LayerSpec::Softmax);

    let architecture = Architecture {
        input_shape: config.input_shape.clone(),
        defences,
        layers,
        nb_classes: config.nb_classes,
    };
    debug!(
        "Constructed {} layers with {} activation and defences {:?}",
        architecture.layers.len(),
        activation,
        architecture.defences
    );

    Ok(architecture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn downcast(err: anyhow::Error) -> BulwarkError {
        err.downcast::<BulwarkError>().unwrap()
    }

    #[test]
    fn brelu_params_are_introspectable() -> Result<()> {
        let config = ClassifierConfig::new([28, 28])
            .activation("brelu")
            .activation_param("alpha", 1.0)
            .activation_param("max_value", 2.0);
        let arch = construct(&config)?;

        let layer = arch.layer(2).unwrap();
        assert_eq!(layer.name(), "activation");
        assert_eq!(layer.config()["alpha"], 1.0);
        assert_eq!(layer.config()["max_value"], 2.0);
        Ok(())
    }

    #[test]
    fn batch_norm_position() -> Result<()> {
        let arch = construct(&ClassifierConfig::new([28, 28]).batch_norm(true))?;
        assert!(arch.layer(BATCH_NORM_LAYER_INDEX).unwrap().is_batch_norm());
        assert_eq!(arch.layers().iter().filter(|l| l.is_batch_norm()).count(), 1);

        let arch = construct(&ClassifierConfig::new([28, 28]))?;
        assert!(!arch.layers().iter().any(LayerSpec::is_batch_norm));
        Ok(())
    }

    #[test]
    fn layout_and_widths() -> Result<()> {
        let arch = construct(&ClassifierConfig::new([28, 28]))?;
        let names: Vec<_> = arch.layers().iter().map(|l| l.name()).collect();
        assert_eq!(
            names,
            vec!["flatten", "dense", "activation", "dense", "activation", "dense", "softmax"]
        );
        assert_eq!(
            arch.layer(1),
            Some(&LayerSpec::Dense {
                in_dim: 784,
                out_dim: DEFAULT_UNITS
            })
        );
        arch.validate()?;

        let arch = construct(&ClassifierConfig::new([32, 32, 3]).dataset("cifar10"))?;
        assert_eq!(arch.layer(1).unwrap().config()["out_dim"], 1024.0);

        let arch = construct(&ClassifierConfig::new([4]).units([16, 8, 4]).nb_classes(3))?;
        assert_eq!(arch.layers().len(), 1 + 3 * 2 + 2);
        assert_eq!(arch.layer(7).unwrap().config()["out_dim"], 3.0);
        arch.validate()?;
        Ok(())
    }

    #[test]
    fn configuration_errors() {
        let cases = vec![
            ClassifierConfig::new([28, 28]).activation("swish"),
            ClassifierConfig::new([28, 28]).defences(["featsqueeze9"]),
            ClassifierConfig::new([28, 28]).defences(["featsqueeze1", "jpeg"]),
            ClassifierConfig::new([28, 28]).dataset("imagenet"),
            ClassifierConfig::new(Vec::<usize>::new()),
            ClassifierConfig::new([28, 0]),
            ClassifierConfig::new([28, 28]).units(Vec::<usize>::new()),
            ClassifierConfig::new([28, 28]).nb_classes(1),
        ];
        for config in cases {
            let err = downcast(construct(&config).unwrap_err());
            assert!(err.is_configuration(), "{:?}", config);
        }
    }

    #[test]
    fn validate_rejects_inconsistent_widths() -> Result<()> {
        let mut arch = construct(&ClassifierConfig::new([4]).units([8]).nb_classes(2))?;
        arch.layers[1] = LayerSpec::Dense {
            in_dim: 5,
            out_dim: 8,
        };
        assert!(arch.validate().unwrap_err().is_configuration());
        Ok(())
    }

    #[test]
    fn validate_rejects_bad_classes_and_defences() -> Result<()> {
        let arch = construct(&ClassifierConfig::new([4]).units([8]).nb_classes(2))?;

        let mut single = arch.clone();
        single.nb_classes = 1;
        assert!(single.validate().unwrap_err().is_configuration());

        let mut squeezed = arch;
        squeezed.defences = vec![Defence::FeatureSqueezing { bit_depth: 0 }];
        assert!(squeezed.validate().unwrap_err().is_configuration());
        Ok(())
    }

    #[test]
    fn data_checks() -> Result<()> {
        let arch = construct(&ClassifierConfig::new([2, 2]).units([4]).nb_classes(3))?;
        let x = ArrayD::<f32>::zeros(IxDyn(&[5, 2, 2]));
        let y = Array2::<f32>::zeros((5, 3));
        assert_eq!(arch.check_data(&x, &y)?, 5);

        let bad_x = ArrayD::<f32>::zeros(IxDyn(&[5, 4]));
        assert!(arch.check_data(&bad_x, &y).unwrap_err().is_training());

        let bad_y = Array2::<f32>::zeros((4, 3));
        assert!(arch.check_data(&x, &bad_y).unwrap_err().is_training());

        let bad_y = Array2::<f32>::zeros((5, 2));
        assert!(arch.check_data(&x, &bad_y).unwrap_err().is_training());

        let empty = ArrayD::<f32>::zeros(IxDyn(&[0, 2, 2]));
        assert!(arch.check_inputs(&empty).unwrap_err().is_training());
        Ok(())
    }
}
