use anyhow::Result;
use bulwark_core::{Activation, LayerSpec};
use candle_core::{Tensor, D};
use candle_nn::{batch_norm, linear, BatchNorm, BatchNormConfig, Linear, Module, ModuleT, VarBuilder};

/// Applies an activation function element-wise.
pub fn activation_forward(activation: &Activation, xs: &Tensor) -> candle_core::Result<Tensor> {
    match *activation {
        Activation::Relu => xs.relu(),
        Activation::BRelu { alpha, max_value } => {
            // relu(x) - relu(x - max) clips to [0, max]; x - relu(x) keeps the negative part
            let pos = (xs.relu()? - xs.affine(1.0, -max_value)?.relu()?)?;
            let neg = (xs - xs.relu()?)?.affine(alpha, 0.0)?;
            pos + neg
        }
        Activation::Tanh => xs.tanh(),
        Activation::Sigmoid => candle_nn::ops::sigmoid(xs),
    }
}

/// A layer of [`Mlp`](super::Mlp) with its variables.
pub enum Layer {
    /// Reshapes `(n, d1, d2, ...)` into `(n, d1 * d2 * ...)`.
    Flatten,

    /// Fully connected layer.
    Linear(Linear),

    /// Element-wise activation.
    Activation(Activation),

    /// Batch normalization over features.
    BatchNorm(BatchNorm),

    /// Softmax over classes.
    Softmax,
}

impl Layer {
    /// Creates the variables of a layer under `vb`.
    pub fn build(spec: &LayerSpec, vb: VarBuilder) -> Result<Self> {
        Ok(match spec {
            LayerSpec::Flatten { .. } => Self::Flatten,
            LayerSpec::Dense { in_dim, out_dim } => Self::Linear(linear(*in_dim, *out_dim, vb)?),
            LayerSpec::Activation { activation } => Self::Activation(*activation),
            LayerSpec::BatchNorm {
                num_features,
                eps,
                momentum,
            } => {
                let config = BatchNormConfig {
                    eps: *eps,
                    remove_mean: true,
                    affine: true,
                    momentum: *momentum,
                };
                Self::BatchNorm(batch_norm(*num_features, config, vb)?)
            }
            LayerSpec::Softmax => Self::Softmax,
        })
    }

    /// Whether the layer owns variables.
    pub fn has_vars(&self) -> bool {
        matches!(self, Self::Linear(_) | Self::BatchNorm(_))
    }

    /// Batch statistics are used and running statistics updated when `train` is true.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        match self {
            Self::Flatten => xs.flatten_from(1),
            Self::Linear(l) => l.forward(xs),
            Self::Activation(a) => activation_forward(a, xs),
            Self::BatchNorm(bn) => bn.forward_t(xs, train),
            Self::Softmax => candle_nn::ops::softmax(xs, D::Minus1),
        }
    }
}
