//! Activation functions of hidden layers.
use crate::error::BulwarkError;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Parameters of an activation function, keyed by name.
pub type ActivationParams = BTreeMap<String, f64>;

/// Default negative slope of [`Activation::BRelu`].
pub const BRELU_DEFAULT_ALPHA: f64 = 1.0;

/// Default upper clamp of [`Activation::BRelu`].
pub const BRELU_DEFAULT_MAX_VALUE: f64 = 1.0;

/// Activation function applied after a hidden dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Activation {
    /// Rectified linear unit.
    Relu,

    /// Bounded ReLU: `min(x, max_value)` for `x >= 0`, `alpha * x` otherwise.
    #[serde(rename = "brelu")]
    BRelu {
        /// Slope applied to negative inputs.
        alpha: f64,
        /// Upper clamp of positive inputs.
        max_value: f64,
    },

    /// Hyperbolic tangent.
    Tanh,

    /// Logistic sigmoid.
    Sigmoid,
}

type Constructor = fn(&ActivationParams) -> Result<Activation, BulwarkError>;

/// Identifier to constructor table.
const REGISTRY: &[(&str, Constructor)] = &[
    ("relu", relu),
    ("brelu", brelu),
    ("tanh", tanh),
    ("sigmoid", sigmoid),
];

fn relu(params: &ActivationParams) -> Result<Activation, BulwarkError> {
    no_params("relu", params).map(|_| Activation::Relu)
}

fn tanh(params: &ActivationParams) -> Result<Activation, BulwarkError> {
    no_params("tanh", params).map(|_| Activation::Tanh)
}

fn sigmoid(params: &ActivationParams) -> Result<Activation, BulwarkError> {
    no_params("sigmoid", params).map(|_| Activation::Sigmoid)
}

fn no_params(name: &str, params: &ActivationParams) -> Result<(), BulwarkError> {
    match params.keys().next() {
        None => Ok(()),
        Some(k) => Err(BulwarkError::config(format!(
            "activation '{}' takes no parameters, got '{}'",
            name, k
        ))),
    }
}

fn brelu(params: &ActivationParams) -> Result<Activation, BulwarkError> {
    if let Some(k) = params
        .keys()
        .find(|k| k.as_str() != "alpha" && k.as_str() != "max_value")
    {
        return Err(BulwarkError::config(format!(
            "unknown parameter '{}' for activation 'brelu'",
            k
        )));
    }
    let act = Activation::BRelu {
        alpha: params.get("alpha").copied().unwrap_or(BRELU_DEFAULT_ALPHA),
        max_value: params
            .get("max_value")
            .copied()
            .unwrap_or(BRELU_DEFAULT_MAX_VALUE),
    };
    act.validate()?;
    Ok(act)
}

impl Activation {
    /// Resolves an activation from its identifier and parameters.
    pub fn resolve(name: &str, params: &ActivationParams) -> Result<Self, BulwarkError> {
        let (_, ctor) = REGISTRY
            .iter()
            .find(|(id, _)| *id == name)
            .ok_or_else(|| {
                BulwarkError::config(format!(
                    "unknown activation '{}', expected one of {:?}",
                    name,
                    Self::identifiers()
                ))
            })?;
        ctor(params)
    }

    /// Identifiers accepted by [`Activation::resolve`].
    pub fn identifiers() -> Vec<&'static str> {
        REGISTRY.iter().map(|(id, _)| *id).collect()
    }

    /// Identifier of the activation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::BRelu { .. } => "brelu",
            Self::Tanh => "tanh",
            Self::Sigmoid => "sigmoid",
        }
    }

    /// Parameters of the activation.
    pub fn params(&self) -> ActivationParams {
        match self {
            Self::BRelu { alpha, max_value } => ActivationParams::from([
                ("alpha".to_string(), *alpha),
                ("max_value".to_string(), *max_value),
            ]),
            _ => ActivationParams::new(),
        }
    }

    /// Checks parameter values.
    pub fn validate(&self) -> Result<(), BulwarkError> {
        if let Self::BRelu { alpha, max_value } = self {
            if !alpha.is_finite() {
                return Err(BulwarkError::config(format!(
                    "brelu alpha must be finite, got {}",
                    alpha
                )));
            }
            if !max_value.is_finite() || *max_value <= 0.0 {
                return Err(BulwarkError::config(format!(
                    "brelu max_value must be finite and > 0, got {}",
                    max_value
                )));
            }
        }
        Ok(())
    }

    /// Applies the activation to a single value.
    ///
    /// Reference semantics; the backend evaluates the same function on tensors.
    pub fn apply(&self, x: f32) -> f32 {
        match *self {
            Self::Relu => x.max(0.0),
            Self::BRelu { alpha, max_value } => {
                if x < 0.0 {
                    alpha as f32 * x
                } else {
                    x.min(max_value as f32)
                }
            }
            Self::Tanh => x.tanh(),
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BRelu { alpha, max_value } => {
                write!(f, "brelu(alpha={}, max_value={})", alpha, max_value)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(kv: &[(&str, f64)]) -> ActivationParams {
        kv.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn brelu_keeps_given_params() {
        let act = Activation::resolve("brelu", &params(&[("alpha", 1.0), ("max_value", 2.0)]))
            .unwrap();
        assert_eq!(
            act,
            Activation::BRelu {
                alpha: 1.0,
                max_value: 2.0
            }
        );
        assert_eq!(act.params()["alpha"], 1.0);
        assert_eq!(act.params()["max_value"], 2.0);
    }

    #[test]
    fn brelu_defaults() {
        let act = Activation::resolve("brelu", &ActivationParams::new()).unwrap();
        assert_eq!(
            act,
            Activation::BRelu {
                alpha: BRELU_DEFAULT_ALPHA,
                max_value: BRELU_DEFAULT_MAX_VALUE
            }
        );
    }

    #[test]
    fn rejects_unknown_names_and_params() {
        let err = Activation::resolve("swish", &ActivationParams::new()).unwrap_err();
        assert!(err.is_configuration());

        let err = Activation::resolve("relu", &params(&[("alpha", 0.1)])).unwrap_err();
        assert!(err.is_configuration());

        let err = Activation::resolve("brelu", &params(&[("beta", 0.1)])).unwrap_err();
        assert!(err.is_configuration());

        let err = Activation::resolve("brelu", &params(&[("max_value", 0.0)])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn brelu_reference_semantics() {
        let act = Activation::BRelu {
            alpha: 0.5,
            max_value: 2.0,
        };
        assert_eq!(act.apply(-2.0), -1.0);
        assert_eq!(act.apply(1.5), 1.5);
        assert_eq!(act.apply(3.0), 2.0);
    }

    #[test]
    fn serializes_with_name_tag() {
        let act = Activation::BRelu {
            alpha: 1.0,
            max_value: 2.0,
        };
        let json = serde_json::to_string(&act).unwrap();
        assert_eq!(json, r#"{"name":"brelu","alpha":1.0,"max_value":2.0}"#);
        let back: Activation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, act);
    }
}
