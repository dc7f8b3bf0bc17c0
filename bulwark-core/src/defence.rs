//! Defences against adversarial inputs.
//!
//! A defence is a pure, stateless transformation applied before
//! classification. Defences are resolved from identifiers at construction
//! time and applied in the order they were given:
//!
//! * `featsqueeze1` .. `featsqueeze8` squeeze every input feature to the given
//!   bit depth, during both training and inference.
//! * `labsmooth` smooths one-hot training targets. It has no effect on
//!   inference.
use crate::error::BulwarkError;
use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest value of a smoothed one-hot label.
pub const LABEL_SMOOTHING_MAX_VALUE: f32 = 0.9;

/// Input or label transformation applied before classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Defence {
    /// Rounds features in `[0, 1]` to `2^bit_depth` levels.
    FeatureSqueezing {
        /// Number of bits kept per feature, in `1..=8`.
        bit_depth: u8,
    },

    /// Replaces one-hot targets `1`/`0` with `max_value`/`(1 - max_value) / (k - 1)`.
    LabelSmoothing {
        /// Value assigned to the true class.
        max_value: f32,
    },
}

type Constructor = fn(&str) -> Result<Defence, BulwarkError>;

/// Identifier prefix to constructor table.
const REGISTRY: &[(&str, Constructor)] = &[
    ("featsqueeze", feature_squeezing),
    ("labsmooth", label_smoothing),
];

fn feature_squeezing(suffix: &str) -> Result<Defence, BulwarkError> {
    let bit_depth = match suffix.parse::<u8>() {
        Ok(b) if (1..=8).contains(&b) && suffix.len() == 1 => b,
        _ => {
            return Err(BulwarkError::config(format!(
                "feature squeezing needs a bit depth: featsqueeze[1-8], got 'featsqueeze{}'",
                suffix
            )))
        }
    };
    Ok(Defence::FeatureSqueezing { bit_depth })
}

fn label_smoothing(suffix: &str) -> Result<Defence, BulwarkError> {
    if !suffix.is_empty() {
        return Err(BulwarkError::config(format!(
            "unknown defence 'labsmooth{}'",
            suffix
        )));
    }
    Ok(Defence::LabelSmoothing {
        max_value: LABEL_SMOOTHING_MAX_VALUE,
    })
}

impl Defence {
    /// Resolves a defence from its identifier.
    pub fn resolve(identifier: &str) -> Result<Self, BulwarkError> {
        REGISTRY
            .iter()
            .find_map(|(prefix, ctor)| identifier.strip_prefix(prefix).map(|s| ctor(s)))
            .unwrap_or_else(|| {
                Err(BulwarkError::config(format!(
                    "unknown defence '{}', expected featsqueeze[1-8] or labsmooth",
                    identifier
                )))
            })
    }

    /// Resolves a list of identifiers, keeping their order.
    pub fn resolve_all<S: AsRef<str>>(identifiers: &[S]) -> Result<Vec<Self>, BulwarkError> {
        identifiers.iter().map(|s| Self::resolve(s.as_ref())).collect()
    }

    /// Identifier from which the defence is resolved.
    pub fn identifier(&self) -> String {
        match self {
            Self::FeatureSqueezing { bit_depth } => format!("featsqueeze{}", bit_depth),
            Self::LabelSmoothing { .. } => "labsmooth".to_string(),
        }
    }

    /// Checks parameter values.
    ///
    /// Resolved defences always pass; descriptions read from disk may not.
    pub fn validate(&self) -> Result<(), BulwarkError> {
        match *self {
            Self::FeatureSqueezing { bit_depth } if !(1..=8).contains(&bit_depth) => {
                Err(BulwarkError::config(format!(
                    "feature squeezing bit_depth must be in 1..=8, got {}",
                    bit_depth
                )))
            }
            Self::LabelSmoothing { max_value } if !(max_value > 0.0 && max_value <= 1.0) => {
                Err(BulwarkError::config(format!(
                    "label smoothing max_value must be in (0, 1], got {}",
                    max_value
                )))
            }
            _ => Ok(()),
        }
    }

    /// Transforms a batch of inputs `(n, ...)`.
    pub fn apply_inputs(&self, mut x: ArrayD<f32>) -> ArrayD<f32> {
        if let Self::FeatureSqueezing { bit_depth } = *self {
            let max_value = 2f32.powi(bit_depth as i32) - 1.0;
            x.mapv_inplace(|v| (v * max_value).round() / max_value);
        }
        x
    }

    /// Transforms a batch of one-hot training targets `(n, nb_classes)`.
    pub fn apply_labels(&self, mut y: Array2<f32>) -> Array2<f32> {
        if let Self::LabelSmoothing { max_value } = *self {
            let nb_classes = y.ncols();
            if nb_classes > 1 {
                let min_value = (1.0 - max_value) / (nb_classes - 1) as f32;
                y.mapv_inplace(|v| v * max_value + (1.0 - v) * min_value);
            }
        }
        y
    }
}

impl fmt::Display for Defence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Applies every defence to the inputs, in order.
pub fn preprocess_inputs(defences: &[Defence], x: ArrayD<f32>) -> ArrayD<f32> {
    defences.iter().fold(x, |x, d| d.apply_inputs(x))
}

/// Applies every defence to the training targets, in order.
pub fn preprocess_labels(defences: &[Defence], y: Array2<f32>) -> Array2<f32> {
    defences.iter().fold(y, |y, d| d.apply_labels(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, ArrayD, IxDyn};

    #[test]
    fn resolves_registry_identifiers() {
        assert_eq!(
            Defence::resolve("featsqueeze1").unwrap(),
            Defence::FeatureSqueezing { bit_depth: 1 }
        );
        assert_eq!(
            Defence::resolve("featsqueeze8").unwrap(),
            Defence::FeatureSqueezing { bit_depth: 8 }
        );
        assert_eq!(
            Defence::resolve("labsmooth").unwrap(),
            Defence::LabelSmoothing { max_value: 0.9 }
        );
    }

    #[test]
    fn rejects_unknown_identifiers() {
        for id in ["featsqueeze", "featsqueeze0", "featsqueeze9", "featsqueeze12", "gaussian", "labsmooth2", ""] {
            let err = Defence::resolve(id).unwrap_err();
            assert!(err.is_configuration(), "{}", id);
        }
    }

    #[test]
    fn validate_bounds_parameters() {
        for bit_depth in [0, 9, 40] {
            let err = Defence::FeatureSqueezing { bit_depth }.validate().unwrap_err();
            assert!(err.is_configuration(), "{}", bit_depth);
        }
        for max_value in [0.0, -0.5, 1.5, f32::NAN] {
            let err = Defence::LabelSmoothing { max_value }.validate().unwrap_err();
            assert!(err.is_configuration(), "{}", max_value);
        }
        assert!(Defence::FeatureSqueezing { bit_depth: 8 }.validate().is_ok());
        assert!(Defence::LabelSmoothing { max_value: 1.0 }.validate().is_ok());
    }

    #[test]
    fn resolve_all_keeps_order() {
        let ds = Defence::resolve_all(&["labsmooth", "featsqueeze2"]).unwrap();
        let ids: Vec<_> = ds.iter().map(|d| d.identifier()).collect();
        assert_eq!(ids, vec!["labsmooth", "featsqueeze2"]);
    }

    #[test]
    fn squeezing_one_bit_binarizes() {
        let x = ArrayD::from_shape_vec(IxDyn(&[1, 4]), vec![0.1, 0.49, 0.51, 0.9]).unwrap();
        let x = Defence::FeatureSqueezing { bit_depth: 1 }.apply_inputs(x);
        assert_eq!(x.iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn squeezing_is_idempotent() {
        let d = Defence::FeatureSqueezing { bit_depth: 3 };
        let x = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0.0, 0.13, 0.5, 0.77, 0.99, 1.0])
            .unwrap();
        let once = d.apply_inputs(x);
        let twice = d.apply_inputs(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn label_smoothing_keeps_rows_normalized() {
        let y = arr2(&[[0.0f32, 1.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]]);
        let y = Defence::LabelSmoothing { max_value: 0.9 }.apply_labels(y);
        assert!((y[[0, 1]] - 0.9).abs() < 1e-6);
        assert!((y[[0, 0]] - 0.1 / 3.0).abs() < 1e-6);
        for row in y.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn label_smoothing_leaves_inputs_alone() {
        let x = ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![0.3, 0.7]).unwrap();
        let defences = [Defence::LabelSmoothing { max_value: 0.9 }];
        assert_eq!(preprocess_inputs(&defences, x.clone()), x);
    }
}
