#![warn(missing_docs)]
//! Backend-agnostic part of Bulwark, a library of MLP classifiers hardened
//! with input defences.
//!
//! This crate turns a [`ClassifierConfig`] into an [`Architecture`] with
//! [`construct`], resolves compilation parameters from a [`CompileConfig`],
//! and defines the on-disk layout of saved classifiers. Training and
//! inference are provided by a backend crate implementing [`Classifier`].
//!
//! ```rust
//! use bulwark_core::{construct, ClassifierConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ClassifierConfig::new([28, 28])
//!     .activation("brelu")
//!     .activation_param("alpha", 1.0)
//!     .activation_param("max_value", 2.0)
//!     .batch_norm(true)
//!     .defences(["featsqueeze1"]);
//! let architecture = construct(&config)?;
//!
//! assert_eq!(architecture.layer(2).unwrap().config()["max_value"], 2.0);
//! assert!(architecture.layer(3).unwrap().is_batch_norm());
//! # Ok(())
//! # }
//! ```
pub mod activation;
pub mod architecture;
pub mod artifact;
pub mod config;
pub mod defence;
pub mod error;
pub mod loss;
pub mod metric;
pub mod record;

mod base;
pub use activation::{Activation, ActivationParams};
pub use architecture::{construct, Architecture, DatasetHint, LayerSpec};
pub use base::Classifier;
pub use config::{ClassifierConfig, CompileConfig, CompileParams, FitConfig, OptimizerKind};
pub use defence::Defence;
pub use error::BulwarkError;
pub use loss::Loss;
pub use metric::{Metric, Scores};
