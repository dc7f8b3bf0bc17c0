//! Configurations of classifiers, compilation and training.
//!
//! All configurations can be built with chained setters or loaded from YAML.
mod classifier;
mod compile;
mod fit;

pub use classifier::ClassifierConfig;
pub use compile::{CompileConfig, CompileParams, OptimizerKind};
pub use fit::FitConfig;
