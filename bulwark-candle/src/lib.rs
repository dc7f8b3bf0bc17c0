//! MLP classifiers implemented with [candle](https://crates.io/crates/candle-core).
//!
//! ```no_run
//! use bulwark_candle::{MlpClassifier, Session};
//! use bulwark_core::{
//!     record::BufferedRecorder, ClassifierConfig, Classifier, CompileConfig, FitConfig,
//! };
//! use ndarray::{Array2, ArrayD, IxDyn};
//!
//! # fn main() -> anyhow::Result<()> {
//! let session = Session::cpu();
//! let config = ClassifierConfig::new([28, 28]).activation("relu").defences(["featsqueeze1"]);
//! let compile = CompileConfig::default()
//!     .loss("categorical_crossentropy")
//!     .optimizer("adam")
//!     .metrics(["accuracy"]);
//! let mut classifier = MlpClassifier::new(&config, &compile, &session)?;
//!
//! let x = ArrayD::<f32>::zeros(IxDyn(&[10, 28, 28]));
//! let y = Array2::<f32>::from_shape_fn((10, 10), |(i, j)| (i == j) as u8 as f32);
//! let mut history = BufferedRecorder::new();
//! classifier.fit(&x, &y, &FitConfig::default().batch_size(10), &mut history)?;
//!
//! let scores = classifier.evaluate(&x, &y)?;
//! println!("accuracy: {:.2}%", scores[1] * 100.0);
//! classifier.save("./model".as_ref())?;
//! # Ok(())
//! # }
//! ```
pub mod classifier;
pub mod mlp;
pub mod opt;
pub mod util;
use anyhow::Result;
use candle_core::DType;
use serde::{Deserialize, Serialize};

pub use classifier::MlpClassifier;
pub use mlp::Mlp;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    #[default]
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Device {
    /// Opens the corresponding candle device.
    pub fn open(self) -> Result<candle_core::Device> {
        match self {
            Self::Cpu => Ok(candle_core::Device::Cpu),
            Self::Cuda(n) => Ok(candle_core::Device::new_cuda(n)?),
        }
    }
}

/// Execution context of classifiers.
///
/// Every classifier is compiled against a session and keeps its own handle to
/// it, so classifiers of different sessions never share backend state.
#[derive(Clone, Debug)]
pub struct Session {
    device: candle_core::Device,
    dtype: DType,
}

impl Session {
    /// Creates a session on the given device.
    pub fn new(device: Device) -> Result<Self> {
        Ok(Self {
            device: device.open()?,
            dtype: DType::F32,
        })
    }

    /// Creates a session on the CPU.
    pub fn cpu() -> Self {
        Self {
            device: candle_core::Device::Cpu,
            dtype: DType::F32,
        }
    }

    /// Candle device of the session.
    pub fn device(&self) -> &candle_core::Device {
        &self.device
    }

    /// Data type of variables.
    pub fn dtype(&self) -> DType {
        self.dtype
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::cpu()
    }
}
