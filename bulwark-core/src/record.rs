//! Records of training progress.
//!
//! [`MlpClassifier::fit`] writes one [`Record`] per epoch into a [`Recorder`].
//! Collect them with a [`BufferedRecorder`] to obtain the training history,
//! or pass a [`NullRecorder`] to discard them.
//!
//! ```rust
//! use bulwark_core::record::{BufferedRecorder, Record, RecordValue, Recorder};
//!
//! let mut recorder = BufferedRecorder::new();
//! let mut record = Record::from_scalar("loss", 2.3);
//! record.insert("epoch", RecordValue::Scalar(1.0));
//! recorder.write(record);
//!
//! assert_eq!(recorder.scalars("loss"), vec![2.3]);
//! ```
//!
//! [`MlpClassifier::fit`]: https://docs.rs/bulwark-candle
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
