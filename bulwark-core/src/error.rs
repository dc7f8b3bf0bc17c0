//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
///
/// Public operations return [`anyhow::Result`]; errors of this type can be
/// recovered from it with [`anyhow::Error::downcast_ref`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BulwarkError {
    /// Invalid or missing construction/compilation parameter.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Mismatch between data and architecture during fit or evaluation.
    #[error("Training error: {0}")]
    Training(String),

    /// Missing or corrupt artifact, or failed write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}

impl BulwarkError {
    /// Shorthand for [`BulwarkError::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Shorthand for [`BulwarkError::Training`].
    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    /// Shorthand for [`BulwarkError::Storage`].
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Returns `true` for [`BulwarkError::Configuration`].
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns `true` for [`BulwarkError::Training`].
    pub fn is_training(&self) -> bool {
        matches!(self, Self::Training(_))
    }

    /// Returns `true` for [`BulwarkError::Storage`].
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
