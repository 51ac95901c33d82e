//! Error types for cosmoemu core.

use thiserror::Error;

/// Result type alias for emulator operations.
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Errors that can occur while loading or evaluating an emulator.
#[derive(Error, Debug)]
pub enum EmulatorError {
    /// Artifact missing parts, corrupt, or internally inconsistent.
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// A declared input parameter is absent from the batch.
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// Input columns or matrices have incompatible shapes.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl EmulatorError {
    pub(crate) fn load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }
}
