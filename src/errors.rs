//! Typed error handling for the face-quant library.
//!
//! All public API functions return [`Result<T>`](type@Result), which uses
//! [`QuantizeError`] as the error type. The CLI binary converts these into
//! `anyhow::Error` through the blanket `From<E: std::error::Error>` impl.

use std::fmt;
use std::path::PathBuf;

/// Result type alias used throughout the face-quant public API.
pub type Result<T> = std::result::Result<T, QuantizeError>;

/// Errors produced by the face-quant library.
///
/// Each variant covers one failure category. The `reason` field carries a
/// human-readable explanation suitable for display.
#[derive(Debug)]
pub enum QuantizeError {
    /// Input model file does not exist. Reported before anything is loaded.
    InputNotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// Malformed tensor payload, shape mismatch, degenerate range, etc.
    InvalidTensor {
        /// What went wrong.
        reason: String,
    },

    /// Unsupported quantization setting (unknown layout name, ...).
    UnsupportedConfig {
        /// What went wrong.
        reason: String,
    },

    /// Failed to load an ONNX model from disk.
    ModelLoad {
        /// Path that was being loaded.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Failed to save a quantized ONNX model to disk.
    ModelSave {
        /// Path that was being written.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Error while rewriting the graph (weight not found, name collision, ...).
    GraphTransform {
        /// What went wrong.
        reason: String,
    },

    /// The inference engine refused to load a produced model.
    Validation {
        /// Model that was being validated.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Configuration file parsing or validation error.
    Config {
        /// What went wrong.
        reason: String,
    },

    /// Catch-all for rare edge cases that don't fit other variants.
    Other(String),
}

impl fmt::Display for QuantizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantizeError::InputNotFound { path } => {
                write!(f, "model not found: {}", path.display())
            }
            QuantizeError::InvalidTensor { reason } => {
                write!(f, "invalid tensor: {reason}")
            }
            QuantizeError::UnsupportedConfig { reason } => {
                write!(f, "unsupported config: {reason}")
            }
            QuantizeError::ModelLoad { path, reason } => {
                write!(f, "failed to load model '{}': {reason}", path.display())
            }
            QuantizeError::ModelSave { path, reason } => {
                write!(f, "failed to save model '{}': {reason}", path.display())
            }
            QuantizeError::GraphTransform { reason } => {
                write!(f, "graph transform error: {reason}")
            }
            QuantizeError::Validation { path, reason } => {
                write!(f, "model '{}' failed to load for inference: {reason}", path.display())
            }
            QuantizeError::Config { reason } => {
                write!(f, "config error: {reason}")
            }
            QuantizeError::Other(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

impl std::error::Error for QuantizeError {}
