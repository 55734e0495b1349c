// src/error.rs
use thiserror::Error;

pub type LinkerResult<T> = std::result::Result<T, LinkerError>;

/// Errors raised by the linkage library.
///
/// Binaries and the async data layer wrap these in `anyhow::Error`
/// with additional context.
#[derive(Debug, Error)]
pub enum LinkerError {
    #[error("invalid goal '{value}', expected one of: training, classification")]
    InvalidGoal { value: String },

    #[error("unknown classifier '{value}', expected one of: {allowed}")]
    UnknownClassifier { value: String, allowed: String },

    #[error("unknown string similarity algorithm '{value}', expected one of: {allowed}")]
    UnknownAlgorithm { value: String, allowed: String },

    #[error("unknown text analyzer '{value}', expected one of: {allowed}")]
    UnknownAnalyzer { value: String, allowed: String },

    #[error("unsupported target '{catalog} {entity}', expected one of: {allowed}")]
    UnknownTarget {
        catalog: String,
        entity: String,
        allowed: String,
    },

    #[error("classifier '{classifier}' requires the '{parameter}' parameter")]
    MissingParameter {
        classifier: String,
        parameter: String,
    },

    #[error("invalid value for parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("feature schema mismatch: model expects {expected:?}, got {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("length mismatch: {left} rows vs {right} rows")]
    LengthMismatch { left: usize, right: usize },

    #[error("unknown {side} identifier '{id}'")]
    UnknownIdentifier { side: String, id: String },

    #[error("training failed: {0}")]
    Training(String),

    #[error("classifier '{0}' has not been fitted")]
    NotFitted(String),

    #[error("malformed value in column '{column}': {reason}")]
    MalformedValue { column: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("tensor backend error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl LinkerError {
    pub fn malformed(column: &str, reason: impl Into<String>) -> Self {
        LinkerError::MalformedValue {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    pub fn training(reason: impl Into<String>) -> Self {
        LinkerError::Training(reason.into())
    }
}
