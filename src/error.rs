use std::path::PathBuf;

use thiserror::Error;

use crate::quantification::QuantifierKind;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for learning, quantification and ranking.
///
/// Rate and measure computations never produce an error for a zero
/// denominator; they resolve to 0 instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cbor(#[from] serde_cbor::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A persisted resource is missing or could not be decoded.
    #[error("cannot read {resource} at {}: {message}", path.display())]
    Resource {
        resource: &'static str,
        path: PathBuf,
        message: String,
    },

    /// A quantifier slot holds a different kind than the caller expected.
    #[error("quantifier slot {slot} holds {found:?}, expected {expected:?}")]
    QuantifierSlot {
        slot: usize,
        expected: QuantifierKind,
        found: QuantifierKind,
    },

    #[error("unknown category id {0}")]
    UnknownCategory(u32),

    #[error("unknown ranking policy `{0}`")]
    UnknownPolicy(String),

    /// The base learner could not build a classifier.
    #[error("learner failed: {0}")]
    Learner(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Wrap a failure to open or decode a persisted file.
    pub fn resource(resource: &'static str, path: impl Into<PathBuf>, err: impl ToString) -> Self {
        Self::Resource {
            resource,
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
