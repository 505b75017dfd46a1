//! Ingest bridge error types

use thiserror::Error;

/// Contract violations detected by the bridge
///
/// These never cross back to the foreign caller (except [`IngestError::Arity`],
/// raised by the module surface); the bridge logs them and drops the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    /// Callback, context or batch not supplied
    #[error("missing {argument}")]
    MissingArgument {
        /// `callback`, `context` or `readings`
        argument: &'static str,
    },

    /// Capsule of the wrong kind (or not a capsule) in a capsule position
    #[error("{argument} must be a {expected} capsule, got {found}")]
    WrongCapsule {
        argument: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Batch is not a list
    #[error("filter did not return a list but object type {found}")]
    NotASequence { found: &'static str },

    /// List without readings
    #[error("filter returned an empty list of readings")]
    EmptyBatch,

    /// One element could not become a reading; the batch is rejected
    #[error("reading {index}: {message}")]
    InvalidElement { index: usize, message: String },

    /// Wrong number of arguments to the module method
    #[error("{method}() takes exactly {expected} arguments ({found} given)")]
    Arity {
        method: &'static str,
        expected: usize,
        found: usize,
    },
}

impl IngestError {
    pub fn invalid_element(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidElement {
            index,
            message: message.into(),
        }
    }

    /// Label used in metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingArgument { .. } => "missing_argument",
            Self::WrongCapsule { .. } => "wrong_capsule",
            Self::NotASequence { .. } => "not_a_sequence",
            Self::EmptyBatch => "empty_batch",
            Self::InvalidElement { .. } => "invalid_element",
            Self::Arity { .. } => "arity",
        }
    }
}

/// Ingest bridge Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;
