//! Error types for the gather library.

use thiserror::Error;

/// Primary error type for fragment intake and document output.
#[derive(Error, Debug)]
pub enum GatherError {
    #[error("malformed fragment identity {key:?}: {reason}")]
    MalformedIdentity { key: String, reason: String },

    #[error("unknown fragment kind: {0}")]
    UnknownFragmentKind(String),

    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },

    /// The markdown was rendered but could not be written. The document has
    /// already left the aggregation table, so the text travels with the error.
    #[error("failed to persist document {doc_id}: {source}")]
    Persist {
        doc_id: String,
        markdown: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatherError {
    pub(crate) fn malformed(key: &str, reason: impl Into<String>) -> Self {
        GatherError::MalformedIdentity {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the submitted fragment itself.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GatherError::MalformedIdentity { .. }
                | GatherError::UnknownFragmentKind(_)
                | GatherError::InvalidPayload { .. }
                | GatherError::Json(_)
        )
    }
}

/// Convenience Result type alias for GatherError.
pub type Result<T> = std::result::Result<T, GatherError>;
