use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the IntervAIew service.
///
/// Backend connection/query failures and rate fetch failures are absorbed by
/// the gateway and the rate cache; the remaining variants reach the caller.
#[derive(Error, Debug)]
pub enum IntervaiewError {
    #[error("Warehouse connection failed: {0}")]
    Connection(String),

    #[error("Warehouse query failed: {0}")]
    Query(String),

    #[error("Completion failed: {0}")]
    Completion(String),

    #[error("Conversation archive error for '{name}': {source}")]
    Archive {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversation '{name}' is malformed: {reason}")]
    MalformedConversation { name: String, reason: String },

    #[error("Exchange rate fetch failed: {0}")]
    RateFetch(String),

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntervaiewError {
    /// True for archive failures caused by a missing conversation file.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Archive { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        ) || matches!(self, Self::SessionNotFound(_))
    }

    /// True for the archive read/write/delete failures.
    pub fn is_archive_failure(&self) -> bool {
        matches!(
            self,
            Self::Archive { .. } | Self::MalformedConversation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IntervaiewError>;
