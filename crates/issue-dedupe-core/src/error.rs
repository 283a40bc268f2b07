//! Error type shared by the engine port, the gateway and the batch scanner.

use thiserror::Error;

/// Failures talking to (or interpreting) the external search engine.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Connectivity failure: the request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response arrived but did not have the expected shape.
    #[error("failed to decode engine response: {0}")]
    Decode(String),

    /// The requested document id does not exist in the index.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Non-success status; `body` is the raw error envelope.
    #[error("engine returned {status}: {body}")]
    Engine { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A batch worker panicked or could not obtain a permit.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl SearchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SearchError::NotFound(_))
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
