//! Error types for the offline engine.
//!
//! Storage errors are hard failures and propagate to the caller. Client
//! errors never leave a sync pass: they are recorded on the failed row.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The local store could not be opened or used (quota, unsupported engine,
    /// poisoned handle). Surfaced to the user as "offline storage unavailable".
    #[error("offline storage unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown index '{index}' on collection '{collection}'")]
    UnknownIndex { collection: String, index: String },
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Failure reported by a `SubmissionClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, refused connection, timeout).
    #[error("{0}")]
    Network(String),

    /// The server answered with a non-success status and no usable envelope.
    #[error("server rejected submission ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("failed to decode server response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Human-readable message recorded on a failed submission.
    ///
    /// Prefers the server-provided message over the transport wrapper.
    pub fn message(&self) -> String {
        match self {
            ClientError::Network(msg) => msg.clone(),
            ClientError::Rejected { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether this looks like lost connectivity rather than a server decision.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(with_sources(&err))
        }
    }
}

/// `err` followed by its source chain, so "connection refused" and friends
/// survive reqwest's generic "error sending request" wrapper.
fn with_sources(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}
