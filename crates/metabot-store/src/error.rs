//! Error types for the metabot-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Failures are never retried here; they propagate to the caller of the
//! operation that triggered the read or write.

use std::path::PathBuf;

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the chat store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The chat has no persisted state record.
    #[error("no state record for chat {chat_id}")]
    NotFound { chat_id: String },

    /// The chat id cannot be used as a directory name.
    #[error("invalid chat id: {0:?}")]
    InvalidChatId(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
