//! Adapter error types.
//!
//! All transport operations surface errors through [`AdapterError`].  The
//! engine never inspects variants directly; it asks the transport whether an
//! error means the recipient is unreachable via
//! [`Transport::is_recipient_unreachable`](crate::Transport::is_recipient_unreachable).

/// Unified error type for Metabot transports.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The HTTP request itself failed (connection, TLS, timeout).
    #[error("request to `{method}` failed: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote API answered with an error.
    #[error("`{method}` returned API error (code {code}): {description}")]
    Api {
        method: String,
        code: i64,
        description: String,
    },

    /// The remote API answered with something that is not a valid reply.
    #[error("invalid response from `{method}`: {reason}")]
    InvalidResponse { method: String, reason: String },

    /// No credentials were configured for the transport.
    #[error("authentication required for transport `{transport}`")]
    AuthRequired { transport: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
