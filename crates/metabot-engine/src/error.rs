//! Engine error types.

use std::path::PathBuf;

use metabot_adapters::AdapterError;
use metabot_scenario::ScenarioError;
use metabot_store::StoreError;

/// Errors raised while playing a scenario.
///
/// Delivery failures are normally absorbed by the chat that hit them; only
/// errors the caller must see (persistence, a broken scenario) propagate.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The scenario document could not be read.
    #[error("failed to read scenario {}: {source}", path.display())]
    ScenarioRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scenario document is malformed.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// Reading or writing chat state failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The transport rejected a request that is not per-chat delivery.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// A chat points at a step the scenario does not contain.
    #[error("step `{step_id}` is not in the scenario")]
    UnknownStep { step_id: String },

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
