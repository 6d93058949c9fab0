//! Scenario error types.
//!
//! The parser is best-effort: it never tries to repair a document.  The few
//! shapes it cannot turn into a playable scenario are reported through
//! [`ScenarioError`] and no partial scenario is returned.

/// Unified error type for scenario parsing.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The document has no step blocks after the metadata block.
    #[error("scenario has no steps after the metadata block")]
    NoSteps,

    /// No step heading carries the `(immediate)` annotation.
    #[error("scenario has no entry step: mark one heading with `(immediate)`")]
    MissingEntry,

    /// An action line has no `label: target` separator.
    #[error("action line in step `{step}` is missing a colon: `{line}`")]
    MissingColon { step: String, line: String },

    /// An action target opens a step reference but never closes it.
    #[error("action target in step `{step}` has an unclosed step reference: `{target}`")]
    UnclosedTarget { step: String, target: String },
}

/// Convenience alias used throughout the scenario crate.
pub type Result<T> = std::result::Result<T, ScenarioError>;
