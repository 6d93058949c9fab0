//! Kernel error types.
//!
//! The kernel is mostly infallible: duration parsing degrades to zero and
//! stopwatches never fail to construct.  The only surfaced failure is a date
//! string that matches none of the accepted formats.

/// Unified error type for the Metabot kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The text could not be interpreted as an absolute date or time.
    #[error("invalid date `{input}`: expected RFC 3339, `YYYY-MM-DD HH:MM[:SS]` or `YYYY-MM-DD`")]
    InvalidDate { input: String },
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
