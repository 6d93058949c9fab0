//! Metabot kernel primitives.
//!
//! This crate provides the leaf services the rest of the workspace builds on:
//!
//! - **[`time`]** -- Human duration parsing (`2h30m`, `1d 4h`) and absolute
//!   date parsing used by scenario headings and action labels.
//! - **[`stopwatch`]** -- A single-shot, resumable countdown whose
//!   [`StopwatchState`] can be persisted and restored without restarting
//!   the countdown from its full duration.
//! - **[`error`]** -- Kernel error types via [`thiserror`].

pub mod error;
pub mod stopwatch;
pub mod time;

pub use error::{KernelError, Result};
pub use stopwatch::{Stopwatch, StopwatchOptions, StopwatchState};
pub use time::{epoch_millis, parse_date, parse_duration};
