//! Scenario model and parser for Metabot.
//!
//! This crate provides:
//!
//! - **Scenario model**: [`Scenario`], [`Step`], [`Action`] and the
//!   top-level [`MenuItem`] list, immutable once parsed.
//! - **Markdown parser**: [`parse_markdown`] turns the author-facing
//!   scenario document into the model.
//! - **Step schedule**: [`StepSchedule`] announces steps whose absolute
//!   `scheduled_at` time has elapsed, for broadcast to every chat.

pub mod error;
pub mod model;
pub mod parser;
pub mod schedule;

pub use error::{Result, ScenarioError};
pub use model::{Action, MenuItem, Scenario, Step, StepRef};
pub use parser::{ACTION_PREFIX, STEP_HEADING, parse_markdown};
pub use schedule::StepSchedule;
