//! # metabot-engine
//!
//! Plays a parsed scenario for every conversation of a bot.
//!
//! - [`Chat`] is the per-conversation state machine: current step, live
//!   timers for that step's delayed actions, persistence and rendering.
//! - [`Orchestrator`] owns every chat, rehydrates them at startup and runs
//!   the single event loop that feeds them inbound messages, timer firings
//!   and scheduled-step broadcasts.
//! - [`MenuCommand`] is the fixed table of built-in slash commands.

pub mod chat;
pub mod error;
pub mod event;
pub mod menu;
pub mod orchestrator;

// ── re-exports ───────────────────────────────────────────────────────

pub use chat::{Chat, ChatContext, SAVED_REPLY};
pub use error::{EngineError, Result};
pub use event::TimerElapsed;
pub use menu::MenuCommand;
pub use orchestrator::{Orchestrator, referral_code};
