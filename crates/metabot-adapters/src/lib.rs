//! Messaging transport adapters for Metabot.
//!
//! The engine talks to end users only through the [`Transport`] trait
//! defined in [`traits`]; inbound traffic arrives as [`InboundEvent`]s on a
//! tokio channel.  [`telegram`] implements both sides for the Telegram Bot
//! API.

pub mod error;
pub mod telegram;
pub mod traits;

pub use error::{AdapterError, Result};
pub use telegram::{TelegramPoller, TelegramTransport};
pub use traits::{InboundEvent, Sender, Transport};
