//! Transport trait and inbound event types.
//!
//! The engine renders everything through [`Transport`] and receives user
//! input as [`InboundEvent`]s.  Keeping the transport behind a trait leaves
//! the engine free of provider-specific request and error shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use metabot_scenario::MenuItem;

use crate::error::{AdapterError, Result};

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Identity of the user behind an inbound event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Provider user id.
    pub id: i64,
    /// Whether the sender is a bot account.
    #[serde(default)]
    pub is_bot: bool,
    /// Display first name.
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

/// Something a user did that the engine must react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A text message (typed or sent by a reply-keyboard button).
    Message {
        chat_id: String,
        text: String,
        sender: Sender,
    },
    /// A press on an inline button carrying `data`.
    Callback {
        chat_id: String,
        callback_id: String,
        data: String,
        sender: Sender,
    },
}

impl InboundEvent {
    /// Conversation the event belongs to.
    pub fn chat_id(&self) -> &str {
        match self {
            Self::Message { chat_id, .. } | Self::Callback { chat_id, .. } => chat_id,
        }
    }

    /// Identity of the user who caused the event.
    pub fn sender(&self) -> &Sender {
        match self {
            Self::Message { sender, .. } | Self::Callback { sender, .. } => sender,
        }
    }
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// Outbound side of a messaging provider.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short identifier used in logs.
    fn id(&self) -> &str;

    /// Deliver `text` to a chat.
    ///
    /// `buttons` of `None` leaves any current keyboard alone; `Some` replaces
    /// it with one row of the given labels, or removes it when empty.
    async fn send_message(&self, chat_id: &str, text: &str, buttons: Option<&[String]>)
    -> Result<()>;

    /// Register the top-level command menu shown by the client.
    async fn set_commands(&self, menu: &[MenuItem]) -> Result<()>;

    /// Acknowledge an inline button press.
    async fn answer_callback(&self, callback_id: &str) -> Result<()>;

    /// Whether `error` means the recipient can no longer be reached (for
    /// example because they blocked the bot).
    fn is_recipient_unreachable(&self, error: &AdapterError) -> bool;
}
