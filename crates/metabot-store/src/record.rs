//! The persisted shape of one conversation.

use serde::{Deserialize, Serialize};

use metabot_kernel::StopwatchState;

/// Persisted chat state, stored as `state.json`.
///
/// ```json
/// {"chatId":"42","stepId":"2","refId":"promo","active":true,
///  "timers":[{"start":1725824170365,"timeout":7200000,"done":false}]}
/// ```
///
/// `timers` holds one entry per delayed action of the current step, in the
/// step's delayed-action order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    /// Transport-assigned conversation id.
    pub chat_id: String,
    /// Current step, absent before the first step switch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Referral code, set at most once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    /// `false` once the recipient is reported unreachable.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Snapshots of the current step's timers.
    #[serde(default)]
    pub timers: Vec<StopwatchState>,
}

fn default_active() -> bool {
    true
}

impl ChatRecord {
    /// A fresh, active record with no timers.
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            step_id: None,
            ref_id: None,
            active: true,
            timers: Vec::new(),
        }
    }
}
