//! Events fed back into the orchestrator loop by live timers.

/// A chat timer ran out.
///
/// `slot` indexes the chat's timer set, which mirrors the current step's
/// delayed actions.  `generation` is the chat's timer generation at the time
/// the timer was armed; a step switch bumps it, so an event from a
/// superseded step is recognised and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerElapsed {
    pub chat_id: String,
    pub generation: u64,
    pub slot: usize,
}
