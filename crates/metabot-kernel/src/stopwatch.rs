//! Resumable single-shot countdown timers.
//!
//! A [`Stopwatch`] fires a callback once its timeout has elapsed, measured
//! from an absolute `start` instant expressed in epoch milliseconds.  Because
//! the start instant is part of the persisted [`StopwatchState`], a countdown
//! restored after a process restart resumes with only the *remaining* time
//! instead of the full timeout.
//!
//! # Restore rules
//!
//! ```text
//! state.done == true            -> never scheduled, remaining() == 0
//! restored, remaining() == 0    -> never scheduled, is_overdue() == true
//! otherwise                     -> fires callback after remaining()
//! ```
//!
//! An overdue stopwatch does not invoke its callback.  The owner decides
//! whether to replay the side effect once (then call
//! [`Stopwatch::mark_done`]) or treat it as already handled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::time::epoch_millis;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Serializable snapshot of a stopwatch, persisted with each chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopwatchState {
    /// Epoch milliseconds at which the countdown began.
    pub start: i64,
    /// Total countdown length in milliseconds.
    pub timeout: u64,
    /// Whether the countdown has already fired (or was handled).
    #[serde(default)]
    pub done: bool,
}

/// Construction options for [`Stopwatch::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopwatchOptions {
    /// Start instant in epoch milliseconds; `None` means "now".
    pub start: Option<i64>,
    /// Total countdown length.
    pub timeout: Duration,
    /// Create the stopwatch already finished.
    pub done: bool,
}

impl StopwatchOptions {
    /// Options for a fresh countdown starting now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            start: None,
            timeout,
            done: false,
        }
    }
}

impl From<StopwatchState> for StopwatchOptions {
    fn from(state: StopwatchState) -> Self {
        Self {
            start: Some(state.start),
            timeout: Duration::from_millis(state.timeout),
            done: state.done,
        }
    }
}

// ---------------------------------------------------------------------------
// Stopwatch
// ---------------------------------------------------------------------------

/// A single-shot countdown backed by a tokio task.
///
/// Dropping a stopwatch cancels any pending firing.
#[derive(Debug)]
pub struct Stopwatch {
    start: i64,
    timeout: Duration,
    done: Arc<AtomicBool>,
    overdue: bool,
    handle: Option<JoinHandle<()>>,
}

impl Stopwatch {
    /// Create a stopwatch and, unless it is finished or overdue, schedule
    /// `callback` to run once the remaining time has elapsed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(callback: F, options: StopwatchOptions) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let restored = options.start.is_some();
        let mut stopwatch = Self {
            start: options.start.unwrap_or_else(epoch_millis),
            timeout: options.timeout,
            done: Arc::new(AtomicBool::new(options.done)),
            overdue: false,
            handle: None,
        };

        if options.done {
            debug!(start = stopwatch.start, "stopwatch restored as done");
            return stopwatch;
        }

        let remaining = stopwatch.remaining();
        if restored && remaining.is_zero() {
            debug!(start = stopwatch.start, "stopwatch restored past its deadline");
            stopwatch.overdue = true;
            return stopwatch;
        }

        let done = Arc::clone(&stopwatch.done);
        stopwatch.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            done.store(true, Ordering::SeqCst);
            callback();
        }));
        stopwatch
    }

    /// Time left before firing, measured against the current wall clock.
    pub fn remaining(&self) -> Duration {
        self.remaining_at(epoch_millis())
    }

    /// Time left before firing as of `now` (epoch milliseconds).
    ///
    /// `max(0, timeout - (now - start))`; a finished stopwatch always
    /// reports zero.
    pub fn remaining_at(&self, now: i64) -> Duration {
        if self.is_done() {
            return Duration::ZERO;
        }
        let elapsed = u64::try_from(now.saturating_sub(self.start)).unwrap_or(0);
        self.timeout.saturating_sub(Duration::from_millis(elapsed))
    }

    /// Whether the countdown has fired or was created finished.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Whether this stopwatch was restored after its deadline and has not
    /// been handled yet.
    pub fn is_overdue(&self) -> bool {
        self.overdue && !self.is_done()
    }

    /// Whether a firing is still pending.
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished()) && !self.is_done()
    }

    /// Record that the owner has handled this countdown's side effect.
    pub fn mark_done(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        self.overdue = false;
    }

    /// Current persistable snapshot.
    pub fn state(&self) -> StopwatchState {
        StopwatchState {
            start: self.start,
            timeout: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            done: self.is_done(),
        }
    }

    /// Cancel any pending firing and return the last known state.
    ///
    /// Idempotent.  Stopping does not mark the countdown done, so a state
    /// captured at shutdown resumes on the next start.
    pub fn stop(&mut self) -> StopwatchState {
        let state = self.state();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        state
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
