//! One-way notification channel for scheduled steps.
//!
//! When a scenario is started, every step whose `scheduled_at` lies in the
//! future gets a sleeping tokio task.  When the time arrives the task sends
//! the step id through the channel; the orchestrator is the only subscriber
//! and fans the id out to every tracked chat.  Steps whose time has already
//! passed at load are skipped.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::model::Scenario;

/// Receiver side of the scheduled-step channel plus the timers feeding it.
///
/// Dropping the schedule cancels every pending timer.
#[derive(Debug)]
pub struct StepSchedule {
    rx: mpsc::UnboundedReceiver<String>,
    // Held so `recv` pends instead of closing once every timer has fired.
    _tx: mpsc::UnboundedSender<String>,
    handles: Vec<JoinHandle<()>>,
}

impl Scenario {
    /// Arm a timer for every future-dated step.  Call once at startup.
    pub fn start_schedule(&self) -> StepSchedule {
        let (tx, rx) = mpsc::unbounded_channel();
        let now = Utc::now();
        let mut handles = Vec::new();

        for (step_id, at) in self.scheduled_steps() {
            let Ok(delay) = (at - now).to_std() else {
                debug!(step_id, at = %at, "scheduled step already in the past, skipping");
                continue;
            };
            if delay.is_zero() {
                continue;
            }

            info!(step_id, at = %at, "scheduling global step");
            let tx = tx.clone();
            let step_id = step_id.to_string();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                debug!(step_id = %step_id, "scheduled step due");
                let _ = tx.send(step_id);
            }));
        }

        StepSchedule {
            rx,
            _tx: tx,
            handles,
        }
    }
}

impl StepSchedule {
    /// Wait for the next step to come due.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Number of timers armed at start.
    pub fn armed(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for StepSchedule {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
