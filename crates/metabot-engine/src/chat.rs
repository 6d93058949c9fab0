//! Per-conversation state machine.
//!
//! A [`Chat`] tracks which step a conversation is on, owns the timers of
//! that step's delayed actions and renders steps through the transport.
//! Every mutating operation takes `&mut self`; the orchestrator handles one
//! event at a time, so a step switch (stop timers, set step, arm timers,
//! persist) is never interleaved with another event for the same chat.
//!
//! Timers never touch the chat directly.  A firing stopwatch only posts a
//! [`TimerElapsed`] into the orchestrator's queue, which hands it back to
//! [`Chat::handle_timer`].  A timer is persisted as done only once that
//! handler has run, so a firing still queued at shutdown is replayed after
//! the restart instead of being lost.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use metabot_adapters::{Sender, Transport};
use metabot_kernel::{Stopwatch, StopwatchOptions, StopwatchState};
use metabot_scenario::{Action, Scenario, Step};
use metabot_store::{ChatRecord, ChatStore};

use crate::error::{EngineError, Result};
use crate::event::TimerElapsed;
use crate::menu::{self, MenuCommand};

/// Acknowledgement for input that matches no action.
pub const SAVED_REPLY: &str = "_Your message has been saved_";

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

/// Collaborators shared by every chat of one bot.
#[derive(Clone)]
pub struct ChatContext {
    pub scenario: Arc<Scenario>,
    pub store: ChatStore,
    pub transport: Arc<dyn Transport>,
    timer_tx: mpsc::UnboundedSender<TimerElapsed>,
}

impl ChatContext {
    /// Build a context and the receiving end of its timer queue.
    pub fn new(
        scenario: Arc<Scenario>,
        store: ChatStore,
        transport: Arc<dyn Transport>,
    ) -> (Self, mpsc::UnboundedReceiver<TimerElapsed>) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let ctx = Self {
            scenario,
            store,
            transport,
            timer_tx,
        };
        (ctx, timer_rx)
    }
}

/// One live timer and the action it belongs to.
struct ActionTimer {
    action: Action,
    stopwatch: Stopwatch,
    /// Set once the side effect has run.
    handled: bool,
}

impl ActionTimer {
    fn state(&self) -> StopwatchState {
        StopwatchState {
            done: self.handled,
            ..self.stopwatch.state()
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Run-time state of one conversation.
pub struct Chat {
    chat_id: String,
    step_id: Option<String>,
    ref_id: Option<String>,
    active: bool,
    timers: Vec<ActionTimer>,
    generation: u64,
    ctx: ChatContext,
}

impl std::fmt::Debug for Chat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chat")
            .field("chat_id", &self.chat_id)
            .field("step_id", &self.step_id)
            .field("ref_id", &self.ref_id)
            .field("active", &self.active)
            .field("timers", &self.timers.len())
            .field("generation", &self.generation)
            .finish()
    }
}

impl Chat {
    /// Start a brand-new conversation at the entry step and persist it.
    ///
    /// No timers are armed and nothing is rendered; the caller performs the
    /// first step switch.
    pub async fn create(ctx: ChatContext, chat_id: &str, ref_id: Option<String>) -> Result<Self> {
        let chat = Self {
            chat_id: chat_id.to_string(),
            step_id: Some(ctx.scenario.entry().id.clone()),
            ref_id,
            active: true,
            timers: Vec::new(),
            generation: 0,
            ctx,
        };
        chat.save_state().await?;
        info!(chat_id, ref_id = ?chat.ref_id, "new chat");
        Ok(chat)
    }

    /// Rebuild a chat from its persisted record and resume its timers.
    ///
    /// Persisted timers are matched to the current step's delayed actions by
    /// position; actions without a persisted timer start a fresh countdown.
    /// A timer whose deadline passed while the process was down is replayed
    /// once through the timer queue.
    pub fn restore(ctx: ChatContext, record: ChatRecord) -> Self {
        let mut chat = Self {
            chat_id: record.chat_id,
            step_id: record.step_id,
            ref_id: record.ref_id,
            active: record.active,
            timers: Vec::new(),
            generation: 0,
            ctx,
        };

        let scenario = Arc::clone(&chat.ctx.scenario);
        match current_step(&scenario, chat.step_id.as_deref()) {
            Ok(step) => chat.start_timers(step, record.timers),
            Err(e) => warn!(chat_id = %chat.chat_id, error = %e, "restored chat has no playable step"),
        }

        let overdue: Vec<usize> = chat
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.stopwatch.is_overdue())
            .map(|(slot, _)| slot)
            .collect();
        for slot in overdue {
            info!(chat_id = %chat.chat_id, slot, "replaying timer that elapsed while offline");
            chat.post_timer(slot);
        }

        debug!(chat_id = %chat.chat_id, step_id = ?chat.step_id, timers = chat.timers.len(), "chat restored");
        chat
    }

    // -- accessors ----------------------------------------------------------

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn step_id(&self) -> Option<&str> {
        self.step_id.as_deref()
    }

    pub fn ref_id(&self) -> Option<&str> {
        self.ref_id.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of timers owned for the current step.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Incremented on every step switch; tags timer events.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Snapshot of the chat in its persisted shape.
    pub fn to_record(&self) -> ChatRecord {
        ChatRecord {
            chat_id: self.chat_id.clone(),
            step_id: self.step_id.clone(),
            ref_id: self.ref_id.clone(),
            active: self.active,
            timers: self.timers.iter().map(ActionTimer::state).collect(),
        }
    }

    // -- persistence --------------------------------------------------------

    /// Persist the current record.
    pub async fn save_state(&self) -> Result<()> {
        self.ctx.store.save(&self.to_record()).await?;
        Ok(())
    }

    /// Append a line to the conversation log.
    pub async fn write_history(&self, text: &str) -> Result<()> {
        self.ctx.store.append_history(&self.chat_id, text).await?;
        Ok(())
    }

    /// Log the first contact of a new chat along with who sent it.
    pub async fn write_first_contact(&self, command: &str, sender: &Sender) -> Result<()> {
        let identity = serde_json::to_string(sender)?;
        self.write_history(&format!("{command} {identity}")).await
    }

    // -- transitions --------------------------------------------------------

    /// Move to `step_id`, replacing the current step's timers with the new
    /// step's.  Returns `false` and changes nothing when the step does not
    /// exist.
    #[instrument(skip(self), fields(chat_id = %self.chat_id))]
    pub async fn switch_step(&mut self, step_id: &str) -> Result<bool> {
        let scenario = Arc::clone(&self.ctx.scenario);
        let Some(step) = scenario.step(step_id) else {
            debug!("switch target not in scenario, ignoring");
            return Ok(false);
        };

        self.stop_timers();
        self.generation += 1;
        self.step_id = Some(step.id.clone());
        self.start_timers(step, Vec::new());
        self.save_state().await?;
        debug!(timers = self.timers.len(), "switched step");
        Ok(true)
    }

    /// Render the current step: its body plus its buttons as a keyboard.
    pub async fn show_step(&mut self) -> Result<()> {
        let scenario = Arc::clone(&self.ctx.scenario);
        match current_step(&scenario, self.step_id.as_deref()) {
            Ok(step) => {
                self.send_message(&step.text(), Some(step.buttons.as_slice()))
                    .await
            }
            Err(e) => {
                warn!(chat_id = %self.chat_id, error = %e, "cannot show step");
                let msg = format!("Step {} is not found", self.step_label());
                self.send_message(&msg, None).await
            }
        }
    }

    /// Dispatch user input: slash commands go to the built-in menu, anything
    /// else is matched against the current step's actions.
    pub async fn process_command(&mut self, command: &str) -> Result<()> {
        if !command.starts_with('/') {
            return self.process_step(command).await;
        }
        match MenuCommand::parse(command) {
            Some(menu) => self.run_menu(menu).await,
            None => {
                debug!(chat_id = %self.chat_id, command, "unknown command ignored");
                Ok(())
            }
        }
    }

    async fn run_menu(&mut self, command: MenuCommand) -> Result<()> {
        debug!(chat_id = %self.chat_id, command = command.as_str(), "menu command");
        match command {
            MenuCommand::Restart => {
                let entry = self.ctx.scenario.entry().id.clone();
                self.switch_step(&entry).await?;
                self.show_step().await
            }
            MenuCommand::Status => {
                let msg = menu::status_text(self.ref_id.as_deref());
                self.send_message(&msg, None).await
            }
            MenuCommand::About => {
                let scenario = Arc::clone(&self.ctx.scenario);
                let msg = menu::about_text(&scenario.name, &scenario.description);
                self.send_message(&msg, None).await
            }
        }
    }

    /// Resolve `command` as an action label of the current step.
    pub async fn process_step(&mut self, command: &str) -> Result<()> {
        let scenario = Arc::clone(&self.ctx.scenario);
        let step = match current_step(&scenario, self.step_id.as_deref()) {
            Ok(step) => step,
            Err(e) => {
                warn!(chat_id = %self.chat_id, error = %e, "input for a missing step");
                let msg = format!("Step [{}] is not found", self.step_label());
                return self.send_message(&msg, None).await;
            }
        };

        let Some(action) = step.action(command) else {
            debug!(chat_id = %self.chat_id, command, "input matches no action");
            return self.send_message(SAVED_REPLY, None).await;
        };

        debug!(chat_id = %self.chat_id, action = %action.name, "action matched");
        let reference = &action.reference;
        if !reference.text.is_empty() {
            self.send_message(&reference.text, None).await?;
        }
        if let Some(next) = reference.step_id.as_deref()
            && self.switch_step(next).await?
        {
            self.show_step().await?;
        }
        Ok(())
    }

    /// Attach a referral code.  The first code sticks; every attempt is
    /// logged.
    pub async fn apply_ref(&mut self, ref_id: &str) -> Result<()> {
        let entry = serde_json::json!({ "refId": ref_id });
        self.write_history(&entry.to_string()).await?;
        if self.ref_id.is_none() {
            info!(chat_id = %self.chat_id, ref_id, "referral code applied");
            self.ref_id = Some(ref_id.to_string());
            self.save_state().await?;
        }
        Ok(())
    }

    /// Inbound traffic proves the recipient is reachable again.
    pub async fn mark_reachable(&mut self) -> Result<()> {
        if !self.active {
            info!(chat_id = %self.chat_id, "chat reactivated");
            self.active = true;
            self.save_state().await?;
        }
        Ok(())
    }

    /// Deliver a message.
    ///
    /// Delivery failures are logged and swallowed.  When the transport says
    /// the recipient is unreachable the chat is archived as inactive; only
    /// the resulting persistence error can propagate.
    pub async fn send_message(&mut self, text: &str, buttons: Option<&[String]>) -> Result<()> {
        let transport = Arc::clone(&self.ctx.transport);
        let Err(e) = transport.send_message(&self.chat_id, text, buttons).await else {
            return Ok(());
        };

        warn!(chat_id = %self.chat_id, transport = transport.id(), error = %e, "delivery failed");
        if transport.is_recipient_unreachable(&e) && self.active {
            info!(chat_id = %self.chat_id, "recipient unreachable, marking chat inactive");
            self.active = false;
            self.save_state().await?;
        }
        Ok(())
    }

    // -- timers -------------------------------------------------------------

    /// Run the side effect of an elapsed timer.
    ///
    /// A target naming a known step sends any trailing text, then switches
    /// to and shows that step.  Any other target is sent verbatim.  The chat
    /// is persisted afterwards so the timer is recorded as done.
    #[instrument(skip(self, event), fields(chat_id = %self.chat_id, slot = event.slot))]
    pub async fn handle_timer(&mut self, event: TimerElapsed) -> Result<()> {
        if event.generation != self.generation {
            debug!(
                event_generation = event.generation,
                generation = self.generation,
                "stale timer event dropped"
            );
            return Ok(());
        }
        let Some(timer) = self.timers.get_mut(event.slot) else {
            debug!("timer slot no longer exists");
            return Ok(());
        };
        if timer.handled {
            return Ok(());
        }
        timer.handled = true;
        timer.stopwatch.mark_done();
        let action = timer.action.clone();
        info!(action = %action.name, "timer elapsed");

        let scenario = Arc::clone(&self.ctx.scenario);
        let next = action
            .reference
            .step_id
            .as_deref()
            .filter(|id| scenario.step(id).is_some());

        match next {
            Some(next) => {
                if !action.reference.text.is_empty() {
                    self.send_message(&action.reference.text, None).await?;
                }
                self.switch_step(next).await?;
                self.show_step().await
            }
            None => {
                self.send_message(&action.target, None).await?;
                self.save_state().await
            }
        }
    }

    /// Cancel every timer and return their last states.
    pub fn stop_timers(&mut self) -> Vec<StopwatchState> {
        self.timers
            .drain(..)
            .map(|mut t| t.stopwatch.stop())
            .collect()
    }

    /// Arm one timer per delayed action of `step`, resuming from `saved`
    /// states by position.
    fn start_timers(&mut self, step: &Step, saved: Vec<StopwatchState>) {
        let mut saved = saved.into_iter();
        for (slot, action) in step.delayed_actions().enumerate() {
            let options = saved
                .next()
                .map(StopwatchOptions::from)
                .unwrap_or_else(|| StopwatchOptions::new(action.delay));
            let handled = options.done;

            let tx = self.ctx.timer_tx.clone();
            let event = TimerElapsed {
                chat_id: self.chat_id.clone(),
                generation: self.generation,
                slot,
            };
            let stopwatch = Stopwatch::start(
                move || {
                    // The receiver only goes away at shutdown.
                    let _ = tx.send(event);
                },
                options,
            );
            self.timers.push(ActionTimer {
                action: action.clone(),
                stopwatch,
                handled,
            });
        }
    }

    fn post_timer(&self, slot: usize) {
        let _ = self.ctx.timer_tx.send(TimerElapsed {
            chat_id: self.chat_id.clone(),
            generation: self.generation,
            slot,
        });
    }

    fn step_label(&self) -> &str {
        self.step_id.as_deref().unwrap_or_default()
    }
}

/// Resolve a chat's step id against the scenario.
fn current_step<'a>(scenario: &'a Scenario, step_id: Option<&str>) -> Result<&'a Step> {
    let step_id = step_id.unwrap_or_default();
    scenario.step(step_id).ok_or_else(|| EngineError::UnknownStep {
        step_id: step_id.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use metabot_adapters::AdapterError;
    use metabot_scenario::{MenuItem, parse_markdown};

    const DOC: &str = "# Demo
A test bot.
+ /restart: Start over

## Step 1 (immediate)
Welcome!
+ Yes: (2) Great
+ No: Maybe later.
+ Lost: (nowhere) Off the map
+ (1h): (2)

## Step 2
Second
+ Back: (1)
";

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String, Option<Vec<String>>)>>,
        blocked: bool,
    }

    #[async_trait]
    impl Transport for Recorder {
        fn id(&self) -> &str {
            "recorder"
        }

        async fn send_message(
            &self,
            chat_id: &str,
            text: &str,
            buttons: Option<&[String]>,
        ) -> metabot_adapters::Result<()> {
            self.sent.lock().unwrap().push((
                chat_id.to_string(),
                text.to_string(),
                buttons.map(<[String]>::to_vec),
            ));
            if self.blocked {
                return Err(AdapterError::Api {
                    method: "sendMessage".into(),
                    code: 403,
                    description: "blocked".into(),
                });
            }
            Ok(())
        }

        async fn set_commands(&self, _menu: &[MenuItem]) -> metabot_adapters::Result<()> {
            Ok(())
        }

        async fn answer_callback(&self, _id: &str) -> metabot_adapters::Result<()> {
            Ok(())
        }

        fn is_recipient_unreachable(&self, error: &AdapterError) -> bool {
            matches!(error, AdapterError::Api { code: 403, .. })
        }
    }

    impl Recorder {
        fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|m| m.1.clone()).collect()
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        ctx: ChatContext,
        rx: mpsc::UnboundedReceiver<TimerElapsed>,
        transport: Arc<Recorder>,
    }

    async fn fixture(doc: &str, blocked: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatStore::open(dir.path().join("history")).await.unwrap();
        let transport = Arc::new(Recorder {
            blocked,
            ..Default::default()
        });
        let scenario = Arc::new(parse_markdown(doc).unwrap());
        let (ctx, rx) = ChatContext::new(scenario, store, transport.clone());
        Fixture {
            _dir: dir,
            ctx,
            rx,
            transport,
        }
    }

    async fn started(fx: &Fixture) -> Chat {
        let mut chat = Chat::create(fx.ctx.clone(), "42", None).await.unwrap();
        chat.switch_step("1").await.unwrap();
        chat.show_step().await.unwrap();
        chat
    }

    #[tokio::test]
    async fn create_persists_entry_step() {
        let fx = fixture(DOC, false).await;
        let chat = Chat::create(fx.ctx.clone(), "42", Some("promo".into()))
            .await
            .unwrap();
        let record = fx.ctx.store.load("42").await.unwrap();
        assert_eq!(record.step_id.as_deref(), Some("1"));
        assert_eq!(record.ref_id.as_deref(), Some("promo"));
        assert_eq!(chat.timer_count(), 0);
    }

    #[tokio::test]
    async fn show_step_renders_body_and_buttons() {
        let fx = fixture(DOC, false).await;
        let _chat = started(&fx).await;
        let sent = fx.transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Welcome!");
        assert_eq!(
            sent[0].2.as_deref(),
            Some(&["Yes".to_string(), "No".to_string(), "Lost".to_string()][..])
        );
    }

    #[tokio::test]
    async fn switch_arms_delayed_actions_and_persists_them() {
        let fx = fixture(DOC, false).await;
        let chat = started(&fx).await;
        assert_eq!(chat.timer_count(), 1);
        let record = fx.ctx.store.load("42").await.unwrap();
        assert_eq!(record.timers.len(), 1);
        assert_eq!(record.timers[0].timeout, 3_600_000);
        assert!(!record.timers[0].done);
    }

    #[tokio::test]
    async fn switch_to_unknown_step_is_a_no_op() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        let generation = chat.generation();
        assert!(!chat.switch_step("missing").await.unwrap());
        assert_eq!(chat.step_id(), Some("1"));
        assert_eq!(chat.generation(), generation);
        assert_eq!(chat.timer_count(), 1);
    }

    #[tokio::test]
    async fn switching_to_current_step_twice_restarts_timers_only() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        chat.apply_ref("promo").await.unwrap();
        let before = chat.generation();

        chat.switch_step("1").await.unwrap();
        chat.switch_step("1").await.unwrap();

        assert_eq!(chat.generation(), before + 2);
        assert_eq!(chat.timer_count(), 1);
        let record = fx.ctx.store.load("42").await.unwrap();
        assert_eq!(record.step_id.as_deref(), Some("1"));
        assert_eq!(record.ref_id.as_deref(), Some("promo"));
    }

    #[tokio::test]
    async fn action_with_reference_sends_text_then_switches() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        chat.process_command("Yes").await.unwrap();
        assert_eq!(chat.step_id(), Some("2"));
        assert_eq!(chat.timer_count(), 0);
        assert_eq!(fx.transport.texts(), vec!["Welcome!", "Great", "Second"]);
    }

    #[tokio::test]
    async fn message_only_action_keeps_step() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        chat.process_command("No").await.unwrap();
        assert_eq!(chat.step_id(), Some("1"));
        assert_eq!(fx.transport.texts().last().unwrap(), "Maybe later.");
    }

    #[tokio::test]
    async fn reference_to_missing_step_sends_text_only() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        chat.process_command("Lost").await.unwrap();
        assert_eq!(chat.step_id(), Some("1"));
        assert_eq!(fx.transport.texts().last().unwrap(), "Off the map");
    }

    #[tokio::test]
    async fn unmatched_input_is_acknowledged() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        chat.process_command("hello?").await.unwrap();
        assert_eq!(chat.step_id(), Some("1"));
        assert_eq!(fx.transport.texts().last().unwrap(), SAVED_REPLY);
    }

    #[tokio::test]
    async fn menu_commands() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        chat.process_command("/status").await.unwrap();
        chat.process_command("/about").await.unwrap();
        chat.process_command("/unknown").await.unwrap();
        let texts = fx.transport.texts();
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[1], "Reference code: *none*");
        assert_eq!(texts[2], "*Demo*\n\nA test bot.");
    }

    #[tokio::test]
    async fn restart_returns_to_entry_and_rearms_timers() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        chat.process_command("Yes").await.unwrap();
        chat.process_command("/restart").await.unwrap();
        assert_eq!(chat.step_id(), Some("1"));
        assert_eq!(chat.timer_count(), 1);
        assert_eq!(fx.transport.texts().last().unwrap(), "Welcome!");
    }

    #[tokio::test]
    async fn apply_ref_first_code_wins() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        chat.apply_ref("first").await.unwrap();
        chat.apply_ref("second").await.unwrap();
        assert_eq!(chat.ref_id(), Some("first"));
        assert_eq!(
            fx.ctx.store.load("42").await.unwrap().ref_id.as_deref(),
            Some("first")
        );
    }

    #[tokio::test]
    async fn apply_ref_logs_escaped_json() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        chat.apply_ref(r#"a"b\c"#).await.unwrap();

        let log = tokio::fs::read_to_string(fx.ctx.store.root().join("42").join("messages.log"))
            .await
            .unwrap();
        let line = log.lines().last().unwrap();
        let (_, json) = line.split_once(' ').unwrap();
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["refId"], r#"a"b\c"#);
    }

    #[tokio::test]
    async fn unknown_step_renders_one_diagnostic() {
        let fx = fixture(DOC, false).await;
        let mut record = ChatRecord::new("7");
        record.step_id = Some("gone".into());
        fx.ctx.store.save(&record).await.unwrap();

        let mut chat = Chat::restore(fx.ctx.clone(), record.clone());
        chat.process_command("Yes").await.unwrap();

        assert_eq!(fx.transport.texts(), vec!["Step [gone] is not found"]);
        assert_eq!(chat.to_record(), record);
        assert_eq!(fx.ctx.store.load("7").await.unwrap(), record);
    }

    #[tokio::test]
    async fn unreachable_recipient_marks_inactive() {
        let fx = fixture(DOC, true).await;
        let chat = started(&fx).await;
        assert!(!chat.is_active());
        assert!(!fx.ctx.store.load("42").await.unwrap().active);
    }

    #[tokio::test]
    async fn mark_reachable_reactivates() {
        let fx = fixture(DOC, true).await;
        let mut chat = started(&fx).await;
        chat.mark_reachable().await.unwrap();
        assert!(chat.is_active());
        assert!(fx.ctx.store.load("42").await.unwrap().active);
    }

    #[tokio::test]
    async fn stale_timer_events_are_dropped() {
        let fx = fixture(DOC, false).await;
        let mut chat = started(&fx).await;
        let stale = TimerElapsed {
            chat_id: "42".into(),
            generation: chat.generation() - 1,
            slot: 0,
        };
        chat.handle_timer(stale).await.unwrap();
        assert_eq!(chat.step_id(), Some("1"));
        assert_eq!(fx.transport.texts().len(), 1);
    }

    #[tokio::test]
    async fn timer_with_plain_target_sends_it_verbatim() {
        let doc = "# Bot\n## Step 1 (immediate)\nHi\n+ (1s): Still there?\n";
        let mut fx = fixture(doc, false).await;
        let mut chat = started(&fx).await;

        let event = tokio::time::timeout(Duration::from_secs(5), fx.rx.recv())
            .await
            .unwrap()
            .unwrap();
        chat.handle_timer(event).await.unwrap();

        assert_eq!(fx.transport.texts(), vec!["Hi", "Still there?"]);
        let record = fx.ctx.store.load("42").await.unwrap();
        assert!(record.timers[0].done);
    }

    #[tokio::test]
    async fn fired_timer_stays_pending_until_handled() {
        let doc = "# Bot\n## Step 1 (immediate)\nHi\n+ (1s): Still there?\n";
        let mut fx = fixture(doc, false).await;
        let chat = started(&fx).await;

        let event = tokio::time::timeout(Duration::from_secs(5), fx.rx.recv())
            .await
            .unwrap()
            .unwrap();
        let record = chat.to_record();
        assert!(!record.timers[0].done);

        // The firing never reached the handler; the next process replays it.
        drop(chat);
        drop(event);
        let mut restored = Chat::restore(fx.ctx.clone(), record);
        let replay = fx.rx.try_recv().unwrap();
        restored.handle_timer(replay.clone()).await.unwrap();
        restored.handle_timer(replay).await.unwrap();

        assert_eq!(fx.transport.texts(), vec!["Hi", "Still there?"]);
        assert!(fx.ctx.store.load("42").await.unwrap().timers[0].done);
    }

    #[tokio::test]
    async fn overdue_timer_is_replayed_once_on_restore() {
        let mut fx = fixture(DOC, false).await;
        let mut record = ChatRecord::new("9");
        record.step_id = Some("1".into());
        record.timers.push(StopwatchState {
            start: 1_000,
            timeout: 3_600_000,
            done: false,
        });

        let mut chat = Chat::restore(fx.ctx.clone(), record);
        let event = fx.rx.try_recv().unwrap();
        assert!(fx.rx.try_recv().is_err());

        chat.handle_timer(event).await.unwrap();
        assert_eq!(chat.step_id(), Some("2"));
        assert_eq!(fx.transport.texts(), vec!["Second"]);
    }

    #[tokio::test]
    async fn done_timer_is_not_replayed() {
        let mut fx = fixture(DOC, false).await;
        let mut record = ChatRecord::new("9");
        record.step_id = Some("1".into());
        record.timers.push(StopwatchState {
            start: 1_000,
            timeout: 3_600_000,
            done: true,
        });

        let chat = Chat::restore(fx.ctx.clone(), record);
        assert!(fx.rx.try_recv().is_err());
        assert!(chat.to_record().timers[0].done);
    }
}
