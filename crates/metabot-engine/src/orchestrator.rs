//! Bot-wide event loop.
//!
//! The [`Orchestrator`] loads the scenario once, rehydrates every persisted
//! chat and then serialises three event sources into one loop:
//!
//! ```text
//!   transport ──InboundEvent──┐
//!   chat timers ─TimerElapsed─┼──> Orchestrator ──> Chat ──> Transport
//!   StepSchedule ──step id────┘
//! ```
//!
//! Handling events one at a time keeps each chat operation atomic without
//! any locking.  A failure in one chat is logged and never stops the loop.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use metabot_adapters::{InboundEvent, Sender, Transport};
use metabot_scenario::{Scenario, StepSchedule, parse_markdown};
use metabot_store::ChatStore;

use crate::chat::{Chat, ChatContext};
use crate::error::{EngineError, Result};
use crate::event::TimerElapsed;

/// Command that may carry a referral code as its last token.
const START_COMMAND: &str = "/start";

/// Owner of every chat and of the event loop.
pub struct Orchestrator {
    ctx: ChatContext,
    chats: HashMap<String, Chat>,
    timer_rx: mpsc::UnboundedReceiver<TimerElapsed>,
    schedule: StepSchedule,
}

impl Orchestrator {
    /// Read and parse the scenario at `path`, then [`start`](Self::start).
    pub async fn load(
        path: &Path,
        store: ChatStore,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let src = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::ScenarioRead {
                path: path.to_path_buf(),
                source: e,
            })?;
        let scenario = parse_markdown(&src)?;
        info!(
            path = %path.display(),
            name = %scenario.name,
            steps = scenario.len(),
            "scenario loaded"
        );
        Self::start(scenario, store, transport).await
    }

    /// Arm the scenario's schedule and rehydrate every persisted chat.
    ///
    /// A chat whose record cannot be read is skipped with a warning.
    pub async fn start(
        scenario: Scenario,
        store: ChatStore,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let scenario = Arc::new(scenario);
        let schedule = scenario.start_schedule();
        let (ctx, timer_rx) = ChatContext::new(scenario, store, transport);

        let mut chats = HashMap::new();
        for chat_id in ctx.store.list_chats().await? {
            match ctx.store.load(&chat_id).await {
                Ok(record) => {
                    chats.insert(chat_id, Chat::restore(ctx.clone(), record));
                }
                Err(e) => warn!(chat_id = %chat_id, error = %e, "skipping unreadable chat"),
            }
        }

        info!(
            chats = chats.len(),
            scheduled = schedule.armed(),
            "orchestrator ready"
        );
        Ok(Self {
            ctx,
            chats,
            timer_rx,
            schedule,
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.ctx.scenario
    }

    /// A tracked chat by id.
    pub fn chat(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.get(chat_id)
    }

    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }

    /// Publish the scenario menu as the transport's command list.
    pub async fn register_menu(&self) -> Result<()> {
        self.ctx.transport.set_commands(&self.ctx.scenario.menu).await?;
        Ok(())
    }

    /// Process events until `shutdown` resolves or the inbound channel
    /// closes, then flush every chat.
    pub async fn run<F>(mut self, mut inbound: mpsc::Receiver<InboundEvent>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(chats = self.chats.len(), "orchestrator running");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                event = inbound.recv() => {
                    let Some(event) = event else {
                        info!("inbound channel closed");
                        break;
                    };
                    let chat_id = event.chat_id().to_string();
                    if let Err(e) = self.handle_event(event).await {
                        error!(chat_id = %chat_id, error = %e, "failed to handle inbound event");
                    }
                }
                Some(event) = self.timer_rx.recv() => {
                    let chat_id = event.chat_id.clone();
                    if let Err(e) = self.handle_timer(event).await {
                        error!(chat_id = %chat_id, error = %e, "failed to handle timer");
                    }
                }
                Some(step_id) = self.schedule.recv() => {
                    self.broadcast(&step_id).await;
                }
            }
        }

        self.shutdown().await
    }

    /// Route one inbound event to its chat, creating the chat on first
    /// contact.
    pub async fn handle_event(&mut self, event: InboundEvent) -> Result<()> {
        let (chat_id, command, sender) = match event {
            InboundEvent::Message {
                chat_id,
                text,
                sender,
            } => (chat_id, text, sender),
            InboundEvent::Callback {
                chat_id,
                callback_id,
                data,
                sender,
            } => {
                if let Err(e) = self.ctx.transport.answer_callback(&callback_id).await {
                    warn!(chat_id = %chat_id, error = %e, "failed to answer callback");
                }
                (chat_id, data, sender)
            }
        };

        let command = command.trim();
        if command.is_empty() {
            return Ok(());
        }
        let ref_id = referral_code(command);

        let Some(chat) = self.chats.get_mut(&chat_id) else {
            return self.start_chat(&chat_id, command, &sender, ref_id).await;
        };

        debug!(chat_id = %chat_id, command, "inbound command");
        chat.mark_reachable().await?;
        chat.write_history(command).await?;
        match ref_id {
            Some(code) => chat.apply_ref(code).await,
            None => chat.process_command(command).await,
        }
    }

    /// First contact: create the chat at the entry step and show it.
    async fn start_chat(
        &mut self,
        chat_id: &str,
        command: &str,
        sender: &Sender,
        ref_id: Option<&str>,
    ) -> Result<()> {
        let chat = Chat::create(self.ctx.clone(), chat_id, ref_id.map(str::to_string)).await?;
        let chat = self.chats.entry(chat_id.to_string()).or_insert(chat);

        chat.write_first_contact(command, sender).await?;
        let entry = self.ctx.scenario.entry().id.clone();
        chat.switch_step(&entry).await?;
        chat.show_step().await
    }

    /// Hand a timer event back to the chat that armed it.
    pub async fn handle_timer(&mut self, event: TimerElapsed) -> Result<()> {
        match self.chats.get_mut(&event.chat_id) {
            Some(chat) => chat.handle_timer(event).await,
            None => {
                debug!(chat_id = %event.chat_id, "timer for unknown chat dropped");
                Ok(())
            }
        }
    }

    /// Move every tracked chat to `step_id` and show it.
    pub async fn broadcast(&mut self, step_id: &str) {
        info!(step_id, chats = self.chats.len(), "broadcasting scheduled step");
        for (chat_id, chat) in &mut self.chats {
            let result = match chat.switch_step(step_id).await {
                Ok(true) => chat.show_step().await,
                Ok(false) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                error!(chat_id = %chat_id, step_id, error = %e, "broadcast failed for chat");
            }
        }
    }

    /// Run timer events already queued, persist every chat with its timers
    /// still pending, then stop the timers.  Returns the first persistence
    /// error after trying all chats.
    pub async fn shutdown(&mut self) -> Result<()> {
        while let Ok(event) = self.timer_rx.try_recv() {
            let chat_id = event.chat_id.clone();
            if let Err(e) = self.handle_timer(event).await {
                error!(chat_id = %chat_id, error = %e, "failed to handle queued timer");
            }
        }

        let mut first_error = None;
        for (chat_id, chat) in &mut self.chats {
            if let Err(e) = chat.save_state().await {
                error!(chat_id = %chat_id, error = %e, "failed to flush chat");
                first_error.get_or_insert(e);
            }
            chat.stop_timers();
        }
        info!(chats = self.chats.len(), "chats flushed");
        first_error.map_or(Ok(()), Err)
    }
}

/// Referral code carried by `/start <code>`: the last token, if any.
pub fn referral_code(command: &str) -> Option<&str> {
    let mut tokens = command.split_whitespace();
    if tokens.next()? != START_COMMAND {
        return None;
    }
    tokens.last()
}
