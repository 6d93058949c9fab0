//! Parsed scenario representation.
//!
//! A [`Scenario`] is built once from the document text by
//! [`parse_markdown`](crate::parse_markdown) and never mutated afterwards;
//! the engine shares it behind an `Arc` for the whole process lifetime.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Resolved form of an action target.
///
/// `(stepId) trailing text` yields `step_id = Some("stepId")` and
/// `text = "trailing text"`; a plain target yields `step_id = None` and the
/// whole target as `text`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepRef {
    /// Step to switch to, if the target names one.
    pub step_id: Option<String>,
    /// Message to send, possibly empty.
    pub text: String,
}

/// A single offered transition or timed side effect inside a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Trimmed label as written, including any parenthesized annotation.
    pub name: String,
    /// The label starts with an `(unread` marker.
    pub is_unread_marker: bool,
    /// Plain labels are rendered as keyboard buttons.
    pub is_button: bool,
    /// Delay parsed from a leading `(...)` annotation; zero when absent.
    pub delay: Duration,
    /// Raw text after the first colon.
    pub target: String,
    /// The target split into step reference and message text.
    pub reference: StepRef,
}

impl Action {
    /// Whether this action runs on a timer when its step becomes current.
    pub fn is_delayed(&self) -> bool {
        !self.delay.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One named state of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Heading text with any trailing `(...)` annotation stripped.
    pub id: String,
    /// Annotated `(immediate)`: the conversation starts here.
    pub is_entry: bool,
    /// Absolute time at which every chat is moved to this step.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Non-action lines, in source order.
    pub body: Vec<String>,
    /// Actions in source order; names are unique.
    pub actions: Vec<Action>,
    /// Names of button actions, in source order.
    pub buttons: Vec<String>,
}

impl Step {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_entry: false,
            scheduled_at: None,
            body: Vec::new(),
            actions: Vec::new(),
            buttons: Vec::new(),
        }
    }

    /// Look up an action by its exact label.
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Actions with a nonzero delay, in source order.
    pub fn delayed_actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| a.is_delayed())
    }

    /// Body lines joined for rendering.
    pub fn text(&self) -> String {
        self.body.join("\n")
    }

    /// Insert an action, replacing an earlier one with the same name in
    /// place.  Returns `true` when a duplicate was replaced.
    pub(crate) fn insert_action(&mut self, action: Action) -> bool {
        if action.is_button && !self.buttons.contains(&action.name) {
            self.buttons.push(action.name.clone());
        }
        match self.actions.iter_mut().find(|a| a.name == action.name) {
            Some(existing) => {
                *existing = action;
                true
            }
            None => {
                self.actions.push(action);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// A top-level bot command derived from the metadata block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Command as written, e.g. `/restart`.
    pub command: String,
    /// Human-readable description shown by the client.
    pub description: String,
}

/// The fully parsed conversation script.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Scenario title from the metadata heading.
    pub name: String,
    /// Metadata body text.
    pub description: String,
    /// Top-level commands from the metadata block's actions.
    pub menu: Vec<MenuItem>,
    steps: Vec<Step>,
    index: HashMap<String, usize>,
    entry: usize,
}

impl Scenario {
    /// Assemble a scenario.  `steps` must have unique ids and `entry` must
    /// index into it; the parser guarantees both.
    pub(crate) fn new(
        name: String,
        description: String,
        menu: Vec<MenuItem>,
        steps: Vec<Step>,
        entry: usize,
    ) -> Self {
        let index = steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.id.clone(), i))
            .collect();
        Self {
            name,
            description,
            menu,
            steps,
            index,
            entry,
        }
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    /// The step new conversations start at.
    pub fn entry(&self) -> &Step {
        &self.steps[self.entry]
    }

    /// All playable steps in document order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of playable steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the scenario has no playable steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps carrying an absolute `scheduled_at` time.
    pub fn scheduled_steps(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.steps
            .iter()
            .filter_map(|s| s.scheduled_at.map(|at| (s.id.as_str(), at)))
    }
}
