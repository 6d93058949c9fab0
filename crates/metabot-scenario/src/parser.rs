//! Scenario document parser.
//!
//! A scenario document is plain markdown split into blocks by the step
//! heading marker:
//!
//! ```text
//! # Onboarding bot                     <- metadata block (name)
//! Walks new users through signup.      <- description
//! + /restart: Start over               <- menu command
//!
//! ## Step 1 (immediate)                <- entry step
//! Welcome! Ready?
//! + Yes: (2) Great.                    <- button, switch to step 2
//! + (unread 1h): (reminder)            <- timer, not a button
//!
//! ## Step 2
//! ...
//!
//! ## Step finale (2030-01-01 12:00)    <- scheduled for every chat
//! ```
//!
//! Lines beginning with [`ACTION_PREFIX`] are actions of the form
//! `label: target`, split on the first colon.  Everything else is body text.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use metabot_kernel::{parse_date, parse_duration};

use crate::error::{Result, ScenarioError};
use crate::model::{Action, MenuItem, Scenario, Step, StepRef};

/// Marker that starts every step block.
pub const STEP_HEADING: &str = "## Step ";

/// Prefix of an action line within a block.
pub const ACTION_PREFIX: &str = "+ ";

/// Heading annotation that marks the entry step.
const ENTRY_ANNOTATION: &str = "immediate";

/// Label prefix that flags an action as an unread marker.
const UNREAD_MARKER: &str = "(unread";

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse a full scenario document.
///
/// The first block becomes the scenario metadata; every following block is
/// a playable step.  Fails on documents with no steps, no entry step, an
/// action line without a colon, or an unclosed `(stepId` target.
pub fn parse_markdown(src: &str) -> Result<Scenario> {
    let mut blocks = src
        .split(STEP_HEADING)
        .filter(|block| !block.trim().is_empty());

    let metadata = parse_block(blocks.next().ok_or(ScenarioError::NoSteps)?)?;

    let mut steps: Vec<Step> = Vec::new();
    for block in blocks {
        let step = parse_block(block)?;
        match steps.iter_mut().find(|s| s.id == step.id) {
            Some(existing) => {
                warn!(step_id = %step.id, "duplicate step id, later block wins");
                *existing = step;
            }
            None => steps.push(step),
        }
    }

    if steps.is_empty() {
        return Err(ScenarioError::NoSteps);
    }

    let entries: Vec<usize> = steps
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.is_entry.then_some(i))
        .collect();
    let entry = *entries.last().ok_or(ScenarioError::MissingEntry)?;
    if entries.len() > 1 {
        warn!(
            count = entries.len(),
            entry = %steps[entry].id,
            "several steps marked (immediate), using the last one"
        );
    }

    let menu = metadata
        .actions
        .iter()
        .map(|action| MenuItem {
            command: action.name.clone(),
            description: action.target.clone(),
        })
        .collect();

    let name = metadata.id.trim_start_matches('#').trim().to_string();
    let description = metadata.text();

    debug!(scenario = %name, steps = steps.len(), entry = %steps[entry].id, "scenario parsed");

    Ok(Scenario::new(name, description, menu, steps, entry))
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Parse one block: heading on the first line, body and actions after it.
fn parse_block(src: &str) -> Result<Step> {
    let (heading, rest) = src.split_once('\n').unwrap_or((src, ""));
    let mut step = parse_heading(heading);

    for line in rest.trim().lines() {
        let trimmed = line.trim();
        match trimmed.strip_prefix(ACTION_PREFIX) {
            Some(text) => {
                let action = parse_action(&step.id, text.trim())?;
                if step.insert_action(action) {
                    warn!(step_id = %step.id, "duplicate action label, later line wins");
                }
            }
            None => step.body.push(line.trim_end().to_string()),
        }
    }

    Ok(step)
}

/// Split a heading into id and annotation.
///
/// `title (immediate)` marks the entry step; `title (<date>)` schedules the
/// step; any other annotation is ignored.
fn parse_heading(heading: &str) -> Step {
    let heading = heading.trim();
    let Some((title, annotation)) = heading.split_once('(') else {
        return Step::new(heading);
    };

    let mut step = Step::new(title.trim());
    let annotation = annotation.trim();
    let annotation = annotation.strip_suffix(')').unwrap_or(annotation).trim();

    if annotation == ENTRY_ANNOTATION {
        step.is_entry = true;
    } else {
        step.scheduled_at = parse_schedule(&step.id, annotation);
    }
    step
}

fn parse_schedule(step_id: &str, annotation: &str) -> Option<DateTime<Utc>> {
    match parse_date(annotation) {
        Ok(at) => Some(at),
        Err(e) => {
            debug!(step_id, error = %e, "heading annotation ignored");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Parse the text of an action line (prefix already removed).
fn parse_action(step_id: &str, text: &str) -> Result<Action> {
    let (label, target) = text
        .split_once(':')
        .ok_or_else(|| ScenarioError::MissingColon {
            step: step_id.to_string(),
            line: text.to_string(),
        })?;

    let name = label.trim().to_string();
    let target = target.trim().to_string();
    let annotated = name.starts_with('(');
    let delay = if annotated {
        parse_duration(between_parens(&name))
    } else {
        std::time::Duration::ZERO
    };
    let reference = parse_target(step_id, &target)?;

    Ok(Action {
        is_unread_marker: name.starts_with(UNREAD_MARKER),
        is_button: !annotated,
        delay,
        reference,
        name,
        target,
    })
}

/// Split `(stepId) trailing text` into its parts.
fn parse_target(step_id: &str, target: &str) -> Result<StepRef> {
    let Some(inner) = target.strip_prefix('(') else {
        return Ok(StepRef {
            step_id: None,
            text: target.to_string(),
        });
    };

    let close = inner
        .find(')')
        .ok_or_else(|| ScenarioError::UnclosedTarget {
            step: step_id.to_string(),
            target: target.to_string(),
        })?;

    let id = inner[..close].trim();
    Ok(StepRef {
        step_id: (!id.is_empty()).then(|| id.to_string()),
        text: inner[close + 1..].trim().to_string(),
    })
}

/// Text between the first `(` and the following `)`, or after the `(` if
/// the parenthesis is never closed.
fn between_parens(text: &str) -> &str {
    let Some(open) = text.find('(') else {
        return "";
    };
    let rest = &text[open + 1..];
    rest.find(')').map_or(rest, |close| &rest[..close])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
