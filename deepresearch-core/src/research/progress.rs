//! Progress events emitted after every step and at termination.

use super::availability::ActionAvailability;
use super::budget::BudgetSnapshot;
use super::controller::FinalAnswer;
use super::knowledge::Reference;
use crate::types::ActionKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Progress,
    Answer,
    Error,
}

/// What happened in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionState {
    /// The gap the step worked on.
    pub question: String,
    /// Executed action; `None` when the decision was rejected.
    pub action: Option<ActionKind>,
    pub think: String,
    pub params: serde_json::Value,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    /// Open questions after the step.
    pub gaps: Vec<String>,
    pub bad_attempts: u32,
    pub availability: ActionAvailability,
    /// Why the proposed decision or answer was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    Action(ActionState),
    Answer(FinalAnswer),
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub step: u64,
    pub budget: BudgetSnapshot,
    pub data: EventData,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn progress(step: u64, budget: BudgetSnapshot, state: ActionState) -> Self {
        Self {
            kind: EventKind::Progress,
            step,
            budget,
            data: EventData::Action(state),
            timestamp: Utc::now(),
        }
    }

    pub fn answer(answer: FinalAnswer) -> Self {
        Self {
            kind: EventKind::Answer,
            step: answer.steps,
            budget: answer.budget.clone(),
            data: EventData::Answer(answer),
            timestamp: Utc::now(),
        }
    }

    pub fn error(step: u64, budget: BudgetSnapshot, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            step,
            budget,
            data: EventData::Error {
                message: message.into(),
            },
            timestamp: Utc::now(),
        }
    }

    /// Answer and error events end a run; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        self.kind != EventKind::Progress
    }

    /// SSE event name.
    pub fn event_name(&self) -> &'static str {
        match self.kind {
            EventKind::Progress => "progress",
            EventKind::Answer => "answer",
            EventKind::Error => "error",
        }
    }
}

/// Receives progress events from the controller.
///
/// Called synchronously from the loop; implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events into an unbounded channel. A closed receiver is ignored.
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory, for tests and post-run inspection.
#[derive(Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn emit(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
