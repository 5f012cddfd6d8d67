//! Event types published while sequences execute

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Progress notification for a single sequence run, keyed by the
/// caller's correlation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub token: String,
    /// Steps settled so far
    pub progress: u32,
    /// Steps in the sequence
    pub total: u32,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(
        token: impl Into<String>,
        progress: u32,
        total: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            progress,
            total,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.progress == self.total
    }
}

/// All possible events in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A validated sequence began executing
    #[serde(rename = "sequence.started")]
    SequenceStarted {
        execution_id: Uuid,
        total_steps: usize,
    },

    /// A step reached a terminal status
    #[serde(rename = "step.settled")]
    StepSettled {
        execution_id: Uuid,
        index: usize,
        tool_name: String,
        status: String,
        attempt_count: u32,
        duration_ms: u64,
    },

    /// Progress forwarded from a run that supplied a progress token
    #[serde(rename = "sequence.progress")]
    SequenceProgress {
        execution_id: Option<Uuid>,
        progress: ProgressEvent,
    },

    /// The step loop ended and the report was built
    #[serde(rename = "sequence.completed")]
    SequenceCompleted {
        execution_id: Uuid,
        status: String,
        successful_steps: usize,
        failed_steps: usize,
        skipped_steps: usize,
        total_duration_ms: u64,
    },

    // System events
    /// Generic error event
    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// Get the execution ID associated with this event, if any
    pub fn execution_id(&self) -> Option<Uuid> {
        match self {
            Event::SequenceStarted { execution_id, .. } => Some(*execution_id),
            Event::StepSettled { execution_id, .. } => Some(*execution_id),
            Event::SequenceProgress { execution_id, .. } => *execution_id,
            Event::SequenceCompleted { execution_id, .. } => Some(*execution_id),
            Event::Error { .. } => None,
        }
    }
}
