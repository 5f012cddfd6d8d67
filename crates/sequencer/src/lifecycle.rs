//! Lifecycle events for a single run, published on the shared bus.
//!
//! Every event carries the run's execution id, so observers can follow one
//! run with `EventBus::subscribe_execution`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use events::{Event, EventBus};
use sequence_core::{ExecutionSummary, StepResult};
use uuid::Uuid;

#[derive(Clone)]
pub struct LifecycleEmitter {
    bus: Option<EventBus>,
    execution_id: Uuid,
    sequence: Arc<AtomicU64>,
}

impl LifecycleEmitter {
    pub fn new(bus: Option<EventBus>, execution_id: Uuid) -> Self {
        Self {
            bus,
            execution_id,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn started(&self, total_steps: usize) {
        self.emit(Event::SequenceStarted {
            execution_id: self.execution_id,
            total_steps,
        });
    }

    pub fn step_settled(&self, result: &StepResult) {
        self.emit(Event::StepSettled {
            execution_id: self.execution_id,
            index: result.index,
            tool_name: result.tool_name.clone(),
            status: result.status.as_str().to_string(),
            attempt_count: result.attempt_count,
            duration_ms: result.duration_ms,
        });
    }

    pub fn completed(&self, summary: &ExecutionSummary) {
        self.emit(Event::SequenceCompleted {
            execution_id: self.execution_id,
            status: summary.overall_status.as_str().to_string(),
            successful_steps: summary.successful_steps,
            failed_steps: summary.failed_steps,
            skipped_steps: summary.skipped_steps,
            total_duration_ms: summary.total_duration_ms,
        });
    }

    /// The run aborted without producing a report.
    pub fn fault(&self, message: impl Into<String>) {
        self.emit(Event::Error {
            message: message.into(),
            context: Some(format!("execution {}", self.execution_id)),
        });
    }

    /// Number of events emitted so far.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn emit(&self, event: Event) {
        let Some(bus) = &self.bus else {
            return;
        };
        self.sequence.fetch_add(1, Ordering::SeqCst);
        bus.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_carry_execution_id() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let execution_id = Uuid::new_v4();
        let emitter = LifecycleEmitter::new(Some(bus), execution_id);

        emitter.started(2);
        emitter.step_settled(&StepResult::skipped(0, "press_key", None, "cancelled"));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.event, Event::SequenceStarted { total_steps: 2, .. }));
        assert_eq!(first.event.execution_id(), Some(execution_id));

        let second = rx.recv().await.unwrap();
        match second.event {
            Event::StepSettled { status, index, .. } => {
                assert_eq!(status, "skipped");
                assert_eq!(index, 0);
            }
            _ => panic!("Wrong event type"),
        }
        assert_eq!(emitter.current_sequence(), 2);
    }

    #[test]
    fn test_without_bus_is_noop() {
        let emitter = LifecycleEmitter::new(None, Uuid::new_v4());
        emitter.started(1);
        emitter.fault("dispatcher gone");
        assert_eq!(emitter.current_sequence(), 0);
    }

    #[test]
    fn test_clone_shares_sequence() {
        let emitter = LifecycleEmitter::new(Some(EventBus::new()), Uuid::new_v4());
        let clone = emitter.clone();

        emitter.started(1);
        clone.fault("boom");
        assert_eq!(emitter.current_sequence(), 2);
    }
}
