//! Per-run progress notifications.
//!
//! Events are queued on an unbounded channel and delivered by a spawned
//! forwarder, so a slow or failing sink never stalls the step loop.

use std::sync::Arc;

use events::{ProgressEvent, ProgressSink};
use sequence_core::{StepResult, Termination};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct ProgressEmitter {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
    forwarder: Option<JoinHandle<()>>,
    token: String,
    total: u32,
    last_progress: u32,
}

impl ProgressEmitter {
    /// An emitter that drops everything.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            forwarder: None,
            token: String::new(),
            total: 0,
            last_progress: 0,
        }
    }

    /// Start emitting for a run of `total` steps.
    ///
    /// Emission only happens when the caller supplied a token and there is a
    /// sink to deliver to. The initial event reports progress 0.
    pub fn start(
        token: Option<&str>,
        total: usize,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> Self {
        let (token, sink) = match (token, sink) {
            (Some(token), Some(sink)) => (token.to_string(), sink),
            _ => return Self::disabled(),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let progress = event.progress;
                if let Err(e) = sink.deliver(event).await {
                    warn!(error = %e, progress, "Failed to deliver progress notification");
                }
            }
        });

        let total = u32::try_from(total).unwrap_or(u32::MAX);
        let emitter = Self {
            sender: Some(tx),
            forwarder: Some(forwarder),
            token,
            total,
            last_progress: 0,
        };
        emitter.send(0, format!("Starting sequence of {} steps", total));
        emitter
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Report that the step at `result.index` settled.
    pub fn step_settled(&mut self, result: &StepResult) {
        let progress = u32::try_from(result.index + 1).unwrap_or(u32::MAX);
        if progress <= self.last_progress {
            return;
        }
        self.last_progress = progress;
        self.send(progress, result.describe());
    }

    /// Close the stream, emitting a terminal event if the run stopped early.
    ///
    /// Delivery is never awaited here. The returned handle resolves once the
    /// forwarder has drained the queue.
    pub fn finish(mut self, termination: Termination) -> Option<JoinHandle<()>> {
        if self.sender.is_some() && self.last_progress < self.total {
            let message = match termination {
                Termination::Completed => "Sequence completed".to_string(),
                Termination::StoppedOnError => {
                    format!("Sequence stopped on error after step {}", self.last_progress)
                }
                Termination::Cancelled => "Sequence cancelled".to_string(),
                Termination::DeadlineExceeded => "Sequence deadline exceeded".to_string(),
            };
            self.last_progress = self.total;
            self.send(self.total, message);
        }

        self.sender.take();
        self.forwarder.take()
    }

    fn send(&self, progress: u32, message: String) {
        let Some(sender) = &self.sender else {
            return;
        };
        debug!(token = %self.token, progress, total = self.total, "Queueing progress");
        let event = ProgressEvent::new(self.token.clone(), progress, self.total, message);
        if sender.send(event).is_err() {
            warn!(token = %self.token, "Progress forwarder is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use events::{ChannelSink, DeliveryError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settled(index: usize) -> StepResult {
        StepResult::skipped(index, "press_key", None, "placeholder")
    }

    async fn drain(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_full_run_progress() {
        let (sink, rx) = ChannelSink::new();
        let mut emitter = ProgressEmitter::start(Some("tok"), 2, Some(Arc::new(sink)));

        emitter.step_settled(&settled(0));
        emitter.step_settled(&settled(1));
        emitter.finish(Termination::Completed);

        let events = drain(rx).await;
        let progress: Vec<u32> = events.iter().map(|e| e.progress).collect();
        assert_eq!(progress, vec![0, 1, 2]);
        assert!(events.iter().all(|e| e.total == 2 && e.token == "tok"));
        assert!(events[2].is_terminal());
    }

    #[tokio::test]
    async fn test_early_stop_emits_terminal_event() {
        let (sink, rx) = ChannelSink::new();
        let mut emitter = ProgressEmitter::start(Some("tok"), 4, Some(Arc::new(sink)));

        emitter.step_settled(&settled(0));
        emitter.finish(Termination::StoppedOnError);

        let events = drain(rx).await;
        let progress: Vec<u32> = events.iter().map(|e| e.progress).collect();
        assert_eq!(progress, vec![0, 1, 4]);
        assert!(events[2].message.contains("stopped on error"));
    }

    #[tokio::test]
    async fn test_without_token_is_silent() {
        let (sink, rx) = ChannelSink::new();
        let mut emitter = ProgressEmitter::start(None, 2, Some(Arc::new(sink)));
        assert!(!emitter.is_enabled());

        emitter.step_settled(&settled(0));
        emitter.finish(Termination::Completed);

        assert!(drain(rx).await.is_empty());
    }

    struct FailingSink {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProgressSink for FailingSink {
        async fn deliver(&self, _event: ProgressEvent) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Failed("peer went away".to_string()))
        }
    }

    #[tokio::test]
    async fn test_delivery_failures_do_not_stop_emission() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = FailingSink {
            calls: calls.clone(),
        };
        let mut emitter = ProgressEmitter::start(Some("tok"), 1, Some(Arc::new(sink)));

        emitter.step_settled(&settled(0));
        emitter
            .finish(Termination::Completed)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
