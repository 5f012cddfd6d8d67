//! Destinations for progress notifications

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::types::{Event, EventEnvelope, ProgressEvent};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Progress channel closed")]
    Closed,

    #[error("Progress delivery failed: {0}")]
    Failed(String),
}

/// Somewhere progress events can be delivered to.
///
/// Implementations may be slow or fail; callers treat delivery as best effort.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn deliver(&self, event: ProgressEvent) -> Result<(), DeliveryError>;
}

/// Publishes one run's progress on the bus as `sequence.progress`.
#[derive(Debug, Clone)]
pub struct BusProgressSink {
    bus: EventBus,
    execution_id: Uuid,
}

impl BusProgressSink {
    pub fn new(bus: EventBus, execution_id: Uuid) -> Self {
        Self { bus, execution_id }
    }
}

#[async_trait]
impl ProgressSink for BusProgressSink {
    async fn deliver(&self, event: ProgressEvent) -> Result<(), DeliveryError> {
        // Zero subscribers is not a failure, the event is simply dropped
        self.bus.publish(EventEnvelope::new(Event::SequenceProgress {
            execution_id: Some(self.execution_id),
            progress: event,
        }));
        Ok(())
    }
}

/// Forwards progress events into an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn deliver(&self, event: ProgressEvent) -> Result<(), DeliveryError> {
        self.sender.send(event).map_err(|_| DeliveryError::Closed)
    }
}
