//! Event system for sequence execution
//!
//! This crate provides the lifecycle event bus, progress event types and
//! the sinks progress notifications are delivered to.

mod bus;
mod sink;
mod types;

pub use bus::{EventBus, ExecutionEvents};
pub use sink::{BusProgressSink, ChannelSink, DeliveryError, ProgressSink};
pub use types::*;
