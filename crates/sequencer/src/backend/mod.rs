//! Contract between the executor and the automation backend.
//!
//! The executor only ever talks to an [`ActionDispatcher`]. What sits behind
//! it (UI automation, a process launcher, a test double) is opaque.

mod registry;

use async_trait::async_trait;
use sequence_core::ActionError;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use registry::{Tool, ToolInfo, ToolRegistry};

/// One dispatch of a named action.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    /// Time the backend has to settle the call
    pub timeout: Duration,
}

/// Per-call execution context handed to the backend.
///
/// Owned by the run, so concurrent sequences never share session state.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub execution_id: Uuid,
    pub session_id: Option<String>,
    pub step_index: usize,
    /// 1-based attempt number for the current step
    pub attempt: u32,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The action ran and failed; recorded against the step
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The backend cannot take calls at all; aborts the run
    #[error("{0}")]
    Unavailable(String),
}

/// Uniform capability the executor dispatches steps to.
///
/// Must be safe to call from independent sequence executions at once.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn invoke(
        &self,
        request: &ActionRequest,
        ctx: &DispatchContext,
    ) -> Result<Value, DispatchError>;

    /// Names this dispatcher accepts, when it knows them up front.
    /// Used to reject unknown tools before a run starts.
    fn tool_names(&self) -> Option<Vec<String>> {
        None
    }
}
