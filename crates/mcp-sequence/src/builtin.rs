//! Tools served when no automation backend is attached.

use std::time::Duration;

use async_trait::async_trait;
use sequence_core::{ActionError, ActionErrorKind};
use sequencer::{DispatchContext, Tool, ToolRegistry};
use serde::Deserialize;
use serde_json::{json, Value};

/// Registry holding every built-in tool
pub fn builtin_registry() -> ToolRegistry {
    ToolRegistry::new()
        .register(EchoTool)
        .register(WaitTool)
        .register(FailTool)
}

#[derive(Debug, Deserialize)]
pub struct EchoArgs {
    pub message: String,
}

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    type Args = EchoArgs;

    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given message unchanged"
    }

    async fn call(&self, args: EchoArgs, ctx: &DispatchContext) -> Result<Value, ActionError> {
        Ok(json!({
            "message": args.message,
            "step_index": ctx.step_index,
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct WaitArgs {
    pub duration_ms: u64,
}

pub struct WaitTool;

#[async_trait]
impl Tool for WaitTool {
    type Args = WaitArgs;

    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Sleep for duration_ms milliseconds"
    }

    async fn call(&self, args: WaitArgs, _ctx: &DispatchContext) -> Result<Value, ActionError> {
        tokio::time::sleep(Duration::from_millis(args.duration_ms)).await;
        Ok(json!({ "waited_ms": args.duration_ms }))
    }
}

#[derive(Debug, Deserialize)]
pub struct FailArgs {
    /// One of not_found, timeout, invalid_argument, unsupported, internal
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct FailTool;

#[async_trait]
impl Tool for FailTool {
    type Args = FailArgs;

    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Fail with the requested error kind (default internal)"
    }

    async fn call(&self, args: FailArgs, _ctx: &DispatchContext) -> Result<Value, ActionError> {
        let kind = match args.kind.as_deref() {
            None => ActionErrorKind::Internal,
            Some(raw) => ActionErrorKind::parse(raw).ok_or_else(|| {
                ActionError::invalid_argument(format!("Unknown error kind '{}'", raw))
            })?,
        };
        Err(ActionError::new(
            kind,
            args.message
                .unwrap_or_else(|| format!("Requested {} failure", kind)),
        ))
    }
}
