//! MCP Server for Tool-Call Sequences
//!
//! This crate exposes the sequence engine over MCP so a client can submit an
//! ordered list of tool calls and get back a per-step report.
//!
//! The server exposes tools like:
//! - `execute_sequence` - Run steps one at a time with retry, delay and progress
//! - `list_tools` - List the tools a sequence step may name
//! - `stop_execution` - Cancel a run that is still in flight

pub mod builtin;
pub mod config;
pub mod runs;

use async_trait::async_trait;
use events::{DeliveryError, ProgressEvent, ProgressSink};
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ErrorData as McpError, *},
    schemars,
    service::{Peer, RequestContext, RoleServer},
    tool, tool_handler, tool_router, ServerHandler,
};
use sequencer::{EngineError, RunContext, SequenceEngine, SequenceRequest, ToolInfo, ToolRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::runs::ActiveRuns;

/// Request to execute a sequence of tool calls
#[derive(Debug, Clone, Default, Deserialize, schemars::JsonSchema)]
pub struct ExecuteSequenceRequest {
    /// Steps to run in order
    #[schemars(
        description = "Ordered steps. Each step is an object with tool_name, optional arguments, delay_ms or delay, retry_policy or retries, continue_on_error, timeout_ms, id and description"
    )]
    pub steps: Vec<Value>,

    #[schemars(description = "Stop at the first failed step (default true)")]
    pub stop_on_error: Option<bool>,

    /// Legacy inverse of stop_on_error
    #[serde(rename = "continue")]
    #[schemars(description = "Deprecated: keep going after failures. Ignored when stop_on_error is set")]
    pub continue_execution: Option<bool>,

    #[schemars(description = "Include arguments and per-attempt errors in the report")]
    pub include_detailed_results: Option<bool>,

    #[schemars(description = "Correlation token for progress notifications")]
    pub progress_token: Option<String>,

    #[schemars(description = "Overall deadline in milliseconds, checked before each step")]
    pub deadline_ms: Option<i64>,

    #[schemars(
        description = "UUID for this run, usable with stop_execution while it is in flight. Generated when omitted"
    )]
    pub execution_id: Option<String>,
}

/// Request to stop runs that are still in flight
#[derive(Debug, Clone, Default, Deserialize, schemars::JsonSchema)]
pub struct StopExecutionRequest {
    #[schemars(description = "Run to stop. Omit to stop every active run")]
    pub execution_id: Option<String>,
}

impl From<ExecuteSequenceRequest> for SequenceRequest {
    fn from(request: ExecuteSequenceRequest) -> Self {
        SequenceRequest {
            steps: request.steps,
            stop_on_error: request.stop_on_error,
            continue_execution: request.continue_execution,
            include_detailed_results: request.include_detailed_results,
            progress_token: request.progress_token,
            deadline_ms: request.deadline_ms,
        }
    }
}

/// Delivers progress to the MCP client as `notifications/progress`.
pub struct PeerProgressSink {
    peer: Peer<RoleServer>,
    token: ProgressToken,
}

impl PeerProgressSink {
    pub fn new(peer: Peer<RoleServer>, token: ProgressToken) -> Self {
        Self { peer, token }
    }
}

#[async_trait]
impl ProgressSink for PeerProgressSink {
    async fn deliver(&self, event: ProgressEvent) -> Result<(), DeliveryError> {
        self.peer
            .notify_progress(ProgressNotificationParam {
                progress_token: self.token.clone(),
                progress: event.progress.into(),
                total: Some(event.total.into()),
                message: Some(event.message),
            })
            .await
            .map_err(|e| DeliveryError::Failed(e.to_string()))
    }
}

fn token_label(token: &ProgressToken) -> String {
    match &token.0 {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s.to_string(),
    }
}

/// MCP service wrapping one sequence engine
#[derive(Clone)]
pub struct SequenceService {
    engine: SequenceEngine,
    catalog: Arc<Vec<ToolInfo>>,
    session_id: Option<String>,
    run_timeout_ms: Option<u64>,
    runs: ActiveRuns,
    tool_router: ToolRouter<SequenceService>,
}

impl SequenceService {
    /// Create a service dispatching to the given registry
    pub fn new(registry: ToolRegistry, config: &ServerConfig) -> Self {
        Self::with_engine_config(registry, config, config.engine_config())
    }

    /// Like [`SequenceService::new`] with a prepared engine config, e.g. one
    /// carrying an event bus
    pub fn with_engine_config(
        registry: ToolRegistry,
        config: &ServerConfig,
        engine_config: sequencer::EngineConfig,
    ) -> Self {
        let catalog = Arc::new(registry.list());
        Self {
            engine: SequenceEngine::new(Arc::new(registry)).with_config(engine_config),
            catalog,
            session_id: config.session_id.clone(),
            run_timeout_ms: config.run_timeout_ms,
            runs: ActiveRuns::new(),
            tool_router: Self::tool_router(),
        }
    }

    /// Run a sequence and render the report as a tool result.
    ///
    /// The run is registered under its execution id until it returns, so
    /// [`SequenceService::stop_runs`] can cancel it. A report whose status is
    /// not `success` is returned with `is_error` set. Validation problems map
    /// to `invalid_params`, aborted runs to `internal_error`.
    pub async fn run_sequence(
        &self,
        request: ExecuteSequenceRequest,
        mut ctx: RunContext,
    ) -> Result<CallToolResult, McpError> {
        if let Some(session_id) = &self.session_id {
            ctx = ctx.with_session_id(session_id.clone());
        }
        let execution_id = ctx.execution_id;

        let mut request = SequenceRequest::from(request);
        if request.deadline_ms.is_none() {
            request.deadline_ms = self.run_timeout_ms.and_then(|ms| i64::try_from(ms).ok());
        }

        let Some(_guard) = self.runs.register(execution_id, ctx.cancellation.clone()) else {
            return Err(McpError::invalid_params(
                format!("Execution {} is already running", execution_id),
                Some(json!({ "execution_id": execution_id })),
            ));
        };

        let report = match self.engine.execute(&request, ctx).await {
            Ok(report) => report,
            Err(EngineError::Validation(e)) => {
                let issues: Vec<String> = e.issues.iter().map(ToString::to_string).collect();
                return Err(McpError::invalid_params(
                    e.to_string(),
                    Some(json!({ "issues": issues })),
                ));
            }
            Err(e) => {
                warn!(execution_id = %execution_id, error = %e, "Sequence could not run");
                return Err(McpError::internal_error(
                    e.to_string(),
                    Some(json!({ "execution_id": execution_id })),
                ));
            }
        };

        let text = serde_json::to_string_pretty(&report).map_err(|e| {
            McpError::internal_error(format!("Failed to serialize report: {}", e), None)
        })?;

        info!(
            execution_id = %report.execution_id,
            status = report.status.as_str(),
            "Sequence report ready"
        );

        if report.is_success() {
            Ok(CallToolResult::success(vec![Content::text(text)]))
        } else {
            Ok(CallToolResult::error(vec![Content::text(text)]))
        }
    }

    /// Cancel one active run, or all of them when `execution_id` is `None`.
    /// Returns the ids that were signalled.
    pub fn stop_runs(&self, execution_id: Option<Uuid>) -> Vec<Uuid> {
        match execution_id {
            Some(id) if self.runs.cancel(id) => vec![id],
            Some(id) => {
                warn!(execution_id = %id, "No active run to stop");
                Vec::new()
            }
            None => self.runs.cancel_all(),
        }
    }

    pub fn active_runs(&self) -> &ActiveRuns {
        &self.runs
    }
}

fn parse_execution_id(raw: &str) -> Result<Uuid, McpError> {
    Uuid::parse_str(raw.trim()).map_err(|e| {
        McpError::invalid_params(
            format!("Invalid execution_id '{}': {}", raw, e),
            Some(json!({ "execution_id": raw })),
        )
    })
}

#[tool_router]
impl SequenceService {
    #[tool(description = "Execute a sequence of tool calls one at a time. Supports per-step retry, delays, stop-on-error and progress notifications. Returns a JSON report with per-step results and a summary.")]
    async fn execute_sequence(
        &self,
        peer: Peer<RoleServer>,
        request_context: RequestContext<RoleServer>,
        Parameters(mut request): Parameters<ExecuteSequenceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut ctx = RunContext::new().with_cancellation(request_context.ct.child_token());
        if let Some(raw) = request.execution_id.as_deref() {
            ctx = ctx.with_execution_id(parse_execution_id(raw)?);
        }

        let token = match request.progress_token.clone() {
            Some(token) => Some(ProgressToken(NumberOrString::String(token.into()))),
            None => request_context.meta.get_progress_token(),
        };
        if let Some(token) = token {
            request.progress_token = Some(token_label(&token));
            ctx = ctx.with_progress_sink(Arc::new(PeerProgressSink::new(peer, token)));
        }

        info!(
            execution_id = %ctx.execution_id,
            steps = request.steps.len(),
            "Received execute_sequence"
        );

        self.run_sequence(request, ctx).await
    }

    #[tool(name = "list_tools", description = "List the tools a sequence step may name in tool_name.")]
    async fn list_available_tools(&self) -> Result<CallToolResult, McpError> {
        let listing = serde_json::to_string_pretty(self.catalog.as_ref()).map_err(|e| {
            McpError::internal_error(format!("Failed to serialize tool list: {}", e), None)
        })?;
        Ok(CallToolResult::success(vec![Content::text(listing)]))
    }

    #[tool(description = "Stop a running execute_sequence call by execution_id, or every running call when execution_id is omitted. Steps already settled are kept; the rest are skipped and the run reports cancelled.")]
    async fn stop_execution(
        &self,
        Parameters(request): Parameters<StopExecutionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let target = request
            .execution_id
            .as_deref()
            .map(parse_execution_id)
            .transpose()?;
        let stopped = self.stop_runs(target);

        info!(stopped = stopped.len(), "Handled stop_execution");
        let body = json!({ "stopped": stopped, "active": self.runs.len() });
        Ok(CallToolResult::success(vec![Content::text(body.to_string())]))
    }
}

#[tool_handler]
impl ServerHandler for SequenceService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sequence-mcp-agent".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Call list_tools to see available tools, then execute_sequence with \
                 an ordered list of steps. Pass a progress token to receive \
                 progress notifications, and an execution_id to be able to \
                 cancel the run with stop_execution."
                    .to_string(),
            ),
        }
    }
}
