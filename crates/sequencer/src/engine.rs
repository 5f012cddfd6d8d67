use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use events::{BusProgressSink, ProgressSink};
use sequence_core::{
    ExecutionOptions, ExecutionPlan, ExecutionReport, SequenceDefinition, ValidationError,
    ValidationIssue,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::aggregator::ResultAggregator;
use crate::backend::ActionDispatcher;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::{millis, StepExecutor};
use crate::lifecycle::LifecycleEmitter;
use crate::progress::ProgressEmitter;
use crate::validator::{SequenceRequest, SequenceValidator};

/// Everything one run owns. Nothing here is shared between runs.
#[derive(Clone)]
pub struct RunContext {
    pub execution_id: Uuid,
    /// Backend session the dispatcher should act in, if any
    pub session_id: Option<String>,
    pub cancellation: CancellationToken,
    pub progress_sink: Option<Arc<dyn ProgressSink>>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            session_id: None,
            cancellation: CancellationToken::new(),
            progress_sink: None,
        }
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution_id(mut self, execution_id: Uuid) -> Self {
        self.execution_id = execution_id;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = Some(sink);
        self
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("execution_id", &self.execution_id)
            .field("session_id", &self.session_id)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("progress_sink", &self.progress_sink.is_some())
            .finish()
    }
}

/// Validates and executes tool-call sequences against one dispatcher.
///
/// The engine holds no per-run state, so one instance can serve any number
/// of concurrent `execute` calls.
#[derive(Clone)]
pub struct SequenceEngine {
    dispatcher: Arc<dyn ActionDispatcher>,
    config: EngineConfig,
}

impl SequenceEngine {
    pub fn new(dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        Self {
            dispatcher,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<dyn ActionDispatcher> {
        &self.dispatcher
    }

    /// A validator bound to this engine's limits and, when the dispatcher
    /// publishes one, its tool catalog.
    pub fn validator(&self) -> SequenceValidator<'_> {
        let validator = SequenceValidator::new(&self.config);
        match self.dispatcher.tool_names() {
            Some(names) => validator.with_known_tools(names),
            None => validator,
        }
    }

    /// Validate a submitted sequence and run it.
    ///
    /// Validation failures return before any step is dispatched. Once
    /// execution starts, step failures, cancellation and deadline expiry all
    /// produce a report rather than an error.
    pub async fn execute(
        &self,
        request: &SequenceRequest,
        ctx: RunContext,
    ) -> Result<ExecutionReport> {
        let validated = self.validator().validate(request).map_err(|e| {
            warn!(execution_id = %ctx.execution_id, error = %e, "Rejected sequence");
            e
        })?;
        self.execute_validated(validated.sequence, validated.options, ctx)
            .await
    }

    pub async fn execute_validated(
        &self,
        sequence: SequenceDefinition,
        options: ExecutionOptions,
        ctx: RunContext,
    ) -> Result<ExecutionReport> {
        if sequence.is_empty() {
            return Err(ValidationError::single(ValidationIssue::sequence(
                "steps",
                "must contain at least one step",
            ))
            .into());
        }

        let total_steps = sequence.len();
        info!(
            execution_id = %ctx.execution_id,
            total_steps,
            stop_on_error = options.stop_on_error,
            "Starting sequence"
        );

        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = options
            .deadline_ms
            .map(|ms| start + Duration::from_millis(ms));

        let lifecycle = LifecycleEmitter::new(self.config.event_bus.clone(), ctx.execution_id);
        lifecycle.started(total_steps);

        let sink = ctx.progress_sink.clone().or_else(|| {
            self.config
                .event_bus
                .clone()
                .map(|bus| {
                    Arc::new(BusProgressSink::new(bus, ctx.execution_id)) as Arc<dyn ProgressSink>
                })
        });
        let mut progress =
            ProgressEmitter::start(options.progress_token.as_deref(), total_steps, sink);

        let executor = StepExecutor::new(
            self.dispatcher.as_ref(),
            &ctx,
            options.include_detailed_results,
        );
        let outcome = match executor
            .run(&sequence, deadline, &mut progress, &lifecycle)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(execution_id = %ctx.execution_id, error = %e, "Sequence aborted");
                lifecycle.fault(e.to_string());
                return Err(e);
            }
        };

        progress.finish(outcome.termination);

        let summary = ResultAggregator::summarize(
            &outcome.results,
            outcome.termination,
            millis(start.elapsed()),
            started_at,
            Utc::now(),
        );
        lifecycle.completed(&summary);

        info!(
            execution_id = %ctx.execution_id,
            status = summary.overall_status.as_str(),
            termination = summary.termination.as_str(),
            successful = summary.successful_steps,
            failed = summary.failed_steps,
            skipped = summary.skipped_steps,
            duration_ms = summary.total_duration_ms,
            "Sequence finished"
        );

        Ok(ExecutionReport {
            execution_id: ctx.execution_id,
            execution_plan: ExecutionPlan::from_sequence(
                &sequence,
                options.include_detailed_results,
            ),
            status: summary.overall_status,
            step_results: outcome.results,
            execution_summary: summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DispatchContext, Tool, ToolRegistry};
    use crate::error::EngineError;
    use async_trait::async_trait;
    use sequence_core::{ActionError, OverallStatus};
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Deserialize)]
    struct NoArgs {}

    struct Ping;

    #[async_trait]
    impl Tool for Ping {
        type Args = NoArgs;

        fn name(&self) -> &str {
            "ping"
        }

        fn description(&self) -> &str {
            "Reply with pong"
        }

        async fn call(
            &self,
            _args: NoArgs,
            _ctx: &DispatchContext,
        ) -> std::result::Result<Value, ActionError> {
            Ok(json!("pong"))
        }
    }

    fn engine() -> SequenceEngine {
        SequenceEngine::new(Arc::new(ToolRegistry::new().register(Ping)))
    }

    #[tokio::test]
    async fn test_validator_uses_dispatcher_catalog() {
        let request = SequenceRequest::new(vec![json!({"tool_name": "pong"})]);

        let error = engine()
            .execute(&request, RunContext::new())
            .await
            .unwrap_err();

        match error {
            EngineError::Validation(e) => assert!(e.mentions(0, "tool_name")),
            other => panic!("Unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_report_echoes_plan_and_execution_id() {
        let execution_id = Uuid::new_v4();
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "ping", "id": "first"}),
            json!({"tool_name": "ping"}),
        ]);

        let report = engine()
            .execute(&request, RunContext::new().with_execution_id(execution_id))
            .await
            .unwrap();

        assert_eq!(report.execution_id, execution_id);
        assert_eq!(report.status, OverallStatus::Success);
        assert_eq!(report.execution_plan.steps.len(), 2);
        assert_eq!(report.execution_plan.steps[0].step_id.as_deref(), Some("first"));
        assert!(report.execution_plan.steps[0].arguments.is_none());
        assert_eq!(report.step_results[1].payload(), Some(&json!("pong")));
    }

    #[tokio::test]
    async fn test_empty_validated_sequence_is_rejected() {
        let error = engine()
            .execute_validated(
                SequenceDefinition::default(),
                ExecutionOptions::default(),
                RunContext::new(),
            )
            .await
            .unwrap_err();
        assert!(error.is_validation());
    }

    #[test]
    fn test_run_context_debug_hides_sink() {
        let ctx = RunContext::new().with_session_id("desktop-1");
        let rendered = format!("{:?}", ctx);
        assert!(rendered.contains("desktop-1"));
        assert!(rendered.contains("progress_sink: false"));
    }
}
