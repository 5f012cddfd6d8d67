use std::time::Duration;

use chrono::Utc;
use sequence_core::{
    ActionError, AttemptRecord, SequenceDefinition, Step, StepOutcome, StepResult, Termination,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::{ActionDispatcher, ActionRequest, DispatchContext, DispatchError};
use crate::engine::RunContext;
use crate::error::{EngineError, Result};
use crate::lifecycle::LifecycleEmitter;
use crate::progress::ProgressEmitter;
use crate::state_machine::{StepState, StepTracker};

/// Step results in submission order and why the loop ended.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub results: Vec<StepResult>,
    pub termination: Termination,
}

/// Runs the steps of one sequence strictly one after another.
pub struct StepExecutor<'a> {
    dispatcher: &'a dyn ActionDispatcher,
    ctx: &'a RunContext,
    detailed: bool,
}

impl<'a> StepExecutor<'a> {
    pub fn new(dispatcher: &'a dyn ActionDispatcher, ctx: &'a RunContext, detailed: bool) -> Self {
        Self {
            dispatcher,
            ctx,
            detailed,
        }
    }

    /// Visit every step once. After the loop stops early, the remaining
    /// steps are recorded as skipped without being dispatched.
    ///
    /// Only a dispatcher that cannot take calls at all aborts with an error;
    /// every other failure is recorded against its step.
    pub async fn run(
        &self,
        sequence: &SequenceDefinition,
        deadline: Option<Instant>,
        progress: &mut ProgressEmitter,
        lifecycle: &LifecycleEmitter,
    ) -> Result<RunOutcome> {
        let mut results = Vec::with_capacity(sequence.len());
        let mut termination = Termination::Completed;
        let mut skip_reason = String::new();

        for (index, step) in sequence.iter().enumerate() {
            if termination == Termination::Completed {
                if self.ctx.cancellation.is_cancelled() {
                    info!(execution_id = %self.ctx.execution_id, step_index = index, "Sequence cancelled");
                    termination = Termination::Cancelled;
                    skip_reason = "sequence was cancelled".to_string();
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    info!(execution_id = %self.ctx.execution_id, step_index = index, "Sequence deadline exceeded");
                    termination = Termination::DeadlineExceeded;
                    skip_reason = "sequence deadline exceeded".to_string();
                }
            }

            if termination != Termination::Completed {
                let result =
                    StepResult::skipped(index, step.tool_name.clone(), step.id.clone(), &skip_reason);
                lifecycle.step_settled(&result);
                results.push(result);
                continue;
            }

            let result = self.run_step(index, step).await?;
            lifecycle.step_settled(&result);
            let failed = result.is_error();

            if step.delay_ms > 0 {
                self.pause(index, step.delay_ms).await;
            }

            progress.step_settled(&result);
            results.push(result);

            if failed && !step.continue_on_error {
                warn!(
                    execution_id = %self.ctx.execution_id,
                    step_index = index,
                    tool_name = %step.tool_name,
                    "Stopping sequence after failed step"
                );
                termination = Termination::StoppedOnError;
                skip_reason = format!("step {} failed", index + 1);
            }
        }

        Ok(RunOutcome {
            results,
            termination,
        })
    }

    /// Dispatch one step, retrying retryable failures up to its policy.
    pub async fn run_step(&self, index: usize, step: &Step) -> Result<StepResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut tracker = StepTracker::new();
        let mut attempts = Vec::new();
        let request = ActionRequest {
            tool_name: step.tool_name.clone(),
            arguments: step.arguments.clone(),
            timeout: Duration::from_millis(step.timeout_ms),
        };

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            tracker.transition(StepState::Executing)?;
            let attempt_start = Instant::now();

            match self.dispatch(index, attempt, &request).await? {
                Ok(payload) => {
                    tracker.transition(StepState::Success)?;
                    debug!(
                        execution_id = %self.ctx.execution_id,
                        step_index = index,
                        attempt,
                        "Step succeeded"
                    );
                    break StepOutcome::ResultPayload(payload);
                }
                Err(e) => {
                    tracker.transition(StepState::Error)?;
                    attempts.push(AttemptRecord {
                        attempt,
                        kind: e.kind,
                        message: e.message.clone(),
                        duration_ms: millis(attempt_start.elapsed()),
                    });

                    if e.is_retryable() && attempt < step.retry_policy.max_attempts {
                        warn!(
                            execution_id = %self.ctx.execution_id,
                            step_index = index,
                            attempt,
                            max_attempts = step.retry_policy.max_attempts,
                            error = %e,
                            "Step attempt failed, retrying"
                        );
                        if step.retry_policy.backoff_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(step.retry_policy.backoff_ms))
                                .await;
                        }
                        continue;
                    }

                    warn!(
                        execution_id = %self.ctx.execution_id,
                        step_index = index,
                        attempt,
                        error = %e,
                        "Step failed"
                    );
                    break StepOutcome::ErrorDetail(e.into());
                }
            }
        };

        let status = tracker.state().settled_status().ok_or_else(|| {
            EngineError::internal(format!("step {} left in {}", index, tracker.state().as_str()))
        })?;

        Ok(StepResult {
            index,
            tool_name: step.tool_name.clone(),
            step_id: step.id.clone(),
            status,
            attempt_count: attempt,
            started_at: Some(started_at),
            completed_at: Some(Utc::now()),
            duration_ms: millis(start.elapsed()),
            outcome,
            arguments: self.detailed.then(|| step.arguments.clone()),
            attempts: if self.detailed { attempts } else { Vec::new() },
        })
    }

    /// One bounded call. The outer error aborts the run, the inner one is
    /// the step's failure.
    async fn dispatch(
        &self,
        index: usize,
        attempt: u32,
        request: &ActionRequest,
    ) -> Result<std::result::Result<serde_json::Value, ActionError>> {
        let ctx = DispatchContext {
            execution_id: self.ctx.execution_id,
            session_id: self.ctx.session_id.clone(),
            step_index: index,
            attempt,
        };

        match tokio::time::timeout(request.timeout, self.dispatcher.invoke(request, &ctx)).await {
            Ok(Ok(payload)) => Ok(Ok(payload)),
            Ok(Err(DispatchError::Action(e))) => Ok(Err(e)),
            Ok(Err(DispatchError::Unavailable(reason))) => {
                error!(
                    execution_id = %self.ctx.execution_id,
                    step_index = index,
                    reason = %reason,
                    "Action dispatcher unavailable"
                );
                Err(EngineError::DispatcherUnavailable(reason))
            }
            Err(_) => Ok(Err(ActionError::timeout(format!(
                "'{}' did not respond within {}ms",
                request.tool_name,
                request.timeout.as_millis()
            )))),
        }
    }

    async fn pause(&self, index: usize, delay_ms: u64) {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            _ = self.ctx.cancellation.cancelled() => {
                debug!(execution_id = %self.ctx.execution_id, step_index = index, "Delay cut short by cancellation");
            }
        }
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
