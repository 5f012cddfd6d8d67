use chrono::{DateTime, Utc};
use sequence_core::{ExecutionSummary, OverallStatus, StepResult, StepStatus, Termination};

pub struct ResultAggregator;

impl ResultAggregator {
    /// Fold per-step results into the run summary.
    pub fn summarize(
        results: &[StepResult],
        termination: Termination,
        total_duration_ms: u64,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> ExecutionSummary {
        let count = |status: StepStatus| results.iter().filter(|r| r.status == status).count();
        let successful_steps = count(StepStatus::Success);
        let failed_steps = count(StepStatus::Error);
        let skipped_steps = count(StepStatus::Skipped);

        ExecutionSummary {
            total_steps: results.len(),
            successful_steps,
            failed_steps,
            skipped_steps,
            total_duration_ms,
            started_at,
            completed_at,
            overall_status: Self::overall_status(successful_steps, results.len(), termination),
            termination,
        }
    }

    /// A run with no successful step is `Failed`, including the
    /// all-skipped edge.
    pub fn overall_status(successful: usize, total: usize, termination: Termination) -> OverallStatus {
        if termination.is_cancellation() {
            return OverallStatus::Cancelled;
        }
        if total > 0 && successful == total {
            OverallStatus::Success
        } else if successful > 0 {
            OverallStatus::PartialSuccess
        } else {
            OverallStatus::Failed
        }
    }
}
