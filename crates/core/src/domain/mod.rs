mod action;
mod report;
mod result;
mod step;

pub use action::{ActionError, ActionErrorKind};
pub use report::{
    ExecutionPlan, ExecutionReport, ExecutionSummary, OverallStatus, PlannedStep, Termination,
};
pub use result::{AttemptRecord, StepError, StepOutcome, StepResult, StepStatus};
pub use step::{ExecutionOptions, RetryPolicy, SequenceDefinition, Step};
