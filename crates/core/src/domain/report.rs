use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::result::StepResult;
use super::step::SequenceDefinition;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    PartialSuccess,
    Failed,
    Cancelled,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "partial_success" => Some(Self::PartialSuccess),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Why the step loop ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every step was visited
    #[default]
    Completed,
    /// A failed step with stop-on-error in effect ended the run
    StoppedOnError,
    /// The caller cancelled the run
    Cancelled,
    /// The overall deadline passed before a step could start
    DeadlineExceeded,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::StoppedOnError => "stopped_on_error",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// Cancellation and deadline expiry both end the run early without failing it.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    /// Wall-clock span of the run, delays included
    pub total_duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub overall_status: OverallStatus,
    pub termination: Termination,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedStep {
    pub index: usize,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionPlan {
    pub steps: Vec<PlannedStep>,
}

impl ExecutionPlan {
    /// Build the plan echoed back to the caller. Arguments are only
    /// included in detailed mode.
    pub fn from_sequence(sequence: &SequenceDefinition, detailed: bool) -> Self {
        let steps = sequence
            .iter()
            .enumerate()
            .map(|(index, step)| PlannedStep {
                index,
                tool_name: step.tool_name.clone(),
                step_id: step.id.clone(),
                description: step.description.clone(),
                arguments: detailed.then(|| step.arguments.clone()),
            })
            .collect();
        Self { steps }
    }
}

/// Everything returned for a sequence that started executing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    pub execution_plan: ExecutionPlan,
    pub step_results: Vec<StepResult>,
    pub execution_summary: ExecutionSummary,
    pub status: OverallStatus,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::step::Step;
    use serde_json::json;

    #[test]
    fn test_overall_status_strings() {
        assert_eq!(OverallStatus::PartialSuccess.as_str(), "partial_success");
        assert_eq!(OverallStatus::parse("cancelled"), Some(OverallStatus::Cancelled));
        assert_eq!(
            serde_json::to_value(OverallStatus::PartialSuccess).unwrap(),
            json!("partial_success")
        );
    }

    #[test]
    fn test_termination_cancellation() {
        assert!(Termination::Cancelled.is_cancellation());
        assert!(Termination::DeadlineExceeded.is_cancellation());
        assert!(!Termination::StoppedOnError.is_cancellation());
        assert!(!Termination::Completed.is_cancellation());
    }

    #[test]
    fn test_plan_hides_arguments_unless_detailed() {
        let sequence = SequenceDefinition::new(vec![
            Step::new("open_application").with_argument("app_name", json!("notepad")),
            Step::new("type_into_element").with_description("Type the greeting"),
        ]);

        let plan = ExecutionPlan::from_sequence(&sequence, false);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].index, 1);
        assert_eq!(plan.steps[1].description.as_deref(), Some("Type the greeting"));
        assert!(plan.steps[0].arguments.is_none());

        let detailed = ExecutionPlan::from_sequence(&sequence, true);
        assert_eq!(
            detailed.steps[0].arguments.as_ref().unwrap()["app_name"],
            json!("notepad")
        );
    }
}
