use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::action::{ActionError, ActionErrorKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Error,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Failure detail attached to a step that did not succeed.
///
/// Skipped steps carry the skip reason here with no `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ActionErrorKind>,
    pub message: String,
}

impl StepError {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: reason.into(),
        }
    }
}

impl From<ActionError> for StepError {
    fn from(error: ActionError) -> Self {
        Self {
            kind: Some(error.kind),
            message: error.message,
        }
    }
}

/// Exactly one of a payload or an error detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    ResultPayload(Value),
    ErrorDetail(StepError),
}

/// One failed dispatch attempt, kept for detailed reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub kind: ActionErrorKind,
    pub message: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    /// Position of the step in the submitted sequence
    pub index: usize,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub status: StepStatus,
    pub attempt_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Dispatch time including retries, excluding the post-step delay
    pub duration_ms: u64,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

impl StepResult {
    pub fn skipped(
        index: usize,
        tool_name: impl Into<String>,
        step_id: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            index,
            tool_name: tool_name.into(),
            step_id,
            status: StepStatus::Skipped,
            attempt_count: 0,
            started_at: None,
            completed_at: None,
            duration_ms: 0,
            outcome: StepOutcome::ErrorDetail(StepError::skipped(reason)),
            arguments: None,
            attempts: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == StepStatus::Error
    }

    pub fn is_skipped(&self) -> bool {
        self.status == StepStatus::Skipped
    }

    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            StepOutcome::ResultPayload(value) => Some(value),
            StepOutcome::ErrorDetail(_) => None,
        }
    }

    pub fn error(&self) -> Option<&StepError> {
        match &self.outcome {
            StepOutcome::ResultPayload(_) => None,
            StepOutcome::ErrorDetail(error) => Some(error),
        }
    }

    /// Short human-readable line describing how the step settled.
    pub fn describe(&self) -> String {
        match (&self.status, self.error()) {
            (StepStatus::Success, _) => format!(
                "Step {} '{}' succeeded after {} attempt(s)",
                self.index + 1,
                self.tool_name,
                self.attempt_count
            ),
            (StepStatus::Error, Some(error)) => format!(
                "Step {} '{}' failed: {}",
                self.index + 1,
                self.tool_name,
                error.message
            ),
            (StepStatus::Error, None) => {
                format!("Step {} '{}' failed", self.index + 1, self.tool_name)
            }
            (StepStatus::Skipped, _) => {
                format!("Step {} '{}' skipped", self.index + 1, self.tool_name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skipped_result_carries_reason() {
        let result = StepResult::skipped(3, "type_into_element", None, "previous step failed");

        assert!(result.is_skipped());
        assert_eq!(result.attempt_count, 0);
        assert!(result.started_at.is_none());
        assert!(result.payload().is_none());
        let error = result.error().unwrap();
        assert!(error.kind.is_none());
        assert_eq!(error.message, "previous step failed");
    }

    #[test]
    fn test_outcome_serializes_as_single_field() {
        let mut result = StepResult::skipped(0, "click_element", Some("ok".into()), "cancelled");
        result.status = StepStatus::Success;
        result.outcome = StepOutcome::ResultPayload(json!({"clicked": true}));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["result_payload"], json!({"clicked": true}));
        assert!(value.get("error_detail").is_none());
        assert_eq!(value["status"], "success");
        assert_eq!(value["step_id"], "ok");
    }

    #[test]
    fn test_error_detail_from_action_error() {
        let detail = StepError::from(ActionError::timeout("no response in 5000ms"));
        assert_eq!(detail.kind, Some(ActionErrorKind::Timeout));

        let value = serde_json::to_value(StepOutcome::ErrorDetail(detail)).unwrap();
        assert_eq!(value["error_detail"]["kind"], "timeout");
    }

    #[test]
    fn test_describe() {
        let result = StepResult::skipped(1, "press_key", None, "cancelled");
        assert_eq!(result.describe(), "Step 2 'press_key' skipped");
    }
}
