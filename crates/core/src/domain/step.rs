use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Retry behaviour for a single step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of dispatch attempts, including the first one
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one
    #[serde(default)]
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
        }
    }

    /// A policy that dispatches exactly once.
    pub fn once() -> Self {
        Self::new(1, 0)
    }

    pub fn allows_retry(&self) -> bool {
        self.max_attempts > 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

/// A normalized automation step, ready for execution.
///
/// Steps are produced by the validator and are not mutated once a
/// sequence starts running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Wait applied after this step settles
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Resolved stop policy: `true` keeps the run going when this step fails
    pub continue_on_error: bool,
    /// Per-call backend timeout
    pub timeout_ms: u64,
    /// Caller supplied label, echoed back in results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Step {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: Map::new(),
            delay_ms: 0,
            retry_policy: RetryPolicy::once(),
            continue_on_error: false,
            timeout_ms: 30_000,
            id: None,
            description: None,
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Ordered list of steps. Order is significant and preserved exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SequenceDefinition {
    pub steps: Vec<Step>,
}

impl SequenceDefinition {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }
}

/// Run-level options supplied with a sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub stop_on_error: bool,
    /// Controls payload verbosity only, never control flow
    pub include_detailed_results: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<String>,
    /// Overall deadline measured from the start of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            include_detailed_results: false,
            progress_token: None,
            deadline_ms: None,
        }
    }
}

impl ExecutionOptions {
    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn with_detailed_results(mut self, detailed: bool) -> Self {
        self.include_detailed_results = detailed;
        self
    }

    pub fn with_progress_token(mut self, token: impl Into<String>) -> Self {
        self.progress_token = Some(token.into());
        self
    }

    pub fn with_deadline(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_builder() {
        let step = Step::new("click_element")
            .with_argument("selector", json!("role:Button|name:OK"))
            .with_delay(250)
            .with_retry(RetryPolicy::new(3, 100))
            .with_id("confirm");

        assert_eq!(step.tool_name, "click_element");
        assert_eq!(step.arguments["selector"], json!("role:Button|name:OK"));
        assert_eq!(step.delay_ms, 250);
        assert_eq!(step.retry_policy.max_attempts, 3);
        assert!(step.retry_policy.allows_retry());
        assert_eq!(step.id.as_deref(), Some("confirm"));
        assert!(!step.continue_on_error);
    }

    #[test]
    fn test_default_retry_policy_dispatches_once() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.allows_retry());
    }

    #[test]
    fn test_default_options_stop_on_error() {
        let options = ExecutionOptions::default();
        assert!(options.stop_on_error);
        assert!(!options.include_detailed_results);
        assert!(options.progress_token.is_none());
    }
}
