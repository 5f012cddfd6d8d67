//! Pre-execution checks and normalization of submitted sequences.
//!
//! Validation is all-or-nothing: every issue found is reported at once and no
//! step runs unless the whole sequence is valid.

use sequence_core::{
    ExecutionOptions, RetryPolicy, SequenceDefinition, Step, ValidationError, ValidationIssue,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::config::EngineConfig;

/// A sequence as submitted by a caller, before validation.
///
/// Steps stay as raw JSON so malformed shapes can be reported per step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceRequest {
    #[serde(default)]
    pub steps: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_on_error: Option<bool>,
    /// Legacy inverse of `stop_on_error`
    #[serde(default, rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_execution: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_detailed_results: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<i64>,
}

impl SequenceRequest {
    pub fn new(steps: Vec<Value>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = Some(stop);
        self
    }

    pub fn with_detailed_results(mut self, detailed: bool) -> Self {
        self.include_detailed_results = Some(detailed);
        self
    }

    pub fn with_progress_token(mut self, token: impl Into<String>) -> Self {
        self.progress_token = Some(token.into());
        self
    }

    pub fn with_deadline(mut self, deadline_ms: i64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepInput {
    tool_name: Option<String>,
    arguments: Option<Value>,
    delay_ms: Option<i64>,
    delay: Option<String>,
    retry_policy: Option<RetryPolicyInput>,
    retries: Option<i64>,
    continue_on_error: Option<bool>,
    timeout_ms: Option<i64>,
    id: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryPolicyInput {
    max_attempts: Option<i64>,
    backoff_ms: Option<i64>,
}

/// Output of a successful validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSequence {
    pub sequence: SequenceDefinition,
    pub options: ExecutionOptions,
}

pub struct SequenceValidator<'a> {
    config: &'a EngineConfig,
    known_tools: Option<HashSet<String>>,
}

impl<'a> SequenceValidator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            known_tools: None,
        }
    }

    /// Restrict `tool_name` to the given catalog.
    pub fn with_known_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate(&self, request: &SequenceRequest) -> Result<ValidatedSequence, ValidationError> {
        let mut issues = Vec::new();

        let stop_on_error = request
            .stop_on_error
            .or(request.continue_execution.map(|c| !c))
            .unwrap_or(true);

        let deadline_ms = match request.deadline_ms {
            Some(ms) if ms < 0 => {
                issues.push(ValidationIssue::sequence("deadline_ms", "must be non-negative"));
                None
            }
            Some(ms) => Some(ms as u64),
            None => None,
        };

        if request.steps.is_empty() {
            issues.push(ValidationIssue::sequence("steps", "must contain at least one step"));
        } else if request.steps.len() > self.config.max_steps {
            issues.push(ValidationIssue::sequence(
                "steps",
                format!(
                    "{} steps exceeds the limit of {}",
                    request.steps.len(),
                    self.config.max_steps
                ),
            ));
        }

        let steps: Vec<Step> = request
            .steps
            .iter()
            .enumerate()
            .filter_map(|(index, raw)| self.validate_step(index, raw, stop_on_error, &mut issues))
            .collect();

        if !issues.is_empty() {
            return Err(ValidationError::new(issues));
        }

        Ok(ValidatedSequence {
            sequence: SequenceDefinition::new(steps),
            options: ExecutionOptions {
                stop_on_error,
                include_detailed_results: request.include_detailed_results.unwrap_or(false),
                progress_token: request.progress_token.clone(),
                deadline_ms,
            },
        })
    }

    fn validate_step(
        &self,
        index: usize,
        raw: &Value,
        stop_on_error: bool,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Step> {
        if !raw.is_object() {
            issues.push(ValidationIssue::step(index, "step", "must be an object"));
            return None;
        }

        let input: StepInput = match serde_json::from_value(raw.clone()) {
            Ok(input) => input,
            Err(e) => {
                issues.push(ValidationIssue::step(index, "step", e.to_string()));
                return None;
            }
        };
        let before = issues.len();

        let tool_name = match input.tool_name.as_deref().map(str::trim) {
            None => {
                issues.push(ValidationIssue::step(index, "tool_name", "is required"));
                String::new()
            }
            Some("") => {
                issues.push(ValidationIssue::step(index, "tool_name", "must not be empty"));
                String::new()
            }
            Some(name) => {
                if let Some(known) = &self.known_tools {
                    if !known.contains(name) {
                        issues.push(ValidationIssue::step(
                            index,
                            "tool_name",
                            format!("unknown tool '{}'", name),
                        ));
                    }
                }
                name.to_string()
            }
        };

        let arguments = match input.arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                issues.push(ValidationIssue::step(
                    index,
                    "arguments",
                    "must be an object keyed by argument name",
                ));
                Map::new()
            }
        };

        let delay_ms = match (input.delay_ms, input.delay.as_deref()) {
            (Some(_), Some(_)) => {
                issues.push(ValidationIssue::step(
                    index,
                    "delay",
                    "specify either delay or delay_ms, not both",
                ));
                0
            }
            (Some(ms), None) => non_negative(index, "delay_ms", ms, issues),
            (None, Some(text)) => match parse_delay(text) {
                Some(ms) => ms,
                None => {
                    issues.push(ValidationIssue::step(
                        index,
                        "delay",
                        format!("cannot parse duration '{}'", text),
                    ));
                    0
                }
            },
            (None, None) => 0,
        };

        let retry_policy = match (input.retry_policy, input.retries) {
            (Some(_), Some(_)) => {
                issues.push(ValidationIssue::step(
                    index,
                    "retries",
                    "specify either retries or retry_policy, not both",
                ));
                RetryPolicy::once()
            }
            (Some(policy), None) => {
                let max_attempts = match policy.max_attempts {
                    Some(n) if n < 1 => {
                        issues.push(ValidationIssue::step(
                            index,
                            "retry_policy.max_attempts",
                            "must be at least 1",
                        ));
                        1
                    }
                    Some(n) => {
                        self.attempts_within_limit(index, "retry_policy.max_attempts", n, issues)
                    }
                    None => {
                        issues.push(ValidationIssue::step(
                            index,
                            "retry_policy.max_attempts",
                            "is required",
                        ));
                        1
                    }
                };
                let backoff_ms = policy
                    .backoff_ms
                    .map(|ms| non_negative(index, "retry_policy.backoff_ms", ms, issues))
                    .unwrap_or(0);
                RetryPolicy::new(max_attempts, backoff_ms)
            }
            (None, Some(retries)) if retries < 0 => {
                issues.push(ValidationIssue::step(index, "retries", "must be non-negative"));
                RetryPolicy::once()
            }
            (None, Some(retries)) => {
                let attempts = retries.saturating_add(1);
                RetryPolicy::new(
                    self.attempts_within_limit(index, "retries", attempts, issues),
                    0,
                )
            }
            (None, None) => RetryPolicy::once(),
        };

        let timeout_ms = match input.timeout_ms {
            Some(ms) => match non_negative(index, "timeout_ms", ms, issues) {
                0 => self.config.default_timeout_ms,
                ms => ms,
            },
            None => self.config.default_timeout_ms,
        };

        if issues.len() > before {
            return None;
        }

        Some(Step {
            tool_name,
            arguments,
            delay_ms,
            retry_policy,
            continue_on_error: input.continue_on_error.unwrap_or(!stop_on_error),
            timeout_ms,
            id: input.id,
            description: input.description,
        })
    }

    fn attempts_within_limit(
        &self,
        index: usize,
        field: &str,
        attempts: i64,
        issues: &mut Vec<ValidationIssue>,
    ) -> u32 {
        if attempts > i64::from(self.config.max_attempts_limit) {
            issues.push(ValidationIssue::step(
                index,
                field,
                format!(
                    "{} attempts exceeds the limit of {}",
                    attempts, self.config.max_attempts_limit
                ),
            ));
            return 1;
        }
        attempts as u32
    }
}

fn non_negative(index: usize, field: &str, value: i64, issues: &mut Vec<ValidationIssue>) -> u64 {
    if value < 0 {
        issues.push(ValidationIssue::step(index, field, "must be non-negative"));
        0
    } else {
        value as u64
    }
}

/// Parse a human-readable delay such as `500ms`, `2s`, `1.5s`, `1m` or `1h`.
/// Bare numbers are milliseconds.
pub fn parse_delay(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.parse().ok()?;

    let multiplier = match unit.trim() {
        "" | "ms" => 1.0,
        "s" | "sec" | "secs" => 1_000.0,
        "m" | "min" | "mins" => 60_000.0,
        "h" | "hr" | "hrs" => 3_600_000.0,
        _ => return None,
    };

    let millis = value * multiplier;
    if !millis.is_finite() || millis < 0.0 || millis > u64::MAX as f64 {
        return None;
    }
    Some(millis.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(request: &SequenceRequest) -> Result<ValidatedSequence, ValidationError> {
        let config = EngineConfig::default();
        SequenceValidator::new(&config).validate(request)
    }

    #[test]
    fn test_normalizes_defaults() {
        let request = SequenceRequest::new(vec![json!({"tool_name": "get_applications"})]);

        let validated = validate(&request).unwrap();
        let step = &validated.sequence.steps[0];

        assert_eq!(step.tool_name, "get_applications");
        assert!(step.arguments.is_empty());
        assert_eq!(step.delay_ms, 0);
        assert_eq!(step.retry_policy, RetryPolicy::once());
        assert!(!step.continue_on_error);
        assert_eq!(step.timeout_ms, 30_000);
        assert!(validated.options.stop_on_error);
        assert!(!validated.options.include_detailed_results);
    }

    #[test]
    fn test_continue_on_error_inherits_sequence_policy() {
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "a"}),
            json!({"tool_name": "b", "continue_on_error": false}),
        ])
        .with_stop_on_error(false);

        let validated = validate(&request).unwrap();
        assert!(validated.sequence.steps[0].continue_on_error);
        assert!(!validated.sequence.steps[1].continue_on_error);
    }

    #[test]
    fn test_legacy_continue_flag() {
        let mut request = SequenceRequest::new(vec![json!({"tool_name": "a"})]);
        request.continue_execution = Some(true);

        let validated = validate(&request).unwrap();
        assert!(!validated.options.stop_on_error);

        request.stop_on_error = Some(true);
        let validated = validate(&request).unwrap();
        assert!(validated.options.stop_on_error);
    }

    #[test]
    fn test_missing_tool_name() {
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "open_application"}),
            json!({"arguments": {"text": "hi"}}),
        ]);

        let error = validate(&request).unwrap_err();
        assert!(error.mentions(1, "tool_name"));
        assert_eq!(error.issues.len(), 1);
    }

    #[test]
    fn test_collects_every_issue() {
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "  "}),
            json!({"tool_name": "a", "arguments": ["not", "a", "map"]}),
            json!({"tool_name": "b", "delay_ms": -5}),
            json!({"tool_name": "c", "retry_policy": {"max_attempts": 0}}),
            json!({"tool_name": "d", "timeout_ms": -1}),
        ])
        .with_deadline(-10);

        let error = validate(&request).unwrap_err();
        assert!(error.mentions(0, "tool_name"));
        assert!(error.mentions(1, "arguments"));
        assert!(error.mentions(2, "delay_ms"));
        assert!(error.mentions(3, "retry_policy.max_attempts"));
        assert!(error.mentions(4, "timeout_ms"));
        assert!(error.issues.iter().any(|i| i.field == "deadline_ms"));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let request = SequenceRequest::new(vec![json!({"tool_name": "a", "fallback_id": "x"})]);

        let error = validate(&request).unwrap_err();
        assert!(error.mentions(0, "step"));
        assert!(error.to_string().contains("fallback_id"));
    }

    #[test]
    fn test_non_object_step() {
        let request = SequenceRequest::new(vec![json!("click_element")]);
        let error = validate(&request).unwrap_err();
        assert!(error.mentions(0, "step"));
    }

    #[test]
    fn test_empty_sequence() {
        let error = validate(&SequenceRequest::new(vec![])).unwrap_err();
        assert_eq!(error.issues[0].field, "steps");
        assert!(error.issues[0].index.is_none());
    }

    #[test]
    fn test_step_limit() {
        let config = EngineConfig::default().with_max_steps(2);
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "a"}),
            json!({"tool_name": "b"}),
            json!({"tool_name": "c"}),
        ]);

        let error = SequenceValidator::new(&config).validate(&request).unwrap_err();
        assert!(error.to_string().contains("exceeds the limit of 2"));
    }

    #[test]
    fn test_unknown_tool_against_catalog() {
        let config = EngineConfig::default();
        let validator = SequenceValidator::new(&config).with_known_tools(["click_element"]);

        let request = SequenceRequest::new(vec![
            json!({"tool_name": "click_element"}),
            json!({"tool_name": "teleport"}),
        ]);

        let error = validator.validate(&request).unwrap_err();
        assert!(error.mentions(1, "tool_name"));
        assert!(!error.mentions(0, "tool_name"));
    }

    #[test]
    fn test_retry_shorthand_and_policy() {
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "a", "retries": 2}),
            json!({"tool_name": "b", "retry_policy": {"max_attempts": 3, "backoff_ms": 250}}),
        ]);

        let validated = validate(&request).unwrap();
        assert_eq!(validated.sequence.steps[0].retry_policy, RetryPolicy::new(3, 0));
        assert_eq!(validated.sequence.steps[1].retry_policy, RetryPolicy::new(3, 250));
    }

    #[test]
    fn test_retry_limit() {
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "a", "retry_policy": {"max_attempts": 50}}),
        ]);
        let error = validate(&request).unwrap_err();
        assert!(error.mentions(0, "retry_policy.max_attempts"));
    }

    #[test]
    fn test_retry_shorthand_limit_names_retries() {
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "a", "retries": 20}),
            json!({"tool_name": "b", "retries": i64::MAX}),
        ]);
        let error = validate(&request).unwrap_err();
        assert!(error.mentions(0, "retries"));
        assert!(error.mentions(1, "retries"));
        assert!(!error.mentions(1, "retry_policy.max_attempts"));
    }

    #[test]
    fn test_conflicting_fields() {
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "a", "delay": "1s", "delay_ms": 1000}),
            json!({"tool_name": "b", "retries": 1, "retry_policy": {"max_attempts": 2}}),
        ]);
        let error = validate(&request).unwrap_err();
        assert!(error.mentions(0, "delay"));
        assert!(error.mentions(1, "retries"));
    }

    #[test]
    fn test_human_readable_delay() {
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "a", "delay": "1.5s"}),
            json!({"tool_name": "b", "delay": "soon"}),
        ]);
        let error = validate(&request).unwrap_err();
        assert!(error.mentions(1, "delay"));
        assert!(!error.mentions(0, "delay"));
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let config = EngineConfig::default().with_default_timeout(5_000);
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "a", "timeout_ms": 0}),
            json!({"tool_name": "b", "timeout_ms": 750}),
        ]);

        let validated = SequenceValidator::new(&config).validate(&request).unwrap();
        assert_eq!(validated.sequence.steps[0].timeout_ms, 5_000);
        assert_eq!(validated.sequence.steps[1].timeout_ms, 750);
    }

    #[test]
    fn test_preserves_order_and_labels() {
        let request = SequenceRequest::new(vec![
            json!({"tool_name": "open_application", "id": "open", "arguments": {"app_name": "calc"}}),
            json!({"tool_name": "press_key", "description": "Press enter", "arguments": null}),
        ])
        .with_progress_token("tok-1")
        .with_detailed_results(true)
        .with_deadline(60_000);

        let validated = validate(&request).unwrap();
        let names: Vec<_> = validated.sequence.iter().map(|s| s.tool_name.as_str()).collect();
        assert_eq!(names, vec!["open_application", "press_key"]);
        assert_eq!(validated.sequence.steps[0].id.as_deref(), Some("open"));
        assert_eq!(validated.sequence.steps[0].arguments["app_name"], "calc");
        assert_eq!(
            validated.sequence.steps[1].description.as_deref(),
            Some("Press enter")
        );
        assert_eq!(validated.options.progress_token.as_deref(), Some("tok-1"));
        assert!(validated.options.include_detailed_results);
        assert_eq!(validated.options.deadline_ms, Some(60_000));
    }

    #[test]
    fn test_parse_delay() {
        assert_eq!(parse_delay("500ms"), Some(500));
        assert_eq!(parse_delay("250"), Some(250));
        assert_eq!(parse_delay("2s"), Some(2_000));
        assert_eq!(parse_delay("1.5s"), Some(1_500));
        assert_eq!(parse_delay("1m"), Some(60_000));
        assert_eq!(parse_delay("1h"), Some(3_600_000));
        assert_eq!(parse_delay(" 3 s "), Some(3_000));
        assert_eq!(parse_delay("fast"), None);
        assert_eq!(parse_delay("5 weeks"), None);
        assert_eq!(parse_delay(""), None);
    }
}
