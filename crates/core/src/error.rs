use std::fmt;

use thiserror::Error;

/// A single problem found while validating a submitted sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Step index, or `None` for sequence-level problems
    pub index: Option<usize>,
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn step(index: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn sequence(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index: None,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "steps[{}].{}: {}", index, self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

/// The submitted sequence was rejected before any step ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    pub fn single(issue: ValidationIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    /// Whether any issue concerns the given step field.
    pub fn mentions(&self, index: usize, field: &str) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.index == Some(index) && issue.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issues = self
            .issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "invalid sequence: {}", issues)
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid step status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ValidationError::new(vec![
            ValidationIssue::step(1, "tool_name", "must not be empty"),
            ValidationIssue::sequence("steps", "too many steps"),
        ]);
        assert_eq!(
            error.to_string(),
            "invalid sequence: steps[1].tool_name: must not be empty; steps: too many steps"
        );
        assert!(error.mentions(1, "tool_name"));
        assert!(!error.mentions(0, "tool_name"));
    }

    #[test]
    fn test_core_error_wraps_validation() {
        let error: CoreError =
            ValidationError::single(ValidationIssue::sequence("steps", "must not be empty")).into();
        assert!(error.to_string().contains("must not be empty"));
    }
}
