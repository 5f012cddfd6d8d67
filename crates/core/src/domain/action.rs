use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of failure classes a backend may report for an action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorKind {
    NotFound,
    Timeout,
    InvalidArgument,
    Unsupported,
    Internal,
}

impl ActionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::InvalidArgument => "invalid_argument",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_found" => Some(Self::NotFound),
            "timeout" => Some(Self::Timeout),
            "invalid_argument" => Some(Self::InvalidArgument),
            "unsupported" => Some(Self::Unsupported),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }

    /// Whether another attempt can change the outcome.
    ///
    /// Malformed arguments and unsupported actions fail the same way every
    /// time, so they are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound | Self::Timeout | Self::Internal => true,
            Self::InvalidArgument | Self::Unsupported => false,
        }
    }
}

impl fmt::Display for ActionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure returned by the automation backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ActionError {
    pub kind: ActionErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ActionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::Timeout, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::InvalidArgument, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::Unsupported, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::Internal, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_decision_table() {
        assert!(ActionErrorKind::NotFound.is_retryable());
        assert!(ActionErrorKind::Timeout.is_retryable());
        assert!(ActionErrorKind::Internal.is_retryable());
        assert!(!ActionErrorKind::InvalidArgument.is_retryable());
        assert!(!ActionErrorKind::Unsupported.is_retryable());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            ActionErrorKind::parse("not_found"),
            Some(ActionErrorKind::NotFound)
        );
        assert_eq!(ActionErrorKind::parse("bogus"), None);
        assert_eq!(ActionErrorKind::Timeout.as_str(), "timeout");
    }

    #[test]
    fn test_error_display() {
        let error = ActionError::not_found("element 'OK' not visible");
        assert_eq!(error.to_string(), "not_found: element 'OK' not visible");
    }
}
