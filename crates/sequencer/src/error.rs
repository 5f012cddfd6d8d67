use sequence_core::{CoreError, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The sequence was rejected before any step ran
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Action dispatcher unavailable: {0}")]
    DispatcherUnavailable(String),

    #[error("Internal fault: {0}")]
    InternalFault(String),
}

impl EngineError {
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::InternalFault(reason.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<CoreError> for EngineError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(error) => Self::Validation(error),
            other => Self::InternalFault(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
