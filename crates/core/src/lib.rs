//! Data model for sequence execution: steps, per-step results and the
//! aggregate report returned to callers.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::{CoreError, ValidationError, ValidationIssue};
