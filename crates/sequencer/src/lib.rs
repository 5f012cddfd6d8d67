pub mod aggregator;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod progress;
pub mod state_machine;
pub mod validator;

pub use aggregator::ResultAggregator;
pub use backend::{
    ActionDispatcher, ActionRequest, DispatchContext, DispatchError, Tool, ToolInfo, ToolRegistry,
};
pub use config::EngineConfig;
pub use engine::{RunContext, SequenceEngine};
pub use error::{EngineError, Result};
pub use executor::{RunOutcome, StepExecutor};
pub use lifecycle::LifecycleEmitter;
pub use progress::ProgressEmitter;
pub use state_machine::{StepState, StepStateMachine, StepTracker};
pub use validator::{parse_delay, SequenceRequest, SequenceValidator, ValidatedSequence};
