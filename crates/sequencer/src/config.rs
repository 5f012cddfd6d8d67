use events::EventBus;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_ATTEMPTS_LIMIT: u32 = 10;
pub const DEFAULT_MAX_STEPS: usize = 1000;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-call backend timeout for steps that do not set `timeout_ms`
    pub default_timeout_ms: u64,
    /// Upper bound accepted for `retry_policy.max_attempts`
    pub max_attempts_limit: u32,
    /// Upper bound on the number of steps in one sequence
    pub max_steps: usize,
    /// Optional bus receiving lifecycle events for every run
    pub event_bus: Option<EventBus>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_attempts_limit: DEFAULT_MAX_ATTEMPTS_LIMIT,
            max_steps: DEFAULT_MAX_STEPS,
            event_bus: None,
        }
    }
}

impl EngineConfig {
    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_attempts_limit(mut self, limit: u32) -> Self {
        self.max_attempts_limit = limit;
        self
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }
}
