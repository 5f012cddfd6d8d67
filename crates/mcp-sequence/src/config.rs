use serde::{Deserialize, Serialize};
use sequencer::config::{DEFAULT_MAX_ATTEMPTS_LIMIT, DEFAULT_MAX_STEPS, DEFAULT_TIMEOUT_MS};
use sequencer::EngineConfig;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const CONFIG_DIR: &str = ".sequence-mcp";
const CONFIG_FILE: &str = "config.json";

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "SEQUENCE_MCP_CONFIG";

const TIMEOUT_ENV: &str = "SEQUENCE_DEFAULT_TIMEOUT_MS";
const MAX_STEPS_ENV: &str = "SEQUENCE_MAX_STEPS";
const MAX_ATTEMPTS_ENV: &str = "SEQUENCE_MAX_ATTEMPTS";
const SESSION_ENV: &str = "SEQUENCE_SESSION_ID";
const RUN_TIMEOUT_ENV: &str = "SEQUENCE_RUN_TIMEOUT_MS";

/// Deadline for requests that do not set `deadline_ms`
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 600_000;

/// Server configuration stored in .sequence-mcp/config.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Backend timeout for steps without their own `timeout_ms`
    pub default_timeout_ms: u64,
    /// Largest `retry_policy.max_attempts` a step may ask for
    pub max_attempts_limit: u32,
    /// Largest number of steps accepted in one sequence
    pub max_steps: usize,
    /// Backend session handed to every dispatch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Deadline applied to runs without their own `deadline_ms`, `null` for none
    pub run_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_attempts_limit: DEFAULT_MAX_ATTEMPTS_LIMIT,
            max_steps: DEFAULT_MAX_STEPS,
            session_id: None,
            run_timeout_ms: Some(DEFAULT_RUN_TIMEOUT_MS),
        }
    }
}

impl ServerConfig {
    /// Default config location below `base`
    pub fn default_path(base: &Path) -> PathBuf {
        base.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load from `SEQUENCE_MCP_CONFIG` or the working directory, then apply
    /// environment overrides.
    pub async fn load() -> Self {
        let path = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => Self::default_path(Path::new(".")),
        };
        Self::read(&path)
            .await
            .apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Read config from a file, falling back to defaults
    pub async fn read(config_path: &Path) -> Self {
        if !config_path.exists() {
            debug!(path = %config_path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(config_path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    debug!(path = %config_path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %config_path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    pub async fn write(&self, config_path: &Path) -> std::io::Result<()> {
        if let Some(dir) = config_path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).await?;
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(config_path, content).await?;
        debug!(path = %config_path.display(), "Config saved successfully");

        Ok(())
    }

    /// Override fields from environment-style lookups. Unparseable values
    /// are ignored with a warning.
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override(&lookup, TIMEOUT_ENV) {
            self.default_timeout_ms = value;
        }
        if let Some(value) = parse_override(&lookup, MAX_STEPS_ENV) {
            self.max_steps = value;
        }
        if let Some(value) = parse_override(&lookup, MAX_ATTEMPTS_ENV) {
            self.max_attempts_limit = value;
        }
        if let Some(value) = parse_override(&lookup, RUN_TIMEOUT_ENV) {
            // 0 disables the run timeout
            self.run_timeout_ms = (value > 0).then_some(value);
        }
        if let Some(session) = lookup(SESSION_ENV).filter(|s| !s.trim().is_empty()) {
            self.session_id = Some(session);
        }
        self
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_default_timeout(self.default_timeout_ms)
            .with_max_attempts_limit(self.max_attempts_limit)
            .with_max_steps(self.max_steps)
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring invalid environment override");
            None
        }
    }
}
