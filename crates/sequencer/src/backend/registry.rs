use async_trait::async_trait;
use sequence_core::ActionError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{ActionDispatcher, ActionRequest, DispatchContext, DispatchError};

/// A typed action the registry can dispatch to by name.
///
/// `Args` doubles as the argument schema: the registry deserializes the
/// step's argument map into it before calling, and a mismatch is reported
/// as `InvalidArgument` without reaching the tool.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Args: DeserializeOwned + Send;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn call(&self, args: Self::Args, ctx: &DispatchContext) -> Result<Value, ActionError>;
}

#[async_trait]
trait ErasedTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn call_value(
        &self,
        arguments: &Map<String, Value>,
        ctx: &DispatchContext,
    ) -> Result<Value, ActionError>;
}

#[async_trait]
impl<T: Tool> ErasedTool for T {
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn description(&self) -> &str {
        Tool::description(self)
    }

    async fn call_value(
        &self,
        arguments: &Map<String, Value>,
        ctx: &DispatchContext,
    ) -> Result<Value, ActionError> {
        let args: T::Args = serde_json::from_value(Value::Object(arguments.clone()))
            .map_err(|e| {
                ActionError::invalid_argument(format!(
                    "Invalid arguments for '{}': {}",
                    Tool::name(self),
                    e
                ))
            })?;
        self.call(args, ctx).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Name-to-tool map implementing [`ActionDispatcher`].
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ErasedTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool already registered under its name.
    pub fn register<T: Tool>(mut self, tool: T) -> Self {
        self.insert(tool);
        self
    }

    pub fn insert<T: Tool>(&mut self, tool: T) {
        let name = Tool::name(&tool).to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tools sorted by name.
    pub fn list(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

#[async_trait]
impl ActionDispatcher for ToolRegistry {
    async fn invoke(
        &self,
        request: &ActionRequest,
        ctx: &DispatchContext,
    ) -> Result<Value, DispatchError> {
        let tool = self.tools.get(&request.tool_name).ok_or_else(|| {
            ActionError::unsupported(format!("Unknown tool '{}'", request.tool_name))
        })?;

        debug!(
            execution_id = %ctx.execution_id,
            step_index = ctx.step_index,
            attempt = ctx.attempt,
            tool_name = %request.tool_name,
            "Dispatching tool"
        );

        Ok(tool.call_value(&request.arguments, ctx).await?)
    }

    fn tool_names(&self) -> Option<Vec<String>> {
        Some(self.tools.keys().cloned().collect())
    }
}
