//! Tool registry for the five capability tools and any extras.
//!
//! Direct dispatch, pipeline steps, and ReAct actions all execute through
//! here. Each call runs under the tool's own timeout; an elapsed timeout is
//! reported as [`ToolError::Timeout`].

use crate::error::ToolError;
use crate::types::{Capability, ToolDefinition, ToolOutput};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A named capability the router, agent, or a pipeline step can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name used in routing tables, ReAct `Action:` lines, and pipeline steps.
    fn name(&self) -> &str;

    /// One line shown to the model in the ReAct tool list.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments. Free-text tools take `{"input": ...}`.
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": { "type": "string", "description": "Free-text input" }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError>;

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Tools keyed by name. Iteration order is alphabetical.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names are unique; a second tool with the same name is rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { name });
        }
        debug!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<(), ToolError> {
        match self.tools.remove(name) {
            Some(_) => Ok(()),
            None => Err(ToolError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Capabilities whose tool has not been registered.
    pub fn missing_capabilities(&self) -> Vec<Capability> {
        Capability::all()
            .iter()
            .copied()
            .filter(|c| !self.contains(c.tool_name()))
            .collect()
    }

    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run a tool by name under its timeout.
    pub async fn execute(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        let timeout = tool.timeout();
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, tool.execute(args))
            .await
            .unwrap_or_else(|_| {
                Err(ToolError::Timeout {
                    name: name.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            });
        info!(
            tool = %name,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool finished"
        );
        result
    }

    /// Send free text to the tool backing `capability`.
    pub async fn execute_capability(
        &self,
        capability: Capability,
        input: &str,
    ) -> Result<ToolOutput, ToolError> {
        self.execute(capability.tool_name(), json!({ "input": input }))
            .await
    }
}

/// Build tool arguments from free text.
///
/// A JSON object is passed through unchanged; anything else becomes
/// `{"input": "<text>"}`.
pub fn tool_args_from_text(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.starts_with('{')
        && let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed)
    {
        return value;
    }
    json!({ "input": trimmed })
}

/// Extract the text input from tool arguments.
///
/// Accepts `{"input": "..."}`, a bare JSON string, or falls back to `query`/`text`
/// keys. Empty input is rejected.
pub fn require_text_input(tool: &str, args: &Value) -> Result<String, ToolError> {
    let text = match args {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["input", "query", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str())),
        _ => None,
    };
    match text.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => Err(ToolError::InvalidArguments {
            name: tool.to_string(),
            reason: "missing 'input' text".to_string(),
        }),
    }
}
