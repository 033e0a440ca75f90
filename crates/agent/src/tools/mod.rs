//! Tool adapters and the per-agent registry

pub mod function;

pub use function::FnTool;

use async_trait::async_trait;
use handoff_provider::Tool;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{AgentError, BoxError};

/// Uniform invocation interface over a capability an engine may call
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value) -> Result<String, BoxError>;

    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description(), self.parameters())
    }
}

/// Name, description and argument schema of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// A usable descriptor has a name and an object-typed schema.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && self.parameters.get("type").and_then(Value::as_str) == Some("object")
    }

    pub fn to_provider_tool(&self) -> Tool {
        Tool::new(&self.name, &self.description, self.parameters.clone())
    }
}

/// Build an object schema of string properties
pub fn object_schema(properties: &[(&str, &str, bool)]) -> Value {
    let mut props = serde_json::Map::new();
    let mut required = Vec::new();

    for (name, description, is_required) in properties {
        props.insert(
            name.to_string(),
            serde_json::json!({
                "type": "string",
                "description": description
            }),
        );
        if *is_required {
            required.push(name.to_string());
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": props,
        "required": required
    })
}

/// Tools available to one agent, keyed by unique name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolAdapter>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool of the same name
    pub fn register<T: ToolAdapter + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn ToolAdapter>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Register a tool, failing if the name is already taken
    pub fn try_register_arc(&mut self, tool: Arc<dyn ToolAdapter>) -> crate::Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Tool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.describe())
            .collect()
    }

    /// Definitions in the provider wire format
    pub fn definitions(&self) -> Vec<Tool> {
        self.descriptors()
            .iter()
            .map(ToolDescriptor::to_provider_tool)
            .collect()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, BoxError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        tool.execute(args).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
