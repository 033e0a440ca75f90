//! Closure-backed tool

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::ToolAdapter;
use crate::BoxError;

type ToolFn = dyn Fn(Value) -> Result<String, BoxError> + Send + Sync;

/// Adapts a synchronous closure to the tool interface
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    func: Arc<ToolFn>,
}

impl FnTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: F,
    ) -> Self
    where
        F: Fn(Value) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl ToolAdapter for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, args: Value) -> Result<String, BoxError> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_tool_executes_closure() {
        let tool = FnTool::new("echo", "Echo the text", json!({"type": "object"}), |args| {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        });

        assert_eq!(tool.name(), "echo");
        assert_eq!(tool.execute(json!({"text": "hi"})).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_fn_tool_propagates_errors_untranslated() {
        let tool = FnTool::new("boom", "Always fails", json!({"type": "object"}), |_| {
            Err("disk on fire".into())
        });

        let err = tool.execute(json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
    }
}
