//! Agent runner
//!
//! Owns an agent's tool set, its optional output gate and the engine built
//! from them. One `invoke` is one run: the gate is bound to it, the engine
//! is driven to completion, and the gate's captured result is returned.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use handoff_config::AgentDefaults;

use crate::factory::{AgentFactory, Engine};
use crate::output::OutputSubmissionGate;
use crate::tools::{ToolAdapter, ToolDescriptor, ToolRegistry};
use crate::{AgentError, BoxError, Result};

/// Collects everything an agent is built from
pub struct AgentBuilder {
    name: String,
    description: Option<String>,
    prompt_prefix: Option<String>,
    tools: Vec<Arc<dyn ToolAdapter>>,
    gate: Option<Arc<OutputSubmissionGate>>,
    factory: Option<Arc<dyn AgentFactory>>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            prompt_prefix: None,
            tools: Vec::new(),
            gate: None,
            factory: None,
        }
    }

    pub fn from_config(defaults: &AgentDefaults) -> Self {
        let mut builder = Self::new(&defaults.name);
        builder.description = defaults.description.clone();
        builder.prompt_prefix = defaults.prompt_prefix.clone();
        builder
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn prompt_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prompt_prefix = Some(prefix.into());
        self
    }

    pub fn tool<T: ToolAdapter + 'static>(self, tool: T) -> Self {
        self.tool_arc(Arc::new(tool))
    }

    pub fn tool_arc(mut self, tool: Arc<dyn ToolAdapter>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn output_gate(self, gate: OutputSubmissionGate) -> Self {
        self.output_gate_arc(Arc::new(gate))
    }

    pub fn output_gate_arc(mut self, gate: Arc<OutputSubmissionGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn factory<F: AgentFactory + 'static>(mut self, factory: F) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Assemble the runner; tool names must be unique, gate included
    pub fn build(self) -> Result<AgentRunner> {
        let factory = self
            .factory
            .ok_or_else(|| AgentError::MissingFactory(self.name.clone()))?;

        let mut tools = ToolRegistry::new();
        for tool in self.tools {
            tools.try_register_arc(tool)?;
        }
        if let Some(gate) = &self.gate {
            tools.try_register_arc(gate.clone())?;
        }

        let description = self
            .description
            .unwrap_or_else(|| format!("Delegate a task to the '{}' agent.", self.name));

        debug!("◆ AGENT '{}' ASSEMBLED WITH TOOLS {:?}", self.name, tools.names());
        Ok(AgentRunner {
            name: self.name,
            description,
            prompt_prefix: self.prompt_prefix,
            factory,
            tools,
            gate: self.gate,
            engine: OnceCell::new(),
            run_lock: Mutex::new(()),
        })
    }
}

/// One logical agent: tool set, optional output gate and lazily built engine
pub struct AgentRunner {
    name: String,
    description: String,
    prompt_prefix: Option<String>,
    factory: Arc<dyn AgentFactory>,
    tools: ToolRegistry,
    gate: Option<Arc<OutputSubmissionGate>>,
    engine: OnceCell<Box<dyn Engine>>,
    run_lock: Mutex<()>,
}

/// Clears the gate's run binding on every exit path, including cancellation
struct GateBinding<'a> {
    gate: &'a OutputSubmissionGate,
}

impl<'a> GateBinding<'a> {
    fn bind(gate: &'a OutputSubmissionGate, agent: &str, input: &str) -> Result<Self> {
        gate.bind(agent, input)?;
        Ok(Self { gate })
    }
}

impl Drop for GateBinding<'_> {
    fn drop(&mut self) {
        self.gate.unbind();
    }
}

#[derive(Deserialize)]
struct DelegateArgs {
    input: String,
}

impl AgentRunner {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gate(&self) -> Option<&Arc<OutputSubmissionGate>> {
        self.gate.as_ref()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    pub fn is_materialized(&self) -> bool {
        self.engine.initialized()
    }

    /// Add a tool before the engine is built
    pub fn add_tool<T: ToolAdapter + 'static>(&mut self, tool: T) -> Result<()> {
        if self.is_materialized() {
            return Err(AgentError::ToolsLocked(self.name.clone()));
        }
        self.tools.try_register_arc(Arc::new(tool))
    }

    /// Build the engine now instead of on first invoke
    pub async fn materialize(&self) -> Result<()> {
        self.engine().await.map(|_| ())
    }

    async fn engine(&self) -> Result<&dyn Engine> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                info!("◆ BUILDING ENGINE FOR '{}'", self.name);
                self.factory.build(&self.tools)
            })
            .await?;
        Ok(engine.as_ref())
    }

    fn compose_prompt(&self, input: &str) -> String {
        match &self.prompt_prefix {
            Some(prefix) if !prefix.trim().is_empty() => format!("{}\n\n{}", prefix, input),
            _ => input.to_string(),
        }
    }

    /// Run the agent once on `input`.
    ///
    /// With an output gate, the result is whatever the gate captured. If the
    /// gate failed fatally that failure is returned, even when the engine
    /// swallowed it; an engine that simply stops without a successful
    /// submission yields [`AgentError::UnvalidatedTermination`]. Without a
    /// gate the engine's final text is returned as a JSON string.
    ///
    /// A gate shared with another runner that is mid-run gives
    /// [`AgentError::GateBusy`].
    pub async fn invoke(&self, input: &str) -> Result<Value> {
        let _serial = self.run_lock.lock().await;
        let _binding = self
            .gate
            .as_deref()
            .map(|gate| GateBinding::bind(gate, &self.name, input))
            .transpose()?;

        let engine = self.engine().await?;
        info!("◆ AGENT '{}' ENGAGED", self.name);
        let outcome = engine.run(&self.compose_prompt(input)).await;

        let Some(gate) = &self.gate else {
            return outcome.map(Value::String).map_err(AgentError::from_boxed);
        };

        match (gate.captured_output(), outcome) {
            (Some(output), Ok(_)) => Ok(output),
            (Some(output), Err(err)) => {
                warn!(
                    "◆ ENGINE FOR '{}' FAILED AFTER SUBMISSION, KEEPING RESULT: {}",
                    self.name, err
                );
                Ok(output)
            }
            (None, Err(err)) => match (AgentError::from_boxed(err), gate.failure()) {
                (
                    err @ (AgentError::IterationBudgetExceeded { .. }
                    | AgentError::OutputRejected(_)),
                    _,
                ) => Err(err),
                (err, Some(failure)) => {
                    warn!(
                        "◆ ENGINE FOR '{}' FAILED AFTER ITS GATE CLOSED: {}",
                        self.name, err
                    );
                    Err(failure)
                }
                (err, None) => Err(err),
            },
            (None, Ok(text)) => {
                if let Some(failure) = gate.failure() {
                    warn!(
                        "◆ ENGINE FOR '{}' FINISHED PAST A GATE FAILURE: {}",
                        self.name, failure
                    );
                    return Err(failure);
                }
                warn!(
                    "◆ AGENT '{}' STOPPED WITHOUT SUBMITTING: {}",
                    self.name,
                    text.chars().take(100).collect::<String>()
                );
                Err(AgentError::UnvalidatedTermination {
                    agent: self.name.clone(),
                })
            }
        }
    }

    /// Clear per-run gate state left behind by an abandoned invocation
    pub fn reset(&self) {
        if let Some(gate) = &self.gate {
            gate.reset();
        }
    }

    /// Descriptor under which this agent is offered to other agents
    pub fn describe(&self) -> ToolDescriptor {
        ToolAdapter::describe(self)
    }

    /// This agent as a tool another agent can call
    pub fn as_tool(self: &Arc<Self>) -> Arc<dyn ToolAdapter> {
        self.clone()
    }
}

#[async_trait]
impl ToolAdapter for AgentRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": { "type": "string", "description": "Task for the agent" }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, args: Value) -> std::result::Result<String, BoxError> {
        let args: DelegateArgs = serde_json::from_value(args)
            .map_err(|e| AgentError::InvalidArguments(e.to_string()))?;

        match self.invoke(&args.input).await? {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }
}

impl std::fmt::Debug for AgentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRunner")
            .field("name", &self.name)
            .field("tools", &self.tools)
            .field("gated", &self.gate.is_some())
            .field("materialized", &self.is_materialized())
            .finish()
    }
}
