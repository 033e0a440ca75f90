//! Reference engine: a reason/act loop over a model provider

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use handoff_config::EngineDefaults;
use handoff_provider::{ChatParams, Message, Provider, ToolCallDef, ToolChoice};

use crate::factory::{factory_fn, AgentFactory, Engine};
use crate::tools::ToolRegistry;
use crate::{is_fatal, AgentError, BoxError};

/// Final text when the loop runs out of turns
pub const ITERATION_LIMIT_MESSAGE: &str = "Agent stopped due to iteration limit.";

#[derive(Debug, Clone)]
pub struct ReactConfig {
    /// Model name; empty means the provider's default
    pub model: String,
    pub system_prompt: String,
    /// Model turns before the loop gives up
    pub max_iterations: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Log each turn at info instead of debug
    pub verbose: bool,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self::from(&EngineDefaults::default())
    }
}

impl From<&EngineDefaults> for ReactConfig {
    fn from(defaults: &EngineDefaults) -> Self {
        Self {
            model: defaults.model.clone(),
            system_prompt: defaults.system_prompt.clone(),
            max_iterations: defaults.max_iterations,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            verbose: defaults.verbose,
        }
    }
}

/// Calls the model, runs the tools it asks for, repeats until it answers
/// in plain text or the turn limit is reached.
///
/// Ordinary tool failures are shown to the model as `Error: ...`; a fatal
/// [`AgentError`] from a tool (such as an exhausted output gate) ends the run.
pub struct ReactEngine<P: Provider> {
    provider: Arc<P>,
    tools: ToolRegistry,
    config: ReactConfig,
}

impl<P: Provider> ReactEngine<P> {
    pub fn new(provider: Arc<P>, tools: ToolRegistry, config: ReactConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    fn model(&self) -> String {
        if self.config.model.is_empty() {
            self.provider.default_model()
        } else {
            self.config.model.clone()
        }
    }

    fn trace_turn(&self, iteration: u32) {
        if self.config.verbose {
            info!("◆ REACT TURN {}/{}", iteration, self.config.max_iterations);
        } else {
            debug!("◆ REACT TURN {}/{}", iteration, self.config.max_iterations);
        }
    }
}

#[async_trait]
impl<P: Provider + 'static> Engine for ReactEngine<P> {
    async fn run(&self, input: &str) -> Result<String, BoxError> {
        let mut messages = Vec::new();
        if !self.config.system_prompt.is_empty() {
            messages.push(Message::system(&self.config.system_prompt));
        }
        messages.push(Message::user(input));

        for iteration in 1..=self.config.max_iterations {
            self.trace_turn(iteration);

            let tools = self.tools.definitions();
            let tool_choice = if tools.is_empty() {
                ToolChoice::None
            } else {
                ToolChoice::Auto
            };
            let params = ChatParams {
                model: self.model(),
                messages: messages.clone(),
                tools,
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                tool_choice,
            };

            let response = self
                .provider
                .chat(params)
                .await
                .map_err(AgentError::from)?;
            debug!(
                "◆ MODEL REPLIED ({}): {} tokens, {} in / {} out",
                response.finish_reason,
                response.usage.total_tokens,
                response.usage.prompt_tokens,
                response.usage.completion_tokens
            );

            if !response.has_tool_calls() {
                return Ok(response.content.unwrap_or_default());
            }

            let defs: Vec<ToolCallDef> = response.tool_calls.iter().map(ToolCallDef::from).collect();
            messages.push(Message::assistant(response.content.clone(), Some(defs)));

            for call in &response.tool_calls {
                debug!("Executing tool: {}", call.name);

                let result = match self.tools.execute(&call.name, call.arguments.clone()).await {
                    Ok(output) => output,
                    Err(err) if is_fatal(&err) => {
                        warn!("◆ TOOL '{}' ABORTED THE RUN: {}", call.name, err);
                        return Err(err);
                    }
                    Err(err) => format!("Error: {}", err),
                };

                messages.push(Message::tool(&call.id, &call.name, result));
            }
        }

        warn!(
            "◆ REACT LOOP HIT ITS LIMIT OF {} TURNS",
            self.config.max_iterations
        );
        Ok(ITERATION_LIMIT_MESSAGE.to_string())
    }
}

/// Factory building a [`ReactEngine`] over the agent's tools
pub fn react_factory<P: Provider + 'static>(
    provider: Arc<P>,
    config: ReactConfig,
) -> impl AgentFactory {
    factory_fn(move |tools| {
        Ok(Box::new(ReactEngine::new(
            provider.clone(),
            tools.clone(),
            config.clone(),
        )))
    })
}
