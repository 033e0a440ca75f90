//! Shared fixtures for agent integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use handoff_agent::{factory_fn, is_fatal, AgentFactory, BoxError, Engine, ToolRegistry};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the scripted engine observed
#[derive(Clone, Default)]
pub struct Recorder {
    /// Tool outputs in call order; ordinary tool errors are prefixed with `ERR: `
    pub outputs: Arc<Mutex<Vec<String>>>,
    /// Number of factory calls
    pub builds: Arc<AtomicUsize>,
    /// Tool names handed to the factory on its last call
    pub bound_tools: Arc<Mutex<Vec<String>>>,
    /// Inputs the engine was run with
    pub inputs: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn outputs(&self) -> Vec<String> {
        self.outputs.lock().unwrap().clone()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn bound_tools(&self) -> Vec<String> {
        self.bound_tools.lock().unwrap().clone()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

/// Engine that makes a fixed sequence of tool calls, then answers in text
pub struct ScriptedEngine {
    tools: ToolRegistry,
    steps: Vec<(String, Value)>,
    final_text: String,
    pause: Option<Duration>,
    swallow_errors: bool,
    recorder: Recorder,
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn run(&self, input: &str) -> Result<String, BoxError> {
        self.recorder.inputs.lock().unwrap().push(input.to_string());
        if let Some(pause) = self.pause {
            tokio::time::sleep(pause).await;
        }

        for (name, args) in &self.steps {
            match self.tools.execute(name, args.clone()).await {
                Ok(output) => self.recorder.outputs.lock().unwrap().push(output),
                Err(err) if is_fatal(&err) && !self.swallow_errors => return Err(err),
                Err(err) => self
                    .recorder
                    .outputs
                    .lock()
                    .unwrap()
                    .push(format!("ERR: {}", err)),
            }
        }
        Ok(self.final_text.clone())
    }
}

pub struct Script {
    steps: Vec<(String, Value)>,
    final_text: String,
    pause: Option<Duration>,
    swallow_errors: bool,
}

impl Script {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            final_text: "done".to_string(),
            pause: None,
            swallow_errors: false,
        }
    }

    pub fn call(mut self, tool: &str, args: Value) -> Self {
        self.steps.push((tool.to_string(), args));
        self
    }

    pub fn answer(mut self, text: &str) -> Self {
        self.final_text = text.to_string();
        self
    }

    /// Sleep before the first call, to leave room for cancellation
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Record every tool error as text and keep going, fatal ones included
    pub fn swallow_errors(mut self) -> Self {
        self.swallow_errors = true;
        self
    }

    pub fn factory(self) -> (impl AgentFactory, Recorder) {
        let recorder = Recorder::default();
        let handle = recorder.clone();
        let factory = factory_fn(move |tools| {
            handle.builds.fetch_add(1, Ordering::SeqCst);
            *handle.bound_tools.lock().unwrap() = tools.names();
            Ok(Box::new(ScriptedEngine {
                tools: tools.clone(),
                steps: self.steps.clone(),
                final_text: self.final_text.clone(),
                pause: self.pause,
                swallow_errors: self.swallow_errors,
                recorder: handle.clone(),
            }))
        });
        (factory, recorder)
    }
}
