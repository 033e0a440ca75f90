//! handoff command implementations

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use handoff_agent::{
    react_factory, AgentBuilder, AgentRunner, OutputSubmissionGate, ReactConfig, RequireFields,
    ToolAdapter,
};
use handoff_config::{self, Config};
use handoff_provider::ScriptedProvider;

/// Arguments of `handoff replay`
#[derive(Debug)]
pub struct ReplayOptions {
    pub script: PathBuf,
    pub input: String,
    pub max_iterations: Option<u32>,
    pub require: Vec<String>,
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

async fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().await.context("Failed to load config")?,
    };
    Ok(config)
}

fn build_gate(config: &Config, require: &[String], max_iterations: Option<u32>) -> OutputSubmissionGate {
    let handler = RequireFields::new(require.iter().cloned())
        .with_name(&config.gate.name)
        .with_description(&config.gate.description);

    let gate = OutputSubmissionGate::configured(handler, &config.gate);
    match max_iterations {
        Some(max) => gate.with_max_iterations(max),
        None => gate,
    }
}

fn build_runner(
    config: &Config,
    gate: OutputSubmissionGate,
    provider: ScriptedProvider,
) -> Result<AgentRunner> {
    let runner = AgentBuilder::from_config(&config.agent)
        .output_gate(gate)
        .factory(react_factory(
            Arc::new(provider),
            ReactConfig::from(&config.engine),
        ))
        .build()
        .context("Failed to assemble agent")?;
    Ok(runner)
}

/// Write a default config file
pub async fn init_command(path: Option<PathBuf>) -> Result<()> {
    println!("◆ Initializing handoff...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let path = path.unwrap_or_else(handoff_config::config_path);
    let config = handoff_config::init_at(&path)
        .await
        .with_context(|| format!("Failed to initialize config at {}", path.display()))?;

    println!("\n◆ Config ready at {}", path.display());
    println!("  agent:  {}", config.agent.name);
    println!(
        "  gate:   {} ({} attempts)",
        config.gate.name, config.gate.max_iterations
    );
    println!("  engine: {} turns", config.engine.max_iterations);
    println!("\nNext steps:");
    println!("  handoff replay --script transcript.json -m \"your task\"");

    Ok(())
}

/// Print what an outer engine would see for this agent and its gate
pub async fn describe_command(require: Vec<String>, config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config.as_deref()).await?;
    let gate = Arc::new(build_gate(&config, &require, None));

    let runner = AgentBuilder::from_config(&config.agent)
        .output_gate_arc(gate.clone())
        .factory(react_factory(
            Arc::new(ScriptedProvider::new(Vec::new())),
            ReactConfig::from(&config.engine),
        ))
        .build()
        .context("Failed to assemble agent")?;

    let described = serde_json::json!({
        "agent": runner.describe(),
        "gate": gate.describe(),
        "max_iterations": gate.max_iterations(),
    });
    println!("{}", serde_json::to_string_pretty(&described)?);
    Ok(())
}

/// Run the agent against a recorded transcript and print the validated result
pub async fn replay_command(options: ReplayOptions) -> Result<()> {
    let mut config = load_config(options.config.as_deref()).await?;
    if options.verbose {
        config.engine.verbose = true;
    }

    let provider = ScriptedProvider::from_file(&options.script)
        .await
        .with_context(|| format!("Failed to read transcript {}", options.script.display()))?;
    debug!("◆ TRANSCRIPT HOLDS {} RESPONSES", provider.remaining());

    let gate = build_gate(&config, &options.require, options.max_iterations);
    let runner = build_runner(&config, gate, provider)?;

    info!("◆ REPLAYING AGENT '{}'", runner.name());
    let output = runner
        .invoke(&options.input)
        .await
        .with_context(|| format!("Agent '{}' did not produce a result", runner.name()))?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
