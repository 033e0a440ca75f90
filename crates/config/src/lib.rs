//! HANDOFF: configuration
//!
//! Agent, output gate and engine defaults, stored as JSON under the data
//! directory. Every field has a default so partial files load.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("◆ DATA LINK ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("◆ MALFORMED CONFIG: {0}")]
    Json(#[from] serde_json::Error),

    #[error("◆ INVALID CONFIG: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Identity of the agent presented to callers and to other agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompt_prefix: Option<String>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            description: None,
            prompt_prefix: None,
        }
    }
}

fn default_agent_name() -> String {
    "agent".to_string()
}

/// Output submission gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDefaults {
    #[serde(default = "default_gate_name")]
    pub name: String,
    #[serde(default = "default_gate_description")]
    pub description: String,
    #[serde(default = "default_gate_max_iterations")]
    pub max_iterations: u32,
}

impl Default for GateDefaults {
    fn default() -> Self {
        Self {
            name: default_gate_name(),
            description: default_gate_description(),
            max_iterations: default_gate_max_iterations(),
        }
    }
}

fn default_gate_name() -> String {
    "output_handler".to_string()
}

fn default_gate_description() -> String {
    "Output handler. ONLY RETURN THE FINAL RESULT USING THIS TOOL!".to_string()
}

fn default_gate_max_iterations() -> u32 {
    5
}

/// Reference engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDefaults {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_engine_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub verbose: bool,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            model: String::new(),
            system_prompt: String::new(),
            max_iterations: default_engine_max_iterations(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            verbose: false,
        }
    }
}

fn default_engine_max_iterations() -> u32 {
    10
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentDefaults,
    #[serde(default)]
    pub gate: GateDefaults,
    #[serde(default)]
    pub engine: EngineDefaults,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location; a missing file yields defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO CONFIG AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ READING CONFIG FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING CONFIG TO {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Reject values no agent can run with
    pub fn validate(&self) -> Result<()> {
        if self.gate.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "gate.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.engine.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.gate.name.trim().is_empty() {
            return Err(ConfigError::Invalid("gate.name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Write a default config unless one already exists
pub async fn init_at(path: &Path) -> Result<Config> {
    if path.exists() {
        warn!("◆ CONFIG ALREADY PRESENT AT {:?}", path);
    } else {
        Config::default().save_to(path).await?;
        info!("◆ CONFIG ESTABLISHED AT {:?}", path);
    }
    Config::load_from(path).await
}

pub async fn init() -> Result<Config> {
    init_at(&config_path()).await
}
