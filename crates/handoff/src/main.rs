//! handoff - gated output submission for tool-using agents

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

mod commands;

use commands::{describe_command, init_command, replay_command, ReplayOptions};

/// handoff - run agents whose final answer must pass an output gate
#[derive(Parser)]
#[command(name = "handoff")]
#[command(about = "◆ Gated output submission for tool-using agents")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Config file location (defaults to ~/.handoff/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the agent and gate tool descriptors as JSON
    Describe {
        /// Field the final result must carry (repeatable)
        #[arg(short, long, default_value = "answer")]
        require: Vec<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Replay a recorded model transcript through a gated agent
    Replay {
        /// JSON array of model responses
        #[arg(short, long)]
        script: PathBuf,
        /// Task handed to the agent
        #[arg(short = 'm', long, default_value = "")]
        input: String,
        /// Submission attempts allowed for the gate
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Field the final result must carry (repeatable)
        #[arg(short, long, default_value = "answer")]
        require: Vec<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only command output
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Init { config } => {
            if let Err(e) = init_command(config).await {
                error!("Init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Describe { require, config } => {
            if let Err(e) = describe_command(require, config).await {
                error!("Describe failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Replay {
            script,
            input,
            max_iterations,
            require,
            config,
        } => {
            let options = ReplayOptions {
                script,
                input,
                max_iterations,
                require,
                config,
                verbose: cli.verbose,
            };
            if let Err(e) = replay_command(options).await {
                error!("Replay failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}
