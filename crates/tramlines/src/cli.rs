use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tramlines")]
#[command(about = "Tramlines - policy guardrails for MCP tool calls", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new config file
    Init {
        /// Path for new config file
        #[arg(default_value = "tramlines.toml")]
        path: PathBuf,
    },
    /// Compile policy files and report their rules
    Validate {
        /// Policy files (defaults to those listed in the config)
        policies: Vec<PathBuf>,
    },
    /// Replay recorded calls through the policy, one decision per call
    Simulate {
        /// JSON array of recorded calls
        #[arg(long)]
        calls: PathBuf,
        /// Policy file; repeatable (defaults to those listed in the config)
        #[arg(long = "policy")]
        policies: Vec<PathBuf>,
        /// Exit with an error if any call is blocked
        #[arg(long)]
        fail_on_block: bool,
    },
    /// Judge JSON-line requests from stdin, writing one decision per line
    Guard {
        /// Policy file; repeatable (defaults to those listed in the config)
        #[arg(long = "policy")]
        policies: Vec<PathBuf>,
    },
}
