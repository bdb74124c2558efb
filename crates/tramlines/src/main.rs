mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tramlines_guardrail::init_logging();

    let cli = Cli::parse();

    // Init runs before a config exists
    if let Commands::Init { path } = &cli.command {
        return commands::init::run_init(path);
    }

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Validate { policies } => {
            commands::validate::execute(&policies, &config)?;
        }
        Commands::Simulate {
            calls,
            policies,
            fail_on_block,
        } => {
            commands::simulate::execute(&calls, &policies, fail_on_block, &config)?;
        }
        Commands::Guard { policies } => {
            commands::guard::execute(&policies, &config).await?;
        }
    }

    Ok(())
}
