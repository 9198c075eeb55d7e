mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    rampart_runtime::init_logging();

    let cli = Cli::parse();

    // Init does not need a config
    if let Commands::Init { path } = &cli.command {
        return commands::init::run_init(path);
    }

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Serve { host, port } => {
            commands::serve::execute(host, port, &config).await?;
        }
        Commands::Chat { session, profile } => {
            commands::chat::execute(session, profile, &config).await?;
        }
        Commands::Tools => {
            commands::tools::execute(&config)?;
        }
    }

    Ok(())
}
