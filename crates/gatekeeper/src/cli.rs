use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(about = "Gatekeeper - guarded LLM agent runtime", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (defaults to ./gatekeeper.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config file
    Init {
        /// Path for new config file
        #[arg(default_value = "gatekeeper.toml")]
        path: PathBuf,
    },
    /// Start the HTTP gateway
    Serve {
        /// Host to bind to (overrides [server].host)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides [server].port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Interactive chat through the guardrails pipeline
    Chat {
        /// Resume existing session by ID
        #[arg(long)]
        session: Option<String>,
        /// Agent profile passed to the checking backend
        #[arg(long)]
        profile: Option<String>,
    },
    /// List registered tools and their policy verdicts
    Tools,
}
