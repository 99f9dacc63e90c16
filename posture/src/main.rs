// posture/src/main.rs

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Setup Logging (Tracing)
    // RUST_LOG=debug posture run ... pour voir les détails
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { project_dir, scope } => commands::run::execute(project_dir, scope).await,
        Commands::Validate { project_dir } => commands::validate::execute(project_dir),
        Commands::Datasets { project_dir } => commands::datasets::execute(project_dir),
        Commands::Results { project_dir, scope } => {
            commands::results::execute(project_dir, scope).await
        }
    }
}
