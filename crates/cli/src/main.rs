mod commands;
mod config;
mod progress;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stowage",
    version,
    about = "Create and remove configured storages"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Configuration file (default: $STOWAGE_CONFIG or the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let registry = config::open_registry(cli.config)?;

    match cli.command {
        commands::Command::EnsureStorage(args) => commands::ensure::run(&registry, args).await,
        commands::Command::DropStorage(args) => commands::drop::run(&registry, args).await,
    }
}
