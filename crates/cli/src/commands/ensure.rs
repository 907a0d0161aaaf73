use anyhow::{Context, Result};
use clap::Args;
use stowage_core::StorageRegistry;
use tracing::info;

use crate::progress::create_spinner;

#[derive(Args)]
pub struct EnsureArgs {
    /// Storage alias from the configuration file
    #[arg(long)]
    alias: String,
}

pub async fn run(registry: &StorageRegistry, args: EnsureArgs) -> Result<()> {
    let spinner = create_spinner(&format!("Ensuring storage {}...", args.alias));
    let result = registry
        .ensure_storage(args.alias.as_str())
        .await
        .with_context(|| format!("failed to ensure storage {}", args.alias));
    spinner.finish_and_clear();
    result?;

    info!(alias = %args.alias, "storage ensured");
    Ok(())
}
