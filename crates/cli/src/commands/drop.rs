use anyhow::{Context, Result};
use clap::Args;
use stowage_core::StorageRegistry;
use tracing::info;

use crate::progress::create_spinner;

#[derive(Args)]
pub struct DropArgs {
    /// Storage alias from the configuration file
    #[arg(long)]
    alias: String,

    /// Remove the content first; succeed if the storage is already gone
    #[arg(short, long)]
    force: bool,
}

pub async fn run(registry: &StorageRegistry, args: DropArgs) -> Result<()> {
    let spinner = create_spinner(&format!("Dropping storage {}...", args.alias));
    let result = registry
        .drop_storage(args.alias.as_str(), args.force)
        .await
        .with_context(|| format!("failed to drop storage {}", args.alias));
    spinner.finish_and_clear();
    result?;

    info!(alias = %args.alias, force = args.force, "storage dropped");
    Ok(())
}
