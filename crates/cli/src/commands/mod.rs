pub mod drop;
pub mod ensure;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Create a storage unless it exists
    EnsureStorage(ensure::EnsureArgs),
    /// Remove a storage
    DropStorage(drop::DropArgs),
}
