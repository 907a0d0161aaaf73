use std::path::PathBuf;

use anyhow::{Result, bail};
use stowage_core::{ConfigFile, StorageRegistry};
use tracing::debug;

const CONFIG_FILE: &str = "stowage.toml";
const CONFIG_ENV: &str = "STOWAGE_CONFIG";

/// `--config`, then `$STOWAGE_CONFIG`, then `<config dir>/stowage/stowage.toml`.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stowage")
        .join(CONFIG_FILE)
}

pub fn open_registry(explicit: Option<PathBuf>) -> Result<StorageRegistry> {
    let path = config_path(explicit);
    if !path.is_file() {
        bail!("config not found at {}", path.display());
    }
    debug!(path = %path.display(), "using configuration");
    Ok(StorageRegistry::new(ConfigFile::new(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let path = PathBuf::from("/etc/stowage/custom.toml");
        assert_eq!(config_path(Some(path.clone())), path);
    }

    #[test]
    fn default_path_ends_with_file_name() {
        assert!(default_config_path().ends_with("stowage/stowage.toml"));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = open_registry(Some(missing)).err().unwrap();
        assert!(err.to_string().contains("nope.toml"));
    }
}
