use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::client::{StorageClient, init_client};
use crate::compression::Compression;
use crate::config::{StorageConfig, StoragesConfig};
use crate::error::{Error, Result};
use crate::shell::{self, DeleteOptions, ShellCommand};
use crate::storage::Storage;
use crate::{info, manage};

/// Supplies storage definitions by alias.
pub trait StorageSource: Send + Sync {
    fn storage_config(&self, alias: &str) -> Result<Option<StorageConfig>>;
}

impl StorageSource for HashMap<String, StorageConfig> {
    fn storage_config(&self, alias: &str) -> Result<Option<StorageConfig>> {
        Ok(self.get(alias).cloned())
    }
}

impl StorageSource for StoragesConfig {
    fn storage_config(&self, alias: &str) -> Result<Option<StorageConfig>> {
        self.storages.storage_config(alias)
    }
}

/// A TOML configuration file, read again on every lookup.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl StorageSource for ConfigFile {
    fn storage_config(&self, alias: &str) -> Result<Option<StorageConfig>> {
        let mut config = StoragesConfig::load(&self.path)?;
        Ok(config.storages.remove(alias))
    }
}

/// Either an alias to resolve or a storage value used as is.
#[derive(Debug, Clone, Copy)]
pub enum StorageRef<'a> {
    Alias(&'a str),
    Storage(&'a Storage),
}

impl<'a> From<&'a str> for StorageRef<'a> {
    fn from(alias: &'a str) -> Self {
        StorageRef::Alias(alias)
    }
}

impl<'a> From<&'a String> for StorageRef<'a> {
    fn from(alias: &'a String) -> Self {
        StorageRef::Alias(alias)
    }
}

impl<'a> From<&'a Storage> for StorageRef<'a> {
    fn from(storage: &'a Storage) -> Self {
        StorageRef::Storage(storage)
    }
}

pub struct StorageRegistry {
    source: Box<dyn StorageSource>,
    resolved: RwLock<HashMap<String, Arc<Storage>>>,
}

impl StorageRegistry {
    pub fn new(source: impl StorageSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with no aliases; only direct storage values can be used.
    pub fn empty() -> Self {
        Self::new(HashMap::<String, StorageConfig>::new())
    }

    /// The storage configured under `alias`, memoized after the first lookup.
    pub fn resolve(&self, alias: &str) -> Result<Arc<Storage>> {
        if let Some(storage) = self
            .resolved
            .read()
            .map_err(|_| Error::Config("storage registry lock poisoned".into()))?
            .get(alias)
        {
            debug!(alias, "storage alias cache hit");
            return Ok(Arc::clone(storage));
        }

        let config = self
            .source
            .storage_config(alias)?
            .ok_or_else(|| Error::NotConfigured(alias.to_string()))?;
        let storage = Arc::new(Storage::try_from(config)?);
        debug!(alias, kind = %storage.kind(), "storage alias resolved");

        let mut resolved = self
            .resolved
            .write()
            .map_err(|_| Error::Config("storage registry lock poisoned".into()))?;
        Ok(Arc::clone(resolved.entry(alias.to_string()).or_insert(storage)))
    }

    /// The storage behind a reference.
    pub fn lookup<'a>(&self, storage: impl Into<StorageRef<'a>>) -> Result<Arc<Storage>> {
        match storage.into() {
            StorageRef::Alias(alias) => self.resolve(alias),
            StorageRef::Storage(storage) => Ok(Arc::new(storage.clone())),
        }
    }

    pub fn client<'a>(&self, storage: impl Into<StorageRef<'a>>) -> Result<Box<dyn StorageClient>> {
        init_client(self.lookup(storage)?.as_ref())
    }

    pub fn read_file_command<'a>(
        &self,
        storage: impl Into<StorageRef<'a>>,
        path: &str,
        compression: Compression,
    ) -> Result<ShellCommand> {
        shell::read_file_command(self.lookup(storage)?.as_ref(), path, compression)
    }

    pub fn write_file_command<'a>(
        &self,
        storage: impl Into<StorageRef<'a>>,
        path: &str,
        compression: Compression,
    ) -> Result<ShellCommand> {
        shell::write_file_command(self.lookup(storage)?.as_ref(), path, compression)
    }

    pub fn delete_file_command<'a>(
        &self,
        storage: impl Into<StorageRef<'a>>,
        path: &str,
        options: DeleteOptions,
    ) -> Result<ShellCommand> {
        shell::delete_file_command(self.lookup(storage)?.as_ref(), path, options)
    }

    pub fn move_file_command<'a>(
        &self,
        storage: impl Into<StorageRef<'a>>,
        source: &str,
        target: &str,
    ) -> Result<ShellCommand> {
        shell::move_file_command(self.lookup(storage)?.as_ref(), source, target)
    }

    pub async fn ensure_storage<'a>(&self, storage: impl Into<StorageRef<'a>>) -> Result<()> {
        manage::ensure_storage(self.lookup(storage)?.as_ref()).await
    }

    pub async fn drop_storage<'a>(
        &self,
        storage: impl Into<StorageRef<'a>>,
        force: bool,
    ) -> Result<()> {
        manage::drop_storage(self.lookup(storage)?.as_ref(), force).await
    }

    pub async fn file_exists<'a>(
        &self,
        storage: impl Into<StorageRef<'a>>,
        path: &str,
    ) -> Result<bool> {
        info::file_exists(self.lookup(storage)?.as_ref(), path).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::storage::{LocalStorage, StorageKind};

    struct CountingSource {
        lookups: Arc<AtomicUsize>,
    }

    impl StorageSource for CountingSource {
        fn storage_config(&self, alias: &str) -> Result<Option<StorageConfig>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(Some(StorageConfig::Local {
                path: PathBuf::from("/srv").join(alias),
            }))
        }
    }

    fn alias() -> String {
        format!("alias-{}", uuid::Uuid::new_v4())
    }

    #[test]
    fn unknown_alias_is_not_configured() {
        let registry = StorageRegistry::empty();
        let name = alias();
        match registry.resolve(&name).unwrap_err() {
            Error::NotConfigured(missing) => assert_eq!(missing, name),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolution_is_memoized() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let registry = StorageRegistry::new(CountingSource {
            lookups: Arc::clone(&lookups),
        });
        let name = alias();

        let first = registry.resolve(&name).unwrap();
        let second = registry.resolve(&name).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(lookups.load(Ordering::SeqCst), 1);

        registry.resolve(&alias()).unwrap();
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn config_file_changes_after_resolution_are_not_observed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stowage.toml");
        let name = alias();
        let first = format!("[storages.{name}]\ntype = \"local\"\npath = \"/first\"\n");
        std::fs::write(&path, first).unwrap();

        let registry = StorageRegistry::new(ConfigFile::new(&path));
        let first = registry.resolve(&name).unwrap();

        let second = format!("[storages.{name}]\ntype = \"local\"\npath = \"/second\"\n");
        std::fs::write(&path, second).unwrap();
        let second = registry.resolve(&name).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.as_ref(), &Storage::Local(LocalStorage::new("/first")));
    }

    #[test]
    fn commands_accept_alias_or_storage() {
        let name = alias();
        let mut configs = HashMap::new();
        configs.insert(
            name.clone(),
            StorageConfig::Local {
                path: PathBuf::from("/srv/data"),
            },
        );
        let registry = StorageRegistry::new(configs);

        let by_alias = registry
            .read_file_command(name.as_str(), "a.csv", Compression::None)
            .unwrap();
        let storage: Storage = LocalStorage::new("/srv/data").into();
        let by_value = registry
            .read_file_command(&storage, "a.csv", Compression::None)
            .unwrap();
        assert_eq!(by_alias, by_value);
        assert_eq!(registry.lookup(&name).unwrap().kind(), StorageKind::Local);
    }

    #[tokio::test]
    async fn every_operation_resolves_an_alias() {
        let dir = tempfile::tempdir().unwrap();
        let name = alias();
        let mut configs = HashMap::new();
        configs.insert(
            name.clone(),
            StorageConfig::Local {
                path: dir.path().join("store"),
            },
        );
        let registry = StorageRegistry::new(configs);
        let alias = name.as_str();

        registry.ensure_storage(alias).await.unwrap();
        std::fs::write(dir.path().join("store/a.csv"), b"x").unwrap();
        assert!(registry.file_exists(alias, "a.csv").await.unwrap());
        assert_eq!(registry.client(alias).unwrap().storage().kind(), StorageKind::Local);

        let write = registry.write_file_command(alias, "b.csv", Compression::Gzip).unwrap();
        assert!(write.script().ends_with("/store/b.csv"));
        let delete = registry
            .delete_file_command(alias, "a.csv", DeleteOptions::default())
            .unwrap();
        assert!(delete.script().starts_with("rm -f "));
        let rename = registry.move_file_command(alias, "a.csv", "b.csv").unwrap();
        assert!(rename.script().starts_with("test -e "));

        assert!(matches!(
            registry.drop_storage(alias, false).await,
            Err(Error::NotEmpty(_))
        ));
        registry.drop_storage(alias, true).await.unwrap();
        assert!(!dir.path().join("store").exists());
    }
}
