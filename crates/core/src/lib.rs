pub mod client;
pub mod compression;
pub mod config;
pub mod error;
pub mod info;
pub mod manage;
pub mod process;
pub mod registry;
pub mod shell;
pub mod storage;
pub mod uri;

#[cfg(test)]
mod testing;

pub use client::{FilePattern, FileStream, GcsClientKind, StorageClient, init_client};
pub use compression::Compression;
pub use config::{StorageConfig, StoragesConfig};
pub use error::{Error, Result};
pub use registry::{ConfigFile, StorageRef, StorageRegistry, StorageSource};
pub use shell::{DeleteOptions, ShellCommand};
pub use storage::{
    AzureStorage, AzureStorageType, GoogleCloudStorage, LocalStorage, ServicePrincipal,
    SftpStorage, Storage, StorageKind,
};
