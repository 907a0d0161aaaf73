use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::{
    AzureStorage, AzureStorageType, GoogleCloudStorage, LocalStorage, MASK, SftpStorage, Storage,
};

/// One storage definition as written in the configuration file.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    #[serde(rename = "local")]
    Local { path: PathBuf },
    #[serde(rename = "sftp")]
    Sftp {
        host: String,
        port: Option<u16>,
        user: Option<String>,
        password: Option<String>,
        #[serde(default)]
        insecure: bool,
        identity_file: Option<PathBuf>,
        public_identity_file: Option<PathBuf>,
    },
    #[serde(rename = "gcs")]
    GoogleCloud {
        bucket_name: String,
        project_id: Option<String>,
        location: Option<String>,
        service_account_file: Option<PathBuf>,
        service_account_info: Option<serde_json::Value>,
    },
    #[serde(rename = "azure")]
    Azure {
        account_name: String,
        container_name: String,
        #[serde(default)]
        storage_type: AzureStorageType,
        sas: Option<String>,
        account_key: Option<String>,
        spa_tenant: Option<String>,
        spa_application: Option<String>,
        spa_client_secret: Option<String>,
    },
}

fn masked<T>(value: &Option<T>) -> Option<&'static str> {
    value.as_ref().map(|_| MASK)
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageConfig::Local { path } => f.debug_struct("Local").field("path", path).finish(),
            StorageConfig::Sftp {
                host,
                port,
                user,
                password,
                insecure,
                identity_file,
                public_identity_file,
            } => f
                .debug_struct("Sftp")
                .field("host", host)
                .field("port", port)
                .field("user", user)
                .field("password", &masked(password))
                .field("insecure", insecure)
                .field("identity_file", identity_file)
                .field("public_identity_file", public_identity_file)
                .finish(),
            StorageConfig::GoogleCloud {
                bucket_name,
                project_id,
                location,
                service_account_file,
                service_account_info,
            } => f
                .debug_struct("GoogleCloud")
                .field("bucket_name", bucket_name)
                .field("project_id", project_id)
                .field("location", location)
                .field("service_account_file", service_account_file)
                .field("service_account_info", &masked(service_account_info))
                .finish(),
            StorageConfig::Azure {
                account_name,
                container_name,
                storage_type,
                sas,
                account_key,
                spa_tenant,
                spa_application,
                spa_client_secret,
            } => f
                .debug_struct("Azure")
                .field("account_name", account_name)
                .field("container_name", container_name)
                .field("storage_type", storage_type)
                .field("sas", &masked(sas))
                .field("account_key", &masked(account_key))
                .field("spa_tenant", spa_tenant)
                .field("spa_application", spa_application)
                .field("spa_client_secret", &masked(spa_client_secret))
                .finish(),
        }
    }
}

impl TryFrom<StorageConfig> for Storage {
    type Error = Error;

    fn try_from(config: StorageConfig) -> Result<Self> {
        let storage = match config {
            StorageConfig::Local { path } => LocalStorage::new(path).into(),
            StorageConfig::Sftp {
                host,
                port,
                user,
                password,
                insecure,
                identity_file,
                public_identity_file,
            } => {
                let mut sftp = SftpStorage::new(host).insecure(insecure);
                if let Some(port) = port {
                    sftp = sftp.with_port(port);
                }
                if let Some(user) = user {
                    sftp = sftp.with_user(user);
                }
                if let Some(password) = password {
                    sftp = sftp.with_password(password);
                }
                if let Some(path) = identity_file {
                    sftp = sftp.with_identity_file(path);
                }
                if let Some(path) = public_identity_file {
                    sftp = sftp.with_public_identity_file(path);
                }
                sftp.into()
            }
            StorageConfig::GoogleCloud {
                bucket_name,
                project_id,
                location,
                service_account_file,
                service_account_info,
            } => {
                let mut gcs = GoogleCloudStorage::new(bucket_name);
                if let Some(project_id) = project_id {
                    gcs = gcs.with_project_id(project_id);
                }
                if let Some(location) = location {
                    gcs = gcs.with_location(location);
                }
                if let Some(path) = service_account_file {
                    gcs = gcs.with_service_account_file(path);
                }
                if let Some(info) = service_account_info {
                    gcs = gcs.with_service_account_info(info);
                }
                gcs.into()
            }
            StorageConfig::Azure {
                account_name,
                container_name,
                storage_type,
                sas,
                account_key,
                spa_tenant,
                spa_application,
                spa_client_secret,
            } => {
                let mut builder =
                    AzureStorage::builder(account_name, container_name).storage_type(storage_type);
                if let Some(sas) = sas {
                    builder = builder.sas(sas);
                }
                if let Some(key) = account_key {
                    builder = builder.account_key(key);
                }
                if let Some(tenant) = spa_tenant {
                    builder = builder.spa_tenant(tenant);
                }
                if let Some(application) = spa_application {
                    builder = builder.spa_application(application);
                }
                if let Some(secret) = spa_client_secret {
                    builder = builder.spa_client_secret(secret);
                }
                builder.build()?.into()
            }
        };
        Ok(storage)
    }
}

/// The `[storages.<alias>]` tables of a configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoragesConfig {
    #[serde(default)]
    pub storages: HashMap<String, StorageConfig>,
}

impl StoragesConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageKind;

    const SAMPLE: &str = r#"
        [storages.data]
        type = "local"
        path = "/var/data"

        [storages.drop]
        type = "sftp"
        host = "files.example.com"
        user = "etl"
        password = "hunter2"
        insecure = true

        [storages.lake]
        type = "gcs"
        bucket_name = "lake"
        location = "EU"

        [storages.raw]
        type = "azure"
        account_name = "acct"
        container_name = "raw"
        storage_type = "dfs"
        sas = "?sv=2022&sig=abc"
    "#;

    #[test]
    fn parses_every_storage_type() {
        let config = StoragesConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.storages.len(), 4);

        let kinds: HashMap<String, StorageKind> = config
            .storages
            .into_iter()
            .map(|(alias, c)| (alias, Storage::try_from(c).unwrap().kind()))
            .collect();
        assert_eq!(kinds["data"], StorageKind::Local);
        assert_eq!(kinds["drop"], StorageKind::Sftp);
        assert_eq!(kinds["lake"], StorageKind::GoogleCloud);
        assert_eq!(kinds["raw"], StorageKind::Azure);
    }

    #[test]
    fn azure_definition_keeps_type_and_strips_sas_prefix() {
        let mut config = StoragesConfig::from_toml_str(SAMPLE).unwrap();
        let storage = Storage::try_from(config.storages.remove("raw").unwrap()).unwrap();
        let Storage::Azure(azure) = storage else {
            panic!("expected azure storage");
        };
        assert_eq!(azure.storage_type(), AzureStorageType::Dfs);
        assert_eq!(azure.sas(), Some("sv=2022&sig=abc"));
    }

    #[test]
    fn azure_without_credentials_is_rejected() {
        let config = StoragesConfig::from_toml_str(
            r#"
            [storages.bad]
            type = "azure"
            account_name = "acct"
            container_name = "raw"
            "#,
        )
        .unwrap();
        let err = Storage::try_from(config.storages["bad"].clone()).unwrap_err();
        assert!(matches!(err, Error::MissingCredentials(_)));
    }

    #[test]
    fn unknown_type_is_a_config_error() {
        let err = StoragesConfig::from_toml_str("[storages.x]\ntype = \"ftp\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoragesConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn debug_output_masks_secrets() {
        let config = StoragesConfig::from_toml_str(SAMPLE).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("files.example.com"));
        assert!(debug.contains("password: Some(\"*****\")"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("sig=abc"));
    }
}
