use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub(crate) const MASK: &str = "*****";

/// Characters left unencoded in URL paths built for storages.
const URL_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

pub(crate) fn encode_url_path(path: &str) -> String {
    utf8_percent_encode(path, URL_PATH).to_string()
}

/// A configured storage. Each variant is immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Local(LocalStorage),
    Sftp(SftpStorage),
    GoogleCloud(GoogleCloudStorage),
    Azure(AzureStorage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Local,
    Sftp,
    GoogleCloud,
    Azure,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageKind::Local => "local",
            StorageKind::Sftp => "sftp",
            StorageKind::GoogleCloud => "gcs",
            StorageKind::Azure => "azure",
        })
    }
}

impl Storage {
    pub fn kind(&self) -> StorageKind {
        match self {
            Storage::Local(_) => StorageKind::Local,
            Storage::Sftp(_) => StorageKind::Sftp,
            Storage::GoogleCloud(_) => StorageKind::GoogleCloud,
            Storage::Azure(_) => StorageKind::Azure,
        }
    }
}

impl From<LocalStorage> for Storage {
    fn from(storage: LocalStorage) -> Self {
        Storage::Local(storage)
    }
}

impl From<SftpStorage> for Storage {
    fn from(storage: SftpStorage) -> Self {
        Storage::Sftp(storage)
    }
}

impl From<GoogleCloudStorage> for Storage {
    fn from(storage: GoogleCloudStorage) -> Self {
        Storage::GoogleCloud(storage)
    }
}

impl From<AzureStorage> for Storage {
    fn from(storage: AzureStorage) -> Self {
        Storage::Azure(storage)
    }
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

/// A directory on the local filesystem; paths are relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The base path made absolute against the current directory.
    pub fn absolute_base_path(&self) -> PathBuf {
        std::path::absolute(&self.base_path).unwrap_or_else(|_| self.base_path.clone())
    }

    /// Absolute path of a file inside the storage.
    pub fn full_path(&self, path: &str) -> PathBuf {
        self.absolute_base_path().join(path.trim_start_matches('/'))
    }
}

// ---------------------------------------------------------------------------
// SFTP
// ---------------------------------------------------------------------------

pub const DEFAULT_SFTP_PORT: u16 = 22;

#[derive(Clone, PartialEq, Eq)]
pub struct SftpStorage {
    host: String,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    insecure: bool,
    identity_file: Option<PathBuf>,
    public_identity_file: Option<PathBuf>,
}

impl SftpStorage {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: None,
            password: None,
            insecure: false,
            identity_file: None,
            public_identity_file: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Skip the known_hosts check.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn with_public_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_identity_file = Some(path.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SFTP_PORT)
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    pub fn identity_file(&self) -> Option<&Path> {
        self.identity_file.as_deref()
    }

    pub fn public_identity_file(&self) -> Option<&Path> {
        self.public_identity_file.as_deref()
    }

    pub fn base_url(&self) -> String {
        format!("sftp://{}:{}", self.host, self.port())
    }

    /// URL of a file on the server, path percent-encoded.
    pub fn build_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url(),
            encode_url_path(path.trim_start_matches('/'))
        )
    }
}

impl fmt::Debug for SftpStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpStorage")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| MASK))
            .field("insecure", &self.insecure)
            .field("identity_file", &self.identity_file)
            .field("public_identity_file", &self.public_identity_file)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Google Cloud Storage
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq)]
pub struct GoogleCloudStorage {
    bucket_name: String,
    project_id: Option<String>,
    location: Option<String>,
    service_account_file: Option<PathBuf>,
    service_account_info: Option<serde_json::Value>,
}

impl GoogleCloudStorage {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            project_id: None,
            location: None,
            service_account_file: None,
            service_account_info: None,
        }
    }

    /// Project used when creating the bucket.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Location used when creating the bucket.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Service account key file; takes precedence over inline info.
    pub fn with_service_account_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.service_account_file = Some(path.into());
        self
    }

    /// Parsed content of a service account key file.
    pub fn with_service_account_info(mut self, info: serde_json::Value) -> Self {
        self.service_account_info = Some(info);
        self
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn service_account_file(&self) -> Option<&Path> {
        self.service_account_file.as_deref()
    }

    pub fn service_account_info(&self) -> Option<&serde_json::Value> {
        self.service_account_info.as_ref()
    }

    pub fn base_uri(&self) -> String {
        format!("gs://{}", self.bucket_name)
    }

    pub fn build_uri(&self, path: &str) -> String {
        format!("{}/{}", self.base_uri(), path.trim_start_matches('/'))
    }
}

impl fmt::Debug for GoogleCloudStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCloudStorage")
            .field("bucket_name", &self.bucket_name)
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("service_account_file", &self.service_account_file)
            .field(
                "service_account_info",
                &self.service_account_info.as_ref().map(|_| MASK),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Azure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AzureStorageType {
    #[default]
    Blob,
    Dfs,
}

impl AzureStorageType {
    pub fn as_str(self) -> &'static str {
        match self {
            AzureStorageType::Blob => "blob",
            AzureStorageType::Dfs => "dfs",
        }
    }
}

impl FromStr for AzureStorageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(AzureStorageType::Blob),
            "dfs" => Ok(AzureStorageType::Dfs),
            other => Err(Error::InvalidArgument(format!(
                "unknown Azure storage type \"{other}\" (expected blob or dfs)"
            ))),
        }
    }
}

/// Service principal credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ServicePrincipal {
    pub tenant_id: String,
    pub application_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("tenant_id", &self.tenant_id)
            .field("application_id", &self.application_id)
            .field("client_secret", &MASK)
            .finish()
    }
}

/// A container in an Azure storage account.
///
/// At least one credential form must be present: a SAS token, the account
/// key, or a service principal.
#[derive(Clone, PartialEq, Eq)]
pub struct AzureStorage {
    account_name: String,
    container_name: String,
    storage_type: AzureStorageType,
    sas: Option<String>,
    account_key: Option<String>,
    service_principal: Option<ServicePrincipal>,
}

#[derive(Debug, Clone, Default)]
pub struct AzureStorageBuilder {
    account_name: String,
    container_name: String,
    storage_type: AzureStorageType,
    sas: Option<String>,
    account_key: Option<String>,
    spa_tenant: Option<String>,
    spa_application: Option<String>,
    spa_client_secret: Option<String>,
}

impl AzureStorageBuilder {
    pub fn storage_type(mut self, storage_type: AzureStorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    pub fn sas(mut self, sas: impl Into<String>) -> Self {
        self.sas = Some(sas.into());
        self
    }

    pub fn account_key(mut self, account_key: impl Into<String>) -> Self {
        self.account_key = Some(account_key.into());
        self
    }

    pub fn spa_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.spa_tenant = Some(tenant.into());
        self
    }

    pub fn spa_application(mut self, application: impl Into<String>) -> Self {
        self.spa_application = Some(application.into());
        self
    }

    pub fn spa_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.spa_client_secret = Some(secret.into());
        self
    }

    pub fn build(self) -> Result<AzureStorage> {
        let sas = self
            .sas
            .map(|sas| sas.strip_prefix('?').map(str::to_string).unwrap_or(sas))
            .filter(|sas| !sas.is_empty());
        let account_key = self.account_key.filter(|key| !key.is_empty());

        let service_principal = match self.spa_client_secret {
            Some(client_secret) => match (self.spa_tenant, self.spa_application) {
                (Some(tenant_id), Some(application_id)) => Some(ServicePrincipal {
                    tenant_id,
                    application_id,
                    client_secret,
                }),
                _ => {
                    return Err(Error::MissingCredentials(
                        "spa_client_secret requires spa_tenant and spa_application".into(),
                    ));
                }
            },
            None => None,
        };

        if sas.is_none() && account_key.is_none() && service_principal.is_none() {
            return Err(Error::MissingCredentials(format!(
                "Azure storage {}/{} needs one of sas, account_key or spa_client_secret",
                self.account_name, self.container_name
            )));
        }

        Ok(AzureStorage {
            account_name: self.account_name,
            container_name: self.container_name,
            storage_type: self.storage_type,
            sas,
            account_key,
            service_principal,
        })
    }
}

impl AzureStorage {
    pub fn builder(
        account_name: impl Into<String>,
        container_name: impl Into<String>,
    ) -> AzureStorageBuilder {
        AzureStorageBuilder {
            account_name: account_name.into(),
            container_name: container_name.into(),
            ..Default::default()
        }
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn storage_type(&self) -> AzureStorageType {
        self.storage_type
    }

    /// SAS token without a leading `?`.
    pub fn sas(&self) -> Option<&str> {
        self.sas.as_deref()
    }

    pub fn account_key(&self) -> Option<&str> {
        self.account_key.as_deref()
    }

    pub fn service_principal(&self) -> Option<&ServicePrincipal> {
        self.service_principal.as_ref()
    }

    pub fn base_uri(&self) -> String {
        self.build_base_uri(None)
    }

    pub fn build_base_uri(&self, storage_type: Option<AzureStorageType>) -> String {
        format!(
            "https://{}.{}.core.windows.net/{}",
            self.account_name,
            storage_type.unwrap_or(self.storage_type).as_str(),
            self.container_name
        )
    }

    /// URI of a path in the container, without any credential query string.
    pub fn build_path_uri(
        &self,
        path: Option<&str>,
        storage_type: Option<AzureStorageType>,
    ) -> String {
        let base = self.build_base_uri(storage_type);
        match path {
            Some(path) if !path.is_empty() => {
                format!("{base}/{}", encode_url_path(path.trim_start_matches('/')))
            }
            _ => base,
        }
    }

    /// URI of a path in the container, with `?<sas>` appended when a SAS is configured.
    pub fn build_uri(&self, path: Option<&str>, storage_type: Option<AzureStorageType>) -> String {
        let uri = self.build_path_uri(path, storage_type);
        match &self.sas {
            Some(sas) => format!("{uri}?{sas}"),
            None => uri,
        }
    }

    pub fn connection_string(&self) -> String {
        match (&self.account_key, &self.sas) {
            (Some(key), _) => format!(
                "DefaultEndpointsProtocol=https;AccountName={};AccountKey={key}",
                self.account_name
            ),
            (None, sas) => format!(
                "DefaultEndpointsProtocol=https;BlobEndpoint=https://{}.{}.core.windows.net;SharedAccessSignature={}",
                self.account_name,
                self.storage_type.as_str(),
                sas.as_deref().unwrap_or_default()
            ),
        }
    }
}

impl fmt::Debug for AzureStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureStorage")
            .field("account_name", &self.account_name)
            .field("container_name", &self.container_name)
            .field("storage_type", &self.storage_type)
            .field("sas", &self.sas.as_ref().map(|_| MASK))
            .field("account_key", &self.account_key.as_ref().map(|_| MASK))
            .field("service_principal", &self.service_principal)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn azure_requires_a_credential() {
        let err = AzureStorage::builder("acct", "data").build().unwrap_err();
        assert!(matches!(err, Error::MissingCredentials(_)));
    }

    #[test]
    fn azure_strips_leading_question_mark_from_sas() {
        let storage = AzureStorage::builder("acct", "data")
            .sas("?sv=2022-11-02&sig=abc")
            .build()
            .unwrap();
        assert_eq!(storage.sas(), Some("sv=2022-11-02&sig=abc"));
        assert_eq!(
            storage.build_uri(Some("dir/file.csv"), None),
            "https://acct.blob.core.windows.net/data/dir/file.csv?sv=2022-11-02&sig=abc"
        );
    }

    #[test]
    fn azure_service_principal_needs_tenant_and_application() {
        let err = AzureStorage::builder("acct", "data")
            .spa_client_secret("s3cr3t")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredentials(_)));

        let storage = AzureStorage::builder("acct", "data")
            .spa_tenant("tenant")
            .spa_application("app")
            .spa_client_secret("s3cr3t")
            .storage_type(AzureStorageType::Dfs)
            .build()
            .unwrap();
        assert_eq!(storage.base_uri(), "https://acct.dfs.core.windows.net/data");
        assert!(!format!("{storage:?}").contains("s3cr3t"));
    }

    #[test]
    fn azure_connection_string_prefers_account_key() {
        let storage = AzureStorage::builder("acct", "data")
            .account_key("a2V5")
            .sas("sv=1")
            .build()
            .unwrap();
        assert_eq!(
            storage.connection_string(),
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5"
        );
    }

    #[test]
    fn sftp_port_defaults_to_22_and_password_is_masked() {
        let storage = SftpStorage::new("files.example.com")
            .with_user("etl")
            .with_password("hunter2");
        assert_eq!(storage.port(), 22);
        assert_eq!(storage.base_url(), "sftp://files.example.com:22");
        assert_eq!(
            storage.build_url("in box/a.csv"),
            "sftp://files.example.com:22/in%20box/a.csv"
        );
        assert!(!format!("{storage:?}").contains("hunter2"));
    }

    #[test]
    fn gcs_uris() {
        let storage = GoogleCloudStorage::new("lake");
        assert_eq!(storage.base_uri(), "gs://lake");
        assert_eq!(storage.build_uri("raw/x.json"), "gs://lake/raw/x.json");
    }

    #[test]
    fn local_full_path_is_absolute() {
        let storage = LocalStorage::new("relative/root");
        let path = storage.full_path("/a/b.txt");
        assert!(path.is_absolute());
        assert!(path.ends_with("relative/root/a/b.txt"));
    }

    #[test]
    fn storage_kind_display() {
        let storage: Storage = GoogleCloudStorage::new("b").into();
        assert_eq!(storage.kind().to_string(), "gcs");
    }
}
