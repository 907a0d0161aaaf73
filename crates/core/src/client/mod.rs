pub mod azure;
pub mod gcs;
pub mod local;

use std::pin::Pin;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use glob::{MatchOptions, Pattern};
use tracing::info;

use crate::error::{Error, Result};
use crate::storage::{Storage, StorageKind};

/// Lazily listed storage-relative file paths.
pub type FileStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Read-only access to the files of one storage.
#[async_trait]
pub trait StorageClient: Send + Sync {
    fn storage(&self) -> &Storage;

    async fn last_modification_timestamp(&self, path: &str) -> Result<DateTime<Utc>>;

    /// Files matching a glob pattern relative to the storage root.
    ///
    /// `*` stays within one path segment, `**` crosses segments. Each call
    /// starts a fresh listing.
    fn iterate_files<'a>(&'a self, pattern: &'a str) -> FileStream<'a>;
}

/// Environment variable forcing the GCS client implementation (`api` or `shell`).
pub const GCS_CLIENT_ENV: &str = "STOWAGE_GCS_CLIENT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcsClientKind {
    /// In-process JSON API client.
    Api,
    /// `gsutil` subprocesses.
    Shell,
}

static GCS_CLIENT_KIND: OnceLock<GcsClientKind> = OnceLock::new();

/// The GCS implementation used by [`init_client`].
///
/// Chosen on first call and fixed for the life of the process: the API client
/// when it is compiled in, `gsutil` otherwise. `STOWAGE_GCS_CLIENT` overrides
/// the choice if read before the first GCS client is built.
pub fn gcs_client_kind() -> GcsClientKind {
    *GCS_CLIENT_KIND.get_or_init(|| {
        let kind = match std::env::var(GCS_CLIENT_ENV).as_deref() {
            Ok("shell") => GcsClientKind::Shell,
            _ if cfg!(feature = "gcs-api") => GcsClientKind::Api,
            _ => GcsClientKind::Shell,
        };
        info!(?kind, "selected gcs client");
        kind
    })
}

/// Builds the client for a storage.
pub fn init_client(storage: &Storage) -> Result<Box<dyn StorageClient>> {
    let client: Box<dyn StorageClient> = match storage {
        Storage::Local(local) => Box::new(local::LocalClient::new(local.clone())),
        Storage::GoogleCloud(gcs) => match gcs_client_kind() {
            #[cfg(feature = "gcs-api")]
            GcsClientKind::Api => Box::new(gcs::GcsApiClient::new(gcs.clone())),
            _ => Box::new(gcs::GcsShellClient::new(gcs.clone())),
        },
        Storage::Azure(azure) => Box::new(azure::AzureClient::new(azure.clone())),
        Storage::Sftp(_) => return Err(Error::unsupported("storage client", StorageKind::Sftp)),
    };
    Ok(client)
}

/// A glob pattern split into the literal prefix used for listing and the matcher.
#[derive(Debug, Clone)]
pub struct FilePattern {
    prefix: String,
    pattern: Pattern,
}

pub(crate) const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl FilePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim_start_matches('/');
        let prefix = match pattern.find(['*', '?', '[']) {
            Some(index) => &pattern[..index],
            None => pattern,
        };
        let compiled = Pattern::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("invalid file pattern {pattern:?}: {e}")))?;
        Ok(Self {
            prefix: prefix.to_string(),
            pattern: compiled,
        })
    }

    /// Everything before the first wildcard.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches_with(path, MATCH_OPTIONS)
    }
}
