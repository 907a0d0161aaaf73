use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{TryStreamExt, future, stream};
use stowage_cloud::auth::AZURE_STORAGE_SCOPE;
use stowage_cloud::{AuthProvider, BlobAuth, BlobClient, CloudError, TokenGrant};
use tokio::sync::OnceCell;

use super::{FilePattern, FileStream, StorageClient};
use crate::error::{Error, Result};
use crate::storage::{AzureStorage, Storage};

/// Blob service client for a container, authenticated with the first
/// available credential: SAS, account key, then service principal.
pub(crate) fn blob_client(azure: &AzureStorage) -> Result<BlobClient> {
    let auth = if let Some(sas) = azure.sas() {
        BlobAuth::Sas(sas.to_string())
    } else if let Some(key) = azure.account_key() {
        BlobAuth::SharedKey(key.to_string())
    } else if let Some(spn) = azure.service_principal() {
        BlobAuth::Bearer(AuthProvider::new(TokenGrant::ClientCredentials {
            tenant_id: spn.tenant_id.clone(),
            client_id: spn.application_id.clone(),
            client_secret: spn.client_secret.clone(),
            scope: AZURE_STORAGE_SCOPE.to_string(),
        }))
    } else {
        return Err(Error::MissingCredentials(format!(
            "Azure container {} has no credentials",
            azure.container_name()
        )));
    };
    Ok(BlobClient::new(azure.account_name(), azure.container_name(), auth)?)
}

/// Azure client over the Blob service REST API.
pub struct AzureClient {
    storage: Storage,
    azure: AzureStorage,
    client: OnceCell<BlobClient>,
}

impl AzureClient {
    pub fn new(azure: AzureStorage) -> Self {
        Self {
            storage: Storage::Azure(azure.clone()),
            azure,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&BlobClient> {
        self.client
            .get_or_try_init(|| async { blob_client(&self.azure) })
            .await
    }
}

#[async_trait]
impl StorageClient for AzureClient {
    fn storage(&self) -> &Storage {
        &self.storage
    }

    async fn last_modification_timestamp(&self, path: &str) -> Result<DateTime<Utc>> {
        match self.client().await?.last_modified(path).await {
            Ok(time) => Ok(time),
            Err(CloudError::NotFound(what)) => Err(Error::NotFound(what)),
            Err(e) => Err(e.into()),
        }
    }

    fn iterate_files<'a>(&'a self, pattern: &'a str) -> FileStream<'a> {
        let pattern = match FilePattern::new(pattern) {
            Ok(pattern) => pattern,
            Err(e) => return Box::pin(stream::once(future::ready(Err(e)))),
        };
        let prefix = pattern.prefix().to_string();

        // `Some(marker)` is the next page to fetch; `None` ends the listing.
        let pages = stream::try_unfold(Some(None::<String>), move |cursor| {
            let prefix = prefix.clone();
            async move {
                let Some(marker) = cursor else {
                    return Ok(None);
                };
                let page = self
                    .client()
                    .await?
                    .list_blobs(&prefix, marker.as_deref(), None)
                    .await?;
                let names: Vec<String> = page.blobs.into_iter().map(|b| b.name).collect();
                let next = page.next_marker.filter(|m| !m.is_empty()).map(Some);
                Ok::<_, Error>(Some((names, next)))
            }
        });

        Box::pin(
            pages
                .map_ok(|names| stream::iter(names.into_iter().map(Ok)))
                .try_flatten()
                .try_filter(move |name| future::ready(pattern.matches(name))),
        )
    }
}
