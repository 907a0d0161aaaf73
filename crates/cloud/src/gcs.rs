use std::time::Duration;

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::auth::{AuthProvider, GCS_SCOPE, ServiceAccountKey, TokenGrant};
use crate::error::{CloudError, Result};

const GCS_BASE: &str = "https://storage.googleapis.com/storage/v1";

/// Object names are a single path segment in the JSON API, so `/` is encoded too.
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectMeta>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectMeta>,
    pub next_page_token: Option<String>,
}

/// Google Cloud Storage JSON API client bound to one bucket.
#[derive(Clone)]
pub struct GcsClient {
    http: reqwest::Client,
    bucket: String,
    auth: AuthProvider,
}

impl GcsClient {
    pub fn new(bucket: &str, key: ServiceAccountKey) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        let auth = AuthProvider::new(TokenGrant::ServiceAccount {
            key,
            scope: GCS_SCOPE.to_string(),
        });
        Ok(Self {
            http,
            bucket: bucket.to_string(),
            auth,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn get_object(&self, name: &str) -> Result<ObjectMeta> {
        let url = format!(
            "{GCS_BASE}/b/{}/o/{}",
            self.bucket,
            utf8_percent_encode(name, OBJECT_NAME)
        );
        let token = self.auth.get_token().await?;
        let resp = self.http.get(&url).bearer_auth(&token).send().await?;
        let status = resp.status();
        debug!(url = %url, status = %status, "gcs request");

        if status == StatusCode::NOT_FOUND {
            return Err(CloudError::NotFound(format!("gs://{}/{name}", self.bucket)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Status {
                method: "GET".into(),
                url,
                status,
                body,
            });
        }
        resp.json()
            .await
            .map_err(|e| CloudError::Decode(format!("object metadata: {e}")))
    }

    /// One page of objects whose names start with `prefix`.
    pub async fn list_objects(&self, prefix: &str, page_token: Option<&str>) -> Result<ObjectPage> {
        let url = format!("{GCS_BASE}/b/{}/o", self.bucket);
        let mut query = vec![("fields", "items(name,updated),nextPageToken")];
        if !prefix.is_empty() {
            query.push(("prefix", prefix));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let token = self.auth.get_token().await?;
        let resp = self
            .http
            .get(&url)
            .query(&query)
            .bearer_auth(&token)
            .send()
            .await?;
        let status = resp.status();
        debug!(url = %url, prefix, status = %status, "gcs list");

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Status {
                method: "GET".into(),
                url,
                status,
                body,
            });
        }
        let list: ObjectList = resp
            .json()
            .await
            .map_err(|e| CloudError::Decode(format!("object listing: {e}")))?;
        Ok(ObjectPage {
            objects: list.items,
            next_page_token: list.next_page_token,
        })
    }
}
