use std::time::Duration;

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::auth::AuthProvider;
use crate::error::{CloudError, Result};
use crate::redact_url;
use crate::shared_key;

const API_VERSION: &str = "2021-08-06";

/// Characters left as-is in a blob path; `/` keeps virtual directories intact.
const BLOB_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Percent-encodes a blob name for use in a URL path.
pub fn encode_blob_path(name: &str) -> String {
    utf8_percent_encode(name, BLOB_PATH).to_string()
}

/// Credentials for the Blob service REST API.
#[derive(Clone)]
pub enum BlobAuth {
    /// Shared access signature, without the leading `?`.
    Sas(String),
    /// Storage account key (base64).
    SharedKey(String),
    /// Bearer token for a service principal.
    Bearer(AuthProvider),
}

#[derive(Debug, Clone)]
pub struct BlobEntry {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct BlobPage {
    pub blobs: Vec<BlobEntry>,
    pub next_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: BlobList,
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    blob: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobItem {
    name: String,
    properties: BlobItemProperties,
}

#[derive(Debug, Deserialize)]
struct BlobItemProperties {
    #[serde(rename = "Last-Modified")]
    last_modified: String,
}

/// Client for one container of an Azure storage account.
#[derive(Clone)]
pub struct BlobClient {
    http: reqwest::Client,
    account_name: String,
    container_name: String,
    auth: BlobAuth,
}

impl BlobClient {
    pub fn new(account_name: &str, container_name: &str, auth: BlobAuth) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            account_name: account_name.to_string(),
            container_name: container_name.to_string(),
            auth,
        })
    }

    fn container_url(&self) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}",
            self.account_name, self.container_name
        )
    }

    fn blob_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.container_url(),
            encode_blob_path(name.trim_start_matches('/'))
        )
    }

    async fn send(&self, method: Method, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        let mut url = Url::parse(url).map_err(|e| CloudError::Decode(format!("invalid URL: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        if let BlobAuth::Sas(sas) = &self.auth {
            let combined = match url.query() {
                Some(existing) => format!("{existing}&{sas}"),
                None => sas.clone(),
            };
            url.set_query(Some(&combined));
        }

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION);

        match &self.auth {
            BlobAuth::Sas(_) => {}
            BlobAuth::SharedKey(account_key) => {
                let authorization = shared_key::authorization(
                    &self.account_name,
                    account_key,
                    method.as_str(),
                    &url,
                    &[("x-ms-date", date.as_str()), ("x-ms-version", API_VERSION)],
                )?;
                request = request.header("Authorization", authorization);
            }
            BlobAuth::Bearer(provider) => {
                request = request.bearer_auth(provider.get_token().await?);
            }
        }
        if method == Method::PUT {
            request = request.header("Content-Length", "0");
        }

        let response = request.send().await?;
        debug!(
            method = %method,
            url = %redact_url(url.as_str()),
            status = %response.status(),
            "azure request"
        );
        Ok(response)
    }

    async fn status_error(method: Method, url: &str, resp: Response) -> CloudError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        CloudError::Status {
            method: method.to_string(),
            url: redact_url(url).to_string(),
            status,
            body,
        }
    }

    /// HEAD on the blob; a clean 404 means absent.
    pub async fn blob_exists(&self, name: &str) -> Result<bool> {
        let url = self.blob_url(name);
        let resp = self.send(Method::HEAD, &url, &[]).await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::status_error(Method::HEAD, &url, resp).await),
        }
    }

    pub async fn last_modified(&self, name: &str) -> Result<DateTime<Utc>> {
        let url = self.blob_url(name);
        let resp = self.send(Method::HEAD, &url, &[]).await?;
        match resp.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(CloudError::NotFound(name.to_string())),
            _ => return Err(Self::status_error(Method::HEAD, &url, resp).await),
        }
        let header = resp
            .headers()
            .get("Last-Modified")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CloudError::Decode(format!("no Last-Modified header for {name}")))?;
        parse_http_date(header)
    }

    /// One page of blobs whose names start with `prefix`.
    pub async fn list_blobs(
        &self,
        prefix: &str,
        marker: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<BlobPage> {
        let url = self.container_url();
        let max_results = max_results.map(|n| n.to_string());
        let mut query = vec![("restype", "container"), ("comp", "list")];
        if !prefix.is_empty() {
            query.push(("prefix", prefix));
        }
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }
        if let Some(max_results) = max_results.as_deref() {
            query.push(("maxresults", max_results));
        }

        let resp = self.send(Method::GET, &url, &query).await?;
        if !resp.status().is_success() {
            return Err(Self::status_error(Method::GET, &url, resp).await);
        }
        let body = resp.text().await?;
        parse_blob_list(&body)
    }

    pub async fn container_exists(&self) -> Result<bool> {
        let url = self.container_url();
        let resp = self
            .send(Method::HEAD, &url, &[("restype", "container")])
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::status_error(Method::HEAD, &url, resp).await),
        }
    }

    pub async fn container_is_empty(&self) -> Result<bool> {
        let page = self.list_blobs("", None, Some(1)).await?;
        Ok(page.blobs.is_empty())
    }

    /// Creates the container; an existing container is not an error.
    pub async fn create_container(&self) -> Result<()> {
        let url = self.container_url();
        let resp = self
            .send(Method::PUT, &url, &[("restype", "container")])
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            _ => Err(Self::status_error(Method::PUT, &url, resp).await),
        }
    }

    /// Deletes the container including all blobs in it.
    pub async fn delete_container(&self) -> Result<()> {
        let url = self.container_url();
        let resp = self
            .send(Method::DELETE, &url, &[("restype", "container")])
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(CloudError::NotFound(self.container_name.clone())),
            _ => Err(Self::status_error(Method::DELETE, &url, resp).await),
        }
    }
}

fn parse_http_date(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CloudError::Decode(format!("invalid date '{value}': {e}")))
}

fn parse_blob_list(xml: &str) -> Result<BlobPage> {
    let xml = xml.trim_start_matches('\u{feff}');
    let results: EnumerationResults = quick_xml::de::from_str(xml)
        .map_err(|e| CloudError::Decode(format!("blob listing: {e}")))?;

    let blobs = results
        .blobs
        .blob
        .into_iter()
        .map(|item| {
            Ok(BlobEntry {
                last_modified: parse_http_date(&item.properties.last_modified)?,
                name: item.name,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(BlobPage {
        blobs,
        next_marker: results.next_marker.filter(|m| !m.is_empty()),
    })
}
