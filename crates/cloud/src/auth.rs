use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CloudError, Result};

/// OAuth scope for Azure Storage data-plane access.
pub const AZURE_STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// OAuth scope for Google Cloud Storage.
pub const GCS_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.full_control";

const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh tokens this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// The parts of a Google service-account key file needed to mint tokens.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CloudError::Credentials(format!(
                "failed to read service account file {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            CloudError::Credentials(format!(
                "invalid service account file {}: {e}",
                path.display()
            ))
        })
    }

    pub fn from_value(info: serde_json::Value) -> Result<Self> {
        serde_json::from_value(info)
            .map_err(|e| CloudError::Credentials(format!("invalid service account info: {e}")))
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"*****")
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// How an access token is obtained.
#[derive(Clone)]
pub enum TokenGrant {
    /// Azure AD client-credentials flow for a service principal.
    ClientCredentials {
        tenant_id: String,
        client_id: String,
        client_secret: String,
        scope: String,
    },
    /// Google JWT bearer flow signed with a service-account key.
    #[cfg(feature = "gcs")]
    ServiceAccount { key: ServiceAccountKey, scope: String },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Fetches bearer tokens and caches them until shortly before expiry.
#[derive(Clone)]
pub struct AuthProvider {
    grant: TokenGrant,
    http: reqwest::Client,
    cache: Arc<RwLock<Option<CachedToken>>>,
}

impl AuthProvider {
    pub fn new(grant: TokenGrant) -> Self {
        Self {
            grant,
            http: reqwest::Client::new(),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.expires_at > Instant::now() + EXPIRY_MARGIN
            {
                return Ok(cached.access_token.clone());
            }
        }

        let resp = match &self.grant {
            TokenGrant::ClientCredentials {
                tenant_id,
                client_id,
                client_secret,
                scope,
            } => {
                let url = format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token");
                debug!(tenant_id = %tenant_id, "requesting service principal token");
                self.http
                    .post(&url)
                    .form(&[
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("scope", scope.as_str()),
                        ("grant_type", "client_credentials"),
                    ])
                    .send()
                    .await?
            }
            #[cfg(feature = "gcs")]
            TokenGrant::ServiceAccount { key, scope } => {
                let assertion = service_account_assertion(key, scope)?;
                debug!(client_email = %key.client_email, "requesting service account token");
                self.http
                    .post(&key.token_uri)
                    .form(&[
                        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                        ("assertion", assertion.as_str()),
                    ])
                    .send()
                    .await?
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Token(format!("{status}: {body}")));
        }

        let token_resp: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CloudError::Decode(format!("token response: {e}")))?;
        let cached = CachedToken {
            access_token: token_resp.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token_resp.expires_in),
        };

        let mut cache = self.cache.write().await;
        *cache = Some(cached);

        Ok(token_resp.access_token)
    }
}

#[cfg(feature = "gcs")]
#[derive(serde::Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[cfg(feature = "gcs")]
fn service_account_assertion(key: &ServiceAccountKey, scope: &str) -> Result<String> {
    use jsonwebtoken::{Algorithm, EncodingKey, Header};

    let iat = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        iss: &key.client_email,
        scope,
        aud: &key.token_uri,
        iat,
        exp: iat + 3600,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| CloudError::Credentials(format!("invalid service account private key: {e}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
        .map_err(|e| CloudError::Credentials(format!("failed to sign token request: {e}")))
}
