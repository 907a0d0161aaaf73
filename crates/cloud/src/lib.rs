pub mod auth;
pub mod azure;
pub mod error;
#[cfg(feature = "gcs")]
pub mod gcs;
mod shared_key;

pub use auth::{AuthProvider, TokenGrant};
pub use azure::{BlobAuth, BlobClient};
pub use error::{CloudError, Result};
#[cfg(feature = "gcs")]
pub use gcs::GcsClient;

/// Strips the query string from a URL so SAS tokens never reach logs or errors.
pub(crate) fn redact_url(url: &str) -> &str {
    url.split_once('?').map(|(base, _)| base).unwrap_or(url)
}
