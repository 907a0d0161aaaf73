use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("token request failed: {0}")]
    Token(String),

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;
