use thiserror::Error;

use crate::compression::Compression;
use crate::storage::StorageKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("storage alias \"{0}\" not configured")]
    NotConfigured(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("{operation} is not supported for {storage} storage")]
    UnsupportedOperation {
        operation: String,
        storage: StorageKind,
    },

    #[error(
        "compression {requested} is not supported for {operation} on {storage} storage (supported: {})",
        format_compressions(.allowed)
    )]
    UnsupportedCompression {
        storage: StorageKind,
        operation: String,
        requested: Compression,
        allowed: &'static [Compression],
    },

    #[error("unknown compression \"{0}\" (expected none, gzip, tar.gzip or zip)")]
    UnknownCompression(String),

    #[error("command `{command}` failed with exit code {}:\n{stdout}{stderr}", display_status(.status))]
    ExternalTool {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not empty: {0}")]
    NotEmpty(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unexpected output from `{command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cloud(#[from] stowage_cloud::CloudError),
}

impl Error {
    pub(crate) fn unsupported(operation: impl Into<String>, storage: StorageKind) -> Self {
        Error::UnsupportedOperation {
            operation: operation.into(),
            storage,
        }
    }
}

fn format_compressions(allowed: &[Compression]) -> String {
    allowed
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_status(status: &Option<i32>) -> String {
    status.map_or_else(|| "none (terminated by signal)".to_string(), |code| code.to_string())
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_compression_names_allowed_set() {
        let err = Error::UnsupportedCompression {
            storage: StorageKind::Sftp,
            operation: "write".into(),
            requested: Compression::Zip,
            allowed: &[Compression::None],
        };
        assert_eq!(
            err.to_string(),
            "compression zip is not supported for write on sftp storage (supported: none)"
        );
    }

    #[test]
    fn external_tool_error_carries_output() {
        let err = Error::ExternalTool {
            command: "gsutil mb gs://x".into(),
            status: Some(1),
            stdout: String::new(),
            stderr: "AccessDeniedException: 403".into(),
        };
        let text = err.to_string();
        assert!(text.contains("exit code 1"));
        assert!(text.contains("AccessDeniedException"));
    }
}
