use std::io;

use tracing::debug;

use crate::client::azure::blob_client;
use crate::error::{Error, Result};
use crate::process::{self, CommandOutput};
use crate::shell::{ShellCommand, curl_sftp_options, gsutil, gsutil_reports_missing, quote};
use crate::storage::{SftpStorage, Storage};

/// curl's exit code for a remote file that does not exist.
const CURL_REMOTE_FILE_NOT_FOUND: i32 = 78;

/// Whether `path` names an existing file.
///
/// A clean "not found" is `Ok(false)`; connectivity and authentication
/// failures are errors.
pub async fn file_exists(storage: &Storage, path: &str) -> Result<bool> {
    let exists = match storage {
        Storage::Local(local) => match tokio::fs::metadata(local.full_path(path)).await {
            Ok(metadata) => metadata.is_file(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(Error::Io(e)),
        },
        Storage::Sftp(sftp) => {
            let command = sftp_head_command(sftp, path)?;
            probe(&command, |output| output.status == Some(CURL_REMOTE_FILE_NOT_FOUND)).await?
        }
        Storage::GoogleCloud(gcs) => {
            let command = ShellCommand::new(format!(
                "{} stat {}",
                gsutil(gcs)?,
                quote(&gcs.build_uri(path))?
            ));
            probe(&command, |output| gsutil_reports_missing(&output.stderr)).await?
        }
        Storage::Azure(azure) => blob_client(azure)?.blob_exists(path).await?,
    };

    debug!(storage = %storage.kind(), path, exists, "checked file existence");
    Ok(exists)
}

fn sftp_head_command(sftp: &SftpStorage, path: &str) -> Result<ShellCommand> {
    let (options, env) = curl_sftp_options(sftp)?;
    let command = ShellCommand::new(format!(
        "curl -sS{options} -I {}",
        quote(&sftp.build_url(path))?
    ));
    Ok(command.with_env(env))
}

/// Exit 0 means present. A failure `is_missing` accepts means absent; any
/// other failure is an [`Error::ExternalTool`].
pub(crate) async fn probe(
    command: &ShellCommand,
    is_missing: impl Fn(&CommandOutput) -> bool,
) -> Result<bool> {
    let output = process::output(command).await?;
    if output.success() {
        Ok(true)
    } else if is_missing(&output) {
        Ok(false)
    } else {
        Err(output.into_error(command))
    }
}
