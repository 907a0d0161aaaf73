use std::io;

use stowage_cloud::CloudError;
use tracing::info;

use crate::client::azure::blob_client;
use crate::error::{Error, Result};
use crate::info::probe;
use crate::process;
use crate::shell::{ShellCommand, gsutil, gsutil_branch, gsutil_reports_missing, quote};
use crate::storage::{AzureStorage, GoogleCloudStorage, LocalStorage, Storage, StorageKind};

/// Creates the storage unless it already exists.
pub async fn ensure_storage(storage: &Storage) -> Result<()> {
    match storage {
        Storage::Local(local) => {
            let root = local.absolute_base_path();
            tokio::fs::create_dir_all(&root).await?;
            info!(path = %root.display(), "local storage ready");
        }
        Storage::GoogleCloud(gcs) => {
            process::run(&gcs_ensure_command(gcs)?).await?;
            info!(bucket = gcs.bucket_name(), "gcs bucket ready");
        }
        Storage::Azure(azure) => {
            let client = blob_client(azure)?;
            if !client.container_exists().await? {
                client.create_container().await?;
            }
            info!(
                account = azure.account_name(),
                container = azure.container_name(),
                "azure container ready"
            );
        }
        Storage::Sftp(_) => return Err(Error::unsupported("ensure storage", StorageKind::Sftp)),
    }
    Ok(())
}

/// Removes the storage.
///
/// Without `force` the storage must exist and be empty. With `force` its
/// content is removed first and a missing storage is not an error.
pub async fn drop_storage(storage: &Storage, force: bool) -> Result<()> {
    match storage {
        Storage::Local(local) => drop_local(local, force).await?,
        Storage::GoogleCloud(gcs) => drop_gcs(gcs, force).await?,
        Storage::Azure(azure) => drop_azure(azure, force).await?,
        Storage::Sftp(_) => return Err(Error::unsupported("drop storage", StorageKind::Sftp)),
    }
    info!(storage = %storage.kind(), force, "storage dropped");
    Ok(())
}

async fn drop_local(local: &LocalStorage, force: bool) -> Result<()> {
    let root = local.absolute_base_path();
    let display = root.display().to_string();

    if force {
        return match tokio::fs::remove_dir_all(&root).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        };
    }

    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::NotFound(display)),
        Err(e) => return Err(e.into()),
    };
    if entries.next_entry().await?.is_some() {
        return Err(Error::NotEmpty(display));
    }
    tokio::fs::remove_dir(&root).await?;
    Ok(())
}

fn gcs_ensure_command(gcs: &GoogleCloudStorage) -> Result<ShellCommand> {
    let gsutil = gsutil(gcs)?;
    let uri = quote(&gcs.base_uri())?;
    let mut make_bucket = format!("{gsutil} mb");
    if let Some(project_id) = gcs.project_id() {
        make_bucket.push_str(&format!(" -p {}", quote(project_id)?));
    }
    if let Some(location) = gcs.location() {
        make_bucket.push_str(&format!(" -l {}", quote(location)?));
    }
    Ok(ShellCommand::new(gsutil_branch(
        &format!("{gsutil} ls -b {uri}"),
        ":",
        &format!("{make_bucket} {uri}"),
    )?))
}

fn gcs_force_drop_command(gcs: &GoogleCloudStorage) -> Result<ShellCommand> {
    let gsutil = gsutil(gcs)?;
    let uri = quote(&gcs.base_uri())?;
    let objects = quote(&format!("{}/**", gcs.base_uri()))?;
    // rm fails on an already empty bucket; rb decides the outcome.
    Ok(ShellCommand::new(gsutil_branch(
        &format!("{gsutil} ls -b {uri}"),
        &format!("{{ {gsutil} -m -q rm -r -f {objects}; {gsutil} rb {uri}; }}"),
        ":",
    )?))
}

async fn drop_gcs(gcs: &GoogleCloudStorage, force: bool) -> Result<()> {
    if force {
        process::run(&gcs_force_drop_command(gcs)?).await?;
        return Ok(());
    }

    let gsutil = gsutil(gcs)?;
    let uri = quote(&gcs.base_uri())?;
    let bucket = ShellCommand::new(format!("{gsutil} ls -b {uri}"));
    if !probe(&bucket, |output| gsutil_reports_missing(&output.stderr)).await? {
        return Err(Error::NotFound(gcs.base_uri()));
    }
    let listing = process::run(&ShellCommand::new(format!("{gsutil} ls {uri}"))).await?;
    if !listing.stdout.trim().is_empty() {
        return Err(Error::NotEmpty(gcs.base_uri()));
    }
    process::run(&ShellCommand::new(format!("{gsutil} rb {uri}"))).await?;
    Ok(())
}

async fn drop_azure(azure: &AzureStorage, force: bool) -> Result<()> {
    let client = blob_client(azure)?;
    if !client.container_exists().await? {
        return if force {
            Ok(())
        } else {
            Err(Error::NotFound(azure.base_uri()))
        };
    }
    if !force && !client.container_is_empty().await? {
        return Err(Error::NotEmpty(azure.base_uri()));
    }
    match client.delete_container().await {
        Err(CloudError::NotFound(_)) if force => Ok(()),
        other => Ok(other?),
    }
}
