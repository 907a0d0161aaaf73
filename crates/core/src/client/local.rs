use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{TryStreamExt, stream};
use tracing::debug;

use super::{FileStream, MATCH_OPTIONS, StorageClient};
use crate::error::{Error, Result};
use crate::storage::{LocalStorage, Storage};

pub struct LocalClient {
    storage: Storage,
    local: LocalStorage,
}

impl LocalClient {
    pub fn new(local: LocalStorage) -> Self {
        Self {
            storage: Storage::Local(local.clone()),
            local,
        }
    }
}

#[async_trait]
impl StorageClient for LocalClient {
    fn storage(&self) -> &Storage {
        &self.storage
    }

    async fn last_modification_timestamp(&self, path: &str) -> Result<DateTime<Utc>> {
        let full = self.local.full_path(path);
        let metadata = tokio::fs::metadata(&full).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound(full.display().to_string()),
            _ => Error::Io(e),
        })?;
        Ok(DateTime::<Utc>::from(metadata.modified()?))
    }

    fn iterate_files<'a>(&'a self, pattern: &'a str) -> FileStream<'a> {
        let root = self.local.absolute_base_path();
        let pattern = pattern.trim_start_matches('/').to_string();
        let listing = stream::once(async move {
            tokio::task::spawn_blocking(move || glob_files(&root, &pattern))
                .await
                .map_err(|e| Error::Io(io::Error::other(e)))?
        });
        Box::pin(
            listing
                .map_ok(|files| stream::iter(files.into_iter().map(Ok)))
                .try_flatten(),
        )
    }
}

/// Regular files under `root` matching `pattern`, relative to `root`.
fn glob_files(root: &Path, pattern: &str) -> Result<Vec<String>> {
    let root_str = root.to_string_lossy();
    let base = root_str.trim_end_matches('/');
    let full_pattern = format!("{}/{pattern}", glob::Pattern::escape(base));
    let base = PathBuf::from(if base.is_empty() { "/" } else { base });

    let entries = glob::glob_with(&full_pattern, MATCH_OPTIONS)
        .map_err(|e| Error::InvalidArgument(format!("invalid file pattern {pattern:?}: {e}")))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::Io(e.into()))?;
        if !path.is_file() {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(&base) {
            files.push(relative.to_string_lossy().into_owned());
        }
    }
    debug!(root = %base.display(), pattern, count = files.len(), "listed local files");
    Ok(files)
}
