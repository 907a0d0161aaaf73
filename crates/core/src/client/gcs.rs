use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{TryStreamExt, future, stream};
use tracing::debug;

use super::{FilePattern, FileStream, StorageClient};
use crate::error::{Error, Result};
use crate::process::{self, CommandOutput};
use crate::shell::{ShellCommand, gsutil, quote};
use crate::storage::{GoogleCloudStorage, Storage};

#[cfg(feature = "gcs-api")]
pub use api::GcsApiClient;

#[cfg(feature = "gcs-api")]
mod api {
    use stowage_cloud::CloudError;
    use stowage_cloud::GcsClient;
    use stowage_cloud::auth::ServiceAccountKey;
    use tokio::sync::OnceCell;

    use super::*;

    /// GCS client backed by the JSON API; credentials are loaded on first use.
    pub struct GcsApiClient {
        storage: Storage,
        gcs: GoogleCloudStorage,
        client: OnceCell<GcsClient>,
    }

    impl GcsApiClient {
        pub fn new(gcs: GoogleCloudStorage) -> Self {
            Self {
                storage: Storage::GoogleCloud(gcs.clone()),
                gcs,
                client: OnceCell::new(),
            }
        }

        async fn client(&self) -> Result<&GcsClient> {
            self.client
                .get_or_try_init(|| async {
                    let credentials =
                        (self.gcs.service_account_file(), self.gcs.service_account_info());
                    let key = match credentials {
                        (Some(path), _) => ServiceAccountKey::from_file(path).await?,
                        (None, Some(info)) => ServiceAccountKey::from_value(info.clone())?,
                        (None, None) => {
                            return Err(Error::MissingCredentials(format!(
                                "bucket {} has neither service_account_file \
                                 nor service_account_info",
                                self.gcs.bucket_name()
                            )));
                        }
                    };
                    debug!(
                        bucket = self.gcs.bucket_name(),
                        client_email = %key.client_email,
                        "gcs credentials loaded"
                    );
                    Ok(GcsClient::new(self.gcs.bucket_name(), key)?)
                })
                .await
        }
    }

    #[async_trait]
    impl StorageClient for GcsApiClient {
        fn storage(&self) -> &Storage {
            &self.storage
        }

        async fn last_modification_timestamp(&self, path: &str) -> Result<DateTime<Utc>> {
            let client = self.client().await?;
            match client.get_object(path.trim_start_matches('/')).await {
                Ok(meta) => Ok(meta.updated),
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

            // `Some(token)` is the next page to fetch; `None` ends the listing.
            let pages = stream::try_unfold(Some(None::<String>), move |cursor| {
                let prefix = prefix.clone();
                async move {
                    let Some(page_token) = cursor else {
                        return Ok(None);
                    };
                    let page = self
                        .client()
                        .await?
                        .list_objects(&prefix, page_token.as_deref())
                        .await?;
                    let names: Vec<String> = page.objects.into_iter().map(|o| o.name).collect();
                    Ok::<_, Error>(Some((names, page.next_page_token.map(Some))))
                }
            });

            Box::pin(
                pages
                    .map_ok(|names| stream::iter(names.into_iter().map(Ok)))
                    .try_flatten()
                    .try_filter(move |name| {
                        future::ready(!name.ends_with('/') && pattern.matches(name))
                    }),
            )
        }
    }
}

/// GCS client running `gsutil`.
pub struct GcsShellClient {
    storage: Storage,
    gcs: GoogleCloudStorage,
}

impl GcsShellClient {
    pub fn new(gcs: GoogleCloudStorage) -> Self {
        Self {
            storage: Storage::GoogleCloud(gcs.clone()),
            gcs,
        }
    }

    async fn list(&self, pattern: &FilePattern) -> Result<Vec<String>> {
        let base = format!("{}/", self.gcs.base_uri());
        let command = ShellCommand::new(format!(
            "{} ls {}",
            gsutil(&self.gcs)?,
            quote(&format!("{base}{}**", pattern.prefix()))?
        ));
        let output = process::output(&command).await?;
        let names: Vec<String> = listing_names(output, &command, &base)?
            .into_iter()
            .filter(|name| pattern.matches(name))
            .collect();
        debug!(
            bucket = self.gcs.bucket_name(),
            pattern = pattern.as_str(),
            count = names.len(),
            "listed gcs objects"
        );
        Ok(names)
    }
}

#[async_trait]
impl StorageClient for GcsShellClient {
    fn storage(&self) -> &Storage {
        &self.storage
    }

    async fn last_modification_timestamp(&self, path: &str) -> Result<DateTime<Utc>> {
        let command = ShellCommand::new(format!(
            "{} stat {}",
            gsutil(&self.gcs)?,
            quote(&self.gcs.build_uri(path))?
        ));
        let output = process::output(&command).await?;
        stat_update_time(output, &command, &self.gcs.build_uri(path))
    }

    fn iterate_files<'a>(&'a self, pattern: &'a str) -> FileStream<'a> {
        let listing = stream::once(async move {
            let pattern = FilePattern::new(pattern)?;
            self.list(&pattern).await
        });
        Box::pin(
            listing
                .map_ok(|names| stream::iter(names.into_iter().map(Ok)))
                .try_flatten(),
        )
    }
}

/// Names from a finished `gsutil ls`; "matched no objects" is an empty listing.
fn listing_names(
    output: CommandOutput,
    command: &ShellCommand,
    base: &str,
) -> Result<Vec<String>> {
    if output.success() {
        Ok(parse_listing(&output.stdout, base).collect())
    } else if output.stderr.contains("matched no objects") {
        Ok(Vec::new())
    } else {
        Err(output.into_error(command))
    }
}

fn stat_update_time(
    output: CommandOutput,
    command: &ShellCommand,
    uri: &str,
) -> Result<DateTime<Utc>> {
    if !output.success() {
        return Err(if output.stderr.contains("No URLs matched") {
            Error::NotFound(uri.to_string())
        } else {
            output.into_error(command)
        });
    }
    parse_update_time(&output.stdout).ok_or_else(|| Error::UnexpectedOutput {
        command: command.script().to_string(),
        detail: "no parsable \"Update time\" line".into(),
    })
}

/// Object names from `gsutil ls` output, relative to `base` (`gs://bucket/`).
fn parse_listing<'a>(stdout: &'a str, base: &'a str) -> impl Iterator<Item = String> + 'a {
    stdout
        .lines()
        .filter_map(move |line| line.trim().strip_prefix(base))
        .filter(|name| !name.is_empty() && !name.ends_with('/') && !name.ends_with(':'))
        .map(str::to_string)
}

fn parse_update_time(stdout: &str) -> Option<DateTime<Utc>> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Update time:"))
        .and_then(|value| DateTime::parse_from_rfc2822(value.trim()).ok())
        .map(|time| time.with_timezone(&Utc))
}
