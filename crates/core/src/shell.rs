use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::storage::{
    AzureStorage, AzureStorageType, GoogleCloudStorage, LocalStorage, SftpStorage, Storage,
    StorageKind,
};

/// Environment variable carrying `user:password` for SFTP transfers.
pub const SFTP_CREDENTIALS_VAR: &str = "STOWAGE_SFTP_CREDENTIALS";

/// Environment variable carrying the Azure SAS token.
pub const AZURE_SAS_VAR: &str = "STOWAGE_AZURE_SAS";

const AZCOPY_AUTO_LOGIN_TYPE: &str = "AZCOPY_AUTO_LOGIN_TYPE";
const AZCOPY_TENANT_ID: &str = "AZCOPY_TENANT_ID";
const AZCOPY_SPA_APPLICATION_ID: &str = "AZCOPY_SPA_APPLICATION_ID";
const AZCOPY_SPA_CLIENT_SECRET: &str = "AZCOPY_SPA_CLIENT_SECRET";

/// gsutil messages meaning the object, prefix or bucket does not exist.
const GSUTIL_MISSING: [&str; 3] = [
    "No URLs matched",
    "matched no objects",
    "BucketNotFoundException",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Delete,
    Move,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
            Operation::Move => "move",
        })
    }
}

/// Options for [`delete_file_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Exit with status 0 when the target does not exist.
    pub force: bool,
    /// Remove a directory or prefix including its content.
    pub recursive: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            force: true,
            recursive: false,
        }
    }
}

/// A generated shell script together with the environment it must run in.
#[derive(Clone, PartialEq, Eq)]
pub struct ShellCommand {
    script: String,
    env: Vec<(String, String)>,
}

impl ShellCommand {
    pub(crate) fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            env: Vec::new(),
        }
    }

    pub(crate) fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// The script text. Contains no secret values.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Variables that must be set when running the script.
    pub fn env(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// A `sh -c` process with the environment block applied.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(&self.script);
        command.envs(self.env());
        command
    }

    /// A single self-contained command line with the environment inlined.
    ///
    /// The result exposes every secret to anything that can read the command
    /// line; prefer [`ShellCommand::to_command`].
    pub fn inline_script(&self) -> Result<String> {
        if self.env.is_empty() {
            return Ok(self.script.clone());
        }
        let mut line = String::from("env");
        for (key, value) in &self.env {
            line.push(' ');
            line.push_str(&quote(&format!("{key}={value}"))?);
        }
        line.push_str(" sh -c ");
        line.push_str(&quote(&self.script)?);
        Ok(line)
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.script)
    }
}

impl fmt::Debug for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env: Vec<String> = self.env.iter().map(|(k, _)| format!("{k}=*****")).collect();
        f.debug_struct("ShellCommand")
            .field("script", &self.script)
            .field("env", &env)
            .finish()
    }
}

/// Quotes a single shell word.
pub fn quote(value: &str) -> Result<String> {
    shlex::try_quote(value)
        .map(Cow::into_owned)
        .map_err(|_| Error::InvalidArgument(format!("value contains a NUL byte: {value:?}")))
}

fn quote_path(path: &Path) -> Result<String> {
    quote(&path.to_string_lossy())
}

/// Whether gsutil's stderr says the target does not exist.
pub(crate) fn gsutil_reports_missing(stderr: &str) -> bool {
    GSUTIL_MISSING.iter().any(|marker| stderr.contains(marker))
}

/// Runs `probe` (stdout discarded), then `present` when it succeeds or
/// `absent` when its stderr carries a gsutil "not found" message. Any other
/// probe failure is re-raised with the probe's stderr and exit code.
pub(crate) fn gsutil_branch(probe: &str, present: &str, absent: &str) -> Result<String> {
    let markers = GSUTIL_MISSING
        .iter()
        .map(|marker| quote(marker).map(|m| format!("*{m}*")))
        .collect::<Result<Vec<_>>>()?
        .join("|");
    Ok(format!(
        "{{ out=$({probe} 2>&1 > /dev/null); rc=$?; if [ \"$rc\" -eq 0 ]; then {present}; \
         else case \"$out\" in {markers}) {absent} ;; \
         *) printf '%s\\n' \"$out\" >&2; (exit \"$rc\") ;; esac; fi; }}"
    ))
}

/// Compressions a storage kind accepts for an operation.
pub fn allowed_compressions(kind: StorageKind, operation: Operation) -> &'static [Compression] {
    match (kind, operation) {
        (_, Operation::Delete | Operation::Move) => &[Compression::None],
        (StorageKind::Sftp, _) => &[Compression::None],
        (StorageKind::Local, Operation::Read) => &Compression::ALL,
        (StorageKind::Local, Operation::Write) => {
            &[Compression::None, Compression::Gzip, Compression::Zip]
        }
        (StorageKind::GoogleCloud | StorageKind::Azure, Operation::Read) => {
            &[Compression::None, Compression::Gzip, Compression::TarGzip]
        }
        (StorageKind::GoogleCloud | StorageKind::Azure, Operation::Write) => {
            &[Compression::None, Compression::Gzip]
        }
    }
}

fn check_compression(
    kind: StorageKind,
    operation: Operation,
    compression: Compression,
) -> Result<()> {
    let allowed = allowed_compressions(kind, operation);
    if allowed.contains(&compression) {
        Ok(())
    } else {
        Err(Error::UnsupportedCompression {
            storage: kind,
            operation: operation.to_string(),
            requested: compression,
            allowed,
        })
    }
}

/// Appends a decompression stage reading from stdin.
fn decompress(script: String, compression: Compression) -> String {
    match compression {
        Compression::None => script,
        _ => format!("{script} | {} -", compression.decompressor()),
    }
}

/// Prepends a compression stage reading from stdin.
fn compress(script: String, compression: Compression) -> String {
    match compression.compressor() {
        Some(compressor) => format!("{compressor} - | {script}"),
        None => script,
    }
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// A command that writes the (decompressed) content of a file to stdout.
pub fn read_file_command(
    storage: &Storage,
    path: &str,
    compression: Compression,
) -> Result<ShellCommand> {
    check_compression(storage.kind(), Operation::Read, compression)?;

    let command = match storage {
        Storage::Local(local) => ShellCommand::new(format!(
            "{} {}",
            compression.decompressor(),
            quote_path(&local.full_path(path))?
        )),
        Storage::Sftp(sftp) => {
            let (options, env) = curl_sftp_options(sftp)?;
            let script = format!("curl -sS{options} {}", quote(&sftp.build_url(path))?);
            ShellCommand::new(decompress(script, compression)).with_env(env)
        }
        Storage::GoogleCloud(gcs) => {
            let script = format!("{} cat {}", gsutil(gcs)?, quote(&gcs.build_uri(path))?);
            ShellCommand::new(decompress(script, compression))
        }
        Storage::Azure(azure) => {
            if azure.sas().is_some() {
                let (url, env) = azure_url(azure, path, None)?;
                ShellCommand::new(decompress(format!("curl -sf {url}"), compression)).with_env(env)
            } else {
                let (url, env) = azure_url(azure, path, Some(AzureStorageType::Blob))?;
                let script = format!("azcopy cp {url} --from-to BlobPipe");
                ShellCommand::new(decompress(script, compression)).with_env(env)
            }
        }
    };

    debug!(storage = %storage.kind(), path, script = %command.script(), "built read command");
    Ok(command)
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

/// A command that stores its stdin as a file, compressing it on the way.
pub fn write_file_command(
    storage: &Storage,
    path: &str,
    compression: Compression,
) -> Result<ShellCommand> {
    check_compression(storage.kind(), Operation::Write, compression)?;

    let command = match storage {
        Storage::Local(local) => local_write(local, path, compression)?,
        Storage::Sftp(sftp) => {
            let (options, env) = curl_sftp_options(sftp)?;
            let script = format!(
                "curl -sS{options} --ftp-create-dirs -T - {}",
                quote(&sftp.build_url(path))?
            );
            ShellCommand::new(script).with_env(env)
        }
        Storage::GoogleCloud(gcs) => {
            let script = format!("{} cp - {}", gsutil(gcs)?, quote(&gcs.build_uri(path))?);
            ShellCommand::new(compress(script, compression))
        }
        Storage::Azure(azure) => {
            let (url, env) = azure_url(azure, path, Some(AzureStorageType::Blob))?;
            let script = format!("azcopy cp --from-to PipeBlob {url}");
            ShellCommand::new(compress(script, compression)).with_env(env)
        }
    };

    debug!(storage = %storage.kind(), path, script = %command.script(), "built write command");
    Ok(command)
}

fn local_write(
    storage: &LocalStorage,
    path: &str,
    compression: Compression,
) -> Result<ShellCommand> {
    let full_path = storage.full_path(path);
    let file = quote_path(&full_path)?;
    let mkdir = match full_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            format!("mkdir -p {} && ", quote_path(parent)?)
        }
        _ => String::new(),
    };
    let script = match compression {
        Compression::None => format!("{mkdir}cat - > {file}"),
        Compression::Gzip => format!("{mkdir}gzip -c - > {file}"),
        Compression::Zip => {
            // zip names an entry read from stdin "-"; rename it after the target file.
            let file_name = full_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let entry = file_name
                .strip_suffix(".zip")
                .filter(|stem| !stem.is_empty())
                .unwrap_or(&file_name);
            format!(
                "{mkdir}zip - - > {file} && printf '%s\\n' '@ -' {} | zipnote -w {file}",
                quote(&format!("@={entry}"))?
            )
        }
        Compression::TarGzip => {
            return Err(Error::UnsupportedCompression {
                storage: StorageKind::Local,
                operation: Operation::Write.to_string(),
                requested: compression,
                allowed: allowed_compressions(StorageKind::Local, Operation::Write),
            });
        }
    };
    Ok(ShellCommand::new(script))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// A command that deletes a file (or, with `recursive`, a directory/prefix).
///
/// With `force` the command exits 0 when the target does not exist.
pub fn delete_file_command(
    storage: &Storage,
    path: &str,
    options: DeleteOptions,
) -> Result<ShellCommand> {
    let command = match storage {
        Storage::Local(local) => ShellCommand::new(format!(
            "rm{}{} {}",
            if options.force { " -f" } else { "" },
            if options.recursive { " -r" } else { "" },
            quote_path(&local.full_path(path))?
        )),
        Storage::Sftp(sftp) => sftp_delete(sftp, path, options)?,
        Storage::GoogleCloud(gcs) => gcs_delete(gcs, path, options)?,
        Storage::Azure(azure) => azure_delete(azure, path, options)?,
    };

    debug!(storage = %storage.kind(), path, script = %command.script(), "built delete command");
    Ok(command)
}

fn sftp_delete(storage: &SftpStorage, path: &str, options: DeleteOptions) -> Result<ShellCommand> {
    if !options.force {
        return Err(Error::unsupported("delete without force", StorageKind::Sftp));
    }
    if options.recursive {
        return Err(Error::unsupported("recursive delete", StorageKind::Sftp));
    }

    // curl's quote parser takes a double-quoted path; `*` ignores a failing rm.
    let remote_path = format!("/{}", path.trim_start_matches('/'))
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    let (options, env) = curl_sftp_options(storage)?;
    let script = format!(
        "curl -sS{options} -o /dev/null -Q {} {}",
        quote(&format!("*rm \"{remote_path}\""))?,
        quote(&format!("{}/", storage.base_url()))?
    );
    Ok(ShellCommand::new(script).with_env(env))
}

fn gcs_delete(
    storage: &GoogleCloudStorage,
    path: &str,
    options: DeleteOptions,
) -> Result<ShellCommand> {
    let gsutil = gsutil(storage)?;
    let uri = quote(&storage.build_uri(path))?;
    let script = match (options.force, options.recursive) {
        (false, false) => format!("{gsutil} rm {uri}"),
        (false, true) => format!("{gsutil} -m rm -r {uri}"),
        (true, false) => gsutil_branch(
            &format!("{gsutil} stat {uri}"),
            &format!("{gsutil} rm {uri}"),
            ":",
        )?,
        (true, true) => gsutil_branch(
            &format!("{gsutil} ls {uri}"),
            &format!("{gsutil} -m rm -r {uri}"),
            ":",
        )?,
    };
    Ok(ShellCommand::new(script))
}

fn azure_delete(
    storage: &AzureStorage,
    path: &str,
    options: DeleteOptions,
) -> Result<ShellCommand> {
    if storage.sas().is_some() && !options.recursive {
        let (url, env) = azure_url(storage, path, Some(AzureStorageType::Blob))?;
        let script = if options.force {
            format!(
                "{{ code=$(curl -s -o /dev/null -w '%{{http_code}}' -X DELETE {url}); \
                 case \"$code\" in 2??|404) ;; \
                 *) printf 'HTTP status %s\\n' \"$code\" >&2; false ;; esac; }}"
            )
        } else {
            format!("curl -sf -o /dev/null -X DELETE {url}")
        };
        return Ok(ShellCommand::new(script).with_env(env));
    }

    let (url, env) = azure_url(storage, path, Some(AzureStorageType::Blob))?;
    let remove = format!(
        "azcopy rm {url}{}",
        if options.recursive { " --recursive=true" } else { "" }
    );
    // azcopy list exits 0 with no entries for a missing blob or prefix.
    let script = if options.force {
        format!(
            "{{ out=$(azcopy list {url} 2>&1); rc=$?; \
             if [ \"$rc\" -ne 0 ]; then printf '%s\\n' \"$out\" >&2; (exit \"$rc\"); \
             elif printf '%s\\n' \"$out\" | grep -q 'Content Length'; then {remove}; fi; }}"
        )
    } else {
        remove
    };
    Ok(ShellCommand::new(script).with_env(env))
}

// ---------------------------------------------------------------------------
// Move
// ---------------------------------------------------------------------------

/// A command that renames a file, failing when the source does not exist.
pub fn move_file_command(storage: &Storage, source: &str, target: &str) -> Result<ShellCommand> {
    let command = match storage {
        Storage::Local(local) => {
            let source = quote_path(&local.full_path(source))?;
            let target = quote_path(&local.full_path(target))?;
            ShellCommand::new(format!("test -e {source} && mv {source} {target}"))
        }
        Storage::Sftp(_) | Storage::GoogleCloud(_) | Storage::Azure(_) => {
            return Err(Error::unsupported(Operation::Move.to_string(), storage.kind()));
        }
    };

    debug!(
        storage = %storage.kind(),
        source,
        target,
        script = %command.script(),
        "built move command"
    );
    Ok(command)
}

// ---------------------------------------------------------------------------
// Backend specific fragments
// ---------------------------------------------------------------------------

/// `gsutil` with the service account key option when one is configured.
pub(crate) fn gsutil(storage: &GoogleCloudStorage) -> Result<String> {
    match storage.service_account_file() {
        Some(path) => Ok(format!(
            "gsutil -o {}",
            quote(&format!("Credentials:gs_service_key_file={}", path.display()))?
        )),
        None => Ok("gsutil".to_string()),
    }
}

/// curl options for an SFTP server, each prefixed with a space.
pub(crate) fn curl_sftp_options(
    storage: &SftpStorage,
) -> Result<(String, Vec<(String, String)>)> {
    let mut options = String::new();
    let mut env = Vec::new();

    if storage.is_insecure() {
        options.push_str(" -k");
    }
    if let Some(user) = storage.user() {
        match storage.password() {
            Some(password) => {
                options.push_str(&format!(" -u \"${SFTP_CREDENTIALS_VAR}\""));
                env.push((SFTP_CREDENTIALS_VAR.to_string(), format!("{user}:{password}")));
            }
            // The trailing colon stops curl from prompting for a password.
            None => options.push_str(&format!(" -u {}", quote(&format!("{user}:"))?)),
        }
    }
    if let Some(identity_file) = storage.identity_file() {
        options.push_str(&format!(" --key {}", quote_path(identity_file)?));
    }
    if let Some(public_identity_file) = storage.public_identity_file() {
        options.push_str(&format!(" --pubkey {}", quote_path(public_identity_file)?));
    }
    Ok((options, env))
}

/// URL word for an Azure path plus the environment it needs.
///
/// With a SAS the token is appended from the environment at run time. Without
/// one, `azcopy` logs in with the service principal from the environment.
fn azure_url(
    storage: &AzureStorage,
    path: &str,
    storage_type: Option<AzureStorageType>,
) -> Result<(String, Vec<(String, String)>)> {
    let url = quote(&storage.build_path_uri(Some(path), storage_type))?;
    if let Some(sas) = storage.sas() {
        return Ok((
            format!("{url}\"?${AZURE_SAS_VAR}\""),
            vec![(AZURE_SAS_VAR.to_string(), sas.to_string())],
        ));
    }
    match storage.service_principal() {
        Some(spn) => Ok((
            url,
            vec![
                (AZCOPY_AUTO_LOGIN_TYPE.to_string(), "SPN".to_string()),
                (AZCOPY_TENANT_ID.to_string(), spn.tenant_id.clone()),
                (AZCOPY_SPA_APPLICATION_ID.to_string(), spn.application_id.clone()),
                (AZCOPY_SPA_CLIENT_SECRET.to_string(), spn.client_secret.clone()),
            ],
        )),
        None => Err(Error::MissingCredentials(format!(
            "shell access to Azure container {} needs a SAS token or a service principal",
            storage.container_name()
        ))),
    }
}
