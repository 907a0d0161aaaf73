use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use stowage_core::info::file_exists;
use stowage_core::shell::{
    delete_file_command, move_file_command, read_file_command, write_file_command,
};
use stowage_core::{
    Compression, DeleteOptions, Error, LocalStorage, ShellCommand, SftpStorage, Storage,
    StorageConfig, StorageRegistry,
};
use tokio::io::AsyncWriteExt;

const CONTENT: &[u8] = b"id,name\n1,alpha\n2,beta\n";

fn storage(dir: &Path) -> Storage {
    LocalStorage::new(dir).into()
}

fn has_tools(tools: &[&str]) -> bool {
    tools.iter().all(|tool| {
        std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("command -v {tool}"))
            .stdout(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    })
}

async fn write(command: &ShellCommand, content: &[u8]) {
    let mut child = command
        .to_command()
        .stdin(Stdio::piped())
        .spawn()
        .expect("spawn write command");
    let mut stdin = child.stdin.take().expect("stdin");
    stdin.write_all(content).await.unwrap();
    drop(stdin);
    let status = child.wait().await.unwrap();
    assert!(status.success(), "write failed: {command}");
}

async fn read(command: &ShellCommand) -> Vec<u8> {
    let output = command
        .to_command()
        .stdin(Stdio::null())
        .output()
        .await
        .expect("spawn read command");
    assert!(
        output.status.success(),
        "read failed: {command}: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output.stdout
}

async fn run(command: &ShellCommand) -> bool {
    command
        .to_command()
        .stdin(Stdio::null())
        .status()
        .await
        .expect("spawn command")
        .success()
}

#[tokio::test]
async fn round_trip_uncompressed_and_gzip() {
    if !has_tools(&["gzip", "gunzip"]) {
        eprintln!("skipping: gzip not installed");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path());

    let cases = [("plain.csv", Compression::None), ("packed.csv.gz", Compression::Gzip)];
    for (name, compression) in cases {
        assert!(!file_exists(&storage, name).await.unwrap());
        write(&write_file_command(&storage, name, compression).unwrap(), CONTENT).await;
        assert!(file_exists(&storage, name).await.unwrap());
        assert_eq!(read(&read_file_command(&storage, name, compression).unwrap()).await, CONTENT);
    }
}

#[tokio::test]
async fn write_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path());

    let command = write_file_command(&storage, "2024/01/day.csv", Compression::None).unwrap();
    write(&command, CONTENT).await;
    assert_eq!(std::fs::read(dir.path().join("2024/01/day.csv")).unwrap(), CONTENT);
}

#[tokio::test]
async fn round_trip_zip_names_the_entry_after_the_file() {
    if !has_tools(&["zip", "zipnote", "unzip"]) {
        eprintln!("skipping: zip tools not installed");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path());

    write(&write_file_command(&storage, "data.csv.zip", Compression::Zip).unwrap(), CONTENT).await;
    assert_eq!(
        read(&read_file_command(&storage, "data.csv.zip", Compression::Zip).unwrap()).await,
        CONTENT
    );

    let listing = std::process::Command::new("unzip")
        .arg("-Z1")
        .arg(dir.path().join("data.csv.zip"))
        .output()
        .unwrap();
    assert_eq!(String::from_utf8_lossy(&listing.stdout).trim(), "data.csv");
}

#[tokio::test]
async fn read_tar_gzip_archive() {
    if !has_tools(&["tar", "gzip"]) {
        eprintln!("skipping: tar not installed");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path());
    tokio::fs::write(dir.path().join("data.csv"), CONTENT).await.unwrap();

    let pack = std::process::Command::new("sh")
        .arg("-c")
        .arg(format!(
            "cd {} && {} data.csv > data.tar.gz",
            dir.path().display(),
            Compression::TarGzip.compressor().unwrap()
        ))
        .status()
        .unwrap();
    assert!(pack.success());

    assert_eq!(
        read(&read_file_command(&storage, "data.tar.gz", Compression::TarGzip).unwrap()).await,
        CONTENT
    );
}

#[tokio::test]
async fn hostile_file_names_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path());
    let name = "it's a $HOME `id`; rm -rf x.csv";

    write(&write_file_command(&storage, name, Compression::None).unwrap(), CONTENT).await;
    assert!(dir.path().join(name).is_file());
    assert_eq!(read(&read_file_command(&storage, name, Compression::None).unwrap()).await, CONTENT);

    assert!(run(&delete_file_command(&storage, name, DeleteOptions::default()).unwrap()).await);
    assert!(!file_exists(&storage, name).await.unwrap());
}

#[tokio::test]
async fn force_delete_succeeds_for_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path());

    let force = delete_file_command(&storage, "missing.csv", DeleteOptions::default()).unwrap();
    assert!(run(&force).await);

    let strict = delete_file_command(
        &storage,
        "missing.csv",
        DeleteOptions {
            force: false,
            recursive: false,
        },
    )
    .unwrap();
    assert!(!run(&strict).await);
}

#[tokio::test]
async fn recursive_delete_removes_directories() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path());
    tokio::fs::create_dir_all(dir.path().join("batch/2024")).await.unwrap();
    tokio::fs::write(dir.path().join("batch/2024/a.csv"), CONTENT).await.unwrap();

    let command = delete_file_command(
        &storage,
        "batch",
        DeleteOptions {
            force: true,
            recursive: true,
        },
    )
    .unwrap();
    assert!(run(&command).await);
    assert!(!dir.path().join("batch").exists());
}

#[tokio::test]
async fn move_requires_existing_source() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path());
    tokio::fs::write(dir.path().join("a.csv"), CONTENT).await.unwrap();

    assert!(run(&move_file_command(&storage, "a.csv", "b.csv").unwrap()).await);
    assert!(!dir.path().join("a.csv").exists());
    assert_eq!(tokio::fs::read(dir.path().join("b.csv")).await.unwrap(), CONTENT);

    assert!(!run(&move_file_command(&storage, "a.csv", "c.csv").unwrap()).await);
    assert!(!dir.path().join("c.csv").exists());
}

#[tokio::test]
async fn unsupported_compression_fails_before_running_anything() {
    let sftp: Storage = SftpStorage::new("unreachable.invalid").into();
    assert!(matches!(
        write_file_command(&sftp, "a.zip", Compression::Zip),
        Err(Error::UnsupportedCompression { .. })
    ));
}

#[tokio::test]
async fn registry_manages_local_storage_by_alias() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("managed");
    let alias = format!("local-{}", uuid::Uuid::new_v4());

    let mut configs = HashMap::new();
    configs.insert(alias.clone(), StorageConfig::Local { path: root.clone() });
    let registry = StorageRegistry::new(configs);

    registry.ensure_storage(alias.as_str()).await.unwrap();
    registry.ensure_storage(alias.as_str()).await.unwrap();
    assert!(root.is_dir());

    write(
        &registry.write_file_command(alias.as_str(), "x.csv", Compression::None).unwrap(),
        CONTENT,
    )
    .await;
    assert!(registry.file_exists(alias.as_str(), "x.csv").await.unwrap());
    assert!(matches!(
        registry.drop_storage(alias.as_str(), false).await,
        Err(Error::NotEmpty(_))
    ));

    registry.drop_storage(alias.as_str(), true).await.unwrap();
    assert!(!root.exists());
    assert!(matches!(
        registry.drop_storage(alias.as_str(), false).await,
        Err(Error::NotFound(_))
    ));
}
