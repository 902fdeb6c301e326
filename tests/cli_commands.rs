// tests/cli_commands.rs
//
// End-to-end through `snapwatch::run` with real shell commands and a
// sqlite store in a temporary directory.

#![cfg(unix)]

use std::fs;
use std::path::Path;

use clap::Parser;
use snapwatch::cli::CliArgs;
use snapwatch::store::{SnapshotStore, SqliteStore};

fn invoke(config: &Path, argv: &[&str]) -> anyhow::Result<()> {
    let config = config.to_str().unwrap();
    let mut full = vec!["snapwatch", "--config", config];
    full.extend_from_slice(argv);
    let args = CliArgs::try_parse_from(full)?;
    block_on(snapwatch::run(args))
}

fn block_on<F: std::future::Future<Output = anyhow::Result<()>>>(fut: F) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

fn setup(dir: &Path, body_file: &Path) -> std::path::PathBuf {
    let config = dir.join("Snapwatch.toml");
    fs::write(
        &config,
        format!(
            r#"
[storage]
kind = "sqlite"
path = "state.db"
max_snapshots = 3

[[job]]
name = "file"
command = "cat {}"
"#,
            body_file.display()
        ),
    )
    .unwrap();
    config
}

#[test]
fn run_history_and_maintenance_commands() {
    snapwatch_test_utils::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let body = dir.path().join("body.txt");
    let config = setup(dir.path(), &body);
    let key = format!("cat {}", body.display());
    let db = dir.path().join("state.db");

    for content in ["one\n", "one\n", "two\n", "three\n", "four\n"] {
        fs::write(&body, content).unwrap();
        invoke(&config, &["run"]).unwrap();
    }

    let count = |db: &Path| {
        SqliteStore::open(db)
            .unwrap()
            .load_history(&key, 0)
            .unwrap()
            .len()
    };
    assert_eq!(count(&db), 3);

    invoke(&config, &["history", "file", "--limit", "0"]).unwrap();
    invoke(&config, &["list"]).unwrap();

    invoke(&config, &["delete-snapshot", "file"]).unwrap();
    assert_eq!(count(&db), 2);

    invoke(&config, &["compact", "1"]).unwrap();
    assert_eq!(count(&db), 1);
    assert!(!dir.path().join("state.db.lock").exists());

    invoke(&config, &["rollback", "0"]).unwrap();
    assert_eq!(count(&db), 0);
}

#[test]
fn errors_command_fails_when_a_job_errors_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt");
    let config = setup(dir.path(), &missing);

    let err = invoke(&config, &["errors"]).unwrap_err();
    assert!(err.to_string().contains("reported errors"));

    fs::write(&missing, "now here\n").unwrap();
    invoke(&config, &["errors"]).unwrap();
    let key = format!("cat {}", missing.display());
    let history = SqliteStore::open(dir.path().join("state.db"))
        .unwrap()
        .load_history(&key, 0)
        .unwrap();
    assert!(history.is_empty());
}

#[test]
fn maintenance_refuses_to_run_while_locked() {
    let dir = tempfile::tempdir().unwrap();
    let body = dir.path().join("body.txt");
    fs::write(&body, "x\n").unwrap();
    let config = setup(dir.path(), &body);

    fs::write(dir.path().join("state.db.lock"), "12345\n").unwrap();
    let err = invoke(&config, &["gc"]).unwrap_err();
    assert!(err.to_string().contains("maintenance"));
}

#[test]
fn test_command_prints_without_storing() {
    let dir = tempfile::tempdir().unwrap();
    let body = dir.path().join("body.txt");
    fs::write(&body, "preview\n").unwrap();
    let config = setup(dir.path(), &body);

    invoke(&config, &["test", "1"]).unwrap();
    let key = format!("cat {}", body.display());
    let store = SqliteStore::open(dir.path().join("state.db")).unwrap();
    assert!(store.load(&key).unwrap().is_none());
}
