//! End-to-end container lifecycle against a real on-disk layout.

#![cfg(unix)]

use std::fs;
use std::path::Path;

use asubox::fetch::VersionPin;
use asubox::service::App;
use asubox::sweeper;
use asubox_core::config::PathsConfig;
use asubox_store::{ContainerStatus, DEFAULT_LOG_PAGE_SIZE};

fn test_app(root: &Path) -> App {
    let paths = PathsConfig {
        storage_dir: root.join("storage"),
        sandbox_dir: root.join("sandbox"),
        db_path: root.join("meta.db"),
    };
    App::with_paths(&paths).unwrap()
}

fn seed_source(root: &Path) -> std::path::PathBuf {
    let src = root.join("checkout").join("demo");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("hello.sh"), "echo hello from container\n").unwrap();
    fs::write(src.join("readme.md"), "# demo\n").unwrap();
    src
}

#[test]
fn create_execute_and_delete() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path());
    let src = seed_source(root.path());

    let record = app
        .register(
            &src,
            "https://example.com/demo.git",
            Some(VersionPin::Branch("main".to_string())),
            true,
        )
        .unwrap();
    assert_eq!(record.id.len(), 64);
    assert_eq!(record.status, ContainerStatus::Active);
    assert!(app.archives.exists(&record.id));

    let output = app
        .execute(&record.id, "sh", &["hello.sh".to_string()], None, false)
        .unwrap();
    assert_eq!(output.exit_code, 0);
    assert!(output.stdout.contains("hello from container"));

    // The run left a stats row, a last-accessed stamp and log chunks.
    let (info, executions) = app.info(&record.id).unwrap();
    assert!(info.last_accessed.is_some());
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].exit_code, 0);
    let logs = app
        .store
        .get_logs(&record.id, 1, DEFAULT_LOG_PAGE_SIZE)
        .unwrap();
    assert!(logs.iter().any(|l| l.message.contains("hello from container")));

    app.delete(&record.id).unwrap();
    assert!(!app.archives.exists(&record.id));
    let (info, _) = app.info(&record.id).unwrap();
    assert_eq!(info.status, ContainerStatus::Deleted);

    // Deleted containers reject further work.
    assert!(app
        .execute(&record.id, "sh", &["hello.sh".to_string()], None, false)
        .is_err());
}

#[test]
fn denylisted_command_is_rejected_before_touching_the_container() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path());
    let src = seed_source(root.path());
    let record = app
        .register(&src, "https://example.com/demo.git", None, true)
        .unwrap();

    let err = app
        .execute(&record.id, "rm", &["-rf".to_string(), "/".to_string()], None, false)
        .unwrap_err();
    assert!(err.to_string().contains("rm"));
    let (info, executions) = app.info(&record.id).unwrap();
    assert!(info.last_accessed.is_none());
    assert!(executions.is_empty());
}

#[test]
fn env_overrides_reach_the_command() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path());
    let src = seed_source(root.path());
    let record = app
        .register(&src, "https://example.com/demo.git", None, true)
        .unwrap();

    app.set_env(&record.id, "GREETING", "bonjour").unwrap();
    assert!(app.set_env(&record.id, "BAD NAME", "x").is_err());

    let output = app
        .execute(&record.id, "printenv", &["GREETING".to_string()], None, false)
        .unwrap();
    assert_eq!(output.stdout.trim(), "bonjour");
}

#[test]
fn expired_containers_are_swept_once() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path());
    let src = seed_source(root.path());
    let record = app
        .register(&src, "https://example.com/demo.git", None, true)
        .unwrap();

    // Age the record past its window.
    let conn_rec = app.store.get_by_id(&record.id).unwrap().unwrap();
    assert_eq!(conn_rec.status, ContainerStatus::Active);
    let mut aged = conn_rec;
    aged.id = format!("{}x", &record.id[..63]);
    aged.expires_at = asubox_core::ts_in_days(-1);
    app.store.insert(&aged).unwrap();

    let (swept, failed) = sweeper::sweep_once(&app.store, &app.archives).unwrap();
    assert_eq!((swept, failed), (1, 0));
    assert_eq!(
        app.store.get_by_id(&aged.id).unwrap().unwrap().status,
        ContainerStatus::Expired
    );
    assert_eq!(
        app.store.get_by_id(&record.id).unwrap().unwrap().status,
        ContainerStatus::Active
    );

    let (swept, failed) = sweeper::sweep_once(&app.store, &app.archives).unwrap();
    assert_eq!((swept, failed), (0, 0));
}
