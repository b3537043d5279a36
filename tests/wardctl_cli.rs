use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn add_then_list_then_remove() {
    let config_dir = tempfile::tempdir().unwrap();
    let messages_dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("wardctl")
        .unwrap()
        .args([
            "--config-dir",
            config_dir.path().to_str().unwrap(),
            "--messages-dir",
            messages_dir.path().to_str().unwrap(),
            "add",
            "myproc",
            "--",
            "/bin/true",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("added"));

    assert!(config_dir.path().join("myproc").exists());

    Command::cargo_bin("wardctl")
        .unwrap()
        .args([
            "--config-dir",
            config_dir.path().to_str().unwrap(),
            "--messages-dir",
            messages_dir.path().to_str().unwrap(),
            "list",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("myproc"));

    Command::cargo_bin("wardctl")
        .unwrap()
        .args([
            "--config-dir",
            config_dir.path().to_str().unwrap(),
            "--messages-dir",
            messages_dir.path().to_str().unwrap(),
            "remove",
            "myproc",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("removed"));

    assert!(!config_dir.path().join("myproc").exists());
}

#[test]
fn add_with_env_and_env_inherit_writes_them_into_the_spec() {
    let config_dir = tempfile::tempdir().unwrap();
    let messages_dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("wardctl")
        .unwrap()
        .args([
            "--config-dir",
            config_dir.path().to_str().unwrap(),
            "--messages-dir",
            messages_dir.path().to_str().unwrap(),
            "add",
            "myproc",
            "--env",
            "FOO=bar",
            "--env-inherit",
            "PATH",
            "--",
            "/bin/true",
        ])
        .assert()
        .success();

    let raw = std::fs::read_to_string(config_dir.path().join("myproc")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["env"]["FOO"], "bar");
    assert_eq!(parsed["env_inherit"][0], "PATH");
}

#[test]
fn add_with_extras_merges_the_json_file_into_the_spec() {
    let config_dir = tempfile::tempdir().unwrap();
    let messages_dir = tempfile::tempdir().unwrap();
    let extras_dir = tempfile::tempdir().unwrap();
    let extras_path = extras_dir.path().join("extras.json");
    std::fs::write(
        &extras_path,
        r#"{"beatcheck": {"status": "status", "period": 10, "grace": 2}}"#,
    )
    .unwrap();

    Command::cargo_bin("wardctl")
        .unwrap()
        .args([
            "--config-dir",
            config_dir.path().to_str().unwrap(),
            "--messages-dir",
            messages_dir.path().to_str().unwrap(),
            "add",
            "myproc",
            "--extras",
            extras_path.to_str().unwrap(),
            "--",
            "/bin/true",
        ])
        .assert()
        .success();

    let raw = std::fs::read_to_string(config_dir.path().join("myproc")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["beatcheck"]["period"], 10);
}

#[test]
fn restart_unknown_name_fails_with_suggestion() {
    let config_dir = tempfile::tempdir().unwrap();
    let messages_dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("wardctl")
        .unwrap()
        .args([
            "--config-dir",
            config_dir.path().to_str().unwrap(),
            "--messages-dir",
            messages_dir.path().to_str().unwrap(),
            "add",
            "postgres",
            "--",
            "/bin/true",
        ])
        .assert()
        .success();

    Command::cargo_bin("wardctl")
        .unwrap()
        .args([
            "--config-dir",
            config_dir.path().to_str().unwrap(),
            "--messages-dir",
            messages_dir.path().to_str().unwrap(),
            "restart",
            "postgre",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("postgres"));
}

#[test]
fn restart_all_writes_a_message_file() {
    let config_dir = tempfile::tempdir().unwrap();
    let messages_dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("wardctl")
        .unwrap()
        .args([
            "--config-dir",
            config_dir.path().to_str().unwrap(),
            "--messages-dir",
            messages_dir.path().to_str().unwrap(),
            "restart-all",
        ])
        .assert()
        .success();

    let entries: Vec<_> = std::fs::read_dir(messages_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(entries.len(), 1);
}
