use assert_cmd::Command;

fn ptysh(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("ptysh").unwrap();
    cmd.env("HOME", home).env_remove("RUST_LOG");
    cmd
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn help_lists_subcommands() {
    let home = tempfile::tempdir().unwrap();
    let assert = ptysh(home.path()).arg("--help").assert().success();
    let out = stdout_of(assert.get_output());
    assert!(out.contains("shell"));
    assert!(out.contains("relay"));
}

#[test]
fn relay_prints_program_output() {
    let home = tempfile::tempdir().unwrap();
    let assert = ptysh(home.path())
        .args(["relay", "--", "/bin/sh", "-c", "echo relay-ok"])
        .write_stdin("")
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success();
    let out = stdout_of(assert.get_output());
    assert!(out.contains("relay-ok"), "unexpected output: {out:?}");
}

#[test]
fn relay_forwards_stdin_to_program() {
    let home = tempfile::tempdir().unwrap();
    let assert = ptysh(home.path())
        .args(["relay", "--", "/bin/sh", "-c", "read line; echo got-$line"])
        .write_stdin("ping\n")
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success();
    let out = stdout_of(assert.get_output());
    assert!(out.contains("got-ping"), "unexpected output: {out:?}");
}

#[test]
fn relay_json_ends_with_closed_event() {
    let home = tempfile::tempdir().unwrap();
    let assert = ptysh(home.path())
        .args(["relay", "--json", "--", "/bin/sh", "-c", "echo json-ok"])
        .write_stdin("")
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success();
    let out = stdout_of(assert.get_output());
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.last(), Some(&r#"{"type":"closed"}"#));
    let events: Vec<serde_json::Value> = lines
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let text: String = events
        .iter()
        .filter(|e| e["type"] == "output")
        .map(|e| e["data"].as_str().unwrap().to_string())
        .collect();
    assert!(text.contains("json-ok"), "unexpected events: {out}");
}

#[test]
fn relay_uses_command_from_config() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("custom.toml");
    std::fs::write(
        &path,
        "[session]\ncommand = [\"/bin/sh\", \"-c\", \"echo from-config\"]\n",
    )
    .unwrap();
    let assert = ptysh(home.path())
        .args(["--config", path.to_str().unwrap(), "relay"])
        .write_stdin("")
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success();
    let out = stdout_of(assert.get_output());
    assert!(out.contains("from-config"), "unexpected output: {out:?}");
}

#[test]
fn relay_applies_window_size_flags() {
    let home = tempfile::tempdir().unwrap();
    let assert = ptysh(home.path())
        .args(["--rows", "33", "--cols", "101", "relay", "--", "/bin/sh", "-c", "stty size"])
        .write_stdin("")
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success();
    let out = stdout_of(assert.get_output());
    assert!(out.contains("33 101"), "unexpected output: {out:?}");
}

#[test]
fn missing_program_fails() {
    let home = tempfile::tempdir().unwrap();
    let assert = ptysh(home.path())
        .args(["relay", "--", "/nonexistent/program"])
        .write_stdin("")
        .assert()
        .failure()
        .code(1);
    let err = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(err.contains("ptysh:"), "unexpected stderr: {err:?}");
}

#[test]
fn shell_requires_a_terminal() {
    let home = tempfile::tempdir().unwrap();
    let assert = ptysh(home.path())
        .args(["shell", "--", "/bin/sh", "-c", "exit 0"])
        .write_stdin("")
        .assert()
        .failure();
    let err = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(err.contains("not a terminal"), "unexpected stderr: {err:?}");
}

#[test]
fn malformed_config_fails() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("bad.toml");
    std::fs::write(&path, "[session\n").unwrap();
    ptysh(home.path())
        .args(["--config", path.to_str().unwrap(), "relay", "--", "/bin/true"])
        .write_stdin("")
        .assert()
        .failure();
}
