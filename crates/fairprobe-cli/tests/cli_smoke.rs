use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use tempfile::TempDir;

fn fairprobe(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fairprobe").unwrap();
    cmd.current_dir(dir.path())
        .env("FAIRPROBE_DB", dir.path().join("audit.db"))
        .env("FAIRPROBE_LOG", "warn");
    cmd
}

/// Sample config with a rate limit loose enough for a test.
fn write_config(dir: &TempDir) -> std::path::PathBuf {
    fairprobe(dir).args(["init"]).assert().success();
    let path = dir.path().join("fairprobe.yaml");
    let raw = fs::read_to_string(&path).unwrap();
    fs::write(&path, raw.replace("max_calls: 10", "max_calls: 1000")).unwrap();
    path
}

#[test]
fn test_init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    fairprobe(&dir).args(["init"]).assert().success();
    fairprobe(&dir)
        .args(["init"])
        .assert()
        .code(2)
        .stderr(contains("already exists"));
    fairprobe(&dir).args(["init", "--force"]).assert().success();
}

#[test]
fn test_generate_prints_one_line_per_pair() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);
    let out = fairprobe(&dir).args(["generate"]).assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 20);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["probes"][0]["group"], "majority");
    assert_eq!(first["probes"][1]["group"], "minority");
}

#[test]
fn test_canned_run_analyze_and_purge() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);

    let out = fairprobe(&dir)
        .args(["run", "--out", "report.md", "--format", "md"])
        .assert()
        .success()
        .stderr(contains("completed"));
    let run_id = String::from_utf8(out.get_output().stdout.clone())
        .unwrap()
        .trim()
        .to_string();
    assert!(run_id.starts_with("name-origin-inquiry-"));

    let report = fs::read_to_string(dir.path().join("report.md")).unwrap();
    assert!(report.contains("No bias detected."));

    let out = fairprobe(&dir)
        .args(["runs", "--format", "json"])
        .assert()
        .success();
    let runs: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(runs[0]["id"], run_id.as_str());
    assert_eq!(runs[0]["status"], "completed");

    fairprobe(&dir)
        .args(["extract", "--run-id", &run_id])
        .assert()
        .success()
        .stderr(contains("for 40 responses"));
    fairprobe(&dir)
        .args(["analyze", "--run-id", &run_id, "--out", "report.json"])
        .assert()
        .code(0);
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("report.json")).unwrap()).unwrap();
    assert_eq!(json["run_id"], run_id.as_str());
    assert_eq!(json["responses"], 40);

    // replies are fresh, inside the sample's 90 day window
    fairprobe(&dir)
        .args(["purge", "--expire"])
        .assert()
        .success()
        .stderr(contains("Cleared raw text of 0 responses"));
    let snapshot = fairprobe(&dir)
        .args(["runs", "--format", "json"])
        .assert()
        .success();
    let runs: serde_json::Value =
        serde_json::from_slice(&snapshot.get_output().stdout).unwrap();
    assert_eq!(runs[0]["config_snapshot"]["retention"]["raw_text_days"], 90);

    fairprobe(&dir)
        .args(["purge", "--run-id", &run_id])
        .assert()
        .success()
        .stderr(contains("40 responses"));
    fairprobe(&dir)
        .args(["analyze", "--run-id", &run_id])
        .assert()
        .code(2)
        .stderr(contains("unknown run"));
}

#[test]
fn test_unknown_provider_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir);
    let raw = fs::read_to_string(&path).unwrap();
    fs::write(&path, raw.replace("provider: canned", "provider: telegraph")).unwrap();

    fairprobe(&dir)
        .args(["run"])
        .assert()
        .code(2)
        .stderr(contains("unknown backend provider"));
}

#[test]
fn test_missing_credentials_fail_before_run() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir);
    let raw = fs::read_to_string(&path).unwrap();
    fs::write(&path, raw.replace("provider: canned", "provider: openai")).unwrap();

    fairprobe(&dir)
        .env_remove("OPENAI_API_KEY")
        .args(["run"])
        .assert()
        .code(2)
        .stderr(contains("OPENAI_API_KEY"));
    fairprobe(&dir)
        .args(["runs"])
        .assert()
        .success()
        .stderr(contains("No runs"));
}

#[test]
fn test_redact_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "reach me at jane@example.org or 555-123-4567\n").unwrap();

    fairprobe(&dir)
        .args(["redact", path.to_str().unwrap(), "--kinds", "email"])
        .assert()
        .success()
        .stderr(contains("Redacted 1 matches"));
    let after = fs::read_to_string(&path).unwrap();
    assert_eq!(after, "reach me at [REDACTED] or 555-123-4567\n");

    fairprobe(&dir)
        .args(["redact", path.to_str().unwrap(), "--kinds", "fingerprint"])
        .assert()
        .code(2);
}
