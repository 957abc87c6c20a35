//! Integration tests for the coursegate CLI
//!
//! Every test runs the built binary inside its own temporary working
//! directory with a `.coursegate` data directory, so nothing touches the
//! real home directory.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

const CATALOG: &str = r#"{
  "courses": [
    {
      "id": "c1",
      "title": "Camera Basics",
      "lessons": [
        {"id": "l0", "title": "Intro"},
        {"id": "l1", "title": "Exposure", "quiz": {
          "passing_score": 70,
          "questions": [
            {"type": "multiple_choice", "prompt": "Aperture?", "options": ["f-stop", "iso"], "correct": 0},
            {"type": "multiple_choice", "prompt": "Shutter?", "options": ["time", "size"], "correct": 0}
          ]
        }},
        {"id": "l2", "title": "Light"}
      ]
    }
  ]
}"#;

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_coursegate"))
}

/// Temporary workspace with an initialized data directory and catalog
fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join(".coursegate")).unwrap();
    let (ok, _, stderr) = run(temp.path(), &["init"]);
    assert!(ok, "init failed: {}", stderr);
    std::fs::write(temp.path().join(".coursegate/catalog.json"), CATALOG).unwrap();
    temp
}

/// Run coursegate and return (success, stdout, stderr)
fn run(cwd: &Path, args: &[&str]) -> (bool, String, String) {
    let output = Command::new(binary())
        .args(args)
        .current_dir(cwd)
        .env("HOME", cwd)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute coursegate");

    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

fn status_json(cwd: &Path) -> serde_json::Value {
    let (ok, stdout, stderr) = run(cwd, &["status", "--json"]);
    assert!(ok, "status failed: {}", stderr);
    serde_json::from_str(&stdout).unwrap()
}

#[test]
fn test_version() {
    let temp = TempDir::new().unwrap();
    let (ok, stdout, _) = run(temp.path(), &["--version"]);
    assert!(ok);
    assert!(stdout.contains("coursegate"));
}

#[test]
fn test_init_creates_data_files() {
    let temp = workspace();
    let data = temp.path().join(".coursegate");
    assert!(data.join("config.toml").exists());
    assert!(data.join("state.sqlite").exists());
    assert!(data.join("catalog.json").exists());
}

#[test]
fn test_gating_flow() {
    let temp = workspace();
    let cwd = temp.path();

    let (_, stdout, _) = run(cwd, &["select", "c1", "l1"]);
    assert!(stdout.contains("locked"));

    run(cwd, &["duration", "l0", "600"]);
    let (ok, stdout, stderr) = run(cwd, &["ended", "l0"]);
    assert!(ok, "ended failed: {}", stderr);
    assert!(stdout.contains("Lesson l0 watched"));

    let (_, stdout, _) = run(cwd, &["select", "c1", "l1"]);
    assert!(stdout.contains("Selected l1"));

    let (ok, stdout, stderr) = run(cwd, &["submit", "c1", "l1", "0", "0"]);
    assert!(ok, "submit failed: {}", stderr);
    assert!(stdout.contains("Passed with 100%"));

    let (_, stdout, _) = run(cwd, &["submit", "c1", "l1", "0", "0"]);
    assert!(stdout.contains("already taken"));

    let status = status_json(cwd);
    assert_eq!(status["courses"][0]["percentage"], 67);
    assert_eq!(status["courses"][0]["completed"], 2);

    let (_, stdout, _) = run(cwd, &["lessons", "c1"]);
    assert!(stdout.contains("quiz 100%"));
}

#[test]
fn test_submit_to_locked_quiz_fails() {
    let temp = workspace();
    let (ok, _, stderr) = run(temp.path(), &["submit", "c1", "l1", "0", "0"]);
    assert!(!ok);
    assert!(stderr.contains("locked"));
}

#[test]
fn test_ended_on_locked_lesson_fails() {
    let temp = workspace();
    let cwd = temp.path();
    run(cwd, &["duration", "l0", "600"]);
    run(cwd, &["ended", "l0"]);
    run(cwd, &["submit", "c1", "l1", "1", "1"]);

    let (ok, stdout, stderr) = run(cwd, &["ended", "l2"]);
    assert!(!ok);
    assert!(stderr.contains("locked"));
    assert!(!stdout.contains("watched"));
    assert_eq!(status_json(cwd)["courses"][0]["completed"], 1);
}

#[test]
fn test_watch_reads_samples_from_stdin() {
    let temp = workspace();

    let mut child = Command::new(binary())
        .args(["watch", "c1", "l0"])
        .current_dir(temp.path())
        .env("HOME", temp.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, r#"{{"kind": "duration", "lesson_id": "l0", "duration": 600.0}}"#).unwrap();
        for p in (0..=560).step_by(20) {
            writeln!(stdin, r#"{{"kind": "position", "lesson_id": "l0", "position": {}}}"#, p).unwrap();
        }
        writeln!(stdin, "garbage line").unwrap();
        // l2 sits behind the unanswered quiz
        writeln!(stdin, r#"{{"kind": "ended", "lesson_id": "l2"}}"#).unwrap();
    }
    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Lesson l0 watched"));
    assert!(!stdout.contains("Lesson l2 watched"));

    let status = status_json(temp.path());
    assert_eq!(status["courses"][0]["percentage"], 33);
    assert_eq!(status["courses"][0]["completed"], 1);
}

#[test]
fn test_certificate_export() {
    let temp = workspace();
    let cwd = temp.path();
    std::fs::write(
        cwd.join(".coursegate/catalog.json"),
        r#"{"courses": [{"id": "q", "title": "Quick", "lessons": [
            {"id": "only", "quiz": {"questions": [
                {"type": "multiple_choice", "prompt": "?", "options": ["a", "b"], "correct": 1}
            ]}}
        ]}]}"#,
    )
    .unwrap();

    let (_, stdout, _) = run(cwd, &["submit", "q", "only", "1"]);
    assert!(stdout.contains("Course complete"));
    assert!(stdout.contains("Certificate"));

    let export = cwd.join("certs.json");
    let (ok, _, _) = run(cwd, &["certificates", "--export", export.to_str().unwrap()]);
    assert!(ok);
    let certs: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(certs.as_array().unwrap().len(), 1);
    assert_eq!(certs[0]["learner_name"], "Learner");
}

#[test]
fn test_reset_requires_confirmation() {
    let temp = workspace();
    let cwd = temp.path();
    run(cwd, &["duration", "l0", "100"]);
    run(cwd, &["ended", "l0"]);

    let (_, stdout, _) = run(cwd, &["reset"]);
    assert!(stdout.contains("--yes"));
    assert_eq!(status_json(cwd)["courses"][0]["completed"], 1);

    let (ok, _, _) = run(cwd, &["reset", "--yes"]);
    assert!(ok);
    assert_eq!(status_json(cwd)["courses"][0]["completed"], 0);
}

#[test]
fn test_file_mirror_push_and_pull() {
    let mirror_dir = TempDir::new().unwrap();
    let mirror = mirror_dir.path().join("mirror.json");
    let config = format!(
        "[sync.backend]\ntype = \"file\"\npath = {:?}\n",
        mirror.to_str().unwrap()
    );

    let first = workspace();
    std::fs::write(first.path().join(".coursegate/config.toml"), &config).unwrap();
    run(first.path(), &["duration", "l0", "300"]);
    run(first.path(), &["ended", "l0"]);
    let (ok, stdout, stderr) = run(first.path(), &["sync", "push"]);
    assert!(ok, "push failed: {}", stderr);
    assert!(stdout.contains("Pushed 1 courses"));

    let second = workspace();
    std::fs::write(second.path().join(".coursegate/config.toml"), &config).unwrap();
    let (ok, stdout, stderr) = run(second.path(), &["sync", "pull"]);
    assert!(ok, "pull failed: {}", stderr);
    assert!(stdout.contains("Lessons marked watched: 1"));

    let (_, stdout, _) = run(second.path(), &["select", "c1", "l1"]);
    assert!(stdout.contains("Selected l1"));
}

#[test]
fn test_sync_without_mirror() {
    let temp = workspace();
    let (ok, stdout, _) = run(temp.path(), &["sync", "pull"]);
    assert!(ok);
    assert!(stdout.contains("No mirror configured"));
}
