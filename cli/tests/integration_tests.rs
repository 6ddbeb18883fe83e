use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{Value, json};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create fixture dir");
    }
    fs::write(&path, contents).expect("failed to write fixture");
    path
}

fn multiplex(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_multiplex"))
        .args(args)
        .env_remove("MULTIPLEX_LOG")
        .output()
        .expect("failed to run multiplex")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

/// A training config with a declarative `train` subprogram.
fn project() -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    write(
        dir.path(),
        "experiment.yaml",
        r#"lr: 0.1
model:
  depth: 3
argparse:
  parser:
    description: Toy experiment
  arguments:
    - name_or_flags: ["-v", "--verbose"]
      action: count
subprograms:
  train: programs/train
"#,
    );
    write(dir.path(), "programs/train.yaml", "epochs: 5\n");
    write(dir.path(), "programs/database.yaml", "host: localhost\nport: 5432\n");
    dir
}

fn standalone() -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    write(dir.path(), "app.yaml", "lr: 0.1\nmodel:\n  depth: 3\n");
    write(dir.path(), "database.yaml", "host: localhost\nport: 5432\n");
    dir
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

#[test]
fn show_merges_arguments_over_defaults() {
    let dir = standalone();
    let config = dir.path().join("app");
    let output = multiplex(&[
        "show",
        config.to_str().unwrap(),
        "--",
        "--lr",
        "0.5",
        "--database.port=5433",
    ]);
    assert_eq!(
        stdout_json(&output),
        json!({
            "config": {"lr": 0.5, "model": {"depth": 3}},
            "residual": {"database": {"port": 5433}},
        })
    );
}

#[test]
fn show_resolves_residual_keys() {
    let dir = standalone();
    let config = dir.path().join("app.yaml");
    let output = multiplex(&["show", "--resolve", config.to_str().unwrap(), "--", "--database.port=5433"]);
    let value = stdout_json(&output);
    assert_eq!(value["config"]["database"], json!({"host": "localhost", "port": 5433}));
    assert_eq!(value["residual"], json!({}));
}

#[test]
fn show_renders_yaml() {
    let dir = standalone();
    let config = dir.path().join("app");
    let output = multiplex(&["--format", "yaml", "show", config.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lr: 0.1"), "stdout: {stdout}");
    assert!(stdout.contains("depth: 3"), "stdout: {stdout}");
}

#[test]
fn show_help_exits_successfully() {
    let dir = standalone();
    let config = dir.path().join("app");
    let output = multiplex(&["show", config.to_str().unwrap(), "--", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--model.depth"), "stdout: {stdout}");
    assert!(stdout.contains("default parameters"), "stdout: {stdout}");
}

#[test]
fn show_ignores_subprogram_table() {
    let dir = project();
    let config = dir.path().join("experiment");
    let output = multiplex(&["show", config.to_str().unwrap(), "--", "--lr", "0.5"]);
    let value = stdout_json(&output);
    assert_eq!(value["config"]["lr"], json!(0.5));
    assert_eq!(value["config"]["subprograms"], json!(null));
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn run_selects_subprogram() {
    let dir = project();
    let config = dir.path().join("experiment");
    let output = multiplex(&[
        "run",
        config.to_str().unwrap(),
        "train",
        "--lr",
        "0.5",
        "--epochs",
        "7",
        "--database.port=5433",
    ]);
    let value = stdout_json(&output);
    assert_eq!(value["state"], json!("subprogram-selected"));
    assert_eq!(value["program"], json!("train"));
    assert_eq!(value["config"]["lr"], json!(0.5));
    assert_eq!(value["config"]["epochs"], json!(7));
    assert_eq!(value["config"]["verbose"], json!(null));
    assert_eq!(value["config"]["database"], json!({"host": "localhost", "port": 5433}));
}

#[test]
fn run_main_program() {
    let dir = project();
    let config = dir.path().join("experiment");
    let output = multiplex(&["run", config.to_str().unwrap(), "--", "-vv"]);
    let value = stdout_json(&output);
    assert_eq!(value["state"], json!("main-program-selected"));
    assert_eq!(value["program"], json!(null));
    assert_eq!(value["config"], json!({"lr": 0.1, "model": {"depth": 3}, "verbose": 2}));
}

#[test]
fn run_unknown_argument_is_a_usage_error() {
    let dir = standalone();
    let config = dir.path().join("app");
    let output = multiplex(&["run", config.to_str().unwrap(), "--", "--bogus"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--bogus"));
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[test]
fn check_prints_generated_help() {
    let dir = project();
    let config = dir.path().join("experiment");
    let output = multiplex(&["check", config.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Toy experiment"), "stdout: {stdout}");
    assert!(stdout.contains("subprograms"), "stdout: {stdout}");
    assert!(stdout.contains("--verbose"), "stdout: {stdout}");
}

#[test]
fn check_reports_unsupported_parser_keys() {
    let dir = TempDir::new().unwrap();
    let config = write(
        dir.path(),
        "bad.yaml",
        "argparse:\n  parser:\n    formatter_class: RawTextHelpFormatter\n",
    );
    let output = multiplex(&["check", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error:"), "stderr: {stderr}");
    assert!(stderr.contains("formatter_class"), "stderr: {stderr}");
}

#[test]
fn check_reports_broken_subprograms() {
    let dir = project();
    fs::remove_file(dir.path().join("programs/train.yaml")).unwrap();
    let config = dir.path().join("experiment");
    let output = multiplex(&["check", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("subprogram 'train'"));
}

#[test]
fn missing_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("absent");
    let output = multiplex(&["show", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load"));
}
