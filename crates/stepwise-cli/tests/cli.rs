//! End-to-end tests running the `stepwise` binary

use pretty_assertions::assert_eq;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn stepwise(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stepwise"))
        .args(args)
        .current_dir(cwd)
        .env_remove("STEPWISE_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("run stepwise")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    let output = stepwise(dir.path(), &["config", "show"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let text = stdout(&output);
    assert!(text.starts_with("# stepwise.toml (default)"));
    assert!(text.contains("[session]"));
    assert!(text.contains("step_timeout_ms"));
}

#[test]
fn test_config_show_reads_explicit_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[session]\nmax_stack_frames = 7\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_stepwise"))
        .args(["config", "show"])
        .current_dir(dir.path())
        .env("STEPWISE_CONFIG", &path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("max_stack_frames = 7"));
}

#[test]
fn test_logging_section_routes_logs_to_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("stepwise.toml"),
        "[logging]\nlevel = \"debug\"\nfile = \"logs/cli.log\"\n",
    )
    .unwrap();

    let output = stepwise(dir.path(), &["config", "show"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!stderr(&output).contains("Config loaded"));

    let logs: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
        .expect("log directory created")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("cli.log"))
        .collect();
    assert_eq!(logs.len(), 1);
    let text = std::fs::read_to_string(logs[0].path()).unwrap();
    assert!(text.contains("Config loaded"));
}

#[test]
fn test_config_check() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.toml");
    std::fs::write(&good, "[logging]\nlevel = \"debug\"\n").unwrap();
    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "[logging]\nlevel = \"loud\"\n").unwrap();

    let ok = stepwise(dir.path(), &["config", "check", good.to_str().unwrap()]);
    assert!(ok.status.success());
    assert!(stdout(&ok).starts_with("Configuration OK"));

    let failed = stepwise(dir.path(), &["config", "check", bad.to_str().unwrap()]);
    assert!(!failed.status.success());
    assert!(stderr(&failed).contains("Invalid configuration"));

    // No file in the working directory: strict check fails
    let missing = stepwise(dir.path(), &["config", "check"]);
    assert!(!missing.status.success());
}

#[test]
fn test_dry_run_describes_python_backend() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("app.py");
    std::fs::write(&target, "print('hi')\n").unwrap();

    let output = stepwise(
        dir.path(),
        &[
            "dry-run",
            "--language",
            "python",
            "--target",
            target.to_str().unwrap(),
            "--format",
            "json",
            "--",
            "--verbose",
        ],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert!(value["commandLine"]
        .as_str()
        .unwrap()
        .ends_with("-m debugpy.adapter"));
    assert_eq!(value["transport"], "stdio");
}

#[test]
fn test_dry_run_failures() {
    let dir = TempDir::new().unwrap();

    let missing = stepwise(
        dir.path(),
        &["dry-run", "--language", "python", "--target", "nope.py"],
    );
    assert!(!missing.status.success());
    assert!(stderr(&missing).contains("Debug target not found"));

    let unknown = stepwise(
        dir.path(),
        &["dry-run", "--language", "cobol", "--target", "nope.cbl"],
    );
    assert!(!unknown.status.success());
    assert!(stderr(&unknown).contains("cobol"));
}

#[test]
fn test_adapters_json_lists_builtin_languages() {
    let dir = TempDir::new().unwrap();
    let output = stepwise(dir.path(), &["adapters", "--format", "json"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let adapters: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
    let languages: Vec<&str> = adapters
        .iter()
        .filter_map(|a| a["language"].as_str())
        .collect();
    for language in ["python", "go", "rust", "javascript"] {
        assert!(languages.contains(&language), "missing {}", language);
    }
    for adapter in &adapters {
        let available = adapter["available"].as_bool().unwrap();
        let explained = adapter["installGuidance"].is_string()
            || !adapter["errors"].as_array().unwrap().is_empty();
        assert!(available || explained, "{}", adapter);
    }
}
