use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    vault: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let vault = base.join("vault");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        seed_vault(&vault);

        Self {
            _temp_dir: temp_dir,
            home,
            vault,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn log_path(&self) -> PathBuf {
        self.xdg_data.join("weeknotes/summaries.jsonl")
    }

    fn reports_dir(&self) -> PathBuf {
        self.xdg_data.join("weeknotes/reports")
    }
}

fn seed_vault(vault: &Path) {
    let notes = [
        ("Projects/parser-design.md", "# Parser design\n\nTokenizer is done.\n"),
        ("Daily/2026-10-12.md", "Standup notes\n- reviewed parser\n"),
        ("inbox.md", "Call the dentist\n"),
        (".obsidian/workspace.md", "editor state\n"),
    ];
    for (rel, content) in notes {
        let path = vault.join(rel);
        fs::create_dir_all(path.parent().expect("missing note parent"))
            .expect("failed to create vault directories");
        fs::write(path, content).expect("failed to write note");
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("weeknotes"));

    Command::new(bin_path)
        .arg("--vault")
        .arg(&env.vault)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("LINEAR_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute weeknotes: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    assert!(
        output.status.success(),
        "weeknotes {:?} failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
        args,
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_scan_summarizes_vault_once() {
    let env = CliTestEnv::new();

    let args = ["scan"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(stdout(&output).contains("Summaries added: 3"));

    let log = fs::read_to_string(env.log_path()).expect("summary log missing");
    assert_eq!(log.lines().count(), 3);
    assert!(!log.contains("workspace.md"));

    // Nothing changed, nothing appended
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(stdout(&output).contains("Summaries added: 0"));
    let log = fs::read_to_string(env.log_path()).expect("summary log missing");
    assert_eq!(log.lines().count(), 3);
}

#[test]
fn test_report_after_scan_writes_and_reuses_artifact() {
    let env = CliTestEnv::new();
    assert_success(&["scan"], &run_bin(&env, &["scan"]));

    let args = ["report"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(stdout(&output).contains("Summaries: 3"));
    assert!(stdout(&output).contains("Written:"));

    let artifacts: Vec<_> = fs::read_dir(env.reports_dir())
        .expect("reports dir missing")
        .map(|e| e.expect("bad dir entry").path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    assert_eq!(artifacts.len(), 1);
    let markdown = fs::read_to_string(&artifacts[0]).expect("report unreadable");
    assert!(markdown.starts_with("# Weekly Review: "));
    assert!(markdown.contains("(end exclusive)"));
    assert!(markdown.contains("### Projects"));

    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(stdout(&output).contains("Unchanged since last build"));
}

#[test]
fn test_status_reports_log_and_watermark() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);
    assert!(stdout(&output).contains("Records:   0"));
    assert!(stdout(&output).contains("Watermark: none"));

    assert_success(&["scan"], &run_bin(&env, &["scan"]));

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);
    assert!(stdout(&output).contains("Records:   3"));
    assert!(!stdout(&output).contains("Watermark: none"));
}

#[test]
fn test_preview_is_read_only() {
    let env = CliTestEnv::new();

    let args = ["preview", "--days", "3"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    let out = stdout(&output);
    assert!(out.contains("Found 3 modified note(s) in the last 3 day(s)."));
    assert!(out.contains("Projects/parser-design.md"));
    assert!(out.contains("Content Snippet:"));
    assert!(!env.log_path().exists());
}

#[test]
fn test_publish_without_credentials_fails_cleanly() {
    let env = CliTestEnv::new();
    assert_success(&["report"], &run_bin(&env, &["report"]));

    let output = run_bin(&env, &["publish"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("LINEAR_API_KEY"));
}

#[test]
fn test_missing_vault_is_an_error() {
    let env = CliTestEnv::new();
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("weeknotes"));

    let output = Command::new(bin_path)
        .arg("scan")
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .expect("failed to execute weeknotes");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no vault configured"));
}
