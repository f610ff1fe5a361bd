//! Integration tests for the `wayvpn` CLI binary.
//!
//! Every test runs against its own temporary config and store file, so
//! nothing touches the user's real catalog or keyring.
#![allow(clippy::unwrap_used)]

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

const DESCRIPTOR_A: &str = "trojan://pw@a.example.com:443#Alpha";
const DESCRIPTOR_B: &str = "trojan://pw@b.example.com:443#Bravo";

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn store_path(&self) -> PathBuf {
        self.dir.path().join("store.json")
    }

    /// A `wayvpn` command isolated to this sandbox.
    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("wayvpn");
        cmd.env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.dir.path().join("xdg-config"))
            .env("XDG_DATA_HOME", self.dir.path().join("xdg-data"))
            .env("WAYVPN_CONFIG", self.config_path())
            .env("WAYVPN_STORAGE__PATH", self.store_path())
            .env("NO_COLOR", "1")
            .env_remove("WAYVPN_OUTPUT")
            .env_remove("WAYVPN_STORAGE__BACKEND")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Run a command expected to succeed and return its trimmed stdout.
    fn stdout(&self, args: &[&str]) -> String {
        let output = self.cmd().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "{args:?} failed:\n{}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap().trim().to_owned()
    }
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let sandbox = Sandbox::new();
    let output = sandbox.cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    Sandbox::new().cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("profiles")
            .and(predicate::str::contains("subscriptions"))
            .and(predicate::str::contains("session"))
            .and(predicate::str::contains("parse")),
    );
}

#[test]
fn test_completions_zsh() {
    Sandbox::new()
        .cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_invalid_output_format() {
    Sandbox::new()
        .cmd()
        .args(["--output", "xml", "profiles", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("possible values").or(predicate::str::contains("invalid")));
}

// ── Parse ───────────────────────────────────────────────────────────

#[test]
fn test_parse_prints_profile() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["parse", DESCRIPTOR_A])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Alpha")
                .and(predicate::str::contains("trojan"))
                .and(predicate::str::contains("a.example.com:443")),
        );

    let id = sandbox.stdout(&["-o", "plain", "parse", DESCRIPTOR_A]);
    assert_eq!(id.len(), 16);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

    // Surrounding whitespace does not change identity.
    let padded = format!("  {DESCRIPTOR_A}\n");
    assert_eq!(sandbox.stdout(&["-o", "plain", "parse", &padded]), id);
}

#[test]
fn test_parse_unknown_scheme_is_usage_error() {
    Sandbox::new()
        .cmd()
        .args(["parse", "gopher://example.com:70"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unsupported scheme"));
}

// ── Profiles ────────────────────────────────────────────────────────

#[test]
fn test_local_group_lifecycle() {
    let sandbox = Sandbox::new();

    let home = sandbox.stdout(&["-o", "plain", "profiles", "add-local", "Home", DESCRIPTOR_A]);
    let work = sandbox.stdout(&["-o", "plain", "profiles", "add-local", "Work"]);
    assert_ne!(home, work);

    // First group created is the active one.
    let listed = sandbox.stdout(&["-o", "json", "profiles", "list"]);
    let groups: serde_json::Value = serde_json::from_str(&listed).unwrap();
    assert_eq!(groups.as_array().unwrap().len(), 2);
    assert_eq!(groups[0]["name"], "Home");
    assert_eq!(groups[0]["isActive"], true);
    assert_eq!(groups[1]["isActive"], false);

    // Importing the same descriptor twice adds it once.
    sandbox.stdout(&["profiles", "import", &work, DESCRIPTOR_B, DESCRIPTOR_B]);
    sandbox.stdout(&["profiles", "import", "Work", DESCRIPTOR_B]);
    let servers = sandbox.stdout(&["-o", "plain", "profiles", "show", &work]);
    assert_eq!(servers.lines().count(), 1);

    sandbox.stdout(&["profiles", "activate", "Work"]);
    sandbox.stdout(&["profiles", "rename", &work, "Office"]);
    sandbox
        .cmd()
        .args(["profiles", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Office (active)").and(predicate::str::contains("Bravo")));

    sandbox.stdout(&["-y", "profiles", "delete", &work]);
    let remaining = sandbox.stdout(&["-o", "plain", "profiles", "list"]);
    assert_eq!(remaining, home);
}

#[test]
fn test_add_local_from_file() {
    let sandbox = Sandbox::new();
    let list = sandbox.dir.path().join("servers.txt");
    std::fs::write(&list, format!("# mine\n{DESCRIPTOR_A}\n\n{DESCRIPTOR_B}\n")).unwrap();

    let id = sandbox.stdout(&[
        "-o",
        "plain",
        "profiles",
        "add-local",
        "Imported",
        "--from-file",
        list.to_str().unwrap(),
    ]);
    let servers = sandbox.stdout(&["-o", "plain", "profiles", "show", &id]);
    assert_eq!(servers.lines().count(), 2);
}

#[test]
fn test_bad_descriptor_creates_nothing() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["profiles", "add-local", "Broken", DESCRIPTOR_A, "not-a-uri"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("descriptor 2"));
    assert_eq!(sandbox.stdout(&["-o", "plain", "profiles", "list"]), "");
}

#[test]
fn test_unknown_group_is_not_found() {
    Sandbox::new()
        .cmd()
        .args(["profiles", "show", "does-not-exist"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_delete_requires_confirmation_when_not_interactive() {
    let sandbox = Sandbox::new();
    let id = sandbox.stdout(&["-o", "plain", "profiles", "add-local", "Home"]);
    sandbox
        .cmd()
        .args(["profiles", "delete", &id])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
    assert_eq!(sandbox.stdout(&["-o", "plain", "profiles", "list"]), id);
}

#[test]
fn test_legacy_catalog_is_migrated_on_first_use() {
    let sandbox = Sandbox::new();
    let servers = serde_json::json!([
        { "raw": DESCRIPTOR_A },
        { "raw": DESCRIPTOR_B, "subscriptionUrl": "https://sub.example.com/list" },
    ])
    .to_string();
    let store = serde_json::json!({ "servers": servers }).to_string();
    std::fs::write(sandbox.store_path(), store).unwrap();

    let listed = sandbox.stdout(&["-o", "json", "profiles", "list"]);
    let groups: serde_json::Value = serde_json::from_str(&listed).unwrap();
    assert_eq!(groups[0]["name"], "My Servers");
    assert_eq!(groups[1]["name"], "sub.example.com");

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(sandbox.store_path()).unwrap()).unwrap();
    assert!(on_disk.get("servers").is_none());
    assert!(on_disk.get("catalog").is_some());
}

// ── Subscriptions ───────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_group_and_sweep() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sub"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "{DESCRIPTOR_A}\n{DESCRIPTOR_B}\n"
        )))
        .mount(&server)
        .await;
    let url = format!("{}/sub", server.uri());

    let sandbox = Sandbox::new();
    let id = sandbox.stdout(&["-o", "plain", "profiles", "add-remote", &url, "--name", "Provider"]);
    let servers = sandbox.stdout(&["-o", "plain", "profiles", "show", &id]);
    assert_eq!(servers.lines().count(), 2);

    // Just refreshed, so the sweep leaves it alone.
    let swept = sandbox.stdout(&["-o", "plain", "subscriptions", "sweep"]);
    assert_eq!(swept, format!("fresh\t{url}"));

    let status = sandbox.stdout(&["-o", "json", "subscriptions", "status"]);
    let entries: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(entries[0]["group"], "Provider");
    assert_eq!(entries[0]["stale"], false);

    sandbox.stdout(&["subscriptions", "refresh", &url]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_fetch_stores_nothing() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["profiles", "add-remote", &format!("{}/sub", server.uri())])
        .assert()
        .code(7);
    assert_eq!(sandbox.stdout(&["-o", "plain", "profiles", "list"]), "");
}

// ── Session ─────────────────────────────────────────────────────────

#[test]
fn test_session_last_without_history() {
    Sandbox::new()
        .cmd()
        .args(["session", "last"])
        .assert()
        .code(4);
}

#[test]
fn test_session_clear_with_yes() {
    Sandbox::new()
        .cmd()
        .args(["-y", "session", "clear"])
        .assert()
        .success();
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_init_show_and_path() {
    let sandbox = Sandbox::new();
    assert_eq!(
        sandbox.stdout(&["config", "path"]),
        sandbox.config_path().display().to_string()
    );

    sandbox.stdout(&["config", "init"]);
    assert!(sandbox.config_path().exists());
    sandbox
        .cmd()
        .args(["config", "init"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));
    sandbox.stdout(&["config", "init", "--force"]);

    sandbox
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_attempts = 5"));
}

#[test]
fn test_invalid_config_value_is_reported() {
    let sandbox = Sandbox::new();
    std::fs::write(sandbox.config_path(), "[reconnect]\nmax_attempts = 0\n").unwrap();
    sandbox
        .cmd()
        .args(["profiles", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_attempts"));
}
