//! CLI integration tests for innergraph
//!
//! Each test gets its own config directory and database file, so none of
//! them needs network access or an API key.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// Fresh config dir pointing `database.path` inside it
    fn new() -> Self {
        let sandbox = Self {
            dir: TempDir::new().unwrap(),
        };
        let db_path = sandbox.dir.path().join("graph.db");
        sandbox
            .cmd()
            .args(["config", "set", "database.path"])
            .arg(&db_path)
            .assert()
            .success();
        sandbox
    }

    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("innergraph").unwrap();
        cmd.env("INNERGRAPH_CONFIG_DIR", self.dir.path().join("config"));
        cmd.env_remove("INNERGRAPH_API_KEY");
        cmd.env_remove("OPENAI_API_KEY");
        cmd.current_dir(self.dir.path());
        cmd
    }
}

#[test]
fn test_help_lists_commands() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tenant"))
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("wipe"));
}

#[test]
fn test_config_list_shows_defaults() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("retrieval.top_k = 5"))
        .stdout(predicate::str::contains("retrieval.max_hops = 2"))
        .stdout(predicate::str::contains("graph.tenant_policy = strict"))
        .stdout(predicate::str::contains("graph.db"));
}

#[test]
fn test_config_rejects_api_key() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["config", "set", "llm.api_key", "sk-test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("environment variable"));
}

#[test]
fn test_tenant_create_then_stats() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["tenant", "create", "u1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tenant 'u1' created."));

    sandbox
        .cmd()
        .args(["tenant", "create", "u1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    sandbox
        .cmd()
        .args(["stats", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tenants\": 1"))
        .stdout(predicate::str::contains("\"nodes\": 0"));
}

#[test]
fn test_tenant_list_and_delete() {
    let sandbox = Sandbox::new();

    sandbox.cmd().args(["tenant", "create", "alice"]).assert().success();

    sandbox
        .cmd()
        .args(["tenant", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice"));

    sandbox
        .cmd()
        .args(["tenant", "delete", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    sandbox
        .cmd()
        .args(["tenant", "delete", "alice", "--force"])
        .assert()
        .success();

    sandbox
        .cmd()
        .args(["tenant", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No tenants found."));
}

#[test]
fn test_wipe_unknown_tenant_reports_code() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["wipe", "--tenant", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E001"))
        .stderr(predicate::str::contains("innergraph tenant create ghost"));
}

#[test]
fn test_wipe_all_on_empty_store() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["wipe", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wiped"));
}

#[test]
fn test_ask_without_api_key_fails() {
    let sandbox = Sandbox::new();
    sandbox.cmd().args(["tenant", "create", "u1"]).assert().success();

    sandbox
        .cmd()
        .args(["ask", "u1", "what do I like?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E301"));
}
