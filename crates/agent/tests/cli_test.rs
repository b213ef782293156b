//! CLI Integration Tests
//!
//! These run the built binary for commands that need no network: help
//! text, key generation and the session file.

use std::path::Path;
use std::process::{Command, Output};

fn run_agent(session: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_commity-agent"))
        .args(args)
        .env("COMMITY_SESSION_PATH", session)
        .env_remove("COMMITY_KEY")
        .output()
        .expect("failed to run commity-agent")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

// ════════════════════════════════════════════════════════════════════════════
// HELP TEXT
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn main_help_lists_commands() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = run_agent(&dir.path().join("s.json"), &["--help"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("Commity Agent CLI"));
    for cmd in ["key", "profile", "community", "proposal", "nft", "notifications", "logout"] {
        assert!(text.contains(cmd), "missing {}", cmd);
    }
}

#[test]
fn subcommand_help_works() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session = dir.path().join("s.json");
    for args in [
        &["proposal", "vote", "--help"][..],
        &["community", "join", "--help"][..],
        &["community", "members", "--help"][..],
        &["notifications", "watch", "--help"][..],
    ] {
        let out = run_agent(&session, args);
        assert!(out.status.success(), "{:?}", args);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// OFFLINE COMMANDS
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn key_generate_remember_then_logout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session = dir.path().join("session.json");

    let out = run_agent(&session, &["key", "generate", "--remember"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = stdout(&out);
    let address = text
        .lines()
        .find_map(|l| l.strip_prefix("address: "))
        .expect("address line")
        .to_string();
    assert!(address.starts_with("0x"));

    let saved = std::fs::read_to_string(&session).expect("session file");
    assert!(saved.contains(&address));
    assert!(!saved.contains("secret"));

    let out = run_agent(&session, &["logout"]);
    assert!(out.status.success());
    assert!(!session.exists());

    // idempotent
    let out = run_agent(&session, &["logout"]);
    assert!(out.status.success());
}

#[test]
fn signing_command_without_key_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = run_agent(&dir.path().join("s.json"), &["profile", "create", "nadolink"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("--key"));
}

#[test]
fn invalid_vote_is_rejected_by_parser() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = run_agent(&dir.path().join("s.json"), &["proposal", "vote", "0xc", "0x1", "maybe"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("expected yes, no or abstain"));
}
