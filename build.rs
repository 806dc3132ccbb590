//! Embeds build metadata for `chat-client version`

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = git(&["rev-parse", "--short=8", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let git_dirty = match git(&["status", "--porcelain"]) {
        Some(status) if !status.is_empty() => "true",
        Some(_) => "false",
        None => "unknown",
    };
    let rustc_version = run("rustc", &["--version"]).unwrap_or_else(|| "unknown".to_string());

    let vars = [
        ("CHAT_CLIENT_GIT_HASH", git_hash),
        ("CHAT_CLIENT_GIT_DIRTY", git_dirty.to_string()),
        (
            "CHAT_CLIENT_BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("CHAT_CLIENT_TARGET", env_or_unknown("TARGET")),
        ("CHAT_CLIENT_PROFILE", env_or_unknown("PROFILE")),
        ("CHAT_CLIENT_RUSTC_VERSION", rustc_version),
    ];
    for (key, value) in vars {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

fn env_or_unknown(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| "unknown".to_string())
}

fn git(args: &[&str]) -> Option<String> {
    run("git", args)
}

/// Run a command and return its trimmed stdout when it succeeds
fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
}
