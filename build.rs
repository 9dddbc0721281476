//! Embeds the git commit reported by `/health`.
//!
//! Falls back to `"unknown"` when git is unavailable (e.g. Docker builds
//! without `.git`); `TELLTALE_GIT_SHORT_OVERRIDE` takes precedence.

use std::process::Command;

fn git_short() -> String {
    std::env::var("TELLTALE_GIT_SHORT_OVERRIDE")
        .ok()
        .filter(|s| !s.is_empty() && s != "unknown")
        .unwrap_or_else(|| {
            Command::new("git")
                .args(["rev-parse", "--short", "HEAD"])
                .output()
                .ok()
                .filter(|o| o.status.success())
                .and_then(|o| String::from_utf8(o.stdout).ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "unknown".into())
        })
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");
    println!("cargo:rerun-if-env-changed=TELLTALE_GIT_SHORT_OVERRIDE");
    println!("cargo:rustc-env=TELLTALE_GIT_SHORT={}", git_short());
}
