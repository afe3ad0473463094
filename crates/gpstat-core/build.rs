use std::env;
use std::process::Command;

/// Revision embedded in `BUILD_VERSION`.
///
/// Packagers building outside a git checkout can set `GPSTAT_GIT_SHA`.
fn revision() -> String {
    if let Ok(sha) = env::var("GPSTAT_GIT_SHA")
        && !sha.trim().is_empty()
    {
        return sha.trim().to_string();
    }

    Command::new("git")
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|sha| sha.trim().to_string())
        .filter(|sha| !sha.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!("cargo:rustc-env=GIT_SHA={}", revision());
    println!("cargo:rerun-if-env-changed=GPSTAT_GIT_SHA");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs/");
}
