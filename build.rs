use std::process::Command;

/// Embed `git describe` as GIT_VERSION so the server can report its build.
fn git_version() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--tags"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
    let version = git_version()
        .or_else(|| std::env::var("CARGO_PKG_VERSION").ok().map(|v| format!("v{}", v)))
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=GIT_VERSION={}", version);
}
