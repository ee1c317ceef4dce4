use std::process::Command;

fn main() {
    let commit = head_commit().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=SAFEKEEP_GIT_HASH={commit}");
}

/// Short hash of the checked-out commit, if this is a git checkout.
fn head_commit() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short=12", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let hash = String::from_utf8(out.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}
