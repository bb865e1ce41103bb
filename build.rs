//! Stamps the binary with the git state so `darkroom --version` can tell a
//! tagged release apart from a dev build.

fn main() {
    // Pick up new commits and branch switches without a clean build
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");

    let short_hash = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_default();
    // Exact tag match means this commit is a release
    let on_tag = git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some();

    println!("cargo:rustc-env=GIT_HASH={short_hash}");
    println!("cargo:rustc-env=ON_RELEASE_TAG={on_tag}");
}

/// Trimmed stdout of a git invocation, `None` outside a repo or on failure.
fn git(args: &[&str]) -> Option<String> {
    let output = std::process::Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
