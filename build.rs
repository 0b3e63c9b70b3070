//! Build script embedding the git revision for the status endpoint.
//!
//! Falls back to `"unknown"` when git is unavailable (e.g. Docker builds
//! without `.git`); `CONSUL_INGRESS_GIT_SHORT_OVERRIDE` wins when set.

use std::process::Command;

fn git_short() -> String {
    std::env::var("CONSUL_INGRESS_GIT_SHORT_OVERRIDE")
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
    println!("cargo:rerun-if-env-changed=CONSUL_INGRESS_GIT_SHORT_OVERRIDE");

    println!("cargo:rustc-env=CONSUL_INGRESS_GIT_SHORT={}", git_short());
}
