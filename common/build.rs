// Resolve the short commit hash at build time and expose BUILD_VERSION to the crate.

use std::process::Command;

fn main() {
    let commit_hash = match option_env!("POUW_COMMIT_HASH") {
        Some(hash) => hash.get(0..7).unwrap_or(hash).to_string(),
        None => match Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            // Not a git checkout, or git is not installed
            _ => "unknown".to_string(),
        },
    };

    let build_version = format!("{}-{}", env!("CARGO_PKG_VERSION"), commit_hash);
    println!("cargo:rerun-if-env-changed=POUW_COMMIT_HASH");
    println!("cargo:rustc-env=BUILD_VERSION={build_version}");
}
