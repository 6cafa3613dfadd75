//! Source fetch: locator validation and shallow git clones.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use asubox_sandbox::common::run_with_deadline;

const LS_REMOTE_TIMEOUT_MS: u64 = 30_000;

/// Version pin applied when cloning.
#[derive(Debug, Clone)]
pub enum VersionPin {
    Branch(String),
    Commit(String),
}

impl VersionPin {
    pub fn kind(&self) -> &'static str {
        match self {
            VersionPin::Branch(_) => "branch",
            VersionPin::Commit(_) => "commit",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            VersionPin::Branch(v) | VersionPin::Commit(v) => v,
        }
    }
}

/// Reject locators that point at local files or private networks.
pub fn validate_locator(url: &str) -> Result<()> {
    let lowered = url.trim().to_lowercase();
    if lowered.is_empty() {
        bail!("repository URL must not be empty");
    }
    if !(lowered.starts_with("https://") || lowered.starts_with("git://")) {
        bail!("repository URL must use https:// or git://");
    }

    let blocked = [
        r"^[a-z+]+://localhost",
        r"^[a-z+]+://127\.",
        r"^[a-z+]+://0\.0\.0\.0",
        r"^[a-z+]+://10\.",
        r"^[a-z+]+://192\.168\.",
        r"^[a-z+]+://172\.(1[6-9]|2[0-9]|3[01])\.",
        r"^[a-z+]+://\[::1\]",
    ];
    for pattern in blocked {
        let re = regex::Regex::new(pattern).context("invalid locator pattern")?;
        if re.is_match(&lowered) {
            bail!("repository URL {url} points at a blocked host");
        }
    }
    Ok(())
}

/// Confirm the remote exists and answers before cloning.
pub fn probe_remote(url: &str) -> Result<()> {
    let out = run_with_deadline(
        Command::new("git").args(["ls-remote", "--heads", url]),
        LS_REMOTE_TIMEOUT_MS,
    )
    .with_context(|| format!("failed to reach {url}"))?;
    if out.exit_code != 0 {
        bail!(
            "remote {url} is not reachable: {}",
            out.stderr.trim()
        );
    }
    Ok(())
}

/// Clone `url` into `dest`. Branch pins use a shallow single-branch
/// clone; commit pins need history, so they clone full and check out.
pub fn clone_repository(
    url: &str,
    pin: Option<&VersionPin>,
    dest: &Path,
    timeout_ms: u64,
) -> Result<()> {
    let dest_str = dest.to_string_lossy();
    let out = match pin {
        Some(VersionPin::Branch(branch)) => run_with_deadline(
            Command::new("git").args([
                "clone",
                "--depth",
                "1",
                "--branch",
                branch,
                url,
                dest_str.as_ref(),
            ]),
            timeout_ms,
        ),
        Some(VersionPin::Commit(_)) | None => run_with_deadline(
            Command::new("git").args(["clone", url, dest_str.as_ref()]),
            timeout_ms,
        ),
    }
    .with_context(|| format!("failed to clone {url}"))?;
    if out.exit_code != 0 {
        bail!("git clone of {url} failed: {}", out.stderr.trim());
    }

    if let Some(VersionPin::Commit(hash)) = pin {
        let out = run_with_deadline(
            Command::new("git")
                .args(["checkout", "--detach", hash])
                .current_dir(dest),
            LS_REMOTE_TIMEOUT_MS,
        )
        .with_context(|| format!("failed to check out {hash}"))?;
        if out.exit_code != 0 {
            bail!("checkout of {hash} failed: {}", out.stderr.trim());
        }
    }
    Ok(())
}
