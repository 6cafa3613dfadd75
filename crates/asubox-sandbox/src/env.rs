//! Runtime detection and dependency bootstrap for a workspace.
//!
//! The runtime is inferred from manifest files in the extracted tree.
//! Bootstrap installs dependencies inside the workspace only; a tree
//! without a manifest runs as-is.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use asubox_core::{Error, Result};

use crate::common::{run_with_deadline, StepOutput};

/// Runtime family of a container's source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Python,
    Node,
    Php,
    Other,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Python => "python",
            RuntimeKind::Node => "node",
            RuntimeKind::Php => "php",
            RuntimeKind::Other => "other",
        }
    }

    /// Infer the runtime from manifest files. Python wins ties, then
    /// node, then php, matching the install order of `bootstrap`.
    pub fn detect(dir: &Path) -> Self {
        if dir.join("requirements.txt").is_file() {
            RuntimeKind::Python
        } else if dir.join("package.json").is_file() {
            RuntimeKind::Node
        } else if dir.join("composer.json").is_file() {
            RuntimeKind::Php
        } else {
            RuntimeKind::Other
        }
    }
}

/// The fixed environment every sandboxed process starts from. `home`
/// is the workspace directory so writes land inside the sandbox.
pub fn base_env(home: &Path) -> HashMap<String, String> {
    HashMap::from([
        ("PATH".to_string(), "/usr/bin:/bin".to_string()),
        ("HOME".to_string(), home.to_string_lossy().into_owned()),
        ("USER".to_string(), "sandbox".to_string()),
        ("SHELL".to_string(), "/bin/sh".to_string()),
        ("LANG".to_string(), "en_US.UTF-8".to_string()),
        ("TZ".to_string(), "UTC".to_string()),
    ])
}

/// Base environment with per-container overrides applied on top.
pub fn merged_env(home: &Path, overrides: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env = base_env(home);
    for (k, v) in overrides {
        env.insert(k.clone(), v.clone());
    }
    env
}

/// Install the workspace's declared dependencies, if any.
///
/// Each install step runs under the fixed sandbox environment with the
/// given deadline. A non-zero exit fails the bootstrap with the step's
/// stderr attached.
pub fn bootstrap(workspace: &Path, timeout_ms: u64) -> Result<RuntimeKind> {
    let runtime = RuntimeKind::detect(workspace);
    match runtime {
        RuntimeKind::Python => {
            tracing::info!(workspace = %workspace.display(), "installing python dependencies");
            run_step(
                step_command("python3", &["-m", "venv", "venv"], workspace),
                timeout_ms,
                "python3 -m venv",
            )?;
            run_step(
                step_command(
                    "venv/bin/pip",
                    &["install", "-r", "requirements.txt"],
                    workspace,
                ),
                timeout_ms,
                "pip install",
            )?;
        }
        RuntimeKind::Node => {
            tracing::info!(workspace = %workspace.display(), "installing node dependencies");
            run_step(
                step_command("npm", &["install"], workspace),
                timeout_ms,
                "npm install",
            )?;
        }
        RuntimeKind::Php => {
            tracing::info!(workspace = %workspace.display(), "installing php dependencies");
            run_step(
                step_command("composer", &["install", "--no-dev"], workspace),
                timeout_ms,
                "composer install",
            )?;
        }
        RuntimeKind::Other => {}
    }
    Ok(runtime)
}

fn step_command(program: &str, args: &[&str], workspace: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(workspace)
        .env_clear()
        .envs(base_env(workspace));
    cmd
}

fn run_step(mut cmd: Command, timeout_ms: u64, label: &str) -> Result<StepOutput> {
    let out = run_with_deadline(&mut cmd, timeout_ms)?;
    if out.exit_code != 0 {
        return Err(Error::Execution(format!(
            "{label} failed with exit code {}: {}",
            out.exit_code,
            out.stderr.trim()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_runtime_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(RuntimeKind::detect(dir.path()), RuntimeKind::Other);

        fs::write(dir.path().join("composer.json"), "{}").unwrap();
        assert_eq!(RuntimeKind::detect(dir.path()), RuntimeKind::Php);

        fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(RuntimeKind::detect(dir.path()), RuntimeKind::Node);

        fs::write(dir.path().join("requirements.txt"), "").unwrap();
        assert_eq!(RuntimeKind::detect(dir.path()), RuntimeKind::Python);
    }

    #[test]
    fn base_env_is_fixed_and_rooted_at_home() {
        let dir = tempfile::tempdir().unwrap();
        let env = base_env(dir.path());
        assert_eq!(env["PATH"], "/usr/bin:/bin");
        assert_eq!(env["USER"], "sandbox");
        assert_eq!(env["TZ"], "UTC");
        assert_eq!(env["HOME"], dir.path().to_string_lossy());
        assert_eq!(env.len(), 6);
    }

    #[test]
    fn overrides_win_over_base_values() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = HashMap::from([
            ("TZ".to_string(), "Asia/Jakarta".to_string()),
            ("APP_MODE".to_string(), "debug".to_string()),
        ]);
        let env = merged_env(dir.path(), &overrides);
        assert_eq!(env["TZ"], "Asia/Jakarta");
        assert_eq!(env["APP_MODE"], "debug");
        assert_eq!(env["USER"], "sandbox");
    }

    #[test]
    fn bootstrap_is_a_no_op_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.sh"), "echo hi").unwrap();
        let runtime = bootstrap(dir.path(), 1_000).unwrap();
        assert_eq!(runtime, RuntimeKind::Other);
    }
}
