//! Application layer: wires the store, archive storage, workspace
//! manager and executor behind the operations the CLI exposes.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use asubox_core::config::{ArchiveConfig, ExecConfig, PathsConfig, RetentionConfig};
use asubox_core::{ident, observability, policy};
use asubox_sandbox::archive::ArchiveStore;
use asubox_sandbox::exec::{ExecutionOutput, Executor};
use asubox_sandbox::workspace::WorkspaceManager;
use asubox_sandbox::env as sandbox_env;
use asubox_store::{
    ContainerRecord, ContainerStatus, ExecutionRecord, SourceLocator, Store, VersionSelector,
};

use crate::fetch::{self, VersionPin};

pub struct App {
    pub store: Arc<Store>,
    pub archives: ArchiveStore,
    pub workspaces: WorkspaceManager,
    pub executor: Arc<Executor>,
    pub archive_cfg: ArchiveConfig,
    pub exec_cfg: ExecConfig,
    pub retention: RetentionConfig,
}

impl App {
    pub fn from_env() -> Result<Self> {
        let paths = PathsConfig::from_env();
        Self::with_paths(&paths)
    }

    pub fn with_paths(paths: &PathsConfig) -> Result<Self> {
        let store = Store::open(&paths.db_path).context("failed to open metadata store")?;
        let archives =
            ArchiveStore::new(&paths.storage_dir).context("failed to prepare archive storage")?;
        let workspaces =
            WorkspaceManager::new(&paths.sandbox_dir).context("failed to prepare sandbox root")?;
        Ok(Self {
            store: Arc::new(store),
            archives,
            workspaces,
            executor: Arc::new(Executor::new()),
            archive_cfg: ArchiveConfig::from_env(),
            exec_cfg: ExecConfig::from_env(),
            retention: RetentionConfig::from_env(),
        })
    }

    /// Fetch a repository and register it as a new container.
    pub fn create(
        &self,
        url: &str,
        pin: Option<VersionPin>,
        validate_extensions: bool,
    ) -> Result<ContainerRecord> {
        fetch::validate_locator(url)?;
        fetch::probe_remote(url)?;

        let staging = tempfile::tempdir().context("failed to create staging directory")?;
        let dest = staging.path().join(repo_dir_name(url));
        fetch::clone_repository(url, pin.as_ref(), &dest, self.exec_cfg.fetch_timeout_ms)?;

        self.register(&dest, url, pin, validate_extensions)
    }

    /// Register an already-fetched source tree as a container. The
    /// network-facing `create` funnels through this after cloning.
    pub fn register(
        &self,
        src_dir: &Path,
        url: &str,
        pin: Option<VersionPin>,
        validate_extensions: bool,
    ) -> Result<ContainerRecord> {
        let id = ident::generate();
        let version = pin.as_ref().map(|p| (p.kind(), p.value()));
        let built = self.archives.build(
            src_dir,
            &id,
            url,
            version,
            self.archive_cfg.max_bytes,
            validate_extensions && self.archive_cfg.validate_extensions,
        )?;

        let record = ContainerRecord {
            id: id.clone(),
            source: SourceLocator {
                url: url.to_string(),
                version: pin.map(|p| VersionSelector {
                    kind: p.kind().to_string(),
                    value: p.value().to_string(),
                }),
            },
            archive_path: built.path.clone(),
            size_bytes: built.size_bytes,
            created_at: asubox_core::now_ts(),
            last_accessed: None,
            expires_at: asubox_core::ts_in_days(self.retention.ttl_days),
            status: ContainerStatus::Active,
        };
        if let Err(e) = self.store.insert(&record) {
            let _ = self.archives.delete(&id);
            return Err(e.into());
        }
        observability::audit_container_created(&id, url, built.size_bytes);
        Ok(record)
    }

    /// Run a sanitized command inside a fresh workspace for `id`.
    pub fn execute(
        &self,
        id: &str,
        command: &str,
        args: &[String],
        timeout_override: Option<u64>,
        bootstrap: bool,
    ) -> Result<ExecutionOutput> {
        let sanitized = policy::sanitize(command, args)?;
        let record = self.require_active(id)?;
        self.store.update_last_accessed(id, &asubox_core::now_ts())?;

        let exec_cfg = self.exec_cfg.with_timeout_override(timeout_override);
        let workspace = self.workspaces.extract(&self.archives, &record.id)?;
        if bootstrap {
            sandbox_env::bootstrap(workspace.path(), exec_cfg.install_timeout_ms)?;
        }

        let overrides = self.store.get_env_vars(id)?;
        let env = sandbox_env::merged_env(workspace.path(), &overrides);

        observability::audit_command_invoked(id, &sanitized.command, &sanitized.args);
        let started = Instant::now();
        let result = self.executor.run(
            id,
            &sanitized.command,
            &sanitized.args,
            workspace.path(),
            &env,
            exec_cfg.timeout_ms,
            exec_cfg.output_cap_bytes as usize,
            self.store.as_ref(),
        );
        workspace.release();

        let output = result?;
        self.store.record_execution(&ExecutionRecord {
            container_id: id.to_string(),
            command: sanitized.command.clone(),
            executed_at: output.completed_at.clone(),
            exit_code: output.exit_code,
        })?;
        observability::audit_execution_completed(
            id,
            output.exit_code,
            started.elapsed().as_millis() as u64,
            output.stdout.len(),
        );
        Ok(output)
    }

    /// Remove the archive and mark the record deleted. The record
    /// itself is retained for history.
    pub fn delete(&self, id: &str) -> Result<()> {
        let record = self.require_active(id)?;
        self.archives.delete(&record.id)?;
        self.store.update_status(id, ContainerStatus::Deleted)?;
        observability::audit_container_deleted(id);
        Ok(())
    }

    pub fn info(&self, id: &str) -> Result<(ContainerRecord, Vec<ExecutionRecord>)> {
        let record = self.require_known(id)?;
        let executions = self.store.get_executions(id)?;
        Ok((record, executions))
    }

    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        Ok(self.store.list_active()?)
    }

    pub fn set_env(&self, id: &str, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("environment variable name {name:?} is not valid");
        }
        self.require_active(id)?;
        self.store.set_env_var(id, name, value)?;
        Ok(())
    }

    fn require_known(&self, id: &str) -> Result<ContainerRecord> {
        self.store
            .get_by_id(id)?
            .with_context(|| format!("container {id} does not exist"))
    }

    fn require_active(&self, id: &str) -> Result<ContainerRecord> {
        let record = self.require_known(id)?;
        if record.status != ContainerStatus::Active {
            bail!("container {id} is {}", record.status.as_str());
        }
        Ok(record)
    }
}

/// Directory name for the cloned tree, taken from the locator's last
/// path segment. This name becomes the root inside the archive.
fn repo_dir_name(url: &str) -> String {
    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("repo")
        .trim_end_matches(".git");
    if name.is_empty() {
        "repo".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_dir_name_strips_suffix() {
        assert_eq!(repo_dir_name("https://example.com/user/app.git"), "app");
        assert_eq!(repo_dir_name("https://example.com/user/app"), "app");
        assert_eq!(repo_dir_name("https://example.com/user/app/"), "app");
    }
}
