//! Disposable workspaces: one extraction per execution.
//!
//! Every extraction gets its own uniquely named directory under the
//! sandbox root, never shared or reused. Removal is guaranteed by
//! scoped ownership: dropping the `Workspace` deletes the tree, and
//! cleanup failures are logged but never replace the caller's outcome.

use std::fs::File;
use std::path::{Path, PathBuf};

use asubox_core::{Error, Result};
use flate2::read::GzDecoder;

use crate::archive::ArchiveStore;

/// An extracted container tree, exclusively owned by one execution.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<tempfile::TempDir>,
    root: PathBuf,
}

impl Workspace {
    /// Root of the extracted source tree (the archive's top directory).
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Remove the workspace now. Best-effort: a filesystem error is
    /// reported via the log, not propagated.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), %e, "workspace cleanup failed");
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Creates and tears down workspaces under a fixed sandbox root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    sandbox_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(sandbox_dir: impl Into<PathBuf>) -> Result<Self> {
        let sandbox_dir = sandbox_dir.into();
        std::fs::create_dir_all(&sandbox_dir)?;
        Ok(Self { sandbox_dir })
    }

    /// Decompress the archive for `id` into a fresh `exec-*` directory.
    /// Fails with `NotFound` when the archive file does not exist.
    pub fn extract(&self, archives: &ArchiveStore, id: &str) -> Result<Workspace> {
        let archive_path = archives.path_for(id);
        if !archive_path.is_file() {
            return Err(Error::NotFound(id.to_string()));
        }

        let dir = tempfile::Builder::new()
            .prefix("exec-")
            .tempdir_in(&self.sandbox_dir)
            .map_err(|e| Error::Storage(format!("failed to create workspace: {e}")))?;

        let file = File::open(&archive_path)?;
        let mut ar = tar::Archive::new(GzDecoder::new(file));
        ar.unpack(dir.path())
            .map_err(|e| Error::Storage(format!("failed to extract archive: {e}")))?;

        let root = tree_root(dir.path())?;
        Ok(Workspace {
            dir: Some(dir),
            root,
        })
    }
}

/// The archive holds the source tree under its own directory name;
/// resolve that single top-level directory.
fn tree_root(extract_dir: &Path) -> Result<PathBuf> {
    let mut dirs = std::fs::read_dir(extract_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir());
    match (dirs.next(), dirs.next()) {
        (Some(root), None) => Ok(root),
        _ => Ok(extract_dir.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn packed_container(storage: &Path) -> (ArchiveStore, String) {
        let src = tempfile::tempdir().unwrap();
        let repo = src.path().join("repo");
        fs::create_dir_all(repo.join("sub")).unwrap();
        fs::write(repo.join("main.py"), "print('hi')").unwrap();
        fs::write(repo.join("sub/util.py"), "pass").unwrap();

        let store = ArchiveStore::new(storage).unwrap();
        let id = "c0ffee".to_string();
        store
            .build(&repo, &id, "https://example.com/r.git", None, u64::MAX, true)
            .unwrap();
        (store, id)
    }

    #[test]
    fn extract_yields_tree_root_and_cleans_up() {
        let storage = tempfile::tempdir().unwrap();
        let sandbox = tempfile::tempdir().unwrap();
        let (archives, id) = packed_container(storage.path());
        let manager = WorkspaceManager::new(sandbox.path()).unwrap();

        let ws = manager.extract(&archives, &id).unwrap();
        let root = ws.path().to_path_buf();
        assert!(root.join("main.py").is_file());
        assert!(root.join("sub/util.py").is_file());
        assert!(root.join("metadata.json").is_file());

        ws.release();
        assert!(!root.exists());
    }

    #[test]
    fn drop_removes_workspace() {
        let storage = tempfile::tempdir().unwrap();
        let sandbox = tempfile::tempdir().unwrap();
        let (archives, id) = packed_container(storage.path());
        let manager = WorkspaceManager::new(sandbox.path()).unwrap();

        let root = {
            let ws = manager.extract(&archives, &id).unwrap();
            ws.path().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn missing_archive_is_not_found() {
        let sandbox = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        let archives = ArchiveStore::new(storage.path()).unwrap();
        let manager = WorkspaceManager::new(sandbox.path()).unwrap();

        let err = manager.extract(&archives, "nope").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn concurrent_extractions_are_independent() {
        let storage = tempfile::tempdir().unwrap();
        let sandbox = tempfile::tempdir().unwrap();
        let (archives, id) = packed_container(storage.path());
        let manager = WorkspaceManager::new(sandbox.path()).unwrap();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let ws = manager.extract(&archives, &id).unwrap();
                        ws.path().to_path_buf()
                    })
                })
                .collect();
            let paths: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            for (i, a) in paths.iter().enumerate() {
                for b in &paths[i + 1..] {
                    assert_ne!(a, b);
                }
            }
        });
    }
}
