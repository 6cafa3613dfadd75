//! Container archive creation and storage.
//!
//! An archive is a gzip-compressed tar of the fetched source tree,
//! rooted at its own directory name, with a `metadata.json` document
//! injected at the tree root before packing. Archives live under the
//! storage directory as `<id>.asu`.

use std::fs::File;
use std::path::{Path, PathBuf};

use asubox_core::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

/// File extensions accepted into an archive when validation is on.
pub const SAFE_EXTENSIONS: &[&str] = &[
    ".js", ".ts", ".py", ".java", ".c", ".cpp", ".h", ".hpp",
    ".md", ".txt", ".json", ".yml", ".yaml", ".html", ".css",
    ".go", ".rs", ".rb", ".php", ".sh",
];

pub const ARCHIVE_SCHEMA_VERSION: &str = "1.0.0";
pub const ARCHIVE_EXTENSION: &str = "asu";

/// Document embedded in every archive as `metadata.json`. Immutable
/// once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub id: String,
    pub source_locator: String,
    pub version_kind: Option<String>,
    pub version_value: Option<String>,
    pub created_at: String,
    pub schema_version: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub safe_extensions: Vec<String>,
}

#[derive(Debug)]
pub struct BuiltArchive {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub metadata: ArchiveMetadata,
}

/// Maps container ids to archive files on durable storage.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    storage_dir: PathBuf,
}

impl ArchiveStore {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir)?;
        Ok(Self { storage_dir })
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.storage_dir.join(format!("{id}.{ARCHIVE_EXTENSION}"))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).is_file()
    }

    /// Remove the archive file. A missing file counts as already
    /// deleted; the caller owns the status transition in the store.
    pub fn delete(&self, id: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("failed to delete archive: {e}"))),
        }
    }

    /// Pack `src_dir` into `<storage>/<id>.asu`.
    ///
    /// Fail-closed: extension violations, the size ceiling and I/O
    /// errors all leave no archive file behind.
    pub fn build(
        &self,
        src_dir: &Path,
        id: &str,
        source_url: &str,
        version: Option<(&str, &str)>,
        max_bytes: u64,
        validate_extensions: bool,
    ) -> Result<BuiltArchive> {
        if validate_extensions {
            let mut offending = Vec::new();
            scan_extensions(src_dir, &mut offending)?;
            if !offending.is_empty() {
                offending.sort();
                offending.dedup();
                return Err(Error::Policy(format!(
                    "source tree contains disallowed file extensions: {}",
                    offending.join(", ")
                )));
            }
        }

        let metadata = ArchiveMetadata {
            id: id.to_string(),
            source_locator: source_url.to_string(),
            version_kind: version.map(|(k, _)| k.to_string()),
            version_value: version.map(|(_, v)| v.to_string()),
            created_at: asubox_core::now_ts(),
            schema_version: ARCHIVE_SCHEMA_VERSION.to_string(),
            content_type: "git-repository".to_string(),
            safe_extensions: SAFE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        };
        let doc = serde_json::to_string_pretty(&metadata)
            .map_err(|e| Error::Storage(format!("failed to serialize metadata: {e}")))?;
        std::fs::write(src_dir.join("metadata.json"), doc)?;

        let path = self.path_for(id);
        if let Err(e) = write_tar_gz(src_dir, &path) {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }

        let size_bytes = finalize_archive(&path, max_bytes)?;

        Ok(BuiltArchive {
            path,
            size_bytes,
            metadata,
        })
    }
}

fn write_tar_gz(src_dir: &Path, dest: &Path) -> Result<()> {
    let root_name = src_dir
        .file_name()
        .ok_or_else(|| Error::Storage("source directory has no name".into()))?
        .to_string_lossy()
        .into_owned();

    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(&root_name, src_dir)
        .map_err(|e| Error::Storage(format!("failed to pack archive: {e}")))?;
    builder
        .into_inner()
        .and_then(|enc| enc.finish())
        .map_err(|e| Error::Storage(format!("failed to finish archive: {e}")))?;
    Ok(())
}

/// Check the packed file against the size ceiling and return its
/// size. Any failure removes the file first; a partial or oversized
/// archive never stays on disk.
fn finalize_archive(path: &Path, max_bytes: u64) -> Result<u64> {
    let size_bytes = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(e) => {
            let _ = std::fs::remove_file(path);
            return Err(Error::Storage(format!("failed to stat archive: {e}")));
        }
    };
    if size_bytes > max_bytes {
        let _ = std::fs::remove_file(path);
        return Err(Error::Policy(format!(
            "archive size ({size_bytes}) exceeds maximum ({max_bytes})"
        )));
    }
    Ok(size_bytes)
}

/// Collect extensions outside the allowlist. `.git` trees are skipped:
/// the fetch step owns them and they always contain unlisted files.
fn scan_extensions(dir: &Path, offending: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if entry.file_name() == ".git" {
                continue;
            }
            scan_extensions(&path, offending)?;
        } else {
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                .unwrap_or_default();
            if !SAFE_EXTENSIONS.contains(&ext.as_str()) {
                offending.push(if ext.is_empty() {
                    "(none)".to_string()
                } else {
                    ext
                });
            }
        }
    }
    Ok(())
}
