//! Unified configuration layer.
//!
//! All environment variable reads live here; business code goes
//! through the structured configs instead of `std::env::var`.

use std::path::PathBuf;

pub fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn env_or(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub fn env_u64(key: &str, default: u64) -> u64 {
    env_optional(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn env_bool(key: &str, default: bool) -> bool {
    match env_optional(key).map(|v| v.to_lowercase()) {
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes"),
        None => default,
    }
}

/// Filesystem layout: archive storage, sandbox root, metadata database.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub storage_dir: PathBuf,
    pub sandbox_dir: PathBuf,
    pub db_path: PathBuf,
}

impl PathsConfig {
    pub fn from_env() -> Self {
        let root = crate::data_root();
        Self {
            storage_dir: env_optional("ASUBOX_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| root.join("storage")),
            sandbox_dir: env_optional("ASUBOX_SANDBOX_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| root.join("sandbox")),
            db_path: env_optional("ASUBOX_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| root.join("asubox.db")),
        }
    }
}

/// Archive construction limits.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveConfig {
    /// Maximum archive size in bytes (default 1 TiB).
    pub max_bytes: u64,
    /// Fail archive creation when a file extension is outside the allowlist.
    pub validate_extensions: bool,
}

impl ArchiveConfig {
    pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024 * 1024 * 1024;

    pub fn from_env() -> Self {
        Self {
            max_bytes: env_u64("ASUBOX_MAX_ARCHIVE_BYTES", Self::DEFAULT_MAX_BYTES),
            validate_extensions: env_bool("ASUBOX_VALIDATE_EXTENSIONS", true),
        }
    }
}

/// Execution ceilings.
#[derive(Debug, Clone, Copy)]
pub struct ExecConfig {
    /// Wall-clock timeout for one command, milliseconds.
    pub timeout_ms: u64,
    /// Per-stream captured output ceiling, bytes.
    pub output_cap_bytes: u64,
    /// Dependency-install step timeout, milliseconds. Independent of
    /// the command timeout.
    pub install_timeout_ms: u64,
    /// Source fetch ceiling, milliseconds (external collaborator).
    pub fetch_timeout_ms: u64,
}

impl ExecConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
    pub const DEFAULT_OUTPUT_CAP_BYTES: u64 = 1024 * 1024;
    pub const DEFAULT_INSTALL_TIMEOUT_MS: u64 = 300_000;
    pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 600_000;

    pub fn from_env() -> Self {
        Self {
            timeout_ms: env_u64("ASUBOX_TIMEOUT_MS", Self::DEFAULT_TIMEOUT_MS),
            output_cap_bytes: env_u64(
                "ASUBOX_OUTPUT_CAP_BYTES",
                Self::DEFAULT_OUTPUT_CAP_BYTES,
            ),
            install_timeout_ms: env_u64(
                "ASUBOX_INSTALL_TIMEOUT_MS",
                Self::DEFAULT_INSTALL_TIMEOUT_MS,
            ),
            fetch_timeout_ms: env_u64(
                "ASUBOX_FETCH_TIMEOUT_MS",
                Self::DEFAULT_FETCH_TIMEOUT_MS,
            ),
        }
    }

    /// Apply a caller-supplied timeout override.
    pub fn with_timeout_override(mut self, timeout_ms: Option<u64>) -> Self {
        if let Some(t) = timeout_ms {
            self.timeout_ms = t;
        }
        self
    }
}

/// Expiry and maintenance cadence.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    /// Container time-to-live in days.
    pub ttl_days: i64,
    /// Expiry sweep period, seconds.
    pub sweep_period_secs: u64,
    /// Store maintenance (reindex + vacuum) period, seconds.
    pub maintenance_period_secs: u64,
}

impl RetentionConfig {
    pub const DEFAULT_TTL_DAYS: i64 = 30;

    pub fn from_env() -> Self {
        Self {
            ttl_days: env_u64("ASUBOX_TTL_DAYS", Self::DEFAULT_TTL_DAYS as u64) as i64,
            sweep_period_secs: env_u64("ASUBOX_SWEEP_PERIOD_SECS", 3600),
            maintenance_period_secs: env_u64("ASUBOX_MAINTENANCE_PERIOD_SECS", 86_400),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let archive = ArchiveConfig {
            max_bytes: ArchiveConfig::DEFAULT_MAX_BYTES,
            validate_extensions: true,
        };
        assert_eq!(archive.max_bytes, 1 << 40);

        let exec = ExecConfig {
            timeout_ms: ExecConfig::DEFAULT_TIMEOUT_MS,
            output_cap_bytes: ExecConfig::DEFAULT_OUTPUT_CAP_BYTES,
            install_timeout_ms: ExecConfig::DEFAULT_INSTALL_TIMEOUT_MS,
            fetch_timeout_ms: ExecConfig::DEFAULT_FETCH_TIMEOUT_MS,
        };
        assert_eq!(exec.timeout_ms, 30_000);
        assert_eq!(exec.output_cap_bytes, 1024 * 1024);
    }

    #[test]
    fn timeout_override_wins() {
        let exec = ExecConfig {
            timeout_ms: 30_000,
            output_cap_bytes: 1,
            install_timeout_ms: 1,
            fetch_timeout_ms: 1,
        }
        .with_timeout_override(Some(100));
        assert_eq!(exec.timeout_ms, 100);
    }
}
