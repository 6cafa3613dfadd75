//! Container metadata store backed by SQLite.
//!
//! Four tables:
//!   - `containers`: one row per container record
//!   - `container_stats`: append-only execution records
//!   - `env_vars`: per-container environment overrides, unique per name
//!   - `container_logs`: captured stdout/stderr chunks, paged reads
//!
//! The connection sits behind a `Mutex` so one `Store` can be shared
//! with the executor's reader threads and the sweeper thread.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use asubox_core::observability::LogSink;
use asubox_core::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a container record. Only two transitions exist:
/// Active -> Expired (sweeper) and Active -> Deleted (explicit request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Active,
    Expired,
    Deleted,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Deleted => "deleted",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "deleted" => Ok(Self::Deleted),
            other => Err(Error::Storage(format!("unknown container status: {other}"))),
        }
    }
}

/// Version selector attached to a source locator (branch, tag, commit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSelector {
    pub kind: String,
    pub value: String,
}

/// Opaque reference the fetch component resolves to a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocator {
    pub url: String,
    pub version: Option<VersionSelector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub source: SourceLocator,
    pub archive_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: String,
    pub last_accessed: Option<String>,
    pub expires_at: String,
    pub status: ContainerStatus,
}

/// One completed execution attempt. Append-only, many per container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub container_id: String,
    pub command: String,
    pub executed_at: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub container_id: String,
    pub timestamp: String,
    pub stream: String,
    pub message: String,
}

pub const DEFAULT_LOG_PAGE_SIZE: u32 = 50;

fn sql(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and ensure the
    /// schema exists. WAL keeps writers from blocking readers.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(sql)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(sql)?;
        ensure_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql)?;
        ensure_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, rec: &ContainerRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO containers
                 (id, source_url, version_kind, version_value, created_at,
                  size_bytes, archive_path, last_accessed, expires_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    rec.id,
                    rec.source.url,
                    rec.source.version.as_ref().map(|v| v.kind.as_str()),
                    rec.source.version.as_ref().map(|v| v.value.as_str()),
                    rec.created_at,
                    rec.size_bytes as i64,
                    rec.archive_path.to_string_lossy(),
                    rec.last_accessed,
                    rec.expires_at,
                    rec.status.as_str(),
                ],
            )
            .map_err(sql)?;
        Ok(())
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<ContainerRecord>> {
        self.conn()
            .query_row(
                "SELECT id, source_url, version_kind, version_value, created_at,
                        size_bytes, archive_path, last_accessed, expires_at, status
                 FROM containers WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()
            .map_err(sql)
    }

    pub fn update_status(&self, id: &str, status: ContainerStatus) -> Result<()> {
        let n = self
            .conn()
            .execute(
                "UPDATE containers SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(sql)?;
        if n == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn update_last_accessed(&self, id: &str, ts: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE containers SET last_accessed = ?1 WHERE id = ?2",
                params![ts, id],
            )
            .map_err(sql)?;
        Ok(())
    }

    pub fn list_active(&self) -> Result<Vec<ContainerRecord>> {
        self.query_records(
            "SELECT id, source_url, version_kind, version_value, created_at,
                    size_bytes, archive_path, last_accessed, expires_at, status
             FROM containers WHERE status = 'active' ORDER BY created_at DESC",
            params![],
        )
    }

    /// Active records whose expiry time has passed `before`.
    pub fn list_expired(&self, before: &str) -> Result<Vec<ContainerRecord>> {
        self.query_records(
            "SELECT id, source_url, version_kind, version_value, created_at,
                    size_bytes, archive_path, last_accessed, expires_at, status
             FROM containers WHERE status = 'active' AND expires_at < ?1",
            params![before],
        )
    }

    fn query_records(
        &self,
        query: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<ContainerRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(query).map_err(sql)?;
        let rows = stmt.query_map(args, row_to_record).map_err(sql)?;
        rows.collect::<std::result::Result<_, _>>().map_err(sql)
    }

    pub fn record_execution(&self, rec: &ExecutionRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO container_stats (container_id, command, executed_at, exit_code)
                 VALUES (?1, ?2, ?3, ?4)",
                params![rec.container_id, rec.command, rec.executed_at, rec.exit_code],
            )
            .map_err(sql)?;
        Ok(())
    }

    pub fn get_executions(&self, id: &str) -> Result<Vec<ExecutionRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT container_id, command, executed_at, exit_code
                 FROM container_stats WHERE container_id = ?1 ORDER BY executed_at DESC",
            )
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok(ExecutionRecord {
                    container_id: row.get(0)?,
                    command: row.get(1)?,
                    executed_at: row.get(2)?,
                    exit_code: row.get(3)?,
                })
            })
            .map_err(sql)?;
        rows.collect::<std::result::Result<_, _>>().map_err(sql)
    }

    pub fn get_env_vars(&self, id: &str) -> Result<HashMap<String, String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT name, value FROM env_vars WHERE container_id = ?1")
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(sql)?;
        rows.collect::<std::result::Result<_, _>>().map_err(sql)
    }

    /// Upsert: one value per (container, name).
    pub fn set_env_var(&self, id: &str, name: &str, value: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO env_vars (container_id, name, value)
                 VALUES (?1, ?2, ?3)",
                params![id, name, value],
            )
            .map_err(sql)?;
        Ok(())
    }

    pub fn append_log(&self, id: &str, stream: &str, message: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO container_logs (container_id, timestamp, stream, message)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, asubox_core::now_ts(), stream, message],
            )
            .map_err(sql)?;
        Ok(())
    }

    /// Newest-first, paged. `page` starts at 1.
    pub fn get_logs(&self, id: &str, page: u32, page_size: u32) -> Result<Vec<LogEntry>> {
        let page = page.max(1);
        let offset = (page - 1) * page_size;
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, container_id, timestamp, stream, message
                 FROM container_logs WHERE container_id = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3",
            )
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![id, page_size, offset], |row| {
                Ok(LogEntry {
                    id: row.get(0)?,
                    container_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    stream: row.get(3)?,
                    message: row.get(4)?,
                })
            })
            .map_err(sql)?;
        rows.collect::<std::result::Result<_, _>>().map_err(sql)
    }

    /// Store-level housekeeping: rebuild indexes and reclaim space.
    /// Invoked by the maintenance pass, not by request traffic.
    pub fn maintain(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "REINDEX containers;
                 REINDEX container_stats;
                 REINDEX env_vars;
                 REINDEX container_logs;
                 VACUUM;",
            )
            .map_err(sql)
    }
}

impl LogSink for Store {
    fn append(&self, container_id: &str, stream: &str, message: &str) {
        if let Err(e) = self.append_log(container_id, stream, message) {
            tracing::warn!(container_id, %e, "failed to persist log chunk");
        }
    }
}

fn ensure_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS containers (
            id TEXT PRIMARY KEY,
            source_url TEXT NOT NULL,
            version_kind TEXT,
            version_value TEXT,
            created_at TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            archive_path TEXT NOT NULL,
            last_accessed TEXT,
            expires_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
        );

        CREATE TABLE IF NOT EXISTS container_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container_id TEXT NOT NULL,
            command TEXT NOT NULL,
            executed_at TEXT NOT NULL,
            exit_code INTEGER,
            FOREIGN KEY(container_id) REFERENCES containers(id)
        );

        CREATE TABLE IF NOT EXISTS env_vars (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container_id TEXT NOT NULL,
            name TEXT NOT NULL,
            value TEXT NOT NULL,
            UNIQUE(container_id, name),
            FOREIGN KEY(container_id) REFERENCES containers(id)
        );

        CREATE TABLE IF NOT EXISTS container_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            stream TEXT NOT NULL,
            message TEXT NOT NULL,
            FOREIGN KEY(container_id) REFERENCES containers(id)
        );

        CREATE INDEX IF NOT EXISTS idx_containers_status ON containers(status);
        CREATE INDEX IF NOT EXISTS idx_containers_expires ON containers(expires_at);
        CREATE INDEX IF NOT EXISTS idx_stats_container ON container_stats(container_id);
        CREATE INDEX IF NOT EXISTS idx_logs_container ON container_logs(container_id);
        "#,
    )
    .map_err(sql)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContainerRecord> {
    let version = match (
        row.get::<_, Option<String>>(2)?,
        row.get::<_, Option<String>>(3)?,
    ) {
        (Some(kind), Some(value)) => Some(VersionSelector { kind, value }),
        _ => None,
    };
    let status_raw: String = row.get(9)?;
    let status = ContainerStatus::parse(&status_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ContainerRecord {
        id: row.get(0)?,
        source: SourceLocator {
            url: row.get(1)?,
            version,
        },
        archive_path: PathBuf::from(row.get::<_, String>(6)?),
        size_bytes: row.get::<_, i64>(5)? as u64,
        created_at: row.get(4)?,
        last_accessed: row.get(7)?,
        expires_at: row.get(8)?,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use asubox_core::{now_ts, ts_in_days};

    fn record(id: &str, expires_at: &str) -> ContainerRecord {
        ContainerRecord {
            id: id.to_string(),
            source: SourceLocator {
                url: "https://example.com/repo.git".to_string(),
                version: Some(VersionSelector {
                    kind: "branch".to_string(),
                    value: "main".to_string(),
                }),
            },
            archive_path: PathBuf::from(format!("/tmp/{id}.asu")),
            size_bytes: 1234,
            created_at: now_ts(),
            last_accessed: None,
            expires_at: expires_at.to_string(),
            status: ContainerStatus::Active,
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let rec = record("aaa", &ts_in_days(30));
        store.insert(&rec).unwrap();

        let got = store.get_by_id("aaa").unwrap().unwrap();
        assert_eq!(got.id, rec.id);
        assert_eq!(got.source, rec.source);
        assert_eq!(got.size_bytes, 1234);
        assert_eq!(got.status, ContainerStatus::Active);
        assert!(store.get_by_id("zzz").unwrap().is_none());
    }

    #[test]
    fn status_update_and_not_found() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&record("aaa", &ts_in_days(30))).unwrap();

        store.update_status("aaa", ContainerStatus::Deleted).unwrap();
        let got = store.get_by_id("aaa").unwrap().unwrap();
        assert_eq!(got.status, ContainerStatus::Deleted);

        assert!(matches!(
            store.update_status("zzz", ContainerStatus::Expired),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn list_expired_honors_cutoff_and_status() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&record("past", &ts_in_days(-1))).unwrap();
        store.insert(&record("future", &ts_in_days(1))).unwrap();

        let expired = store.list_expired(&now_ts()).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "past");

        // Once expired, the record leaves the sweep set.
        store.update_status("past", ContainerStatus::Expired).unwrap();
        assert!(store.list_expired(&now_ts()).unwrap().is_empty());
    }

    #[test]
    fn env_vars_are_unique_per_name() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&record("aaa", &ts_in_days(30))).unwrap();
        store.set_env_var("aaa", "FOO", "1").unwrap();
        store.set_env_var("aaa", "FOO", "2").unwrap();
        store.set_env_var("aaa", "BAR", "3").unwrap();

        let vars = store.get_env_vars("aaa").unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["FOO"], "2");
        assert_eq!(vars["BAR"], "3");
    }

    #[test]
    fn logs_are_paged_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&record("aaa", &ts_in_days(30))).unwrap();
        for i in 0..5 {
            store.append_log("aaa", "stdout", &format!("line {i}")).unwrap();
        }

        let first = store.get_logs("aaa", 1, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].message, "line 4");

        let third = store.get_logs("aaa", 3, 2).unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].message, "line 0");
    }

    #[test]
    fn execution_records_append() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&record("aaa", &ts_in_days(30))).unwrap();
        for code in [0, 1] {
            store
                .record_execution(&ExecutionRecord {
                    container_id: "aaa".to_string(),
                    command: "echo".to_string(),
                    executed_at: now_ts(),
                    exit_code: code,
                })
                .unwrap();
        }
        assert_eq!(store.get_executions("aaa").unwrap().len(), 2);
    }

    #[test]
    fn maintain_runs_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("meta.db")).unwrap();
        store.insert(&record("aaa", &ts_in_days(30))).unwrap();
        store.maintain().unwrap();
    }
}
