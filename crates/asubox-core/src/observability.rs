//! Tracing setup and structured audit events.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Reads `RUST_LOG`, defaults
/// to `info`. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Sink for child process output chunks as they arrive, independent of
/// the final execution result. Implemented by the metadata store.
pub trait LogSink: Send + Sync {
    fn append(&self, container_id: &str, stream: &str, message: &str);
}

pub fn audit_container_created(id: &str, source_url: &str, size_bytes: u64) {
    tracing::info!(
        target: "audit",
        container_id = %id,
        source_url = %source_url,
        size_bytes,
        "container created"
    );
}

pub fn audit_command_invoked(id: &str, command: &str, args: &[String]) {
    tracing::info!(
        target: "audit",
        container_id = %id,
        command = %command,
        args = ?args,
        "command invoked"
    );
}

pub fn audit_execution_completed(id: &str, exit_code: i32, duration_ms: u64, stdout_len: usize) {
    tracing::info!(
        target: "audit",
        container_id = %id,
        exit_code,
        duration_ms,
        stdout_len,
        "execution completed"
    );
}

pub fn audit_container_deleted(id: &str) {
    tracing::info!(target: "audit", container_id = %id, "container deleted");
}

pub fn audit_sweep_completed(expired: usize, failed: usize) {
    tracing::info!(target: "audit", expired, failed, "expiry sweep completed");
}
