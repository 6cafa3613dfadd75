//! Restricted command execution inside a workspace.
//!
//! The executor owns a registry of running processes, one entry per
//! execution, so a running command can be stopped or inspected from
//! another thread. Output is captured in 4 KiB chunks, forwarded to
//! the log sink as it arrives, and cut off at a per-stream ceiling.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use asubox_core::observability::LogSink;
use asubox_core::{Error, Result};

use crate::common::POLL_INTERVAL_MS;

const READ_CHUNK_BYTES: usize = 4096;

/// Result of a command that ran to completion within all limits.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub completed_at: String,
}

#[derive(Debug, Clone)]
struct RunningHandle {
    container_id: String,
    pid: u32,
    cancel: Arc<AtomicBool>,
}

/// Runs sandboxed commands and tracks every live process. Concurrent
/// executions against the same container id are independent; each gets
/// its own registry entry, and `stop` signals all of them.
#[derive(Debug, Default)]
pub struct Executor {
    next_token: AtomicU64,
    running: Mutex<HashMap<u64, RunningHandle>>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `command` with `args` inside `workspace` under the fixed
    /// environment `env`, bounded by `timeout_ms` and a per-stream
    /// `output_cap_bytes` ceiling. Every captured chunk is forwarded
    /// to `sink` before the call returns.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        container_id: &str,
        command: &str,
        args: &[String],
        workspace: &std::path::Path,
        env: &HashMap<String, String>,
        timeout_ms: u64,
        output_cap_bytes: usize,
        sink: &dyn LogSink,
    ) -> Result<ExecutionOutput> {
        let mut child = Command::new(command)
            .args(args)
            .current_dir(workspace)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Execution(format!("failed to start '{command}': {e}")))?;

        let cancel = Arc::new(AtomicBool::new(false));
        let token = self.register(container_id, child.id(), cancel.clone());
        let result = monitor(
            container_id,
            &mut child,
            &cancel,
            timeout_ms,
            output_cap_bytes,
            sink,
        );
        self.deregister(token);
        result
    }

    /// Request termination of every running command for the container.
    /// Returns false when nothing is running for that id.
    pub fn stop(&self, container_id: &str) -> bool {
        let running = self.lock_registry();
        let mut matched = false;
        for handle in running.values() {
            if handle.container_id == container_id {
                handle.cancel.store(true, Ordering::SeqCst);
                matched = true;
            }
        }
        matched
    }

    /// Pid of one of the container's running commands, if any.
    pub fn status(&self, container_id: &str) -> Option<u32> {
        self.lock_registry()
            .values()
            .find(|h| h.container_id == container_id)
            .map(|h| h.pid)
    }

    fn register(&self, container_id: &str, pid: u32, cancel: Arc<AtomicBool>) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.lock_registry().insert(
            token,
            RunningHandle {
                container_id: container_id.to_string(),
                pid,
                cancel,
            },
        );
        token
    }

    fn deregister(&self, token: u64) {
        self.lock_registry().remove(&token);
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, HashMap<u64, RunningHandle>> {
        match self.running.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn monitor(
    container_id: &str,
    child: &mut Child,
    cancel: &AtomicBool,
    timeout_ms: u64,
    output_cap_bytes: usize,
    sink: &dyn LogSink,
) -> Result<ExecutionOutput> {
    let limit_hit = AtomicBool::new(false);
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    std::thread::scope(|s| {
        let limit = &limit_hit;
        let stdout = stdout_pipe.map(|pipe| {
            s.spawn(move || drain_capped(pipe, container_id, "stdout", output_cap_bytes, limit, sink))
        });
        let stderr = stderr_pipe.map(|pipe| {
            s.spawn(move || drain_capped(pipe, container_id, "stderr", output_cap_bytes, limit, sink))
        });

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let status = loop {
            if limit_hit.load(Ordering::SeqCst) {
                reap(child);
                return Err(Error::ResourceLimit(format!(
                    "output exceeded {output_cap_bytes} bytes"
                )));
            }
            if cancel.load(Ordering::SeqCst) {
                reap(child);
                return Err(Error::Execution("terminated by stop request".into()));
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    reap(child);
                    return Err(Error::Execution(format!("failed to wait for process: {e}")));
                }
            }
            if start.elapsed() > timeout {
                reap(child);
                return Err(Error::Timeout(timeout_ms));
            }
            std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
        };

        let stdout = join_capture(stdout);
        let stderr = join_capture(stderr);
        if limit_hit.load(Ordering::SeqCst) {
            return Err(Error::ResourceLimit(format!(
                "output exceeded {output_cap_bytes} bytes"
            )));
        }

        Ok(ExecutionOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            completed_at: asubox_core::now_ts(),
        })
    })
}

/// Read a pipe in chunks, forwarding each chunk to the sink and
/// accumulating up to the cap. Past the cap the flag is raised and
/// reading stops, which lets the monitor kill the writer.
fn drain_capped<R: Read>(
    mut pipe: R,
    container_id: &str,
    stream: &'static str,
    cap_bytes: usize,
    limit_hit: &AtomicBool,
    sink: &dyn LogSink,
) -> String {
    let mut collected = String::new();
    let mut buf = [0u8; READ_CHUNK_BYTES];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]);
                sink.append(container_id, stream, &chunk);
                if collected.len() + chunk.len() > cap_bytes {
                    let room = cap_bytes.saturating_sub(collected.len());
                    collected.push_str(truncate_to_char_boundary(&chunk, room));
                    limit_hit.store(true, Ordering::SeqCst);
                    break;
                }
                collected.push_str(&chunk);
            }
        }
    }
    collected
}

fn join_capture(handle: Option<std::thread::ScopedJoinHandle<'_, String>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

fn truncate_to_char_boundary(s: &str, mut max: usize) -> &str {
    if max >= s.len() {
        return s;
    }
    while max > 0 && !s.is_char_boundary(max) {
        max -= 1;
    }
    &s[..max]
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
