//! Shared helpers for subprocess steps with a wall-clock deadline.
//!
//! Used by the environment bootstrapper and the source fetch step;
//! the main command executor has its own, stricter monitor (output
//! ceilings, cancellation) in `exec`.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use asubox_core::{Error, Result};

/// Poll interval for child process monitoring.
pub const POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug)]
pub struct StepOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run a helper subprocess to completion with a deadline.
///
/// Reads stdout/stderr in background threads while the process runs;
/// without that, a child writing more than the pipe buffer (~64 KiB)
/// blocks on write and the wait deadlocks. On deadline expiry the
/// child is killed and reaped, and the call fails with `Timeout`.
pub fn run_with_deadline(cmd: &mut Command, timeout_ms: u64) -> Result<StepOutput> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Execution(format!("failed to spawn: {e}")))?;

    let stdout = drain_in_background(child.stdout.take());
    let stderr = drain_in_background(child.stderr.take());

    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(StepOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: join_output(stdout),
                    stderr: join_output(stderr),
                });
            }
            Ok(None) => {}
            Err(e) => {
                reap(&mut child);
                let _ = (join_output(stdout), join_output(stderr));
                return Err(Error::Execution(format!("failed to wait for process: {e}")));
            }
        }

        if start.elapsed() > timeout {
            reap(&mut child);
            let _ = (join_output(stdout), join_output(stderr));
            return Err(Error::Timeout(timeout_ms));
        }

        thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}

fn drain_in_background<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> Option<thread::JoinHandle<String>> {
    pipe.map(|mut r| {
        thread::spawn(move || {
            let mut s = String::new();
            let _ = r.read_to_string(&mut s);
            s
        })
    })
}

fn join_output(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn completes_and_captures_output() {
        let out = run_with_deadline(Command::new("echo").arg("hello"), 5_000).unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn deadline_kills_long_running_step() {
        let start = std::time::Instant::now();
        let err = run_with_deadline(Command::new("sleep").arg("5"), 100).unwrap_err();
        assert!(matches!(err, Error::Timeout(100)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn large_output_does_not_deadlock() {
        let out = run_with_deadline(
            Command::new("sh").args(["-c", "head -c 200000 /dev/zero | tr '\\0' 'x'"]),
            10_000,
        )
        .unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.len(), 200_000);
    }
}
