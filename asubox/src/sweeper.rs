//! Background retention: expiry sweeps and periodic store maintenance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use asubox_core::config::RetentionConfig;
use asubox_core::observability;
use asubox_sandbox::archive::ArchiveStore;
use asubox_store::{ContainerStatus, Store};

/// Expire every active container past its retention window. Failures
/// on one container never stop the pass; they are counted and logged.
pub fn sweep_once(store: &Store, archives: &ArchiveStore) -> Result<(usize, usize)> {
    let expired = store.list_expired(&asubox_core::now_ts())?;
    let mut swept = 0usize;
    let mut failed = 0usize;
    for record in expired {
        let outcome = archives
            .delete(&record.id)
            .and_then(|()| store.update_status(&record.id, ContainerStatus::Expired));
        match outcome {
            Ok(()) => swept += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(container_id = %record.id, %e, "failed to expire container");
            }
        }
    }
    observability::audit_sweep_completed(swept, failed);
    Ok((swept, failed))
}

/// Periodic sweeper thread. Sweeps every `sweep_period_secs` and runs
/// store maintenance once the maintenance period has elapsed.
pub struct Sweeper {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Sweeper {
    pub fn start(store: Arc<Store>, archives: ArchiveStore, retention: RetentionConfig) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::spawn(move || {
            let sweep_period = retention.sweep_period_secs.max(1);
            let ticks_per_maintenance =
                (retention.maintenance_period_secs / sweep_period).max(1);
            let mut tick: u64 = 0;
            loop {
                if sleep_interruptible(&stop_flag, sweep_period) {
                    break;
                }
                if let Err(e) = sweep_once(&store, &archives) {
                    tracing::warn!(%e, "expiry sweep failed");
                }
                tick += 1;
                if tick % ticks_per_maintenance == 0 {
                    match store.maintain() {
                        Ok(()) => tracing::info!("store maintenance completed"),
                        Err(e) => tracing::warn!(%e, "store maintenance failed"),
                    }
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Sleep for `secs`, waking early when the stop flag is raised.
/// Returns true when stopped.
fn sleep_interruptible(stop: &AtomicBool, secs: u64) -> bool {
    for _ in 0..secs {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        thread::sleep(Duration::from_secs(1));
    }
    stop.load(Ordering::SeqCst)
}
