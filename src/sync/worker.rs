use super::manager::StorageManager;
use crate::core::{EvaError, Result};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error};

/// Background task that runs a sync pass on every tick.
pub struct SyncWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl SyncWorker {
    /// Signals the worker to stop and waits for it to finish.
    ///
    /// A pass that is already running completes first.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| EvaError::Storage(format!("sync worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the periodic sync loop for `manager` on the current runtime.
///
/// A tick starts a pass only when nothing is in flight and the queue holds
/// work; failed items wait for the next tick (fixed delay, no backoff).
pub fn spawn_sync_worker(manager: Arc<StorageManager>) -> SyncWorker {
    let period = manager.config().interval.max(std::time::Duration::from_millis(10));
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    debug!("sync worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if manager.is_syncing() || manager.pending_count() == 0 {
                        continue;
                    }
                    if let Err(err) = manager.sync_now().await {
                        error!(error = %err, "sync pass failed");
                    }
                }
            }
        }
    });

    SyncWorker {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
