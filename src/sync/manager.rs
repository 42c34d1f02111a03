use super::journal::{JournalEntry, QueueJournal};
use super::queue::{QueueItem, RetryOutcome, WriteQueue};
use crate::core::Result;
use crate::remote::RemoteStore;
use crate::storage::{AUTH_TOKEN_KEY, LocalStore};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sync loop tuning.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time between background ticks
    pub interval: Duration,
    /// Items drained per pass
    pub batch_size: usize,
    /// Failed attempts before an item is dropped
    pub max_retries: u32,
    /// Audit entries kept in memory
    pub audit_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            batch_size: 10,
            max_retries: 3,
            audit_capacity: 100,
        }
    }
}

impl SyncConfig {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAuditEntry {
    pub user_id: String,
    pub key: String,
    pub outcome: SyncOutcome,
    pub retry_count: u32,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Another pass was already running; nothing was attempted.
    pub skipped: bool,
    pub attempted: usize,
    pub synced: usize,
    pub requeued: usize,
    pub dropped: usize,
    pub remaining: usize,
}

struct QueueState {
    queue: WriteQueue,
    journal: Option<QueueJournal>,
}

impl QueueState {
    fn log(&mut self, entry: JournalEntry) -> Result<()> {
        match self.journal.as_mut() {
            Some(journal) => journal.append(&entry),
            None => Ok(()),
        }
    }
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Local writes first, remote store eventually.
///
/// Every `set` lands in the checksummed local store immediately; writes made
/// on behalf of a known user are also queued and pushed to the remote store
/// by [`StorageManager::sync_now`], which the background worker calls on a
/// fixed interval.
pub struct StorageManager {
    local: LocalStore,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    state: Mutex<QueueState>,
    sync_in_progress: AtomicBool,
    audit: Mutex<VecDeque<SyncAuditEntry>>,
}

impl StorageManager {
    /// Manager with a purely in-memory queue: pending writes are lost when
    /// the process exits.
    pub fn new(local: LocalStore, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self::from_parts(local, remote, config, WriteQueue::new(), None)
    }

    /// Manager whose queue is journaled to `journal_path` and replayed here.
    pub fn with_journal<P: AsRef<Path>>(
        local: LocalStore,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
        journal_path: P,
    ) -> Result<Self> {
        let (journal, queue) = QueueJournal::open(journal_path)?;
        if !queue.is_empty() {
            info!(pending = queue.len(), "resuming journaled sync queue");
        }
        Ok(Self::from_parts(local, remote, config, queue, Some(journal)))
    }

    fn from_parts(
        local: LocalStore,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
        queue: WriteQueue,
        journal: Option<QueueJournal>,
    ) -> Self {
        Self {
            local,
            remote,
            config,
            state: Mutex::new(QueueState { queue, journal }),
            sync_in_progress: AtomicBool::new(false),
            audit: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Writes locally and, when `user_id` is known, queues the value for sync.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, user_id: Option<&str>) -> Result<()> {
        self.local.write(key, value)?;
        if user_id.is_some() {
            let json = serde_json::to_value(value)?;
            self.enqueue(key, json, user_id)?;
        }
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.local.read(key, default)
    }

    /// Drops the local copy. Remote rows are left alone.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.local.remove(key)
    }

    fn enqueue(
        &self,
        key: &str,
        value: serde_json::Value,
        user_id: Option<&str>,
    ) -> Result<Option<QueueItem>> {
        let mut state = self.state.lock()?;
        let Some(item) = state.queue.enqueue(key, value, user_id) else {
            return Ok(None);
        };
        state.log(JournalEntry::Enqueued(item.clone()))?;
        debug!(key, user_id = item.user_id.as_deref(), "write queued for sync");
        Ok(Some(item))
    }

    /// Queues every locally stored value (except the auth token) for
    /// `user_id`, so the next passes push this device's state upstream.
    pub fn migrate_user(&self, user_id: &str) -> Result<usize> {
        let mut migrated = 0;
        for key in self.local.keys()? {
            if key == AUTH_TOKEN_KEY {
                continue;
            }
            let Some(value) = self.local.read_json(&key) else {
                warn!(key, "skipping unreadable local value during migration");
                continue;
            };
            if self.enqueue(&key, value, Some(user_id))?.is_some() {
                migrated += 1;
            }
        }
        info!(user_id, migrated, "local data queued for migration");
        Ok(migrated)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().map(|state| state.queue.len()).unwrap_or(0)
    }

    pub fn pending_items(&self) -> Result<Vec<QueueItem>> {
        Ok(self.state.lock()?.queue.items())
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_in_progress.load(Ordering::Acquire)
    }

    /// Most recent audit entries, oldest first.
    pub fn audit_log(&self) -> Vec<SyncAuditEntry> {
        self.audit
            .lock()
            .map(|audit| audit.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Runs one sync pass over at most `batch_size` items.
    ///
    /// Returns a skipped report if another pass is in flight. A failing item
    /// never aborts the rest of the batch.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        let Some(_guard) = InFlightGuard::acquire(&self.sync_in_progress) else {
            debug!("sync pass already in flight, skipping");
            return Ok(SyncReport {
                skipped: true,
                remaining: self.pending_count(),
                ..SyncReport::default()
            });
        };

        let batch = self.state.lock()?.queue.batch(self.config.batch_size);
        let mut report = SyncReport {
            attempted: batch.len(),
            ..SyncReport::default()
        };

        for item in batch {
            let user_id = item.user_id.clone().unwrap_or_default();
            let result = self
                .remote
                .upsert_mirror(&user_id, &item.key, &item.value)
                .await;
            self.settle(&item, result.map_err(|err| err.to_string()), &mut report)?;
        }

        report.remaining = self.finish_pass()?;
        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                synced = report.synced,
                requeued = report.requeued,
                dropped = report.dropped,
                remaining = report.remaining,
                "sync pass finished"
            );
        }
        Ok(report)
    }

    fn settle(
        &self,
        item: &QueueItem,
        result: std::result::Result<(), String>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let slot = item.slot();
        let user_id = item.user_id.clone().unwrap_or_default();
        let mut state = self.state.lock()?;

        match result {
            Ok(()) => {
                report.synced += 1;
                if state.queue.remove_if_current(&slot, item.seq) {
                    state.log(JournalEntry::Removed {
                        slot,
                        seq: item.seq,
                    })?;
                }
                drop(state);
                self.record_audit(SyncAuditEntry {
                    user_id,
                    key: item.key.clone(),
                    outcome: SyncOutcome::Synced,
                    retry_count: item.retry_count,
                    error: None,
                    timestamp: Utc::now(),
                });
            }
            Err(error) => {
                let outcome = state
                    .queue
                    .record_failure(&slot, item.seq, self.config.max_retries);
                match outcome {
                    RetryOutcome::Requeued(retry_count) => {
                        report.requeued += 1;
                        warn!(key = %item.key, user_id = %user_id, retry_count, error = %error, "sync failed, will retry");
                        state.log(JournalEntry::Retried {
                            slot,
                            seq: item.seq,
                            retry_count,
                        })?;
                    }
                    RetryOutcome::Dropped => {
                        report.dropped += 1;
                        warn!(key = %item.key, user_id = %user_id, error = %error, "sync failed permanently, dropping write");
                        state.log(JournalEntry::Removed {
                            slot,
                            seq: item.seq,
                        })?;
                        drop(state);
                        self.record_audit(SyncAuditEntry {
                            user_id,
                            key: item.key.clone(),
                            outcome: SyncOutcome::Dropped,
                            retry_count: self.config.max_retries,
                            error: Some(error),
                            timestamp: Utc::now(),
                        });
                    }
                    RetryOutcome::Superseded => {
                        debug!(key = %item.key, "failed write was superseded by a newer one");
                    }
                }
            }
        }
        Ok(())
    }

    fn finish_pass(&self) -> Result<usize> {
        let mut state = self.state.lock()?;
        let QueueState { queue, journal } = &mut *state;
        if let Some(journal) = journal.as_mut()
            && journal.needs_compaction()
        {
            journal.compact(queue)?;
        }
        Ok(queue.len())
    }

    fn record_audit(&self, entry: SyncAuditEntry) {
        if self.config.audit_capacity == 0 {
            return;
        }
        if let Ok(mut audit) = self.audit.lock() {
            while audit.len() >= self.config.audit_capacity {
                audit.pop_front();
            }
            audit.push_back(entry);
        }
    }
}
