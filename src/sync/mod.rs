//! Local-first writes with best-effort background delivery to the remote store.

pub mod journal;
pub mod manager;
pub mod queue;
pub mod worker;

pub use journal::{JournalEntry, QueueJournal};
pub use manager::{StorageManager, SyncAuditEntry, SyncConfig, SyncOutcome, SyncReport};
pub use queue::{QueueItem, RetryOutcome, WriteQueue};
pub use worker::{SyncWorker, spawn_sync_worker};
