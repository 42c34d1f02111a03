// ============================================================================
// EVA Online backend
// ============================================================================

pub mod auth;
pub mod config;
pub mod core;
pub mod recovery;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod web;

pub use config::{AppConfig, RemoteBackend};
pub use core::{EvaError, Result};
pub use recovery::{BackupTarget, BatchRecoveryOptions, BatchRecoveryReport, PointRecovery};
pub use remote::{InMemoryRemoteStore, RemoteStore, SupabaseConfig, SupabaseRemoteStore};
pub use storage::{FileBackend, KeyValueBackend, LocalStore, MemoryBackend};
pub use sync::{StorageManager, SyncConfig, SyncWorker, spawn_sync_worker};
pub use web::{AppState, build_router};
