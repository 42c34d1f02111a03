//! The system of record.
//!
//! Everything the service persists goes through [`RemoteStore`]. Production
//! talks to Supabase over its REST surface; tests and demo mode use the
//! in-memory store.

pub mod memory;
pub mod object_storage;
pub mod supabase;

use crate::core::{
    BackupFilter, BackupRow, BountyAward, BugReport, BugReportFilter, LeaderboardEntry,
    MaintenanceFeedback, Notification, RecoveryLogEntry, Result, SessionRecord, TwitterProfile,
    User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub use memory::InMemoryRemoteStore;
pub use object_storage::{
    InMemoryObjectStorage, ObjectStorage, SIGNED_URL_EXPIRY_SECS, SupabaseObjectStorage,
};
pub use supabase::{SupabaseConfig, SupabaseRemoteStore};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    // ---- users -------------------------------------------------------------
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>>;
    /// Creates the user on first login, refreshes handle/name/avatar afterwards.
    async fn upsert_twitter_user(&self, profile: &TwitterProfile) -> Result<User>;
    /// Users ordered by handle, strictly after `start_after` when given.
    async fn list_users_after(&self, start_after: Option<&str>, limit: usize)
    -> Result<Vec<User>>;
    async fn leaderboard(&self, limit: usize, offset: usize) -> Result<Vec<LeaderboardEntry>>;
    /// Overwrites the point total and OG-reward flag. Last write wins.
    async fn set_user_points(
        &self,
        user_id: Uuid,
        points: i64,
        og_reward_granted: bool,
    ) -> Result<User>;
    /// Resets the daily question counter for one user or everyone; returns
    /// how many users were touched.
    async fn reset_question_counts(&self, user_id: Option<Uuid>) -> Result<u64>;

    // ---- sessions ----------------------------------------------------------
    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>>;
    /// Stores a session and credits its points to the user in one step.
    async fn record_session(&self, session: &SessionRecord) -> Result<User>;

    // ---- point recovery ----------------------------------------------------
    async fn insert_backup(&self, backup: &BackupRow) -> Result<()>;
    async fn get_backup(&self, id: Uuid) -> Result<Option<BackupRow>>;
    async fn latest_unrestored_backup(&self, user_id: Uuid) -> Result<Option<BackupRow>>;
    async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<BackupRow>>;
    /// Flips an unrestored backup to restored; `None` if it was missing or
    /// already restored.
    async fn mark_backup_restored(
        &self,
        id: Uuid,
        restored_at: DateTime<Utc>,
    ) -> Result<Option<BackupRow>>;
    async fn append_recovery_log(&self, entry: &RecoveryLogEntry) -> Result<()>;
    async fn list_recovery_logs(&self, user_id: Option<Uuid>) -> Result<Vec<RecoveryLogEntry>>;

    // ---- notifications -----------------------------------------------------
    async fn insert_notification(&self, notification: &Notification) -> Result<()>;
    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>>;
    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<bool>;

    // ---- bug bounty --------------------------------------------------------
    async fn insert_bug_report(&self, report: &BugReport) -> Result<()>;
    async fn get_bug_report(&self, id: Uuid) -> Result<Option<BugReport>>;
    async fn list_bug_reports(&self, filter: &BugReportFilter) -> Result<Vec<BugReport>>;
    /// Server-side procedure: marks the report awarded and credits the
    /// reporter. Fails with `Conflict` if the report is not open.
    async fn award_bug_bounty(&self, report_id: Uuid, points: i64) -> Result<BountyAward>;

    // ---- misc --------------------------------------------------------------
    async fn insert_maintenance_feedback(&self, feedback: &MaintenanceFeedback) -> Result<()>;
    async fn create_auth_session(&self, user_id: Uuid) -> Result<String>;
    async fn resolve_auth_session(&self, token: &str) -> Result<Option<User>>;
    /// Target of the background sync loop.
    async fn upsert_mirror(&self, user_id: &str, key: &str, value: &JsonValue) -> Result<()>;
}
