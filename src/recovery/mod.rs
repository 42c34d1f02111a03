//! Point reconciliation against the authoritative session history.
//!
//! All mutating paths snapshot the user's pre-change state into a backup row
//! first, so any correction can be previewed and undone later.

pub mod batch;
pub mod restore;

use crate::core::points::recalculate_total;
use crate::core::{
    BackupRow, OgStatus, PointSnapshot, RecoveryLogEntry, RecoveryOperation, Result,
    SessionPoints, User,
};
use crate::remote::RemoteStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub use batch::{BatchError, BatchRecoveryOptions, BatchRecoveryReport, FlaggedChange};
pub use restore::{BackupTarget, RestoreOutcome, RestorePreview};

/// Planned correction for one user, computed without touching anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPlan {
    pub old_points: i64,
    pub new_points: i64,
    pub og_reward_before: bool,
    pub og_reward_after: bool,
}

impl RecoveryPlan {
    pub fn delta(&self) -> i64 {
        self.new_points.saturating_sub(self.old_points)
    }

    pub fn changes_anything(&self) -> bool {
        self.old_points != self.new_points || self.og_reward_before != self.og_reward_after
    }

    fn snapshot(&self) -> PointSnapshot {
        PointSnapshot {
            points: self.old_points,
            og_status: OgStatus {
                was_og: self.og_reward_before,
                is_now_og: self.og_reward_after,
            },
            session_points: SessionPoints {
                old_total: self.old_points,
                recalculated_total: self.new_points,
            },
        }
    }

    fn log_entry(&self, user: &User, operation: RecoveryOperation, dry_run: bool) -> RecoveryLogEntry {
        RecoveryLogEntry {
            id: Uuid::new_v4(),
            user_id: user.id,
            handle: user.handle.clone(),
            old_points: self.old_points,
            new_points: self.new_points,
            og_status_before: self.og_reward_before,
            og_status_after: self.og_reward_after,
            timestamp: Utc::now(),
            operation,
            dry_run,
            error: None,
        }
    }
}

/// Single-user, batch and restore operations over a [`RemoteStore`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use eva_online::{InMemoryRemoteStore, PointRecovery};
///
/// # tokio_test::block_on(async {
/// let recovery = PointRecovery::new(Arc::new(InMemoryRemoteStore::new()));
/// let entry = recovery.recover_user_points("nobody", true).await.unwrap();
/// assert!(entry.is_none());
/// # });
/// ```
#[derive(Clone)]
pub struct PointRecovery {
    remote: Arc<dyn RemoteStore>,
}

impl PointRecovery {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Recomputes what `user`'s total should be from their sessions.
    pub async fn plan(&self, user: &User) -> Result<RecoveryPlan> {
        let sessions = self.remote.list_sessions(user.id).await?;
        Ok(RecoveryPlan {
            old_points: user.points,
            new_points: recalculate_total(user.is_og, &sessions),
            og_reward_before: user.og_reward_granted,
            og_reward_after: user.is_og,
        })
    }

    /// Single-user recovery by handle. `None` when the user does not exist.
    ///
    /// In dry-run mode nothing is written, not even the audit log.
    pub async fn recover_user_points(
        &self,
        handle: &str,
        dry_run: bool,
    ) -> Result<Option<RecoveryLogEntry>> {
        let Some(user) = self.remote.get_user_by_handle(handle).await? else {
            return Ok(None);
        };
        let plan = self.plan(&user).await?;
        let entry = self
            .execute(&user, plan, RecoveryOperation::Recover, dry_run)
            .await?;
        Ok(Some(entry))
    }

    /// Applies `plan`: backup, overwrite, audit. Unchanged users get an audit
    /// entry but neither a backup nor a write.
    pub(crate) async fn execute(
        &self,
        user: &User,
        plan: RecoveryPlan,
        operation: RecoveryOperation,
        dry_run: bool,
    ) -> Result<RecoveryLogEntry> {
        let mut entry = plan.log_entry(user, operation, dry_run);
        if dry_run {
            return Ok(entry);
        }

        if plan.changes_anything()
            && let Err(err) = self.overwrite(user, &plan).await
        {
            warn!(handle = %user.handle, error = %err, "point recovery failed");
            entry.error = Some(err.to_string());
            if let Err(log_err) = self.remote.append_recovery_log(&entry).await {
                warn!(handle = %user.handle, error = %log_err, "could not record failed recovery");
            }
            return Err(err);
        }

        self.remote.append_recovery_log(&entry).await?;
        info!(
            handle = %user.handle,
            old_points = plan.old_points,
            new_points = plan.new_points,
            "points reconciled"
        );
        Ok(entry)
    }

    async fn overwrite(&self, user: &User, plan: &RecoveryPlan) -> Result<()> {
        let backup = BackupRow::new(user, plan.snapshot());
        self.remote.insert_backup(&backup).await?;
        self.remote
            .set_user_points(user.id, plan.new_points, plan.og_reward_after)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BackupFilter, SessionRecord};
    use crate::remote::InMemoryRemoteStore;

    fn user(handle: &str, points: i64, is_og: bool, granted: bool) -> User {
        User {
            id: Uuid::new_v4(),
            twitter_id: None,
            handle: handle.to_string(),
            display_name: handle.to_string(),
            avatar_url: None,
            points,
            is_og,
            og_reward_granted: granted,
            questions_asked_today: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn session(user_id: Uuid, points: i64) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            user_id,
            question_count: 1,
            points_earned: points,
            created_at: Utc::now(),
        }
    }

    async fn seeded() -> (Arc<InMemoryRemoteStore>, User) {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let eva = user("eva", 1_000, true, false);
        remote.insert_user(eva.clone()).await;
        remote.insert_session(session(eva.id, 350)).await;
        remote.insert_session(session(eva.id, 400)).await;
        (remote, eva)
    }

    #[tokio::test]
    async fn dry_run_reports_without_writing() {
        let (remote, eva) = seeded().await;
        let recovery = PointRecovery::new(remote.clone());

        let entry = recovery.recover_user_points("eva", true).await.unwrap().unwrap();
        assert_eq!(entry.old_points, 1_000);
        assert_eq!(entry.new_points, 11_750);
        assert!(entry.dry_run);

        let stored = remote.get_user_by_id(eva.id).await.unwrap().unwrap();
        assert_eq!(stored.points, 1_000);
        assert!(remote.list_backups(&BackupFilter::default()).await.unwrap().is_empty());
        assert!(remote.list_recovery_logs(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recovery_backs_up_then_overwrites() {
        let (remote, eva) = seeded().await;
        let recovery = PointRecovery::new(remote.clone());

        let entry = recovery.recover_user_points("eva", false).await.unwrap().unwrap();
        assert_eq!(entry.delta(), 10_750);
        assert!(entry.og_status_after);

        let stored = remote.get_user_by_id(eva.id).await.unwrap().unwrap();
        assert_eq!(stored.points, 11_750);
        assert!(stored.og_reward_granted);

        let backups = remote.list_backups(&BackupFilter::default()).await.unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].snapshot.points, 1_000);
        assert!(!backups[0].snapshot.og_status.was_og);
        assert_eq!(backups[0].snapshot.session_points.recalculated_total, 11_750);
    }

    #[tokio::test]
    async fn recovery_is_idempotent() {
        let (remote, _) = seeded().await;
        let recovery = PointRecovery::new(remote.clone());

        let first = recovery.recover_user_points("eva", false).await.unwrap().unwrap();
        let second = recovery.recover_user_points("eva", false).await.unwrap().unwrap();
        assert_eq!(second.old_points, first.new_points);
        assert_eq!(second.new_points, first.new_points);
        assert_eq!(second.delta(), 0);
        assert_eq!(remote.list_backups(&BackupFilter::default()).await.unwrap().len(), 1);
        assert_eq!(remote.list_recovery_logs(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_handle_yields_none() {
        let (remote, _) = seeded().await;
        let recovery = PointRecovery::new(remote);
        assert!(recovery.recover_user_points("nobody", false).await.unwrap().is_none());
    }
}
