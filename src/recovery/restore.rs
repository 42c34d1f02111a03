use super::PointRecovery;
use crate::core::points::LARGE_CHANGE_THRESHOLD;
use crate::core::{
    BackupRow, EvaError, Notification, NotificationKind, RecoveryLogEntry, RecoveryOperation,
    Result, User,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const NO_VALID_BACKUP: &str = "no valid backup found";

/// Which backup to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupTarget {
    Id(Uuid),
    /// The most recent unrestored backup for this handle
    Handle(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorePreview {
    pub backup: BackupRow,
    pub handle: String,
    pub current_points: i64,
    pub restored_points: i64,
    pub delta: i64,
    pub current_og_reward: bool,
    pub restored_og_reward: bool,
    pub og_change: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub preview: RestorePreview,
    pub user: User,
    pub log: RecoveryLogEntry,
    pub notification: Notification,
}

impl PointRecovery {
    async fn resolve_backup(&self, target: &BackupTarget) -> Result<BackupRow> {
        let backup = match target {
            BackupTarget::Id(id) => self.remote().get_backup(*id).await?,
            BackupTarget::Handle(handle) => {
                let user = self
                    .remote()
                    .get_user_by_handle(handle)
                    .await?
                    .ok_or_else(|| EvaError::not_found(format!("user '{}' not found", handle)))?;
                self.remote().latest_unrestored_backup(user.id).await?
            }
        };
        backup
            .filter(|backup| !backup.restored)
            .ok_or_else(|| EvaError::not_found(NO_VALID_BACKUP))
    }

    async fn build_preview(&self, backup: BackupRow) -> Result<(RestorePreview, User)> {
        let user = self
            .remote()
            .get_user_by_id(backup.user_id)
            .await?
            .ok_or_else(|| EvaError::not_found(format!("user '{}' not found", backup.handle)))?;

        let restored_points = backup.snapshot.points;
        let restored_og_reward = backup.snapshot.og_status.was_og;
        let delta = restored_points.saturating_sub(user.points);
        let og_change = restored_og_reward != user.og_reward_granted;

        let mut warnings = Vec::new();
        if delta.saturating_abs() > LARGE_CHANGE_THRESHOLD {
            warnings.push(format!(
                "large point change: {} -> {} ({:+})",
                user.points, restored_points, delta
            ));
        }
        if og_change {
            warnings.push(format!(
                "OG reward will change: {} -> {}",
                user.og_reward_granted, restored_og_reward
            ));
        }

        let preview = RestorePreview {
            handle: user.handle.clone(),
            current_points: user.points,
            restored_points,
            delta,
            current_og_reward: user.og_reward_granted,
            restored_og_reward,
            og_change,
            warnings,
            backup,
        };
        Ok((preview, user))
    }

    /// Describes what restoring `target` would do, without writing.
    pub async fn preview_restore(&self, target: &BackupTarget) -> Result<RestorePreview> {
        let backup = self.resolve_backup(target).await?;
        Ok(self.build_preview(backup).await?.0)
    }

    /// Puts the user's points and OG reward back to the backed-up values.
    ///
    /// A backup restores at most once; afterwards it resolves as missing.
    pub async fn restore_backup(&self, target: &BackupTarget) -> Result<RestoreOutcome> {
        let backup = self.resolve_backup(target).await?;
        let backup_id = backup.id;
        let (preview, user) = self.build_preview(backup).await?;

        let updated = self
            .remote()
            .set_user_points(user.id, preview.restored_points, preview.restored_og_reward)
            .await?;
        let restored = self
            .remote()
            .mark_backup_restored(backup_id, Utc::now())
            .await?
            .ok_or_else(|| EvaError::not_found(NO_VALID_BACKUP))?;

        let log = RecoveryLogEntry {
            id: Uuid::new_v4(),
            user_id: user.id,
            handle: user.handle.clone(),
            old_points: user.points,
            new_points: preview.restored_points,
            og_status_before: user.og_reward_granted,
            og_status_after: preview.restored_og_reward,
            timestamp: Utc::now(),
            operation: RecoveryOperation::Restore,
            dry_run: false,
            error: None,
        };
        self.remote().append_recovery_log(&log).await?;

        let notification = Notification::new(
            user.id,
            NotificationKind::PointsRestored,
            "Points restored",
            format!(
                "Your points were restored from {} to {}.",
                user.points, preview.restored_points
            ),
        );
        self.remote().insert_notification(&notification).await?;

        info!(
            handle = %user.handle,
            backup_id = %backup_id,
            old_points = user.points,
            new_points = preview.restored_points,
            "backup restored"
        );
        Ok(RestoreOutcome {
            preview: RestorePreview {
                backup: restored,
                ..preview
            },
            user: updated,
            log,
            notification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionRecord;
    use crate::remote::{InMemoryRemoteStore, RemoteStore};
    use std::sync::Arc;

    async fn recovered_user() -> (Arc<InMemoryRemoteStore>, PointRecovery, Uuid) {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let now = Utc::now();
        let id = Uuid::new_v4();
        remote
            .insert_user(User {
                id,
                twitter_id: None,
                handle: "eva".into(),
                display_name: "Eva".into(),
                avatar_url: None,
                points: 1_000,
                is_og: true,
                og_reward_granted: false,
                questions_asked_today: 0,
                created_at: now,
                updated_at: now,
            })
            .await;
        remote
            .insert_session(SessionRecord {
                id: Uuid::new_v4(),
                user_id: id,
                question_count: 3,
                points_earned: 750,
                created_at: now,
            })
            .await;
        let recovery = PointRecovery::new(remote.clone());
        recovery.recover_user_points("eva", false).await.unwrap();
        (remote, recovery, id)
    }

    #[tokio::test]
    async fn preview_warns_on_large_and_og_changes() {
        let (_, recovery, _) = recovered_user().await;

        let preview = recovery
            .preview_restore(&BackupTarget::Handle("eva".into()))
            .await
            .unwrap();
        assert_eq!(preview.current_points, 11_750);
        assert_eq!(preview.restored_points, 1_000);
        assert_eq!(preview.delta, -10_750);
        assert!(preview.og_change);
        assert_eq!(preview.warnings.len(), 2);
    }

    #[tokio::test]
    async fn restore_reverts_and_notifies_once() {
        let (remote, recovery, id) = recovered_user().await;
        let target = BackupTarget::Handle("eva".into());

        let outcome = recovery.restore_backup(&target).await.unwrap();
        assert_eq!(outcome.user.points, 1_000);
        assert!(!outcome.user.og_reward_granted);
        assert!(outcome.preview.backup.restored);
        assert_eq!(outcome.log.operation, RecoveryOperation::Restore);

        let notifications = remote.list_notifications(id).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::PointsRestored);

        let again = recovery.restore_backup(&target).await.unwrap_err();
        assert!(matches!(again, EvaError::NotFound(ref msg) if msg == NO_VALID_BACKUP));

        let by_id = recovery
            .restore_backup(&BackupTarget::Id(outcome.preview.backup.id))
            .await
            .unwrap_err();
        assert!(matches!(by_id, EvaError::NotFound(_)));
    }
}
