use super::PointRecovery;
use crate::core::{RecoveryLogEntry, RecoveryOperation, Result, User};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BatchRecoveryOptions {
    /// Resume strictly after this handle
    pub start_after: Option<String>,
    /// Users fetched per page
    pub batch_size: usize,
    /// Stop after visiting this many users
    pub max_users: Option<usize>,
    /// Larger corrections are flagged instead of applied
    pub max_point_change: i64,
    /// Pause between pages
    pub delay: Duration,
    pub dry_run: bool,
}

impl Default for BatchRecoveryOptions {
    fn default() -> Self {
        Self {
            start_after: None,
            batch_size: 50,
            max_users: None,
            max_point_change: 50_000,
            delay: Duration::from_millis(100),
            dry_run: true,
        }
    }
}

impl BatchRecoveryOptions {
    pub fn start_after(mut self, handle: impl Into<String>) -> Self {
        self.start_after = Some(handle.into());
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn max_users(mut self, max_users: usize) -> Self {
        self.max_users = Some(max_users);
        self
    }

    pub fn max_point_change(mut self, cap: i64) -> Self {
        self.max_point_change = cap.saturating_abs();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// A correction that exceeded the per-user cap and was left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedChange {
    pub user_id: Uuid,
    pub handle: String,
    pub old_points: i64,
    pub new_points: i64,
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub handle: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecoveryReport {
    pub dry_run: bool,
    pub processed: usize,
    /// Sum of absolute deltas over applied corrections.
    pub total_points_changed: i64,
    pub largest_change: Option<RecoveryLogEntry>,
    pub applied: Vec<RecoveryLogEntry>,
    pub flagged: Vec<FlaggedChange>,
    pub errors: Vec<BatchError>,
    /// Pass as `start_after` to resume.
    pub last_handle: Option<String>,
}

impl BatchRecoveryReport {
    fn record_applied(&mut self, entry: RecoveryLogEntry) {
        let magnitude = entry.delta().saturating_abs();
        self.total_points_changed = self.total_points_changed.saturating_add(magnitude);
        if self
            .largest_change
            .as_ref()
            .is_none_or(|largest| magnitude > largest.delta().saturating_abs())
        {
            self.largest_change = Some(entry.clone());
        }
        self.applied.push(entry);
    }
}

enum UserOutcome {
    Unchanged,
    Applied(RecoveryLogEntry),
    Flagged(FlaggedChange),
}

impl PointRecovery {
    /// Walks every user by handle and reconciles each one.
    ///
    /// A failure on one user is recorded in the report and the walk goes on;
    /// only failing to fetch a page of users aborts the run.
    pub async fn batch_recover_points(
        &self,
        options: BatchRecoveryOptions,
    ) -> Result<BatchRecoveryReport> {
        let mut report = BatchRecoveryReport {
            dry_run: options.dry_run,
            ..BatchRecoveryReport::default()
        };
        let mut cursor = options.start_after.clone();

        loop {
            let limit = match options.max_users {
                Some(max) if report.processed >= max => break,
                Some(max) => options.batch_size.min(max - report.processed),
                None => options.batch_size,
            };

            let users = self
                .remote()
                .list_users_after(cursor.as_deref(), limit)
                .await?;
            let page_len = users.len();

            for user in users {
                cursor = Some(user.handle.clone());
                report.processed += 1;
                match self.reconcile_capped(&user, &options).await {
                    Ok(UserOutcome::Unchanged) => {}
                    Ok(UserOutcome::Applied(entry)) => report.record_applied(entry),
                    Ok(UserOutcome::Flagged(flagged)) => {
                        warn!(
                            handle = %flagged.handle,
                            delta = flagged.delta,
                            cap = options.max_point_change,
                            "point change exceeds cap, flagged"
                        );
                        report.flagged.push(flagged);
                    }
                    Err(err) => report.errors.push(BatchError {
                        handle: user.handle.clone(),
                        error: err.to_string(),
                    }),
                }
            }

            report.last_handle = cursor.clone();
            if page_len < limit {
                break;
            }
            if !options.delay.is_zero() {
                tokio::time::sleep(options.delay).await;
            }
        }

        info!(
            processed = report.processed,
            applied = report.applied.len(),
            flagged = report.flagged.len(),
            errors = report.errors.len(),
            dry_run = report.dry_run,
            "batch point recovery finished"
        );
        Ok(report)
    }

    async fn reconcile_capped(
        &self,
        user: &User,
        options: &BatchRecoveryOptions,
    ) -> Result<UserOutcome> {
        let plan = self.plan(user).await?;
        if !plan.changes_anything() {
            return Ok(UserOutcome::Unchanged);
        }
        if plan.delta().saturating_abs() > options.max_point_change {
            return Ok(UserOutcome::Flagged(FlaggedChange {
                user_id: user.id,
                handle: user.handle.clone(),
                old_points: plan.old_points,
                new_points: plan.new_points,
                delta: plan.delta(),
            }));
        }
        let entry = self
            .execute(user, plan, RecoveryOperation::BatchRecover, options.dry_run)
            .await?;
        Ok(UserOutcome::Applied(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionRecord;
    use crate::remote::{InMemoryRemoteStore, RemoteStore};
    use chrono::Utc;
    use std::sync::Arc;

    async fn seed(remote: &InMemoryRemoteStore, handle: &str, points: i64, sessions: &[i64]) -> Uuid {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            twitter_id: None,
            handle: handle.to_string(),
            display_name: handle.to_string(),
            avatar_url: None,
            points,
            is_og: false,
            og_reward_granted: false,
            questions_asked_today: 0,
            created_at: now,
            updated_at: now,
        };
        let id = user.id;
        remote.insert_user(user).await;
        for points in sessions {
            remote
                .insert_session(SessionRecord {
                    id: Uuid::new_v4(),
                    user_id: id,
                    question_count: 5,
                    points_earned: *points,
                    created_at: now,
                })
                .await;
        }
        id
    }

    #[tokio::test]
    async fn batch_applies_small_changes_and_flags_large_ones() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let alice = seed(&remote, "alice", 1_000, &[500]).await;
        let bob = seed(&remote, "bob", 1_000, &[2_500; 30]).await;
        let carol = seed(&remote, "carol", 1_000, &[]).await;
        let recovery = PointRecovery::new(remote.clone());

        let report = recovery
            .batch_recover_points(
                BatchRecoveryOptions::default()
                    .dry_run(false)
                    .max_point_change(10_000)
                    .batch_size(2)
                    .delay(Duration::ZERO),
            )
            .await
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].handle, "alice");
        assert_eq!(report.total_points_changed, 500);
        assert_eq!(report.flagged.len(), 1);
        assert_eq!(report.flagged[0].handle, "bob");
        assert_eq!(report.flagged[0].delta, 75_000);
        assert_eq!(report.last_handle.as_deref(), Some("carol"));

        let points = |id| {
            let remote = remote.clone();
            async move { remote.get_user_by_id(id).await.unwrap().unwrap().points }
        };
        assert_eq!(points(alice).await, 1_500);
        assert_eq!(points(bob).await, 1_000);
        assert_eq!(points(carol).await, 1_000);
    }

    #[tokio::test]
    async fn batch_resumes_after_handle_and_respects_max_users() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        for handle in ["a", "b", "c", "d"] {
            seed(&remote, handle, 900, &[]).await;
        }
        let recovery = PointRecovery::new(remote.clone());

        let report = recovery
            .batch_recover_points(
                BatchRecoveryOptions::default()
                    .start_after("a")
                    .max_users(2)
                    .delay(Duration::ZERO),
            )
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.processed, 2);
        assert_eq!(report.last_handle.as_deref(), Some("c"));
        let handles: Vec<_> = report.applied.iter().map(|e| e.handle.as_str()).collect();
        assert_eq!(handles, vec!["b", "c"]);
        // Dry run leaves totals alone.
        let b = remote.get_user_by_handle("b").await.unwrap().unwrap();
        assert_eq!(b.points, 900);
    }
}
