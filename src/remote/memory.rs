use super::RemoteStore;
use crate::core::points::BASE_POINTS;
use crate::core::{
    BackupFilter, BackupRow, BountyAward, BugReport, BugReportFilter, BugStatus, EvaError,
    LeaderboardEntry, MaintenanceFeedback, MirrorRecord, Notification, RecoveryLogEntry, Result,
    SessionRecord, TwitterProfile, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    sessions: Vec<SessionRecord>,
    backups: Vec<BackupRow>,
    recovery_logs: Vec<RecoveryLogEntry>,
    notifications: Vec<Notification>,
    bug_reports: Vec<BugReport>,
    feedback: Vec<MaintenanceFeedback>,
    auth_sessions: HashMap<String, Uuid>,
    mirror: HashMap<(String, String), MirrorRecord>,
    rejected_mirror_users: Vec<String>,
}

impl State {
    fn user_by_handle(&self, handle: &str) -> Option<&User> {
        let handle = normalize_handle(handle);
        self.users
            .values()
            .find(|user| user.handle.eq_ignore_ascii_case(handle))
    }

    fn user_mut(&mut self, id: Uuid) -> Result<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| EvaError::not_found("user not found"))
    }
}

/// Process-local stand-in for the hosted database.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    state: RwLock<State>,
    mirror_outage: AtomicBool,
    notification_outage: AtomicBool,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or replaces a user row as-is.
    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Seeds a session row without crediting points.
    pub async fn insert_session(&self, session: SessionRecord) {
        self.state.write().await.sessions.push(session);
    }

    /// While set, every mirror upsert fails as if the remote were unreachable.
    pub fn set_mirror_outage(&self, outage: bool) {
        self.mirror_outage.store(outage, Ordering::SeqCst);
    }

    /// While set, inserting a notification fails.
    pub fn set_notification_outage(&self, outage: bool) {
        self.notification_outage.store(outage, Ordering::SeqCst);
    }

    /// Makes mirror upserts for one user fail, leaving other users unaffected.
    pub async fn reject_mirror_for(&self, user_id: &str) {
        self.state
            .write()
            .await
            .rejected_mirror_users
            .push(user_id.to_string());
    }

    pub async fn mirror_value(&self, user_id: &str, key: &str) -> Option<JsonValue> {
        self.state
            .read()
            .await
            .mirror
            .get(&(user_id.to_string(), key.to_string()))
            .map(|record| record.value.clone())
    }

    pub async fn feedback(&self) -> Vec<MaintenanceFeedback> {
        self.state.read().await.feedback.clone()
    }
}

pub(crate) fn normalize_handle(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
        Ok(self.state.read().await.user_by_handle(handle).cloned())
    }

    async fn upsert_twitter_user(&self, profile: &TwitterProfile) -> Result<User> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        if let Some(user) = state
            .users
            .values_mut()
            .find(|user| user.twitter_id.as_deref() == Some(profile.twitter_id.as_str()))
        {
            user.handle = profile.handle.clone();
            user.display_name = profile.display_name.clone();
            user.avatar_url = profile.avatar_url.clone();
            user.updated_at = now;
            return Ok(user.clone());
        }

        let user = User {
            id: Uuid::new_v4(),
            twitter_id: Some(profile.twitter_id.clone()),
            handle: profile.handle.clone(),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
            points: BASE_POINTS,
            is_og: false,
            og_reward_granted: false,
            questions_asked_today: 0,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list_users_after(
        &self,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<&User> = state
            .users
            .values()
            .filter(|user| start_after.is_none_or(|after| user.handle.as_str() > after))
            .collect();
        users.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(users.into_iter().take(limit).cloned().collect())
    }

    async fn leaderboard(&self, limit: usize, offset: usize) -> Result<Vec<LeaderboardEntry>> {
        let state = self.state.read().await;
        let mut users: Vec<&User> = state.users.values().collect();
        users.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.handle.cmp(&b.handle)));
        Ok(users
            .into_iter()
            .enumerate()
            .skip(offset)
            .take(limit)
            .map(|(index, user)| LeaderboardEntry {
                rank: index as u64 + 1,
                handle: user.handle.clone(),
                display_name: user.display_name.clone(),
                avatar_url: user.avatar_url.clone(),
                points: user.points,
                is_og: user.is_og,
            })
            .collect())
    }

    async fn set_user_points(
        &self,
        user_id: Uuid,
        points: i64,
        og_reward_granted: bool,
    ) -> Result<User> {
        let mut state = self.state.write().await;
        let user = state.user_mut(user_id)?;
        user.points = points;
        user.og_reward_granted = og_reward_granted;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn reset_question_counts(&self, user_id: Option<Uuid>) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut touched = 0;
        for user in state.users.values_mut() {
            if user_id.is_none_or(|id| id == user.id) {
                user.questions_asked_today = 0;
                user.updated_at = Utc::now();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>> {
        let state = self.state.read().await;
        let mut sessions: Vec<SessionRecord> = state
            .sessions
            .iter()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|session| session.created_at);
        Ok(sessions)
    }

    async fn record_session(&self, session: &SessionRecord) -> Result<User> {
        let mut state = self.state.write().await;
        let user = state.user_mut(session.user_id)?;
        user.points += session.points_earned;
        user.questions_asked_today += session.question_count;
        user.updated_at = Utc::now();
        let user = user.clone();
        state.sessions.push(session.clone());
        Ok(user)
    }

    async fn insert_backup(&self, backup: &BackupRow) -> Result<()> {
        self.state.write().await.backups.push(backup.clone());
        Ok(())
    }

    async fn get_backup(&self, id: Uuid) -> Result<Option<BackupRow>> {
        Ok(self
            .state
            .read()
            .await
            .backups
            .iter()
            .find(|backup| backup.id == id)
            .cloned())
    }

    async fn latest_unrestored_backup(&self, user_id: Uuid) -> Result<Option<BackupRow>> {
        Ok(self
            .state
            .read()
            .await
            .backups
            .iter()
            .filter(|backup| backup.user_id == user_id && !backup.restored)
            .max_by_key(|backup| backup.created_at)
            .cloned())
    }

    async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<BackupRow>> {
        let state = self.state.read().await;
        let mut backups: Vec<BackupRow> = state
            .backups
            .iter()
            .filter(|backup| filter.matches(backup))
            .cloned()
            .collect();
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    async fn mark_backup_restored(
        &self,
        id: Uuid,
        restored_at: DateTime<Utc>,
    ) -> Result<Option<BackupRow>> {
        let mut state = self.state.write().await;
        let Some(backup) = state
            .backups
            .iter_mut()
            .find(|backup| backup.id == id && !backup.restored)
        else {
            return Ok(None);
        };
        backup.restored = true;
        backup.restored_at = Some(restored_at);
        Ok(Some(backup.clone()))
    }

    async fn append_recovery_log(&self, entry: &RecoveryLogEntry) -> Result<()> {
        self.state.write().await.recovery_logs.push(entry.clone());
        Ok(())
    }

    async fn list_recovery_logs(&self, user_id: Option<Uuid>) -> Result<Vec<RecoveryLogEntry>> {
        Ok(self
            .state
            .read()
            .await
            .recovery_logs
            .iter()
            .filter(|entry| user_id.is_none_or(|id| entry.user_id == id))
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        if self.notification_outage.load(Ordering::SeqCst) {
            return Err(EvaError::remote("notifications table unavailable"));
        }
        self.state
            .write()
            .await
            .notifications
            .push(notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let state = self.state.read().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|notification| notification.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        match state
            .notifications
            .iter_mut()
            .find(|notification| notification.id == id && notification.user_id == user_id)
        {
            Some(notification) => {
                notification.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_bug_report(&self, report: &BugReport) -> Result<()> {
        self.state.write().await.bug_reports.push(report.clone());
        Ok(())
    }

    async fn get_bug_report(&self, id: Uuid) -> Result<Option<BugReport>> {
        Ok(self
            .state
            .read()
            .await
            .bug_reports
            .iter()
            .find(|report| report.id == id)
            .cloned())
    }

    async fn list_bug_reports(&self, filter: &BugReportFilter) -> Result<Vec<BugReport>> {
        let state = self.state.read().await;
        let mut reports: Vec<BugReport> = state
            .bug_reports
            .iter()
            .filter(|report| filter.matches(report))
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn award_bug_bounty(&self, report_id: Uuid, points: i64) -> Result<BountyAward> {
        let mut state = self.state.write().await;
        let State {
            users, bug_reports, ..
        } = &mut *state;
        let report = bug_reports
            .iter_mut()
            .find(|report| report.id == report_id)
            .ok_or_else(|| EvaError::not_found("bug report not found"))?;
        let user = users
            .get_mut(&report.user_id)
            .ok_or_else(|| EvaError::not_found("user not found"))?;
        if report.status != BugStatus::Open {
            return Err(EvaError::Conflict(format!(
                "bug report is already {}",
                report.status.as_str()
            )));
        }
        let new_total = user
            .points
            .checked_add(points)
            .ok_or_else(|| EvaError::validation("award would overflow the user's points"))?;
        report.status = BugStatus::Awarded;
        report.awarded_points = Some(points);
        report.awarded_at = Some(Utc::now());
        let report = report.clone();

        user.points = new_total;
        user.updated_at = Utc::now();
        Ok(BountyAward { report, new_total })
    }

    async fn insert_maintenance_feedback(&self, feedback: &MaintenanceFeedback) -> Result<()> {
        self.state.write().await.feedback.push(feedback.clone());
        Ok(())
    }

    async fn create_auth_session(&self, user_id: Uuid) -> Result<String> {
        let token = Uuid::new_v4().simple().to_string();
        self.state
            .write()
            .await
            .auth_sessions
            .insert(token.clone(), user_id);
        Ok(token)
    }

    async fn resolve_auth_session(&self, token: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .auth_sessions
            .get(token)
            .and_then(|user_id| state.users.get(user_id))
            .cloned())
    }

    async fn upsert_mirror(&self, user_id: &str, key: &str, value: &JsonValue) -> Result<()> {
        if self.mirror_outage.load(Ordering::SeqCst) {
            return Err(EvaError::remote("remote store unavailable"));
        }
        let mut state = self.state.write().await;
        if state.rejected_mirror_users.iter().any(|rejected| rejected == user_id) {
            return Err(EvaError::remote(format!("mirror write rejected for '{user_id}'")));
        }
        let record = MirrorRecord {
            user_id: user_id.to_string(),
            key: key.to_string(),
            value: value.clone(),
            updated_at: Utc::now(),
        };
        state
            .mirror
            .insert((user_id.to_string(), key.to_string()), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BugSeverity, OgStatus, PointSnapshot, SessionPoints};

    fn profile(id: &str, handle: &str) -> TwitterProfile {
        TwitterProfile {
            twitter_id: id.to_string(),
            handle: handle.to_string(),
            display_name: handle.to_uppercase(),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn twitter_upsert_creates_then_refreshes() {
        let store = InMemoryRemoteStore::new();
        let created = store.upsert_twitter_user(&profile("1", "eva")).await.unwrap();
        assert_eq!(created.points, BASE_POINTS);

        let refreshed = store
            .upsert_twitter_user(&profile("1", "eva_renamed"))
            .await
            .unwrap();
        assert_eq!(refreshed.id, created.id);
        assert_eq!(refreshed.handle, "eva_renamed");
        assert!(store.get_user_by_handle("@EVA_renamed").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn users_page_by_handle() {
        let store = InMemoryRemoteStore::new();
        for (id, handle) in [("1", "carol"), ("2", "alice"), ("3", "bob")] {
            store.upsert_twitter_user(&profile(id, handle)).await.unwrap();
        }
        let first = store.list_users_after(None, 2).await.unwrap();
        let handles: Vec<_> = first.iter().map(|user| user.handle.as_str()).collect();
        assert_eq!(handles, vec!["alice", "bob"]);
        let rest = store.list_users_after(Some("bob"), 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].handle, "carol");
    }

    #[tokio::test]
    async fn bounty_award_is_single_shot() {
        let store = InMemoryRemoteStore::new();
        let user = store.upsert_twitter_user(&profile("1", "eva")).await.unwrap();
        let report = BugReport {
            id: Uuid::new_v4(),
            user_id: user.id,
            handle: user.handle.clone(),
            title: "crash".to_string(),
            description: "it crashes".to_string(),
            severity: BugSeverity::High,
            steps_to_reproduce: None,
            status: BugStatus::Open,
            awarded_points: None,
            attachments: vec![],
            created_at: Utc::now(),
            awarded_at: None,
        };
        store.insert_bug_report(&report).await.unwrap();

        let award = store.award_bug_bounty(report.id, 2_500).await.unwrap();
        assert_eq!(award.new_total, BASE_POINTS + 2_500);
        assert_eq!(award.report.status, BugStatus::Awarded);

        let again = store.award_bug_bounty(report.id, 2_500).await;
        assert!(matches!(again, Err(EvaError::Conflict(_))));
    }

    #[tokio::test]
    async fn handle_lookups_ignore_case_and_at_sign() {
        let store = InMemoryRemoteStore::new();
        let user = store.upsert_twitter_user(&profile("1", "eva")).await.unwrap();
        let found = store.get_user_by_handle("@EVA").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        let snapshot = PointSnapshot {
            points: user.points,
            og_status: OgStatus {
                was_og: false,
                is_now_og: false,
            },
            session_points: SessionPoints {
                old_total: user.points,
                recalculated_total: user.points,
            },
        };
        let backup = BackupRow::new(&user, snapshot);
        store.insert_backup(&backup).await.unwrap();
        let filter = BackupFilter {
            handle: Some("@Eva".to_string()),
            restored: None,
        };
        assert_eq!(store.list_backups(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overflowing_award_leaves_report_open() {
        let store = InMemoryRemoteStore::new();
        let user = store.upsert_twitter_user(&profile("1", "eva")).await.unwrap();
        let report = BugReport {
            id: Uuid::new_v4(),
            user_id: user.id,
            handle: user.handle.clone(),
            title: "crash".to_string(),
            description: "it crashes".to_string(),
            severity: BugSeverity::Low,
            steps_to_reproduce: None,
            status: BugStatus::Open,
            awarded_points: None,
            attachments: vec![],
            created_at: Utc::now(),
            awarded_at: None,
        };
        store.insert_bug_report(&report).await.unwrap();

        let result = store.award_bug_bounty(report.id, i64::MAX).await;
        assert!(matches!(result, Err(EvaError::Validation(_))));
        let stored = store.get_bug_report(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BugStatus::Open);
        assert_eq!(store.get_user_by_id(user.id).await.unwrap().unwrap().points, BASE_POINTS);
    }

    #[tokio::test]
    async fn mirror_outage_fails_upserts() {
        let store = InMemoryRemoteStore::new();
        store.set_mirror_outage(true);
        assert!(store.upsert_mirror("u1", "profile", &JsonValue::Null).await.is_err());
        store.set_mirror_outage(false);
        store
            .upsert_mirror("u1", "profile", &serde_json::json!({"points": 5}))
            .await
            .unwrap();
        assert_eq!(
            store.mirror_value("u1", "profile").await,
            Some(serde_json::json!({"points": 5}))
        );
    }
}
