//! Remote store backed by Supabase's PostgREST endpoint.

use super::RemoteStore;
use super::memory::normalize_handle;
use crate::core::points::BASE_POINTS;
use crate::core::{
    BackupFilter, BackupRow, BountyAward, BugReport, BugReportFilter, EvaError, LeaderboardEntry,
    MaintenanceFeedback, MirrorRecord, Notification, RecoveryLogEntry, Result, SessionRecord,
    TwitterProfile, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
    pub storage_bucket: String,
}

impl SupabaseConfig {
    pub fn new(url: &str, service_role_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
            storage_bucket: "bug-attachments".to_string(),
        }
    }

    /// Set the bucket that holds bug-report attachments
    pub fn storage_bucket(mut self, bucket: &str) -> Self {
        self.storage_bucket = bucket.to_string();
        self
    }
}

type Filters = Vec<(&'static str, String)>;

pub struct SupabaseRemoteStore {
    http: reqwest::Client,
    config: SupabaseConfig,
}

#[derive(Deserialize)]
struct LeaderboardRow {
    handle: String,
    display_name: String,
    avatar_url: Option<String>,
    points: i64,
    is_og: bool,
}

#[derive(Serialize, Deserialize)]
struct AuthSessionRow {
    token: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
}

impl SupabaseRemoteStore {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.config.url, path))
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(&self.config.service_role_key)
    }

    async fn check(context: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("{}: {} {}", context, status, body);
        Err(match status {
            StatusCode::NOT_FOUND => EvaError::NotFound(message),
            StatusCode::CONFLICT => EvaError::Conflict(message),
            _ => EvaError::Remote(message),
        })
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, filters: Filters) -> Result<Vec<T>> {
        debug!(table, "supabase select");
        let response = self
            .request(Method::GET, table)
            .query(&filters)
            .send()
            .await?;
        Ok(Self::check(table, response).await?.json().await?)
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        mut filters: Filters,
    ) -> Result<Option<T>> {
        filters.push(("limit", "1".to_string()));
        Ok(self.select(table, filters).await?.into_iter().next())
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> Result<()> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        Self::check(table, response).await?;
        Ok(())
    }

    async fn insert_returning<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        table: &str,
        row: &T,
    ) -> Result<R> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let rows: Vec<R> = Self::check(table, response).await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EvaError::remote(format!("{}: insert returned no row", table)))
    }

    async fn patch<R: DeserializeOwned>(
        &self,
        table: &str,
        filters: Filters,
        body: JsonValue,
    ) -> Result<Vec<R>> {
        let response = self
            .request(Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(&filters)
            .json(&body)
            .send()
            .await?;
        Ok(Self::check(table, response).await?.json().await?)
    }

    async fn rpc<R: DeserializeOwned>(&self, function: &str, args: JsonValue) -> Result<R> {
        let response = self
            .request(Method::POST, &format!("rpc/{}", function))
            .json(&args)
            .send()
            .await?;
        Ok(Self::check(function, response).await?.json().await?)
    }
}

fn eq(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

/// Case-insensitive exact match; pattern characters in `value` are escaped.
fn ieq(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_' | '*') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    format!("ilike.{escaped}")
}

#[async_trait]
impl RemoteStore for SupabaseRemoteStore {
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.select_one("users", vec![("id", eq(id))]).await
    }

    async fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
        self.select_one("users", vec![("handle", ieq(normalize_handle(handle)))])
            .await
    }

    async fn upsert_twitter_user(&self, profile: &TwitterProfile) -> Result<User> {
        let now = Utc::now();
        let existing: Option<User> = self
            .select_one("users", vec![("twitter_id", eq(&profile.twitter_id))])
            .await?;

        if let Some(user) = existing {
            let rows: Vec<User> = self
                .patch(
                    "users",
                    vec![("id", eq(user.id))],
                    json!({
                        "handle": profile.handle,
                        "display_name": profile.display_name,
                        "avatar_url": profile.avatar_url,
                        "updated_at": now,
                    }),
                )
                .await?;
            return rows
                .into_iter()
                .next()
                .ok_or_else(|| EvaError::not_found("user not found"));
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
        self.insert_returning("users", &user).await
    }

    async fn list_users_after(
        &self,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<User>> {
        let mut filters: Filters = vec![
            ("order", "handle.asc".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(after) = start_after {
            filters.push(("handle", format!("gt.{}", after)));
        }
        self.select("users", filters).await
    }

    async fn leaderboard(&self, limit: usize, offset: usize) -> Result<Vec<LeaderboardEntry>> {
        let rows: Vec<LeaderboardRow> = self
            .select(
                "users",
                vec![
                    ("select", "handle,display_name,avatar_url,points,is_og".to_string()),
                    ("order", "points.desc,handle.asc".to_string()),
                    ("limit", limit.to_string()),
                    ("offset", offset.to_string()),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| LeaderboardEntry {
                rank: (offset + index) as u64 + 1,
                handle: row.handle,
                display_name: row.display_name,
                avatar_url: row.avatar_url,
                points: row.points,
                is_og: row.is_og,
            })
            .collect())
    }

    async fn set_user_points(
        &self,
        user_id: Uuid,
        points: i64,
        og_reward_granted: bool,
    ) -> Result<User> {
        let rows: Vec<User> = self
            .patch(
                "users",
                vec![("id", eq(user_id))],
                json!({
                    "points": points,
                    "og_reward_granted": og_reward_granted,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EvaError::not_found("user not found"))
    }

    async fn reset_question_counts(&self, user_id: Option<Uuid>) -> Result<u64> {
        let filter = match user_id {
            Some(id) => ("id", eq(id)),
            // PostgREST refuses unfiltered updates.
            None => ("id", "not.is.null".to_string()),
        };
        let rows: Vec<IgnoredAny> = self
            .patch(
                "users",
                vec![filter, ("select", "id".to_string())],
                json!({ "questions_asked_today": 0, "updated_at": Utc::now() }),
            )
            .await?;
        Ok(rows.len() as u64)
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>> {
        self.select(
            "sessions",
            vec![
                ("user_id", eq(user_id)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn record_session(&self, session: &SessionRecord) -> Result<User> {
        let user = self
            .get_user_by_id(session.user_id)
            .await?
            .ok_or_else(|| EvaError::not_found("user not found"))?;
        self.insert("sessions", session).await?;
        let rows: Vec<User> = self
            .patch(
                "users",
                vec![("id", eq(user.id))],
                json!({
                    "points": user.points + session.points_earned,
                    "questions_asked_today": user.questions_asked_today + session.question_count,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EvaError::not_found("user not found"))
    }

    async fn insert_backup(&self, backup: &BackupRow) -> Result<()> {
        self.insert("point_recovery_backups", backup).await
    }

    async fn get_backup(&self, id: Uuid) -> Result<Option<BackupRow>> {
        self.select_one("point_recovery_backups", vec![("id", eq(id))])
            .await
    }

    async fn latest_unrestored_backup(&self, user_id: Uuid) -> Result<Option<BackupRow>> {
        self.select_one(
            "point_recovery_backups",
            vec![
                ("user_id", eq(user_id)),
                ("restored", eq(false)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<BackupRow>> {
        let mut filters: Filters = vec![("order", "created_at.desc".to_string())];
        if let Some(handle) = filter.handle.as_deref() {
            filters.push(("handle", ieq(normalize_handle(handle))));
        }
        if let Some(restored) = filter.restored {
            filters.push(("restored", eq(restored)));
        }
        self.select("point_recovery_backups", filters).await
    }

    async fn mark_backup_restored(
        &self,
        id: Uuid,
        restored_at: DateTime<Utc>,
    ) -> Result<Option<BackupRow>> {
        let rows: Vec<BackupRow> = self
            .patch(
                "point_recovery_backups",
                vec![("id", eq(id)), ("restored", eq(false))],
                json!({ "restored": true, "restored_at": restored_at }),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn append_recovery_log(&self, entry: &RecoveryLogEntry) -> Result<()> {
        self.insert("point_recovery_logs", entry).await
    }

    async fn list_recovery_logs(&self, user_id: Option<Uuid>) -> Result<Vec<RecoveryLogEntry>> {
        let mut filters: Filters = vec![("order", "timestamp.asc".to_string())];
        if let Some(user_id) = user_id {
            filters.push(("user_id", eq(user_id)));
        }
        self.select("point_recovery_logs", filters).await
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.insert("notifications", notification).await
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.select(
            "notifications",
            vec![
                ("user_id", eq(user_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let rows: Vec<IgnoredAny> = self
            .patch(
                "notifications",
                vec![
                    ("id", eq(id)),
                    ("user_id", eq(user_id)),
                    ("select", "id".to_string()),
                ],
                json!({ "read": true }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_bug_report(&self, report: &BugReport) -> Result<()> {
        self.insert("bug_reports", report).await
    }

    async fn get_bug_report(&self, id: Uuid) -> Result<Option<BugReport>> {
        self.select_one("bug_reports", vec![("id", eq(id))]).await
    }

    async fn list_bug_reports(&self, filter: &BugReportFilter) -> Result<Vec<BugReport>> {
        let mut filters: Filters = vec![("order", "created_at.desc".to_string())];
        if let Some(status) = filter.status {
            filters.push(("status", eq(status.as_str())));
        }
        if let Some(user_id) = filter.user_id {
            filters.push(("user_id", eq(user_id)));
        }
        self.select("bug_reports", filters).await
    }

    async fn award_bug_bounty(&self, report_id: Uuid, points: i64) -> Result<BountyAward> {
        self.rpc(
            "award_bug_bounty_points",
            json!({ "p_report_id": report_id, "p_points": points }),
        )
        .await
    }

    async fn insert_maintenance_feedback(&self, feedback: &MaintenanceFeedback) -> Result<()> {
        self.insert("maintenance_feedback", feedback).await
    }

    async fn create_auth_session(&self, user_id: Uuid) -> Result<String> {
        let row = AuthSessionRow {
            token: Uuid::new_v4().simple().to_string(),
            user_id,
            created_at: Utc::now(),
        };
        self.insert("auth_sessions", &row).await?;
        Ok(row.token)
    }

    async fn resolve_auth_session(&self, token: &str) -> Result<Option<User>> {
        let session: Option<AuthSessionRow> = self
            .select_one("auth_sessions", vec![("token", eq(token))])
            .await?;
        match session {
            Some(session) => self.get_user_by_id(session.user_id).await,
            None => Ok(None),
        }
    }

    async fn upsert_mirror(&self, user_id: &str, key: &str, value: &JsonValue) -> Result<()> {
        let record = MirrorRecord {
            user_id: user_id.to_string(),
            key: key.to_string(),
            value: value.clone(),
            updated_at: Utc::now(),
        };
        let response = self
            .request(Method::POST, "user_data")
            .query(&[("on_conflict", "user_id,key")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&record)
            .send()
            .await?;
        Self::check("user_data", response).await?;
        Ok(())
    }
}
