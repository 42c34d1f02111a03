use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// ============================================================================
// Users and sessions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub twitter_id: Option<String>,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub points: i64,
    /// Whether the account belongs to the OG cohort.
    pub is_og: bool,
    /// Whether the OG bonus is currently reflected in `points`.
    pub og_reward_granted: bool,
    pub questions_asked_today: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity returned by the OAuth provider, used to create or refresh a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwitterProfile {
    pub twitter_id: String,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub question_count: u32,
    pub points_earned: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u64,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub points: i64,
    pub is_og: bool,
}

// ============================================================================
// Point recovery
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgStatus {
    #[serde(rename = "wasOG")]
    pub was_og: bool,
    #[serde(rename = "isNowOG")]
    pub is_now_og: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPoints {
    pub old_total: i64,
    pub recalculated_total: i64,
}

/// Pre-mutation copy of a user's point state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointSnapshot {
    pub points: i64,
    pub og_status: OgStatus,
    pub session_points: SessionPoints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub handle: String,
    pub snapshot: PointSnapshot,
    pub created_at: DateTime<Utc>,
    pub restored: bool,
    pub restored_at: Option<DateTime<Utc>>,
}

impl BackupRow {
    pub fn new(user: &User, snapshot: PointSnapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user.id,
            handle: user.handle.clone(),
            snapshot,
            created_at: Utc::now(),
            restored: false,
            restored_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFilter {
    pub handle: Option<String>,
    pub restored: Option<bool>,
}

impl BackupFilter {
    pub fn matches(&self, backup: &BackupRow) -> bool {
        self.handle
            .as_deref()
            .map(|handle| handle.trim().trim_start_matches('@'))
            .is_none_or(|handle| backup.handle.eq_ignore_ascii_case(handle))
            && self.restored.is_none_or(|restored| backup.restored == restored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOperation {
    Recover,
    BatchRecover,
    Restore,
}

/// Append-only audit record for every point correction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub handle: String,
    pub old_points: i64,
    pub new_points: i64,
    pub og_status_before: bool,
    pub og_status_after: bool,
    pub timestamp: DateTime<Utc>,
    pub operation: RecoveryOperation,
    pub dry_run: bool,
    pub error: Option<String>,
}

impl RecoveryLogEntry {
    pub fn delta(&self) -> i64 {
        self.new_points.saturating_sub(self.old_points)
    }
}

// ============================================================================
// Bug bounty
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugStatus {
    #[default]
    Open,
    Awarded,
    Rejected,
}

impl BugStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Awarded => "awarded",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugAttachment {
    /// Object path inside the attachments bucket.
    pub path: String,
    pub file_name: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    pub id: Uuid,
    pub user_id: Uuid,
    pub handle: String,
    pub title: String,
    pub description: String,
    pub severity: BugSeverity,
    pub steps_to_reproduce: Option<String>,
    pub status: BugStatus,
    pub awarded_points: Option<i64>,
    pub attachments: Vec<BugAttachment>,
    pub created_at: DateTime<Utc>,
    pub awarded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReportFilter {
    pub status: Option<BugStatus>,
    pub user_id: Option<Uuid>,
}

impl BugReportFilter {
    pub fn matches(&self, report: &BugReport) -> bool {
        self.status.is_none_or(|status| report.status == status)
            && self.user_id.is_none_or(|user_id| report.user_id == user_id)
    }
}

/// Result of the bug-bounty award procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyAward {
    pub report: BugReport,
    pub new_total: i64,
}

// ============================================================================
// Notifications, feedback and mirrored device data
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PointsRestored,
    BountyAwarded,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceFeedback {
    pub id: Uuid,
    pub message: String,
    pub email: Option<String>,
    pub handle: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Remote copy of one device-local key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    pub user_id: String,
    pub key: String,
    pub value: JsonValue,
    pub updated_at: DateTime<Utc>,
}
