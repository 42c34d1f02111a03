use crate::core::{BackupFilter, BugAttachment, BugReport, BugSeverity, BugStatus, SessionRecord, User};
use crate::recovery::{BackupTarget, BatchRecoveryOptions};
use crate::web::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub const MAX_LEADERBOARD_LIMIT: usize = 100;
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 50;
pub const MAX_QUESTIONS_PER_SESSION: usize = 50;
pub const MAX_ATTACHMENTS: usize = 5;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub message: String,
}

// ---- public ---------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl LeaderboardQuery {
    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
            .clamp(1, MAX_LEADERBOARD_LIMIT)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceFeedbackRequest {
    pub message: String,
    pub email: Option<String>,
    pub handle: Option<String>,
}

// ---- sessions -------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuestionScore {
    pub quality: u8,
    pub sincerity: u8,
}

#[derive(Debug, Deserialize)]
pub struct RecordSessionRequest {
    pub questions: Vec<QuestionScore>,
}

#[derive(Debug, Serialize)]
pub struct RecordedSession {
    pub session: SessionRecord,
    pub user: User,
}

// ---- bug bounty -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitBugReportRequest {
    pub title: String,
    pub description: String,
    pub severity: BugSeverity,
    pub steps_to_reproduce: Option<String>,
    #[serde(default)]
    pub attachments: Vec<BugAttachment>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BugReportListQuery {
    pub status: Option<BugStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AwardBountyRequest {
    /// Falls back to the severity's default reward.
    pub points: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SignedAttachment {
    pub path: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub signed_url: Option<String>,
}

/// Admin view of a report, attachments replaced by time-limited links.
#[derive(Debug, Serialize)]
pub struct BugReportView {
    #[serde(flatten)]
    pub report: BugReport,
    pub signed_attachments: Vec<SignedAttachment>,
}

// ---- notifications --------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub id: Uuid,
    pub read: bool,
}

// ---- admin ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverPointsRequest {
    pub handle: String,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchRecoverRequest {
    pub start_after: Option<String>,
    pub batch_size: Option<usize>,
    pub max_users: Option<usize>,
    pub max_point_change: Option<i64>,
    pub delay_ms: Option<u64>,
    pub dry_run: Option<bool>,
}

impl BatchRecoverRequest {
    pub fn into_options(self) -> AppResult<BatchRecoveryOptions> {
        let mut options = BatchRecoveryOptions::default();
        if let Some(handle) = self.start_after {
            options = options.start_after(handle);
        }
        if let Some(batch_size) = self.batch_size {
            options = options.batch_size(batch_size);
        }
        if let Some(max_users) = self.max_users {
            options = options.max_users(max_users);
        }
        if let Some(cap) = self.max_point_change {
            if cap < 0 {
                return Err(AppError::validation("maxPointChange must not be negative"));
            }
            options = options.max_point_change(cap);
        }
        if let Some(delay_ms) = self.delay_ms {
            options = options.delay(Duration::from_millis(delay_ms));
        }
        if let Some(dry_run) = self.dry_run {
            options = options.dry_run(dry_run);
        }
        Ok(options)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BackupListQuery {
    pub handle: Option<String>,
    pub restored: Option<bool>,
}

impl From<BackupListQuery> for BackupFilter {
    fn from(query: BackupListQuery) -> Self {
        Self {
            handle: query.handle,
            restored: query.restored,
        }
    }
}

/// Selects a backup by id, or the latest unrestored one for a handle.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupSelector {
    pub backup_id: Option<Uuid>,
    pub handle: Option<String>,
}

impl BackupSelector {
    pub fn target(self) -> Option<BackupTarget> {
        match (self.backup_id, self.handle) {
            (Some(id), _) => Some(BackupTarget::Id(id)),
            (None, Some(handle)) if !handle.trim().is_empty() => Some(BackupTarget::Handle(handle)),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetQuestionCountRequest {
    /// Everyone when absent.
    pub handle: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetQuestionCountResult {
    pub reset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaderboard_limit_is_capped() {
        let query = LeaderboardQuery {
            limit: Some(1_000),
            offset: None,
        };
        assert_eq!(query.limit(), MAX_LEADERBOARD_LIMIT);
        assert_eq!(LeaderboardQuery::default().limit(), DEFAULT_LEADERBOARD_LIMIT);
    }

    #[test]
    fn batch_request_defaults_to_dry_run() {
        let request: BatchRecoverRequest = serde_json::from_str("{}").unwrap();
        let options = request.into_options().unwrap();
        assert!(options.dry_run);
        assert_eq!(options.batch_size, 50);
        assert_eq!(options.max_point_change, 50_000);
        assert_eq!(options.delay, Duration::from_millis(100));

        let request: BatchRecoverRequest =
            serde_json::from_str(r#"{"dryRun": false, "startAfter": "m", "delayMs": 0}"#).unwrap();
        let options = request.into_options().unwrap();
        assert!(!options.dry_run);
        assert_eq!(options.start_after.as_deref(), Some("m"));
        assert!(options.delay.is_zero());
    }

    #[test]
    fn negative_point_cap_is_rejected() {
        let request: BatchRecoverRequest =
            serde_json::from_str(r#"{"maxPointChange": -9223372036854775808}"#).unwrap();
        assert!(matches!(request.into_options(), Err(AppError::Validation(_))));
    }

    #[test]
    fn selector_prefers_backup_id() {
        let id = Uuid::new_v4();
        let selector = BackupSelector {
            backup_id: Some(id),
            handle: Some("eva".into()),
        };
        assert_eq!(selector.target(), Some(BackupTarget::Id(id)));
        assert_eq!(BackupSelector::default().target(), None);
    }
}
