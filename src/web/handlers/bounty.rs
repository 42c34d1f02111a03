use crate::core::points::{MAX_BUG_BOUNTY_AWARD, default_bug_bounty_reward};
use crate::core::{
    BountyAward, BugAttachment, BugReport, BugReportFilter, BugStatus, Notification,
    NotificationKind,
};
use crate::web::error::{AppError, AppResult};
use crate::web::extract::{AdminUser, ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::web::models::{
    ApiResponse, AwardBountyRequest, BugReportListQuery, BugReportView, MAX_ATTACHMENTS,
    SignedAttachment, SubmitBugReportRequest,
};
use crate::web::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

fn validate_attachment(attachment: &BugAttachment) -> AppResult<()> {
    let path = attachment.path.trim();
    if path.is_empty() || path.split('/').any(|segment| segment == "..") {
        return Err(AppError::validation("attachment path is not valid"));
    }
    if attachment.file_name.trim().is_empty() {
        return Err(AppError::validation("attachment file name must not be blank"));
    }
    Ok(())
}

fn validate_submission(payload: &SubmitBugReportRequest) -> AppResult<()> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::validation("title must not be blank"));
    }
    if title.len() > 200 {
        return Err(AppError::validation("title must be at most 200 characters"));
    }
    if payload.description.trim().is_empty() {
        return Err(AppError::validation("description must not be blank"));
    }
    if payload.description.len() > 10_000 {
        return Err(AppError::validation(
            "description must be at most 10000 characters",
        ));
    }
    if payload.attachments.len() > MAX_ATTACHMENTS {
        return Err(AppError::validation(format!(
            "at most {MAX_ATTACHMENTS} attachments are allowed"
        )));
    }
    payload.attachments.iter().try_for_each(validate_attachment)
}

pub async fn submit_report(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<SubmitBugReportRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<BugReport>>)> {
    validate_submission(&payload)?;

    let report = BugReport {
        id: Uuid::new_v4(),
        user_id: user.id,
        handle: user.handle.clone(),
        title: payload.title.trim().to_string(),
        description: payload.description,
        severity: payload.severity,
        steps_to_reproduce: payload
            .steps_to_reproduce
            .filter(|steps| !steps.trim().is_empty()),
        status: BugStatus::Open,
        awarded_points: None,
        attachments: payload.attachments,
        created_at: Utc::now(),
        awarded_at: None,
    };
    state.remote.insert_bug_report(&report).await?;
    info!(handle = %user.handle, report_id = %report.id, severity = ?report.severity, "bug report submitted");

    Ok((StatusCode::CREATED, Json(ApiResponse { data: report })))
}

pub async fn my_reports(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ApiResponse<Vec<BugReport>>>> {
    let filter = BugReportFilter {
        status: None,
        user_id: Some(user.id),
    };
    let reports = state.remote.list_bug_reports(&filter).await?;
    Ok(Json(ApiResponse { data: reports }))
}

pub async fn list_reports(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiQuery(query): ApiQuery<BugReportListQuery>,
) -> AppResult<Json<ApiResponse<Vec<BugReportView>>>> {
    let filter = BugReportFilter {
        status: query.status,
        user_id: None,
    };
    let reports = state.remote.list_bug_reports(&filter).await?;

    let mut views = Vec::with_capacity(reports.len());
    for report in reports {
        let mut signed_attachments = Vec::with_capacity(report.attachments.len());
        for attachment in &report.attachments {
            let signed_url = match state.storage.signed_url(&attachment.path).await {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!(path = %attachment.path, error = %err, "could not sign attachment url");
                    None
                }
            };
            signed_attachments.push(SignedAttachment {
                path: attachment.path.clone(),
                file_name: attachment.file_name.clone(),
                content_type: attachment.content_type.clone(),
                signed_url,
            });
        }
        views.push(BugReportView {
            report,
            signed_attachments,
        });
    }

    Ok(Json(ApiResponse { data: views }))
}

pub async fn award_report(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AwardBountyRequest>,
) -> AppResult<Json<ApiResponse<BountyAward>>> {
    let report = state
        .remote
        .get_bug_report(id)
        .await?
        .ok_or_else(|| AppError::not_found("bug report not found"))?;

    let points = payload
        .points
        .unwrap_or_else(|| default_bug_bounty_reward(report.severity));
    if !(1..=MAX_BUG_BOUNTY_AWARD).contains(&points) {
        return Err(AppError::validation(format!(
            "points must be between 1 and {MAX_BUG_BOUNTY_AWARD}"
        )));
    }

    let award = state.remote.award_bug_bounty(id, points).await?;
    let notification = Notification::new(
        award.report.user_id,
        NotificationKind::BountyAwarded,
        "Bug bounty awarded",
        format!(
            "You earned {} points for \"{}\". New total: {}.",
            points, award.report.title, award.new_total
        ),
    );
    if let Err(err) = state.remote.insert_notification(&notification).await {
        warn!(report_id = %id, error = %err, "bounty awarded but notification failed");
    }
    info!(admin = %admin.handle, report_id = %id, points, "bug bounty awarded");

    Ok(Json(ApiResponse { data: award }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BugSeverity;

    fn submission(title: &str, attachments: Vec<BugAttachment>) -> SubmitBugReportRequest {
        SubmitBugReportRequest {
            title: title.to_string(),
            description: "steps".to_string(),
            severity: BugSeverity::Low,
            steps_to_reproduce: None,
            attachments,
        }
    }

    fn attachment(path: &str) -> BugAttachment {
        BugAttachment {
            path: path.to_string(),
            file_name: "shot.png".to_string(),
            content_type: Some("image/png".to_string()),
        }
    }

    #[test]
    fn rejects_blank_titles_and_path_traversal() {
        assert!(validate_submission(&submission("  ", vec![])).is_err());
        assert!(validate_submission(&submission("ok", vec![attachment("a/../b")])).is_err());
        assert!(validate_submission(&submission("ok", vec![attachment("u1/shot.png")])).is_ok());
        let too_many = (0..=MAX_ATTACHMENTS).map(|i| attachment(&format!("u/{i}"))).collect();
        assert!(validate_submission(&submission("ok", too_many)).is_err());
    }
}
