use crate::core::{BackupFilter, BackupRow, RecoveryLogEntry};
use crate::recovery::{BatchRecoveryReport, RestoreOutcome, RestorePreview};
use crate::web::error::{AppError, AppResult};
use crate::web::extract::{AdminUser, ApiJson, ApiQuery};
use crate::web::models::{
    ApiResponse, BackupListQuery, BackupSelector, BatchRecoverRequest, RecoverPointsRequest,
    ResetQuestionCountRequest, ResetQuestionCountResult,
};
use crate::web::state::AppState;
use axum::Json;
use axum::extract::State;
use tracing::info;

pub async fn recover_points(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(payload): ApiJson<RecoverPointsRequest>,
) -> AppResult<Json<ApiResponse<RecoveryLogEntry>>> {
    let handle = payload.handle.trim();
    if handle.is_empty() {
        return Err(AppError::validation("handle must not be blank"));
    }
    let dry_run = payload.dry_run.unwrap_or(true);
    info!(admin = %admin.handle, target = handle, dry_run, "point recovery requested");

    let entry = state
        .recovery
        .recover_user_points(handle, dry_run)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user '{handle}' not found")))?;
    Ok(Json(ApiResponse { data: entry }))
}

pub async fn batch_recover_points(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(payload): ApiJson<BatchRecoverRequest>,
) -> AppResult<Json<ApiResponse<BatchRecoveryReport>>> {
    let options = payload.into_options()?;
    info!(
        admin = %admin.handle,
        dry_run = options.dry_run,
        batch_size = options.batch_size,
        "batch point recovery requested"
    );
    let report = state.recovery.batch_recover_points(options).await?;
    Ok(Json(ApiResponse { data: report }))
}

pub async fn list_backups(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiQuery(query): ApiQuery<BackupListQuery>,
) -> AppResult<Json<ApiResponse<Vec<BackupRow>>>> {
    let filter = BackupFilter::from(query);
    let backups = state.remote.list_backups(&filter).await?;
    Ok(Json(ApiResponse { data: backups }))
}

pub async fn preview_restore(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiQuery(selector): ApiQuery<BackupSelector>,
) -> AppResult<Json<ApiResponse<RestorePreview>>> {
    let target = selector
        .target()
        .ok_or_else(|| AppError::validation("backupId or handle is required"))?;
    let preview = state.recovery.preview_restore(&target).await?;
    Ok(Json(ApiResponse { data: preview }))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(selector): ApiJson<BackupSelector>,
) -> AppResult<Json<ApiResponse<RestoreOutcome>>> {
    let target = selector
        .target()
        .ok_or_else(|| AppError::validation("backupId or handle is required"))?;
    info!(admin = %admin.handle, target = ?target, "backup restore requested");
    let outcome = state.recovery.restore_backup(&target).await?;
    Ok(Json(ApiResponse { data: outcome }))
}

pub async fn reset_question_count(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(payload): ApiJson<ResetQuestionCountRequest>,
) -> AppResult<Json<ApiResponse<ResetQuestionCountResult>>> {
    let user_id = match payload
        .handle
        .as_deref()
        .map(str::trim)
        .filter(|handle| !handle.is_empty())
    {
        Some(handle) => Some(
            state
                .remote
                .get_user_by_handle(handle)
                .await?
                .ok_or_else(|| AppError::not_found(format!("user '{handle}' not found")))?
                .id,
        ),
        None => None,
    };

    let reset = state.remote.reset_question_counts(user_id).await?;
    info!(admin = %admin.handle, reset, "question counts reset");
    Ok(Json(ApiResponse {
        data: ResetQuestionCountResult { reset },
    }))
}
