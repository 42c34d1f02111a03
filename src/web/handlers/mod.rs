pub mod admin;
pub mod auth;
pub mod bounty;

use super::error::{AppError, AppResult};
use super::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use super::models::{
    ApiMessage, ApiResponse, LeaderboardQuery, MAX_QUESTIONS_PER_SESSION,
    MaintenanceFeedbackRequest, MarkedRead, RecordSessionRequest, RecordedSession,
};
use super::state::AppState;
use crate::core::points::session_points;
use crate::core::{LeaderboardEntry, MaintenanceFeedback, Notification, SessionRecord, User};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

pub async fn healthcheck() -> Json<ApiResponse<ApiMessage>> {
    Json(ApiResponse {
        data: ApiMessage {
            message: "ok".to_string(),
        },
    })
}

pub async fn me(AuthUser(user): AuthUser) -> Json<ApiResponse<User>> {
    Json(ApiResponse { data: user })
}

pub async fn leaderboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LeaderboardQuery>,
) -> AppResult<Json<ApiResponse<Vec<LeaderboardEntry>>>> {
    let entries = state
        .remote
        .leaderboard(query.limit(), query.offset())
        .await?;
    Ok(Json(ApiResponse { data: entries }))
}

pub async fn record_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<RecordSessionRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<RecordedSession>>)> {
    if payload.questions.is_empty() {
        return Err(AppError::validation("a session needs at least one question"));
    }
    if payload.questions.len() > MAX_QUESTIONS_PER_SESSION {
        return Err(AppError::validation(format!(
            "a session holds at most {MAX_QUESTIONS_PER_SESSION} questions"
        )));
    }

    let points = session_points(
        payload
            .questions
            .iter()
            .map(|score| (score.quality, score.sincerity)),
    );
    let session = SessionRecord {
        id: Uuid::new_v4(),
        user_id: user.id,
        question_count: payload.questions.len() as u32,
        points_earned: points,
        created_at: Utc::now(),
    };
    let user = state.remote.record_session(&session).await?;
    info!(handle = %user.handle, points, total = user.points, "session recorded");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: RecordedSession { session, user },
        }),
    ))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let notifications = state.remote.list_notifications(user.id).await?;
    Ok(Json(ApiResponse {
        data: notifications,
    }))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<MarkedRead>>> {
    if !state.remote.mark_notification_read(user.id, id).await? {
        return Err(AppError::not_found("notification not found"));
    }
    Ok(Json(ApiResponse {
        data: MarkedRead { id, read: true },
    }))
}

pub async fn submit_maintenance_feedback(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<MaintenanceFeedbackRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<MaintenanceFeedback>>)> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::validation("message must not be blank"));
    }
    if message.len() > 2_000 {
        return Err(AppError::validation("message must be at most 2000 characters"));
    }
    let email = payload
        .email
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty());
    if let Some(email) = email.as_deref()
        && !email.contains('@')
    {
        return Err(AppError::validation("email is not valid"));
    }

    let feedback = MaintenanceFeedback {
        id: Uuid::new_v4(),
        message: message.to_string(),
        email,
        handle: payload
            .handle
            .map(|handle| handle.trim().trim_start_matches('@').to_string())
            .filter(|handle| !handle.is_empty()),
        created_at: Utc::now(),
    };
    state.remote.insert_maintenance_feedback(&feedback).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse { data: feedback })))
}
