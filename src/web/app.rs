use super::handlers::{self, admin, auth, bounty};
use super::state::AppState;
use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

fn cors_layer(app_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    match HeaderValue::from_str(app_url) {
        Ok(origin) => cors.allow_origin(origin).allow_credentials(true),
        Err(_) => {
            warn!(app_url, "APP_URL is not a valid origin, CORS left closed");
            cors
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.app_url);

    Router::new()
        .route("/health", get(handlers::healthcheck))
        .route("/api/auth/twitter", get(auth::start_login))
        .route("/api/auth/twitter/callback", get(auth::callback))
        .route("/api/auth/twitter/debug", get(auth::debug_config))
        .route("/api/auth/twitter/test", get(auth::test_authorize_url))
        .route("/api/me", get(handlers::me))
        .route("/api/leaderboard", get(handlers::leaderboard))
        .route("/api/sessions", post(handlers::record_session))
        .route(
            "/api/bug-bounty",
            post(bounty::submit_report).get(bounty::list_reports),
        )
        .route("/api/bug-bounty/mine", get(bounty::my_reports))
        .route("/api/bug-bounty/{id}/award", post(bounty::award_report))
        .route("/api/notifications", get(handlers::list_notifications))
        .route(
            "/api/notifications/{id}/read",
            post(handlers::mark_notification_read),
        )
        .route(
            "/api/maintenance/feedback",
            post(handlers::submit_maintenance_feedback),
        )
        .route("/api/admin/recover-points", post(admin::recover_points))
        .route(
            "/api/admin/recover-points/batch",
            post(admin::batch_recover_points),
        )
        .route("/api/admin/backups", get(admin::list_backups))
        .route("/api/admin/backups/preview", get(admin::preview_restore))
        .route("/api/admin/backups/restore", post(admin::restore_backup))
        .route(
            "/api/admin/reset-question-count",
            post(admin::reset_question_count),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
