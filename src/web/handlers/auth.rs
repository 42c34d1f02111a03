use crate::auth::{
    STATE_COOKIE, clear_state_cookie, cookie_value, parse_state_cookie, session_cookie,
    state_cookie,
};
use crate::config::RemoteBackend;
use crate::web::error::AppResult;
use crate::web::extract::ApiQuery;
use crate::web::models::ApiResponse;
use crate::web::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::SET_COOKIE;
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OAuthDebugInfo {
    pub provider: Option<&'static str>,
    pub configured: bool,
    pub client_id_present: bool,
    pub callback_url: String,
    pub app_url: String,
    pub remote_backend: &'static str,
}

#[derive(Debug, Serialize)]
pub struct OAuthTestInfo {
    pub configured: bool,
    pub authorize_url: Option<String>,
    pub demo_redirect: Option<String>,
}

fn demo_redirect_url(state: &AppState) -> String {
    format!("{}/?demo=true", state.config.app_url)
}

fn demo_redirect(state: &AppState) -> Response {
    Redirect::to(&demo_redirect_url(state)).into_response()
}

pub async fn start_login(State(state): State<AppState>) -> AppResult<Response> {
    let Some(oauth) = state.oauth.as_ref() else {
        info!("oauth not configured, redirecting to demo");
        return Ok(demo_redirect(&state));
    };

    let request = oauth.authorize()?;
    Ok((
        AppendHeaders([(SET_COOKIE, state_cookie(&request.state, &request.code_verifier))]),
        Redirect::to(&request.url),
    )
        .into_response())
}

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<CallbackQuery>,
) -> AppResult<Response> {
    let Some(oauth) = state.oauth.as_ref() else {
        return Ok(demo_redirect(&state));
    };

    if let Some(error) = query.error.as_deref() {
        warn!(error, "oauth provider returned an error");
        let url = format!("{}/?auth_error=access_denied", state.config.app_url);
        return Ok(Redirect::to(&url).into_response());
    }

    let cookie = cookie_value(&headers, STATE_COOKIE);
    let expected = cookie.as_deref().and_then(parse_state_cookie);
    let verified = match (expected, query.state.as_deref(), query.code.as_deref()) {
        (Some((expected, verifier)), Some(received), Some(code)) if expected == received => {
            Some((verifier.to_string(), code.to_string()))
        }
        _ => None,
    };
    let Some((verifier, code)) = verified else {
        warn!("malformed or mismatched oauth state, redirecting to demo");
        return Ok(demo_redirect(&state));
    };

    let access_token = oauth.exchange_code(&code, &verifier).await?;
    let profile = oauth.fetch_profile(&access_token).await?;
    let user = state.remote.upsert_twitter_user(&profile).await?;
    let token = state.remote.create_auth_session(user.id).await?;
    info!(handle = %user.handle, "user logged in");

    let url = format!("{}/?login=success", state.config.app_url);
    Ok((
        AppendHeaders([
            (SET_COOKIE, session_cookie(&token)),
            (SET_COOKIE, clear_state_cookie()),
        ]),
        Redirect::to(&url),
    )
        .into_response())
}

pub async fn debug_config(State(state): State<AppState>) -> Json<ApiResponse<OAuthDebugInfo>> {
    let oauth = state.oauth.as_ref();
    Json(ApiResponse {
        data: OAuthDebugInfo {
            provider: oauth.map(|oauth| oauth.name()),
            configured: oauth.is_some(),
            client_id_present: oauth.and_then(|oauth| oauth.client_id()).is_some(),
            callback_url: oauth
                .map(|oauth| oauth.callback_url().to_string())
                .unwrap_or_else(|| state.config.twitter_callback_url.clone()),
            app_url: state.config.app_url.clone(),
            remote_backend: match state.config.remote_backend {
                RemoteBackend::Memory => "memory",
                RemoteBackend::Supabase => "supabase",
            },
        },
    })
}

pub async fn test_authorize_url(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<OAuthTestInfo>>> {
    let data = match state.oauth.as_ref() {
        Some(oauth) => OAuthTestInfo {
            configured: true,
            authorize_url: Some(oauth.authorize()?.url),
            demo_redirect: None,
        },
        None => OAuthTestInfo {
            configured: false,
            authorize_url: None,
            demo_redirect: Some(demo_redirect_url(&state)),
        },
    };
    Ok(Json(ApiResponse { data }))
}
