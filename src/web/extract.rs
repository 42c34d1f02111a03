use super::error::AppError;
use super::state::AppState;
use crate::auth::{SESSION_COOKIE, cookie_value};
use crate::core::User;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

/// The caller, resolved from a bearer token or the session cookie.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// A caller whose handle is on the admin list.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

/// `Json` whose rejections become validation errors.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| cookie_value(&parts.headers, SESSION_COOKIE))
            .ok_or_else(|| AppError::unauthorized("missing session token"))?;

        let user = state
            .remote
            .resolve_auth_session(&token)
            .await?
            .ok_or_else(|| AppError::unauthorized("invalid or expired session"))?;
        Ok(Self(user))
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !state.config.is_admin(&user.handle) {
            debug!(handle = %user.handle, "admin access denied");
            return Err(AppError::forbidden("admin access required"));
        }
        Ok(Self(user))
    }
}
