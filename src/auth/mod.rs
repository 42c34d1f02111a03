//! Login through an external OAuth provider and the cookies that carry it.

pub mod twitter;

use crate::core::{Result, TwitterProfile};
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::COOKIE;

pub use twitter::TwitterOAuthClient;

/// Holds `{state}.{verifier}` between the redirect and the callback.
pub const STATE_COOKIE: &str = "eva_oauth_state";
/// Holds the bearer token issued after login.
pub const SESSION_COOKIE: &str = "eva_session";

const STATE_COOKIE_MAX_AGE_SECS: u32 = 600;
const SESSION_COOKIE_MAX_AGE_SECS: u32 = 30 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn client_id(&self) -> Option<&str>;
    fn callback_url(&self) -> &str;
    /// Starts a login: fresh state, fresh verifier, provider URL.
    fn authorize(&self) -> Result<AuthorizationRequest>;
    /// Trades the callback code for an access token.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<String>;
    async fn fetch_profile(&self, access_token: &str) -> Result<TwitterProfile>;
}

/// Value of cookie `name` from the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

pub fn state_cookie(state: &str, code_verifier: &str) -> String {
    format!(
        "{STATE_COOKIE}={state}.{code_verifier}; Path=/; HttpOnly; SameSite=Lax; Max-Age={STATE_COOKIE_MAX_AGE_SECS}"
    )
}

pub fn clear_state_cookie() -> String {
    format!("{STATE_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

pub fn session_cookie(token: &str) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_COOKIE_MAX_AGE_SECS}"
    )
}

/// Splits a state cookie into `(state, verifier)`; `None` when malformed.
pub fn parse_state_cookie(raw: &str) -> Option<(&str, &str)> {
    let (state, verifier) = raw.split_once('.')?;
    let well_formed = |part: &str| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };
    (well_formed(state) && well_formed(verifier)).then_some((state, verifier))
}
