use super::{AuthorizationRequest, OAuthProvider};
use crate::config::TwitterCredentials;
use crate::core::{EvaError, Result, TwitterProfile};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

pub const AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
pub const TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
pub const PROFILE_URL: &str = "https://api.twitter.com/2/users/me";
pub const SCOPES: &str = "tweet.read users.read offline.access";

/// Twitter OAuth 2.0 authorization-code flow with PKCE (`plain` method).
pub struct TwitterOAuthClient {
    http: reqwest::Client,
    credentials: TwitterCredentials,
    callback_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ProfileEnvelope {
    data: ProfileData,
}

#[derive(Deserialize)]
struct ProfileData {
    id: String,
    username: String,
    name: String,
    profile_image_url: Option<String>,
}

impl TwitterOAuthClient {
    pub fn new(credentials: TwitterCredentials, callback_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            callback_url: callback_url.into(),
        }
    }

    /// Builds the authorize URL for a given state and verifier.
    pub fn authorize_url(&self, state: &str, code_verifier: &str) -> Result<String> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", self.callback_url.as_str()),
                ("scope", SCOPES),
                ("state", state),
                ("code_challenge", code_verifier),
                ("code_challenge_method", "plain"),
            ],
        )
        .map_err(|err| EvaError::Config(format!("authorize url: {}", err)))?;
        Ok(url.into())
    }
}

/// 64 url-safe characters, usable both as state and as PKCE verifier.
fn random_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[async_trait]
impl OAuthProvider for TwitterOAuthClient {
    fn name(&self) -> &'static str {
        "twitter"
    }

    fn client_id(&self) -> Option<&str> {
        Some(&self.credentials.client_id)
    }

    fn callback_url(&self) -> &str {
        &self.callback_url
    }

    fn authorize(&self) -> Result<AuthorizationRequest> {
        let state = random_token();
        let code_verifier = random_token();
        let url = self.authorize_url(&state, &code_verifier)?;
        Ok(AuthorizationRequest {
            url,
            state,
            code_verifier,
        })
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<String> {
        debug!("exchanging twitter authorization code");
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.callback_url.as_str()),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvaError::Unauthorized(format!(
                "token exchange failed: {} {}",
                status, body
            )));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<TwitterProfile> {
        let response = self
            .http
            .get(PROFILE_URL)
            .query(&[("user.fields", "profile_image_url")])
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EvaError::remote(format!("profile lookup failed: {}", status)));
        }
        let profile: ProfileEnvelope = response.json().await?;
        Ok(TwitterProfile {
            twitter_id: profile.data.id,
            handle: profile.data.username,
            display_name: profile.data.name,
            avatar_url: profile.data.profile_image_url,
        })
    }
}
