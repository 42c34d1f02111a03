//! Attachment storage: the service only ever hands out time-limited links.

use super::supabase::SupabaseConfig;
use crate::core::{EvaError, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Every signed link is valid for one hour.
pub const SIGNED_URL_EXPIRY_SECS: i64 = 3_600;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn signed_url(&self, path: &str) -> Result<String>;
}

/// Produces syntactically valid links without a real storage service.
pub struct InMemoryObjectStorage {
    base_url: String,
    bucket: String,
}

impl InMemoryObjectStorage {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn signed_url(&self, path: &str) -> Result<String> {
        let expires = Utc::now() + Duration::seconds(SIGNED_URL_EXPIRY_SECS);
        Ok(format!(
            "{}/storage/v1/object/sign/{}/{}?token={}&expires={}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/'),
            Uuid::new_v4().simple(),
            expires.timestamp()
        ))
    }
}

pub struct SupabaseObjectStorage {
    http: reqwest::Client,
    config: SupabaseConfig,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl SupabaseObjectStorage {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ObjectStorage for SupabaseObjectStorage {
    async fn signed_url(&self, path: &str) -> Result<String> {
        let url = format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.config.url,
            self.config.storage_bucket,
            path.trim_start_matches('/')
        );
        let response = self
            .http
            .post(url)
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(&self.config.service_role_key)
            .json(&json!({ "expiresIn": SIGNED_URL_EXPIRY_SECS }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EvaError::remote(format!(
                "signing {} failed: {} {}",
                path, status, body
            )));
        }
        let signed: SignResponse = response.json().await?;
        Ok(format!("{}/storage/v1{}", self.config.url, signed.signed_url))
    }
}
