use crate::remote::SupabaseConfig;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteBackend {
    Memory,
    Supabase,
}

impl RemoteBackend {
    fn from_env(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "demo" => Ok(Self::Memory),
            "supabase" | "postgrest" => Ok(Self::Supabase),
            _ => Err(anyhow::anyhow!(
                "REMOTE_BACKEND must be one of: memory, supabase"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TwitterCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Public origin of the web app; OAuth flows redirect back here.
    pub app_url: String,
    pub remote_backend: RemoteBackend,
    pub supabase: Option<SupabaseConfig>,
    pub twitter: Option<TwitterCredentials>,
    pub twitter_callback_url: String,
    /// Lowercase handles without the leading '@'.
    pub admin_handles: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let host = var("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_var(&var, "APP_PORT", 8080u16)?;
        let app_url = var("APP_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        let supabase = match (var("SUPABASE_URL"), var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(key)) => {
                let mut config = SupabaseConfig::new(&url, &key);
                if let Some(bucket) = var("SUPABASE_STORAGE_BUCKET") {
                    config = config.storage_bucket(&bucket);
                }
                Some(config)
            }
            _ => None,
        };

        let requested = match var("REMOTE_BACKEND") {
            Some(raw) => RemoteBackend::from_env(&raw)?,
            None if supabase.is_some() => RemoteBackend::Supabase,
            None => RemoteBackend::Memory,
        };
        let remote_backend = if requested == RemoteBackend::Supabase && supabase.is_none() {
            warn!("SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY missing; running in demo mode");
            RemoteBackend::Memory
        } else {
            requested
        };

        let twitter = match (var("TWITTER_CLIENT_ID"), var("TWITTER_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(TwitterCredentials {
                client_id,
                client_secret,
            }),
            _ => None,
        };
        let twitter_callback_url = var("TWITTER_CALLBACK_URL")
            .unwrap_or_else(|| format!("{app_url}/api/auth/twitter/callback"));

        let admin_handles = var("ADMIN_HANDLES")
            .map(|raw| {
                raw.split(',')
                    .map(normalize_admin_handle)
                    .filter(|handle| !handle.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            app_url,
            remote_backend,
            supabase,
            twitter,
            twitter_callback_url,
            admin_handles,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_admin(&self, handle: &str) -> bool {
        let handle = normalize_admin_handle(handle);
        self.admin_handles.iter().any(|admin| *admin == handle)
    }

    /// Config for tests and demo mode: in-memory store, no OAuth.
    pub fn demo() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            app_url: "http://localhost:8080".to_string(),
            remote_backend: RemoteBackend::Memory,
            supabase: None,
            twitter: None,
            twitter_callback_url: "http://localhost:8080/api/auth/twitter/callback".to_string(),
            admin_handles: Vec::new(),
        }
    }

    pub fn with_admins<I, S>(mut self, handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.admin_handles = handles
            .into_iter()
            .map(|handle| normalize_admin_handle(handle.as_ref()))
            .collect();
        self
    }
}

fn normalize_admin_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_ascii_lowercase()
}

fn parse_var<T, V>(var: &V, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} must be a valid {}", std::any::type_name::<T>())),
        None => Ok(default),
    }
}
