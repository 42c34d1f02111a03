use super::backend::KeyValueBackend;
use super::envelope::{self, Decoded, VersionedRecord};
use crate::core::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// Namespace every mirrored key lives under.
pub const NAMESPACE_PREFIX: &str = "eva_mirror_v1:";

pub const PROFILE_KEY: &str = "profile";
pub const SESSIONS_KEY: &str = "sessions";
pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const ONBOARDING_COMPLETE_KEY: &str = "onboarding_complete";

/// Checksummed view over a device-local key/value backend.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    fn namespaced(key: &str) -> String {
        format!("{}{}", NAMESPACE_PREFIX, key)
    }

    /// Seals `value` in a fresh envelope, replacing whatever was stored.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let record = VersionedRecord::seal(value)?;
        let raw = serde_json::to_string(&record)?;
        self.backend.set(&Self::namespaced(key), &raw)?;
        debug!(key, "local value written");
        Ok(())
    }

    /// Returns the stored value, or `None` when it is missing, corrupted or
    /// of an unknown envelope version. Backend failures also read as `None`.
    pub fn read_optional<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(&Self::namespaced(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, error = %err, "local backend read failed");
                return None;
            }
        };

        match envelope::decode(&raw) {
            Decoded::Valid(value) => Some(value),
            Decoded::Legacy(value) => {
                debug!(key, "legacy local value accepted without checksum");
                Some(value)
            }
            Decoded::Absent => {
                warn!(key, "local value failed validation, treating as absent");
                None
            }
        }
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.read_optional(key).unwrap_or(default)
    }

    /// Raw JSON form of a stored value, used when handing it to the sync queue.
    pub fn read_json(&self, key: &str) -> Option<serde_json::Value> {
        self.read_optional(key)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.backend.remove(&Self::namespaced(key))
    }

    /// Keys under the namespace, with the prefix stripped.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .backend
            .keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(NAMESPACE_PREFIX).map(str::to_string))
            .collect())
    }
}
