use crate::auth::OAuthProvider;
use crate::config::AppConfig;
use crate::recovery::PointRecovery;
use crate::remote::{InMemoryObjectStorage, InMemoryRemoteStore, ObjectStorage, RemoteStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub remote: Arc<dyn RemoteStore>,
    pub storage: Arc<dyn ObjectStorage>,
    /// `None` when OAuth credentials are missing; logins fall back to a demo redirect.
    pub oauth: Option<Arc<dyn OAuthProvider>>,
    pub recovery: PointRecovery,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        storage: Arc<dyn ObjectStorage>,
        oauth: Option<Arc<dyn OAuthProvider>>,
        config: AppConfig,
    ) -> Self {
        Self {
            recovery: PointRecovery::new(remote.clone()),
            remote,
            storage,
            oauth,
            config: Arc::new(config),
        }
    }

    /// Everything in memory, no OAuth.
    pub fn demo(config: AppConfig) -> Self {
        let storage = InMemoryObjectStorage::new(config.app_url.clone(), "bug-attachments");
        Self::new(
            Arc::new(InMemoryRemoteStore::new()),
            Arc::new(storage),
            None,
            config,
        )
    }
}
