use std::sync::Arc;

use anyhow::{Context, Result};
use eva_online::{
    auth::{OAuthProvider, TwitterOAuthClient},
    build_router,
    config::{AppConfig, RemoteBackend},
    remote::{
        InMemoryObjectStorage, InMemoryRemoteStore, ObjectStorage, RemoteStore,
        SupabaseObjectStorage, SupabaseRemoteStore,
    },
    web::AppState,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("failed to load application configuration")?;

    let (remote, storage): (Arc<dyn RemoteStore>, Arc<dyn ObjectStorage>) =
        match (config.remote_backend, config.supabase.clone()) {
            (RemoteBackend::Supabase, Some(supabase)) => {
                info!(url = %supabase.url, "remote backend: supabase");
                (
                    Arc::new(SupabaseRemoteStore::new(supabase.clone())),
                    Arc::new(SupabaseObjectStorage::new(supabase)),
                )
            }
            _ => {
                warn!("remote backend: in-memory (demo mode, nothing is persisted)");
                (
                    Arc::new(InMemoryRemoteStore::new()),
                    Arc::new(InMemoryObjectStorage::new(
                        config.app_url.clone(),
                        "bug-attachments",
                    )),
                )
            }
        };

    let oauth: Option<Arc<dyn OAuthProvider>> = match config.twitter.clone() {
        Some(credentials) => Some(Arc::new(TwitterOAuthClient::new(
            credentials,
            config.twitter_callback_url.clone(),
        ))),
        None => {
            warn!("TWITTER_CLIENT_ID or TWITTER_CLIENT_SECRET missing; logins use the demo redirect");
            None
        }
    };

    let addr = config.address();
    let app = build_router(AppState::new(remote, storage, oauth, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, "eva online backend started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("eva_online=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
