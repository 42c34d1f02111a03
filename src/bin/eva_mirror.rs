use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use eva_online::{
    FileBackend, InMemoryRemoteStore, LocalStore, RemoteStore, StorageManager, SupabaseConfig,
    SupabaseRemoteStore, SyncConfig, spawn_sync_worker,
};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const STORE_FILE: &str = "store.json";
const JOURNAL_FILE: &str = "sync-queue.journal";

#[derive(Parser)]
#[command(name = "eva-mirror")]
#[command(about = "Device-side local store with background sync to the EVA Online backend")]
struct Cli {
    /// Directory holding the local store and the sync journal
    #[arg(long, env = "EVA_MIRROR_DIR", default_value = ".eva-mirror")]
    data_dir: PathBuf,

    #[command(flatten)]
    remote: RemoteArgs,

    #[command(flatten)]
    sync: SyncArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct RemoteArgs {
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    supabase_key: Option<String>,
}

#[derive(Args)]
struct SyncArgs {
    #[arg(long, env = "SYNC_INTERVAL_MS", default_value_t = 5_000)]
    interval_ms: u64,
    #[arg(long, env = "SYNC_BATCH_SIZE", default_value_t = 10)]
    batch_size: usize,
    #[arg(long, env = "SYNC_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Write a value locally, queueing it for sync when --user is given
    Set {
        key: String,
        /// JSON; anything that does not parse is stored as a string
        value: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Print a locally stored value
    Get { key: String },
    /// List local keys
    Keys,
    /// List writes waiting for sync
    Pending,
    /// Run a single sync pass
    Sync,
    /// Sync on an interval until interrupted
    Run,
    /// Queue every local value for a user
    Migrate {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let manager = Arc::new(open_manager(&cli)?);

    match cli.command {
        Command::Set { key, value, user } => {
            let value = serde_json::from_str::<JsonValue>(&value)
                .unwrap_or_else(|_| JsonValue::String(value.clone()));
            manager
                .set(&key, &value, user.as_deref())
                .with_context(|| format!("failed to write '{key}'"))?;
            println!("stored '{}' ({} pending)", key, manager.pending_count());
        }
        Command::Get { key } => match manager.local().read_json(&key) {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("(absent)"),
        },
        Command::Keys => {
            for key in manager.local().keys()? {
                println!("{key}");
            }
        }
        Command::Pending => {
            let items = manager.pending_items()?;
            if items.is_empty() {
                println!("no pending writes");
            }
            for item in items {
                println!(
                    "{}\tretries={}\tqueued={}",
                    item.slot(),
                    item.retry_count,
                    item.timestamp.to_rfc3339()
                );
            }
        }
        Command::Sync => {
            let report = manager.sync_now().await?;
            println!(
                "attempted={} synced={} requeued={} dropped={} remaining={}",
                report.attempted, report.synced, report.requeued, report.dropped, report.remaining
            );
        }
        Command::Run => {
            let worker = spawn_sync_worker(manager.clone());
            info!(pending = manager.pending_count(), "sync loop running, Ctrl+C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl+C")?;
            worker.stop().await?;
            info!(pending = manager.pending_count(), "sync loop stopped");
        }
        Command::Migrate { user } => {
            let queued = manager.migrate_user(&user)?;
            println!("queued {queued} values for '{user}'");
        }
    }

    Ok(())
}

fn open_manager(cli: &Cli) -> Result<StorageManager> {
    let backend = FileBackend::open(cli.data_dir.join(STORE_FILE))
        .with_context(|| format!("failed to open local store in '{}'", cli.data_dir.display()))?;
    let local = LocalStore::new(Arc::new(backend));

    let remote: Arc<dyn RemoteStore> = match (&cli.remote.supabase_url, &cli.remote.supabase_key) {
        (Some(url), Some(key)) => Arc::new(SupabaseRemoteStore::new(SupabaseConfig::new(url, key))),
        _ => {
            warn!("no Supabase credentials; syncing into a throwaway in-memory store");
            Arc::new(InMemoryRemoteStore::new())
        }
    };

    let config = SyncConfig::default()
        .interval(Duration::from_millis(cli.sync.interval_ms))
        .batch_size(cli.sync.batch_size)
        .max_retries(cli.sync.max_retries);

    StorageManager::with_journal(local, remote, config, cli.data_dir.join(JOURNAL_FILE))
        .context("failed to open sync journal")
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("eva_online=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
