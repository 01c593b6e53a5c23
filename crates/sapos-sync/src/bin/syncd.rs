//! # Sync Daemon
//!
//! Runs the sync engine against a till database until Ctrl-C.
//!
//! ## Usage
//! ```bash
//! # Remote from sync.toml or the environment
//! SAPOS_REMOTE_URL=https://pos.example.co.za SAPOS_API_KEY=... \
//!     cargo run -p sapos-sync --bin sapos-syncd
//!
//! # Explicit config and database
//! cargo run -p sapos-sync --bin sapos-syncd -- --config ./sync.toml --db ./sapos.db
//!
//! # One cycle, then exit
//! cargo run -p sapos-sync --bin sapos-syncd -- --once
//! ```
//!
//! Connectivity is checked against the remote every `PING_INTERVAL`.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sapos_db::{Database, DbConfig};
use sapos_sync::{
    CycleOutcome, RestTransport, SchedulerConfig, SyncConfig, SyncOrchestrator, SyncScheduler,
    SyncStatus, TriggerSource,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PING_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sapos=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_config = DbConfig::from_env_or("./sapos.db");
    let mut once = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_config = DbConfig::new(&args[i + 1]);
                    i += 1;
                }
            }
            "--once" => once = true,
            "--help" | "-h" => {
                println!("SA POS Sync Daemon");
                println!();
                println!("Usage: sapos-syncd [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  sync.toml path (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file path (default: $SAPOS_DB_PATH or ./sapos.db)");
                println!("      --once           Run a single cycle and exit");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = SyncConfig::load(config_path)?;
    let db = Arc::new(Database::new(db_config).await?);
    let identity = db.device_identity().await?;
    info!(
        device_id = %identity.device_id,
        device_name = %config.device.name,
        mode = %config.mode(),
        "Sync daemon starting"
    );

    let transport = Arc::new(RestTransport::from_config(&config)?);
    let orchestrator =
        Arc::new(SyncOrchestrator::new(Arc::clone(&db), transport.clone(), &config).await?);

    orchestrator.broadcaster().subscribe(Arc::new(|s: &SyncStatus| {
        info!(
            online = s.online,
            syncing = s.syncing,
            pending = s.pending_count,
            last_sync = ?s.last_sync,
            error = ?s.error,
            "Sync status"
        );
    }));

    if once {
        let outcome = orchestrator.try_sync(TriggerSource::Manual).await;
        db.close().await;
        return match outcome {
            CycleOutcome::Failed(message) => Err(message.into()),
            _ => Ok(()),
        };
    }

    let online = transport.ping().await.is_ok();
    let (online_tx, online_rx) = watch::channel(online);

    let connectivity = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        loop {
            ticker.tick().await;
            let reachable = transport.ping().await.is_ok();
            online_tx.send_if_modified(|current| {
                let changed = *current != reachable;
                *current = reachable;
                changed
            });
        }
    });

    let scheduler = SyncScheduler::spawn(
        Arc::clone(&orchestrator),
        SchedulerConfig::from(&config),
        online_rx,
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    connectivity.abort();
    if let Err(e) = scheduler.shutdown().await {
        warn!(?e, "Scheduler did not stop cleanly");
    }
    db.close().await;

    Ok(())
}
