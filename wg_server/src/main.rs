//! Host daemon for the wager games engine.
//!
//! Wires the session engine to PostgreSQL (or in-memory storage), runs the
//! timer dispatcher, re-arms every active session on startup, and offers a
//! one-shot force-end sweep for maintenance.

mod config;
mod logging;
mod metrics;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Error;
use pico_args::Arguments;
use wager_games::{
    SessionManager,
    db::{Database, InMemorySessionRepository, PgSessionRepository, SessionRepository},
    game::{SecretCatalog, StaticCatalog},
    session::{LogNotifier, SessionContext, SystemClock, TokioScheduler},
    wallet::{InMemoryLedger, Ledger, PgLedger},
};

use crate::config::{ServerConfig, StorageConfig};

const HELP: &str = "\
Run the wager games session host

USAGE:
  wg_server [OPTIONS]

OPTIONS:
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --metrics    IP:PORT     Prometheus scrape address   [default: env METRICS_BIND, disabled]
  --catalog    PATH        JSON secret catalog         [default: env CATALOG_PATH or bundled]

FLAGS:
  --in-memory              Keep sessions and wallets in process memory
  --force-end-all          End every active session with a refund, then exit
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string
  HINT_INTERVAL_SECS       Seconds between hint reveals
  TURN_TIMEOUT_SECS        Seconds before an idle player gets an auto-move
  GAME_RNG_SEED            Fixed seed for reproducible boards
  (See .env file for all configuration options)
";

struct Args {
    database_url: Option<String>,
    metrics: Option<SocketAddr>,
    catalog: Option<PathBuf>,
    in_memory: bool,
    force_end_all: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        in_memory: pargs.contains("--in-memory"),
        force_end_all: pargs.contains("--force-end-all"),
        database_url: pargs.opt_value_from_str("--db-url")?,
        metrics: pargs.opt_value_from_str("--metrics")?,
        catalog: pargs.opt_value_from_str("--catalog")?,
    };

    logging::init();

    let config =
        ServerConfig::from_env(args.database_url, args.in_memory, args.metrics, args.catalog)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        crate::metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        tracing::info!("Metrics exported at http://{}/metrics", addr);
    }

    let catalog: Arc<dyn SecretCatalog> = match &config.catalog_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read catalog {}: {}", path.display(), e))?;
            let catalog = StaticCatalog::from_json(&json)
                .map_err(|e| anyhow::anyhow!("Invalid catalog {}: {}", path.display(), e))?;
            tracing::info!("Loaded {} catalog entries from {}", catalog.len(), path.display());
            Arc::new(catalog)
        }
        None => Arc::new(StaticCatalog::builtin()),
    };

    let mut connected: Option<Database> = None;
    let (repository, ledger): (Arc<dyn SessionRepository>, Arc<dyn Ledger>) =
        match &config.storage {
            StorageConfig::Postgres(database) => {
                tracing::info!("Connecting to database");
                let db = Database::new(database)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
                db.migrate()
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to apply migrations: {}", e))?;
                db.health_check()
                    .await
                    .map_err(|e| anyhow::anyhow!("Database health check failed: {}", e))?;
                tracing::info!("Database connected successfully");

                let pool = db.pool().clone();
                connected = Some(db);
                (
                    Arc::new(PgSessionRepository::new(pool.clone())),
                    Arc::new(PgLedger::new(Arc::new(pool))),
                )
            }
            StorageConfig::InMemory { starting_balance } => {
                tracing::warn!(
                    starting_balance = starting_balance,
                    "Running with in-memory storage; nothing survives a restart"
                );
                (
                    Arc::new(InMemorySessionRepository::new()),
                    Arc::new(InMemoryLedger::new().with_starting_balance(*starting_balance)),
                )
            }
        };

    let (scheduler, due) = TokioScheduler::new();
    let ctx = SessionContext {
        config: Arc::new(config.session.clone()),
        repository,
        ledger,
        catalog,
        notifier: Arc::new(crate::metrics::MetricsNotifier::new(Arc::new(LogNotifier))),
        scheduler: Arc::new(scheduler),
        clock: Arc::new(SystemClock),
    };
    let manager = Arc::new(SessionManager::new(ctx)?);

    if args.force_end_all {
        let active_before = manager.list_active().await?.len();
        let ended = manager.force_end_all().await?;
        logging::log_sweep(ended, active_before);
        if let Some(db) = connected {
            db.close().await;
        }
        return Ok(());
    }

    tokio::spawn(Arc::clone(&manager).run_dispatcher(due));

    let resumed = manager.resume_active().await?;
    tracing::info!(resumed = resumed, "Session host ready. Press Ctrl+C to stop.");

    let gauge = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(15));
            loop {
                ticker.tick().await;
                crate::metrics::active_session_actors(manager.active_session_count().await);
            }
        })
    };

    shutdown_signal().await;
    gauge.abort();
    tracing::info!("Shutting down session host...");
    if let Some(db) = connected {
        db.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
