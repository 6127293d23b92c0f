//! swcache - command-line host for the offline cache manager.
//!
//! Each invocation plays the hosting runtime for one event: it builds a worker
//! over the on-disk cache and the real network, dispatches the event, waits
//! for the event's background work to settle and prints the outcome.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use swcache_core::store::DiskStorage;
use swcache_core::{
    EventOutcome, FetchOutcome, HttpNetwork, LogClients, LogNotifier, Network,
    OfflineCacheManager, PageMessage, Request, Response, ServiceWorker, WorkerConfig, WorkerEvent,
};

/// When set, logs are also written to a daily rolling file in this directory
const LOG_DIR_ENV: &str = "SWCACHE_LOG_DIR";

/// Prefix of rolling log file names
const LOG_FILE_PREFIX: &str = "swcache.log";

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "Offline cache manager for progressive web apps")]
#[command(version)]
struct Args {
    /// Path to config file (default: $XDG_CONFIG_HOME/swcache/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the page origin from the config
    #[arg(short, long)]
    origin: Option<String>,

    /// Override the cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pre-cache the static manifest
    Install,
    /// Install, then activate and delete stale generations
    Update,
    /// Request a path through the cache-first policy
    Fetch {
        path: String,
        /// Treat the request as a full page load
        #[arg(long)]
        navigate: bool,
    },
    /// Post a JSON message, e.g. '{"type":"CACHE_URLS","urls":["/a"]}'
    Message { json: String },
    /// Deliver a push with an optional text payload
    Push { body: Option<String> },
    /// Fire a background sync tag
    Sync { tag: String },
    /// Fire a periodic sync tag
    PeriodicSync { tag: String },
    /// Click a notification action ("open" or "close")
    Click { action: Option<String> },
    /// List cache generations
    List,
    /// Write the effective config to the config path
    InitConfig,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let args = Args::parse();

    let mut config = WorkerConfig::load(args.config.as_deref())?;
    if let Some(origin) = args.origin {
        config.origin = origin;
    }

    if let Command::InitConfig = args.command {
        config.save(args.config.as_deref())?;
        eprintln!("Config written");
        return Ok(());
    }

    let cache_dir = match args.cache_dir {
        Some(dir) => dir,
        None => config.cache_dir()?,
    };
    let storage = Arc::new(DiskStorage::new(cache_dir).context("Failed to open cache directory")?);

    if let Command::List = args.command {
        return list(&storage).await;
    }

    let origin = config.origin_url()?;
    let network = Arc::new(HttpNetwork::new()?);
    let manager = OfflineCacheManager::new(&config, origin.clone(), storage, network.clone());
    let mut worker = ServiceWorker::new(
        config.clone(),
        manager,
        Arc::new(LogNotifier),
        Arc::new(LogClients),
    );

    info!(origin = %origin, command = ?args.command, "swcache starting");

    match args.command {
        Command::Install => {
            dispatch(&mut worker, WorkerEvent::Install).await?;
            eprintln!("Installed {}", worker.manager().static_cache());
        }
        Command::Update => {
            dispatch(&mut worker, WorkerEvent::Install).await?;
            if let EventOutcome::Activated { deleted } =
                dispatch(&mut worker, WorkerEvent::Activate).await?
            {
                for name in deleted {
                    eprintln!("Deleted stale cache {}", name);
                }
            }
            eprintln!("Active: {}, {}", worker.manager().static_cache(), worker.manager().dynamic_cache());
        }
        Command::Fetch { path, navigate } => {
            let url = worker.manager().resolve(&path)?;
            let request = if navigate {
                Request::navigate(url)
            } else {
                Request::get(url)
            };
            worker.resume_activated();
            let outcome = dispatch(&mut worker, WorkerEvent::Fetch(request.clone())).await?;
            let response = match outcome {
                EventOutcome::Fetch(FetchOutcome::Responded(response)) => response,
                _ => {
                    info!(url = %request.url(), "Not intercepted, fetching directly");
                    network.fetch(&request).await?
                }
            };
            print_response(response)?;
        }
        Command::Message { json } => {
            let message = PageMessage::parse(&json)?;
            dispatch(&mut worker, WorkerEvent::Message(message)).await?;
        }
        Command::Push { body } => {
            dispatch(&mut worker, WorkerEvent::Push { data: body }).await?;
        }
        Command::Sync { tag } => {
            dispatch(&mut worker, WorkerEvent::Sync { tag }).await?;
        }
        Command::PeriodicSync { tag } => {
            dispatch(&mut worker, WorkerEvent::PeriodicSync { tag }).await?;
        }
        Command::Click { action } => {
            // Clicks arrive without the original; rebuild the push notification shape
            let notification = worker.build_notification(config.default_push_body.clone());
            dispatch(&mut worker, WorkerEvent::NotificationClick { action, notification }).await?;
        }
        Command::List | Command::InitConfig => {}
    }

    Ok(())
}

/// Dispatch one event and wait for everything it registered to finish
async fn dispatch(worker: &mut ServiceWorker, event: WorkerEvent) -> Result<EventOutcome> {
    let kind = event.kind();
    let dispatched = worker
        .dispatch(event)
        .await
        .with_context(|| format!("{} event failed", kind))?;
    Ok(dispatched.settled().await)
}

async fn list(storage: &DiskStorage) -> Result<()> {
    let generations = storage.describe().await?;
    if generations.is_empty() {
        eprintln!("No caches in {}", storage.cache_dir().display());
    }
    let mut out = io::stdout().lock();
    for g in generations {
        writeln!(out, "{}\t{} entries\t{}", g.name, g.entries, g.age_display())?;
    }
    Ok(())
}

fn print_response(response: Response) -> Result<()> {
    eprintln!("HTTP {} {}", response.status(), response.status_text());
    let body = response.text()?;
    let mut out = io::stdout().lock();
    out.write_all(body.as_bytes())?;
    out.flush()?;
    Ok(())
}
