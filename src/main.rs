//! SIATA Weather ETL - Main Daemon
//!
//! A server-side daemon that:
//! 1. Collects WRF forecasts for every configured zone
//! 2. Syncs the SIATA station registry
//! 3. Sweeps live readings of every active station into PostgreSQL
//!
//! The full cycle runs at start and every 10 minutes; the measurement
//! sweep alone runs every 30 seconds.
//!
//! Usage:
//!   cargo run --release                    # Start daemon without HTTP endpoint
//!   cargo run --release -- --endpoint 8080 # Start with liveness endpoint on port 8080
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string
//!   ETL_CONFIG   - optional TOML config file (default: etl.toml)
//!   LOG_LEVEL    - log verbosity (RUST_LOG takes precedence)

use log::{error, info, warn};
use siata_etl::config::EtlConfig;
use siata_etl::daemon::Daemon;
use siata_etl::db::PgStore;
use siata_etl::endpoint;
use siata_etl::freshness::SystemClock;
use siata_etl::ingest::fetch::HttpFetcher;
use siata_etl::scheduler::{Scheduler, SchedulerConfig};
use std::env;
use std::process;
use std::sync::{mpsc, Arc};
use std::thread;

fn main() {
    let mut config = match EtlConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" => match args.get(i + 1).and_then(|p| p.parse().ok()) {
                Some(port) => {
                    config.endpoint_port = Some(port);
                    i += 2;
                }
                None => {
                    eprintln!("Error: --endpoint requires a port number");
                    process::exit(1);
                }
            },
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--endpoint PORT]", args[0]);
                process::exit(1);
            }
        }
    }

    env_logger::Builder::new()
        .filter_level(config.level_filter())
        .parse_default_env()
        .init();

    info!("SIATA weather ETL starting");

    let store = match PgStore::connect(config.workers) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Database initialization failed: {}", e);
            process::exit(1);
        }
    };

    let fetcher = match HttpFetcher::from_config(&config) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            process::exit(1);
        }
    };

    let daemon = Arc::new(Daemon::new(
        config.clone(),
        fetcher,
        store,
        Arc::new(SystemClock),
    ));
    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig::from_config(&config),
        daemon.slow_job(),
        daemon.fast_job(),
    ));

    // Shutdown hook: Ctrl-C / SIGTERM stops the scheduler after in-flight jobs.
    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    let handler_tx = shutdown_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = handler_tx.send(());
    }) {
        warn!("Failed to install shutdown handler: {}", e);
    }

    scheduler.ensure_started();

    if let Some(port) = config.endpoint_port {
        let scheduler = Arc::clone(&scheduler);
        thread::spawn(move || {
            if let Err(e) = endpoint::start_endpoint_server(port, scheduler) {
                error!("Endpoint server error: {}", e);
            }
        });
    }

    info!("Running; press Ctrl+C to stop");
    if shutdown_rx.recv().is_err() {
        warn!("Shutdown channel closed unexpectedly");
    }

    drop(shutdown_tx);
    info!("Shutdown requested");
    scheduler.stop();
    info!("SIATA weather ETL stopped");
}
