//! # sensortagd: SensorTag monitor daemon
//!
//! Composition root that wires the adapters together and runs the monitor.
//!
//! ## Responsibilities
//! - Parse configuration (CLI args, env vars, config file)
//! - Install the tracing subscriber
//! - Initialize the `SQLite` metrics database and run migrations
//! - Open the BLE stack and subscribe to its events
//! - Run the monitor until SIGINT/SIGTERM, then disconnect the tag
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sensortag_adapter_ble::BleAdapterService;
use sensortag_adapter_storage_sqlite_sqlx::{Config as StorageConfig, SqliteMetricsSink};
use sensortag_app::monitor::Monitor;

use crate::config::{Args, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args).context("unable to load configuration")?;

    let filter = EnvFilter::try_new(&config.logging.filter)
        .with_context(|| format!("invalid log filter {:?}", config.logging.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let monitor_config = config.monitor_config()?;
    tracing::info!(
        device = %monitor_config.target,
        interval_secs = config.monitor.interval_secs,
        output = %config.storage.path.display(),
        "sensortagd starting"
    );

    // Storage
    let db = StorageConfig::from_path(&config.storage.path)
        .build()
        .await
        .context("unable to open metrics database")?;
    let sink = SqliteMetricsSink::new(db.pool().clone());

    // Bluetooth
    let ble = BleAdapterService::new(config.ble.clone())
        .await
        .context("unable to open the bluetooth stack")?;
    let events = ble
        .events()
        .await
        .context("unable to subscribe to bluetooth events")?;

    Monitor::new(monitor_config, ble, sink)
        .run(events, shutdown_signal())
        .await
        .context("monitor stopped with an error")?;

    tracing::info!("sensortagd stopped");
    Ok(())
}

/// Resolve once SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "unable to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("interrupted"),
        () = terminate => tracing::info!("terminated"),
    }
}
