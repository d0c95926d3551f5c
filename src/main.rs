//! # Altimeter Sync
//!
//! Periodically samples a barometric altimeter and uploads the readings,
//! archiving them on local storage while the network is unreachable.

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use altimeter_sync::clock::SystemClock;
use altimeter_sync::config::{Config, LoggingConfig};
use altimeter_sync::network::TcpProbe;
use altimeter_sync::reference::{FixedReference, ReferencePressure, WeatherReference};
use altimeter_sync::sensor::IioAltimeter;
use altimeter_sync::state::StateFile;
use altimeter_sync::store::RecordStore;
use altimeter_sync::sync::{Endpoints, SyncController, SyncSettings};
use altimeter_sync::uplink::http::HttpGateway;

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix of the daily-rolling log files
const LOG_FILE_PREFIX: &str = "altimeter-sync.log";

/// Main entry point for Altimeter Sync
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (path from the first argument)
///    - Set up logging to the console and, optionally, a rolling file
///    - Mount the record store; on failure keep running without archiving
///    - Pick the reference pressure source (fixed or weather service)
///    - Restore persisted process state
///
/// 2. **Main Loop**
///    - Run one sync cycle every `sync.period_ms`
///    - Checkpoint process state before each sleep
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Checkpoint process state
///    - Close the record store
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded or is invalid.
///
/// # Examples
///
/// ```bash
/// cargo run --release -- /etc/altimeter-sync.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);

    info!("Altimeter Sync v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Using configuration from {}", config_path);

    let store = RecordStore::new(&config.store.root, config.store.max_sequence_id);
    match store.open() {
        Ok(()) => info!(
            "Record store mounted at {}, next id {:?}",
            store.root().display(),
            store.next_id()
        ),
        Err(e) => error!("Record store unavailable, offline readings will be dropped: {}", e),
    }

    let endpoints = Endpoints {
        primary: config.uplink.thingspeak_endpoint(),
        batch: config.uplink.keenio_endpoint(),
    };
    let gateway = HttpGateway::new(config.uplink.port, config.uplink.backoff());
    let fallback = config.sensor.reference_pressure_pa;
    let reference: Box<dyn ReferencePressure> = match &config.weather {
        Some(weather) => {
            info!(
                "Reference pressure from {} every {:?}, {} Pa until then",
                weather.host,
                weather.refresh_period(),
                fallback
            );
            Box::new(WeatherReference::new(
                gateway.clone(),
                &weather.host,
                &weather.location_id,
                &weather.api_key,
                weather.refresh_period(),
                fallback,
            ))
        }
        None => {
            info!("Using fixed reference pressure {} Pa", fallback);
            Box::new(FixedReference(fallback))
        }
    };
    let settings = SyncSettings {
        climb_threshold: config.sensor.climb_threshold_m,
        drain_policy: config.sync.drain_policy,
    };

    let mut sync = SyncController::new(
        store,
        IioAltimeter::new(&config.sensor.device_dir),
        reference,
        TcpProbe::new(
            &config.network.probe_host,
            config.network.probe_port,
            config.network.probe_timeout(),
        ),
        gateway,
        SystemClock::new(),
        endpoints,
        settings,
    )
    .with_state_file(StateFile::new(&config.state.path));

    info!("Press Ctrl+C to exit");

    sync.run(config.sync.period(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down...");
    })
    .await;

    sync.checkpoint();
    sync.store().close();
    info!("Completed {} cycles", sync.state().cycles);

    Ok(())
}

/// Console logging filtered by `RUST_LOG` (INFO by default), plus a
/// daily-rolling file when a log directory is configured.
///
/// The returned guard flushes the file writer and must be held until exit.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let console = fmt::layer();

    match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        assert_eq!(DEFAULT_CONFIG_PATH, "config/default.toml");
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();
        assert!(config.uplink.thingspeak.is_some());
    }
}
