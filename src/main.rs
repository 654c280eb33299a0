//! # CRSF Link
//!
//! Runs one CRSF link engine against the configured serial device until
//! Ctrl+C, publishing telemetry for other processes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crsf_link::config::{Config, LoggingConfig};
use crsf_link::serial::port_trait::TokioSerialOpener;
use crsf_link::{EngineRegistry, LinkEngine};

/// Used when no path is given on the command line and the file exists
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Rolling log file name inside `logging.dir`
const LOG_FILE_NAME: &str = "crsf-link.log";

/// Pick the configuration file: first CLI argument, else the default path if present
fn config_path(args: &[String], default_exists: bool) -> Option<PathBuf> {
    match args.get(1) {
        Some(path) => Some(PathBuf::from(path)),
        None if default_exists => Some(PathBuf::from(DEFAULT_CONFIG_PATH)),
        None => None,
    }
}

fn load_config() -> Result<Config> {
    let args: Vec<String> = std::env::args().collect();
    let default_exists = std::path::Path::new(DEFAULT_CONFIG_PATH).exists();

    match config_path(&args, default_exists) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. When a log directory is set,
/// output is also written to a daily rolling file; keep the returned guard
/// alive so buffered lines are flushed on exit.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (file_layer, guard) = if logging.dir.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&logging.dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Main entry point for CRSF Link
///
/// # Control Flow
///
/// 1. Load configuration and set up logging
/// 2. Create the engine, register it and log its handle
/// 3. Run the receive, transmit and publish loops until Ctrl+C
/// 4. Stop the loops, remove the telemetry file and log packet totals
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded or the Ctrl+C
/// handler cannot be installed. A missing serial device is not fatal: the
/// engine keeps retrying with backoff.
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _log_guard = init_logging(&config.logging);

    info!("CRSF Link v{} starting...", env!("CARGO_PKG_VERSION"));

    let registry = EngineRegistry::new();
    let opener = Arc::new(TokioSerialOpener::new(config.serial.baud_rate));
    let engine = LinkEngine::new(config, opener);
    let handle = registry.register(engine.clone());
    info!("Engine registered as {}", handle);

    let tasks = engine.start();
    info!("Press Ctrl+C to exit");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Received Ctrl+C, shutting down...");
    engine.shutdown();
    tasks.join().await;
    registry.remove(handle);

    let snapshot = engine.snapshot();
    info!(
        "Total packets sent: {}, received: {}, lost: {}",
        snapshot.packets_sent, snapshot.packets_received, snapshot.packets_lost
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_config_path_from_argument() {
        assert_eq!(
            config_path(&args(&["crsf-link", "/etc/crsf.toml"]), true),
            Some(PathBuf::from("/etc/crsf.toml"))
        );
    }

    #[test]
    fn test_config_path_falls_back_to_default_file() {
        assert_eq!(
            config_path(&args(&["crsf-link"]), true),
            Some(PathBuf::from(DEFAULT_CONFIG_PATH))
        );
        assert_eq!(config_path(&args(&["crsf-link"]), false), None);
    }

    #[test]
    fn test_bundled_default_config_is_valid() {
        let contents = include_str!("../config/default.toml");
        let config = Config::from_toml(contents).unwrap();
        assert_eq!(config.serial.baud_rate, 420_000);
        assert_eq!(config.crsf.packet_rate_hz, 100);
    }
}
