//! dashdaemon: derives digital dashboard values from live car telemetry

mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use dashdaemon_core::bus::{InMemoryTransport, RedisTransport, Transport};
use dashdaemon_core::config::{locate_settings, ConfigBackend, DaemonSettings};
use dashdaemon_core::daemon::{DaemonError, DashDaemon, ShutdownHandle, DEFAULT_EXIT_CODE};
use dashdaemon_core::demo::{seed_vehicle_parameters, DemoProducer, DemoSimulator};

/// Publish period of the simulated OBD producer
const DEMO_PERIOD: Duration = Duration::from_millis(100);

/// CarPi dashboard value processor
#[derive(Parser, Debug)]
#[command(name = "dashdaemon", version)]
#[command(about = "Derives speed and fuel consumption for the CarPi dashboard")]
struct Args {
    /// Daemon settings file (default: $DASH_DAEMON_CFG, ./dash.ini, /etc/carpi/dash.ini)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Attach a simulated OBD producer and seed vehicle parameters
    #[arg(long)]
    demo: bool,

    /// Log filter, e.g. "debug" or "dashdaemon_core=trace" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init_logging(args.log_level.as_deref());

    let code = match run(args).await {
        Ok(()) => 0,
        Err(err) => {
            let code = err
                .downcast_ref::<DaemonError>()
                .map(DaemonError::exit_code)
                .unwrap_or(DEFAULT_EXIT_CODE);
            error!(exit_code = code, "dashdaemon failed: {err:#}");
            code
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!(version = dashdaemon_core::VERSION, "Starting dashdaemon");

    let settings = load_settings(args.config.as_deref())?;

    let mut _producer = None;
    let transport: Arc<dyn Transport> = if args.demo {
        info!("Demo mode, using the in-process bus");
        let transport = Arc::new(InMemoryTransport::new());
        _producer = Some(start_demo(&transport, &settings));
        transport
    } else {
        Arc::new(RedisTransport::new())
    };

    let daemon = DashDaemon::new(settings, transport);
    spawn_signal_listener(daemon.shutdown_handle());

    daemon.run().await?;
    info!("dashdaemon exited cleanly");
    Ok(())
}

fn load_settings(explicit: Option<&std::path::Path>) -> anyhow::Result<DaemonSettings> {
    match locate_settings(explicit) {
        Some(path) => {
            info!(path = %path.display(), "Loading daemon settings");
            DaemonSettings::load_from(&path)
                .map_err(DaemonError::from)
                .with_context(|| format!("failed to load settings from {}", path.display()))
        }
        None => {
            info!("No settings file found, using defaults");
            Ok(DaemonSettings::default())
        }
    }
}

/// Seed the config bus and feed the source bus with simulated readings
fn start_demo(transport: &InMemoryTransport, settings: &DaemonSettings) -> DemoProducer {
    match ConfigBackend::from_section(&settings.config) {
        Ok(ConfigBackend::Bus { endpoint }) => seed_vehicle_parameters(&transport.bus(&endpoint)),
        Ok(ConfigBackend::Ini { path }) => {
            info!(path = %path.display(), "Demo mode reads vehicle parameters from the INI store")
        }
        // Startup reports this one
        Err(_) => {}
    }
    DemoProducer::spawn(transport.bus(&settings.source), DEMO_PERIOD, DemoSimulator::new())
}

fn spawn_signal_listener(handle: ShutdownHandle) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => handle.shutdown(),
            Err(e) => warn!("Signal handling unavailable: {e:#}"),
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["dashdaemon", "--config", "/tmp/dash.ini", "--demo", "--log-level", "debug"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/dash.ini")));
        assert!(args.demo);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["dashdaemon"]);
        assert_eq!(args.config, None);
        assert!(!args.demo);
    }

    #[test]
    fn test_missing_explicit_settings_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.ini");

        let err = load_settings(Some(&path)).unwrap_err();
        let code = err.downcast_ref::<DaemonError>().map(DaemonError::exit_code);
        assert_eq!(code, Some(0xFDC2));
    }

    #[test]
    fn test_settings_error_maps_to_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dash.ini");
        std::fs::write(&path, "[Daemon]\nTickIntervalMs = fast\n").unwrap();

        let err = load_settings(Some(&path)).unwrap_err();
        let code = err.downcast_ref::<DaemonError>().map(DaemonError::exit_code);
        assert_eq!(code, Some(0xFDC2));
    }
}
