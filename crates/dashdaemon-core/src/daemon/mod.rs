//! Dashboard daemon
//!
//! Owns the [`ValueStore`], wires the source listener into it and runs the
//! periodic derivation tick against the destination bus.
//!
//! ```text
//! Idle -> Starting -> Running -> Stopping -> Stopped
//! ```
//!
//! A shutdown request interrupts a blocked startup and ends the loop after
//! the tick in flight.

mod error;
pub mod tick;

pub use error::{
    DaemonError, DEFAULT_EXIT_CODE, REASON_BUS_UNREACHABLE, REASON_CONFIG_CONNECTION_INVALID,
    REASON_CONFIG_WHEREISIT, REASON_SETTINGS_INVALID,
};
pub use tick::{FuelOutcome, TickContext, TickReport};

use crate::bus::{BusListener, BusWriter, Transport};
use crate::channel::keys::subscribed_channels;
use crate::config::{ConfigBackend, ConfigStore, DaemonSettings};
use crate::store::ValueStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`DashDaemon`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DaemonState {
    /// Constructed, not yet run
    Idle,
    /// Connecting the config store and both buses
    Starting,
    /// Ticking
    Running,
    /// Tearing down connections
    Stopping,
    /// Done; a daemon cannot be run twice
    Stopped,
}

/// Requests a running daemon to stop. Cheap to clone; repeated calls are no-ops.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask the daemon to stop
    pub fn shutdown(&self) {
        if !self.tx.send_replace(true) {
            info!("Shutdown requested");
        }
    }

    /// Whether shutdown has been requested
    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolves once shutdown is requested
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    // The sender lives as long as the handle, so an error means nobody can
    // request shutdown any more; treat that as a request.
    let _ = rx.wait_for(|requested| *requested).await;
}

/// Everything a running daemon holds
struct Running {
    config: Arc<dyn ConfigStore>,
    listener: BusListener,
    writer: BusWriter,
}

/// The dashboard daemon
pub struct DashDaemon {
    settings: DaemonSettings,
    transport: Arc<dyn Transport>,
    store: Arc<ValueStore>,
    state: watch::Sender<DaemonState>,
    last_report: watch::Sender<Option<TickReport>>,
    shutdown: ShutdownHandle,
}

impl DashDaemon {
    /// Daemon over `transport`; nothing connects until [`DashDaemon::run`]
    pub fn new(settings: DaemonSettings, transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(DaemonState::Idle);
        let (last_report, _) = watch::channel(None);
        Self {
            settings,
            transport,
            store: Arc::new(ValueStore::new()),
            state,
            last_report,
            shutdown: ShutdownHandle::new(),
        }
    }

    /// Latest known value of every subscribed channel
    pub fn store(&self) -> &Arc<ValueStore> {
        &self.store
    }

    /// Settings the daemon was built with
    pub fn settings(&self) -> &DaemonSettings {
        &self.settings
    }

    /// Current lifecycle state
    pub fn state(&self) -> DaemonState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn state_watch(&self) -> watch::Receiver<DaemonState> {
        self.state.subscribe()
    }

    /// Observe tick reports; `None` until the first tick completes
    pub fn report_watch(&self) -> watch::Receiver<Option<TickReport>> {
        self.last_report.subscribe()
    }

    /// Handle for requesting shutdown from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    fn transition(&self, next: DaemonState) {
        let previous = self.state.send_replace(next);
        debug!(from = ?previous, to = ?next, "Daemon state changed");
    }

    /// Start up, tick until shutdown, then tear down.
    ///
    /// Returns `Ok(())` after a requested shutdown. Startup failures are
    /// returned as [`DaemonError`]; the daemon ends in [`DaemonState::Stopped`]
    /// either way and cannot be run again.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let current = self.state();
        if current != DaemonState::Idle {
            return Err(DaemonError::InvalidState(current));
        }
        self.transition(DaemonState::Starting);

        let started = tokio::select! {
            biased;
            _ = shutdown_requested(self.shutdown.subscribe()) => {
                info!("Shutdown requested during startup");
                self.transition(DaemonState::Stopped);
                return Ok(());
            }
            started = self.start_up() => started,
        };

        let mut running = match started {
            Ok(running) => running,
            Err(e) => {
                error!(error = %e, exit_code = e.exit_code(), "Daemon startup failed");
                self.transition(DaemonState::Stopped);
                return Err(e);
            }
        };

        self.transition(DaemonState::Running);
        info!(
            tick_interval_ms = self.settings.daemon.tick_interval.as_millis() as u64,
            config = %running.config.describe(),
            "Dash daemon running"
        );
        self.tick_loop(&running).await;

        self.transition(DaemonState::Stopping);
        running.listener.stop().await;
        running.writer.close().await;
        self.transition(DaemonState::Stopped);
        info!("Dash daemon stopped");
        Ok(())
    }

    async fn start_up(&self) -> Result<Running, DaemonError> {
        let backend = ConfigBackend::from_section(&self.settings.config)?;
        let config = backend.connect(self.transport.as_ref()).await?;
        info!(store = %config.describe(), "Config store ready");

        let mut listener = BusListener::new(
            Arc::clone(&self.transport),
            self.settings.source.clone(),
            subscribed_channels(),
        );
        let writer = BusWriter::connect(self.transport.as_ref(), self.settings.destination.clone())
            .await?
            .with_timeout(self.settings.daemon.publish_timeout);

        let store = Arc::clone(&self.store);
        listener.register_global_callback(move |channel, value| {
            store.record(channel.clone(), value);
        });
        if let Err(e) = listener.start().await {
            writer.close().await;
            return Err(e.into());
        }

        Ok(Running {
            config,
            listener,
            writer,
        })
    }

    async fn tick_loop(&self, running: &Running) {
        let ctx = TickContext {
            config: running.config.as_ref(),
            writer: &running.writer,
            config_timeout: self.settings.daemon.config_timeout,
        };

        let mut interval = tokio::time::interval(self.settings.daemon.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(self.shutdown.subscribe()) => break,
                _ = interval.tick() => {}
            }

            let snapshot = self.store.snapshot();
            let report = ctx.run(&snapshot).await;
            if report.publish_failures > 0 {
                warn!(failures = report.publish_failures, "Tick completed with publish failures");
            }
            debug!(speed = report.speed, fuel = ?report.fuel, "Tick");
            self.last_report.send_replace(Some(report));
        }
    }
}
