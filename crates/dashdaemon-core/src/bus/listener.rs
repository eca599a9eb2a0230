//! Typed bus listener
//!
//! Subscribes to a fixed set of channels, decodes each payload according to
//! its channel's type tag and hands `(channel, value)` to one global callback.

use super::transport::{BusConnection, BusEndpoint, MessageStream, Transport};
use super::BusError;
use crate::channel::ChannelId;
use crate::value::TelemetryValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback receiving every decoded message
pub type ValueCallback = Arc<dyn Fn(&ChannelId, TelemetryValue) + Send + Sync>;

/// Delivery counters of a listener
#[derive(Debug, Default)]
pub struct ListenerStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ListenerStats {
    /// Messages decoded and handed to the callback
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Messages discarded because their payload did not decode
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Listener for typed channels on one bus endpoint
pub struct BusListener {
    transport: Arc<dyn Transport>,
    endpoint: BusEndpoint,
    channels: Vec<ChannelId>,
    callback: Arc<RwLock<Option<ValueCallback>>>,
    stats: Arc<ListenerStats>,
    connection: Option<Arc<dyn BusConnection>>,
    task: Option<JoinHandle<()>>,
}

impl BusListener {
    /// Create a listener for `channels`. Nothing is connected until [`start`](Self::start).
    pub fn new(transport: Arc<dyn Transport>, endpoint: BusEndpoint, channels: Vec<ChannelId>) -> Self {
        Self {
            transport,
            endpoint,
            channels,
            callback: Arc::new(RwLock::new(None)),
            stats: Arc::new(ListenerStats::default()),
            connection: None,
            task: None,
        }
    }

    /// Install the callback invoked for every decoded message, replacing any previous one
    pub fn register_global_callback<F>(&self, callback: F)
    where
        F: Fn(&ChannelId, TelemetryValue) + Send + Sync + 'static,
    {
        let mut slot = self
            .callback
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(Arc::new(callback));
    }

    /// Connect, subscribe and start consuming in a background task.
    ///
    /// Returns once the subscription is established. Calling `start` on a
    /// running listener is a no-op.
    pub async fn start(&mut self) -> Result<(), BusError> {
        if self.is_running() {
            return Ok(());
        }

        info!(endpoint = %self.endpoint, channels = self.channels.len(), "Subscribing to data source");
        let connection = self.transport.connect(&self.endpoint).await?;
        let stream = match connection.subscribe(&self.channels).await {
            Ok(stream) => stream,
            Err(e) => {
                connection.close().await;
                return Err(e);
            }
        };

        let callback = Arc::clone(&self.callback);
        let stats = Arc::clone(&self.stats);
        self.task = Some(tokio::spawn(consume(stream, callback, stats)));
        self.connection = Some(connection);
        Ok(())
    }

    /// Stop consuming and release the connection. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Cancellation is the expected outcome
            let _ = task.await;
        }
        if let Some(connection) = self.connection.take() {
            connection.close().await;
            info!(
                endpoint = %self.endpoint,
                delivered = self.stats.delivered(),
                dropped = self.stats.dropped(),
                "Bus listener stopped"
            );
        }
    }

    /// Whether the consumer task is alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Channels this listener subscribes to
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Delivery counters
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }
}

impl Drop for BusListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn consume(
    mut stream: Box<dyn MessageStream>,
    callback: Arc<RwLock<Option<ValueCallback>>>,
    stats: Arc<ListenerStats>,
) {
    while let Some(msg) = stream.next_message().await {
        let value = match TelemetryValue::decode(msg.channel.payload_type(), &msg.payload) {
            Ok(value) => value,
            Err(e) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(channel = %msg.channel, error = %e, "Dropping malformed payload");
                continue;
            }
        };

        let cb = callback
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        match cb {
            Some(cb) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                cb(&msg.channel, value);
            }
            None => debug!(channel = %msg.channel, "No callback registered, value discarded"),
        }
    }
    debug!("Subscription stream ended");
}
