//! In-process bus
//!
//! Broadcast-based broker standing in for a networked pub/sub server. One
//! [`InMemoryBus`] exists per endpoint address; connections to the same
//! address share it. Used by demo mode and the tests.

use super::transport::{BusConnection, BusEndpoint, MessageStream, RawMessage, Transport};
use super::BusError;
use crate::channel::ChannelId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

/// Messages buffered per subscriber before the slowest one starts lagging
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A single in-process broker
pub struct InMemoryBus {
    sender: broadcast::Sender<RawMessage>,
    retained: RwLock<HashMap<ChannelId, String>>,
    messages_published: AtomicU64,
    capacity: usize,
}

impl InMemoryBus {
    /// Create a bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with the given per-subscriber buffer
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            retained: RwLock::new(HashMap::new()),
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Deliver a payload to every current subscriber of `channel`
    pub fn publish(&self, channel: &ChannelId, payload: impl Into<String>) -> usize {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(RawMessage::new(channel.clone(), payload)) {
            Ok(receivers) => {
                trace!(channel = %channel, receivers, "Message published");
                receivers
            }
            Err(_) => {
                trace!(channel = %channel, "Message dropped (no receivers)");
                0
            }
        }
    }

    /// Receiver for messages on any of `channels`
    pub fn subscribe(&self, channels: &[ChannelId]) -> broadcast::Receiver<RawMessage> {
        debug!(channels = channels.len(), "New subscription created");
        self.sender.subscribe()
    }

    /// Store a retained value
    pub fn set(&self, key: &ChannelId, payload: impl Into<String>) {
        let mut retained = self.retained.write().unwrap_or_else(PoisonError::into_inner);
        retained.insert(key.clone(), payload.into());
    }

    /// Read a retained value
    pub fn get(&self, key: &ChannelId) -> Option<String> {
        let retained = self.retained.read().unwrap_or_else(PoisonError::into_inner);
        retained.get(key).cloned()
    }

    /// Number of live receivers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total publish attempts, delivered or not
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Per-subscriber buffer size
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Transport`] handing out connections to in-process brokers
#[derive(Default)]
pub struct InMemoryTransport {
    brokers: Mutex<HashMap<String, Arc<InMemoryBus>>>,
    unreachable: Mutex<HashSet<String>>,
    passwords: Mutex<HashMap<String, String>>,
}

impl InMemoryTransport {
    /// Transport with no brokers yet; each endpoint gets one on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker behind `endpoint`, created on first use
    pub fn bus(&self, endpoint: &BusEndpoint) -> Arc<InMemoryBus> {
        let mut brokers = self.brokers.lock().unwrap_or_else(PoisonError::into_inner);
        brokers
            .entry(endpoint.address())
            .or_insert_with(|| Arc::new(InMemoryBus::new()))
            .clone()
    }

    /// Make connection attempts to `endpoint` fail (or succeed again)
    pub fn set_unreachable(&self, endpoint: &BusEndpoint, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap_or_else(PoisonError::into_inner);
        if unreachable {
            set.insert(endpoint.address());
        } else {
            set.remove(&endpoint.address());
        }
    }

    /// Require `password` for connections to `endpoint`
    pub fn require_password(&self, endpoint: &BusEndpoint, password: impl Into<String>) {
        let mut passwords = self.passwords.lock().unwrap_or_else(PoisonError::into_inner);
        passwords.insert(endpoint.address(), password.into());
    }

    fn check_reachable(&self, endpoint: &BusEndpoint) -> Result<(), BusError> {
        let address = endpoint.address();
        let failed = |reason: &str| BusError::ConnectionFailed {
            endpoint: address.clone(),
            reason: reason.to_string(),
        };

        let unreachable = self.unreachable.lock().unwrap_or_else(PoisonError::into_inner);
        if unreachable.contains(&address) {
            return Err(failed("connection refused"));
        }
        drop(unreachable);

        let passwords = self.passwords.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(expected) = passwords.get(&address) {
            if endpoint.password.as_deref() != Some(expected.as_str()) {
                return Err(failed("authentication failed"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn connect(&self, endpoint: &BusEndpoint) -> Result<Arc<dyn BusConnection>, BusError> {
        self.check_reachable(endpoint)?;
        debug!(endpoint = %endpoint, "Connected to in-memory bus");
        Ok(Arc::new(InMemoryConnection::new(self.bus(endpoint))))
    }
}

/// Connection to an [`InMemoryBus`]
pub struct InMemoryConnection {
    bus: Arc<InMemoryBus>,
    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
}

impl InMemoryConnection {
    /// Open connection to `bus`
    pub fn new(bus: Arc<InMemoryBus>) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            bus,
            closed: AtomicBool::new(false),
            close_tx,
        }
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BusError::NotConnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BusConnection for InMemoryConnection {
    async fn subscribe(&self, channels: &[ChannelId]) -> Result<Box<dyn MessageStream>, BusError> {
        self.ensure_open()?;
        Ok(Box::new(InMemorySubscription {
            receiver: self.bus.subscribe(channels),
            channels: channels.iter().cloned().collect(),
            closed: Some(self.close_tx.subscribe()),
        }))
    }

    async fn publish(&self, channel: &ChannelId, payload: String) -> Result<usize, BusError> {
        self.ensure_open()?;
        Ok(self.bus.publish(channel, payload))
    }

    async fn get(&self, key: &ChannelId) -> Result<Option<String>, BusError> {
        self.ensure_open()?;
        Ok(self.bus.get(key))
    }

    async fn set(&self, key: &ChannelId, payload: String) -> Result<(), BusError> {
        self.ensure_open()?;
        self.bus.set(key, payload);
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_tx.send_replace(true);
            debug!("In-memory connection closed");
        }
    }
}

/// Filtered view of the broker's broadcast stream
pub struct InMemorySubscription {
    receiver: broadcast::Receiver<RawMessage>,
    channels: HashSet<ChannelId>,
    /// `None` once the connection handle is gone; the stream then lives
    /// as long as the broker
    closed: Option<watch::Receiver<bool>>,
}

enum Wake {
    Received(Result<RawMessage, broadcast::error::RecvError>),
    Closed,
    HandleDropped,
}

#[async_trait]
impl MessageStream for InMemorySubscription {
    async fn next_message(&mut self) -> Option<RawMessage> {
        loop {
            let wake = match &mut self.closed {
                Some(closed) if *closed.borrow() => Wake::Closed,
                // Buffered messages win over a concurrent close
                Some(closed) => tokio::select! {
                    biased;
                    received = self.receiver.recv() => Wake::Received(received),
                    changed = closed.changed() => match changed {
                        Ok(()) => continue,
                        Err(_) => Wake::HandleDropped,
                    },
                },
                None => Wake::Received(self.receiver.recv().await),
            };
            match wake {
                Wake::Closed => return None,
                Wake::HandleDropped => {
                    self.closed = None;
                    continue;
                }
                Wake::Received(Ok(msg)) if self.channels.contains(&msg.channel) => return Some(msg),
                Wake::Received(Ok(_)) => continue,
                Wake::Received(Err(broadcast::error::RecvError::Lagged(count))) => {
                    debug!(lagged = count, "Subscriber lagged, some messages dropped");
                    continue;
                }
                Wake::Received(Err(broadcast::error::RecvError::Closed)) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn rpm() -> ChannelId {
        ChannelId::new("#carpi.obd.rpm")
    }

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let bus = InMemoryBus::new();
        assert_eq!(bus.publish(&rpm(), "900"), 0);
        assert_eq!(bus.messages_published(), 1);
    }

    #[tokio::test]
    async fn test_subscription_filters_channels() {
        let transport = InMemoryTransport::new();
        let conn = transport.connect(&BusEndpoint::default()).await.unwrap();
        let mut stream = conn.subscribe(&[rpm()]).await.unwrap();

        conn.publish(&ChannelId::new("#carpi.obd.speed"), "50".into())
            .await
            .unwrap();
        conn.publish(&rpm(), "1200".into()).await.unwrap();

        let msg = timeout(Duration::from_millis(100), stream.next_message())
            .await
            .expect("timeout")
            .expect("message");
        assert_eq!(msg, RawMessage::new(rpm(), "1200"));
    }

    #[tokio::test]
    async fn test_same_address_shares_broker() {
        let transport = InMemoryTransport::new();
        let a = transport.connect(&BusEndpoint::default()).await.unwrap();
        let b = transport.connect(&BusEndpoint::default()).await.unwrap();
        let other = transport
            .connect(&BusEndpoint::default().with_db(1))
            .await
            .unwrap();

        a.set(&rpm(), "42".into()).await.unwrap();
        assert_eq!(b.get(&rpm()).await.unwrap().as_deref(), Some("42"));
        assert_eq!(other.get(&rpm()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let transport = InMemoryTransport::new();
        let ep = BusEndpoint::new("10.0.0.9", 6379);
        transport.set_unreachable(&ep, true);

        let err = transport.connect(&ep).await.err().unwrap();
        assert!(matches!(err, BusError::ConnectionFailed { .. }));

        transport.set_unreachable(&ep, false);
        assert!(transport.connect(&ep).await.is_ok());
    }

    #[tokio::test]
    async fn test_password_required() {
        let transport = InMemoryTransport::new();
        let ep = BusEndpoint::default();
        transport.require_password(&ep, "secret");

        assert!(transport.connect(&ep).await.is_err());
        let authed = ep.clone().with_password(Some("secret".into()));
        assert!(transport.connect(&authed).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let transport = InMemoryTransport::new();
        let conn = transport.connect(&BusEndpoint::default()).await.unwrap();
        let mut stream = conn.subscribe(&[rpm()]).await.unwrap();

        conn.close().await;
        conn.close().await;

        let next = timeout(Duration::from_millis(100), stream.next_message())
            .await
            .expect("stream should end promptly");
        assert_eq!(next, None);
        assert_eq!(
            conn.publish(&rpm(), "1".into()).await,
            Err(BusError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_stream_outlives_dropped_connection() {
        let transport = InMemoryTransport::new();
        let endpoint = BusEndpoint::default();
        let mut stream = {
            let conn = transport.connect(&endpoint).await.unwrap();
            conn.subscribe(&[rpm()]).await.unwrap()
        };

        let bus = transport.bus(&endpoint);
        bus.publish(&rpm(), "800");
        bus.publish(&rpm(), "900");

        for expected in ["800", "900"] {
            let msg = timeout(Duration::from_millis(100), stream.next_message())
                .await
                .expect("buffered message should be delivered")
                .expect("stream ended early");
            assert_eq!(msg.payload, expected);
        }
    }
}
