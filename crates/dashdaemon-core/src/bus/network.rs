//! Redis-backed transport
//!
//! Commands share one multiplexed connection per [`BusConnection`]. Every
//! subscription gets its own pub/sub connection, so a slow consumer never
//! blocks publishing.

use super::transport::{BusConnection, BusEndpoint, MessageStream, RawMessage, Transport};
use super::BusError;
use crate::channel::ChannelId;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, Msg, RedisConnectionInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// How long to wait for the server before giving up on a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn connection_info(endpoint: &BusEndpoint) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
        redis: RedisConnectionInfo {
            db: i64::from(endpoint.db),
            password: endpoint.password.clone(),
            ..Default::default()
        },
    }
}

fn connection_failed(endpoint: &BusEndpoint, reason: impl ToString) -> BusError {
    BusError::ConnectionFailed {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    }
}

/// Opens connections to Redis servers
#[derive(Debug, Clone)]
pub struct RedisTransport {
    connect_timeout: Duration,
}

impl RedisTransport {
    /// Transport with the default connect timeout
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for RedisTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn connect(&self, endpoint: &BusEndpoint) -> Result<Arc<dyn BusConnection>, BusError> {
        let client = Client::open(connection_info(endpoint)).map_err(|e| connection_failed(endpoint, e))?;
        let conn = tokio::time::timeout(self.connect_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| connection_failed(endpoint, "connect timed out"))?
            .map_err(|e| connection_failed(endpoint, e))?;

        debug!(endpoint = %endpoint, "Connected to Redis");
        Ok(Arc::new(RedisConnection {
            endpoint: endpoint.clone(),
            client,
            conn,
            connect_timeout: self.connect_timeout,
            closed: AtomicBool::new(false),
            close_tx: watch::channel(false).0,
        }))
    }
}

/// An open connection to one Redis database
pub struct RedisConnection {
    endpoint: BusEndpoint,
    client: Client,
    conn: MultiplexedConnection,
    connect_timeout: Duration,
    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
}

impl RedisConnection {
    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BusError::NotConnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BusConnection for RedisConnection {
    async fn subscribe(&self, channels: &[ChannelId]) -> Result<Box<dyn MessageStream>, BusError> {
        self.ensure_open()?;
        let mut pubsub = tokio::time::timeout(self.connect_timeout, self.client.get_async_pubsub())
            .await
            .map_err(|_| connection_failed(&self.endpoint, "pub/sub connect timed out"))?
            .map_err(|e| connection_failed(&self.endpoint, e))?;

        for channel in channels {
            pubsub.subscribe(channel.as_str()).await.map_err(|e| BusError::CommandFailed {
                command: "SUBSCRIBE",
                reason: e.to_string(),
            })?;
        }
        debug!(endpoint = %self.endpoint, channels = channels.len(), "Subscribed");

        Ok(Box::new(RedisSubscription {
            messages: pubsub.into_on_message().boxed(),
            closed: Some(self.close_tx.subscribe()),
        }))
    }

    async fn publish(&self, channel: &ChannelId, payload: String) -> Result<usize, BusError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(channel.as_str(), payload)
            .await
            .map_err(|e| BusError::PublishFailed {
                channel: channel.clone(),
                reason: e.to_string(),
            })?;
        Ok(usize::try_from(receivers).unwrap_or(0))
    }

    async fn get(&self, key: &ChannelId) -> Result<Option<String>, BusError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        conn.get(key.as_str()).await.map_err(|e| BusError::CommandFailed {
            command: "GET",
            reason: e.to_string(),
        })
    }

    async fn set(&self, key: &ChannelId, payload: String) -> Result<(), BusError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        conn.set(key.as_str(), payload).await.map_err(|e| BusError::CommandFailed {
            command: "SET",
            reason: e.to_string(),
        })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_tx.send_replace(true);
            debug!(endpoint = %self.endpoint, "Redis connection closed");
        }
    }
}

enum Wake {
    Received(Option<Msg>),
    Closed,
    HandleDropped,
}

/// Messages from a dedicated pub/sub connection
pub struct RedisSubscription {
    messages: BoxStream<'static, Msg>,
    closed: Option<watch::Receiver<bool>>,
}

#[async_trait]
impl MessageStream for RedisSubscription {
    async fn next_message(&mut self) -> Option<RawMessage> {
        loop {
            let wake = match &mut self.closed {
                Some(closed) if *closed.borrow() => Wake::Closed,
                Some(closed) => tokio::select! {
                    biased;
                    msg = self.messages.next() => Wake::Received(msg),
                    changed = closed.changed() => match changed {
                        Ok(()) => continue,
                        Err(_) => Wake::HandleDropped,
                    },
                },
                None => Wake::Received(self.messages.next().await),
            };
            let msg = match wake {
                Wake::Closed => return None,
                Wake::HandleDropped => {
                    self.closed = None;
                    continue;
                }
                // Server went away
                Wake::Received(None) => return None,
                Wake::Received(Some(msg)) => msg,
            };
            match msg.get_payload::<String>() {
                Ok(payload) => return Some(RawMessage::new(ChannelId::new(msg.get_channel_name()), payload)),
                Err(e) => {
                    warn!(channel = msg.get_channel_name(), error = %e, "Dropping non-text payload");
                    continue;
                }
            }
        }
    }
}
