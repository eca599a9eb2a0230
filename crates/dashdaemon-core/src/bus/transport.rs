//! Transport abstraction
//!
//! The daemon never talks to a concrete pub/sub system directly. Everything
//! goes through [`Transport`], which opens [`BusConnection`]s to an
//! [`BusEndpoint`]. Payloads are UTF-8 text; typing lives in the channel tag.

use super::BusError;
use crate::channel::ChannelId;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Default bus host
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default bus port
pub const DEFAULT_PORT: u16 = 6379;
/// Default database index
pub const DEFAULT_DB: u32 = 0;

/// Address of a bus instance
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BusEndpoint {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Database index
    pub db: u32,
    /// `AUTH` password, if the server requires one
    pub password: Option<String>,
}

impl BusEndpoint {
    /// Endpoint at `host:port`, database 0, no password
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            db: DEFAULT_DB,
            password: None,
        }
    }

    /// Set the database index
    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    /// Set the password; empty strings mean no password
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    /// Parse `redis://[[user]:password@]host[:port][/db]`
    pub fn from_url(url: &str) -> Result<Self, BusError> {
        let invalid = || BusError::InvalidUrl(url.to_string());

        let rest = url
            .trim()
            .strip_prefix("redis://")
            .ok_or_else(invalid)?;

        let (auth, location) = match rest.rsplit_once('@') {
            Some((auth, location)) => (Some(auth), location),
            None => (None, rest),
        };
        let password = auth
            .map(|a| a.split_once(':').map(|(_, pw)| pw).unwrap_or(a))
            .filter(|pw| !pw.is_empty())
            .map(str::to_string);

        let (hostport, db) = match location.split_once('/') {
            Some((hp, "")) => (hp, DEFAULT_DB),
            Some((hp, db)) => (hp, db.parse().map_err(|_| invalid())?),
            None => (location, DEFAULT_DB),
        };
        let (host, port) = match hostport.rsplit_once(':') {
            Some((h, p)) => (h, p.parse().map_err(|_| invalid())?),
            None => (hostport, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            db,
            password,
        })
    }

    /// `host:port/db`, used as a broker identity
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.db)
    }
}

impl Default for BusEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for BusEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

// Never print the password
impl fmt::Debug for BusEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A message as delivered by the transport, before decoding
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Channel the message was published on
    pub channel: ChannelId,
    /// Undecoded payload text
    pub payload: String,
}

impl RawMessage {
    /// Message carrying `payload` on `channel`
    pub fn new(channel: ChannelId, payload: impl Into<String>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }
}

/// Factory for bus connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `endpoint`
    async fn connect(&self, endpoint: &BusEndpoint) -> Result<Arc<dyn BusConnection>, BusError>;
}

/// An open connection to one bus instance
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// Start receiving messages published on any of `channels`
    async fn subscribe(&self, channels: &[ChannelId]) -> Result<Box<dyn MessageStream>, BusError>;

    /// Publish a payload, returning the number of receivers
    async fn publish(&self, channel: &ChannelId, payload: String) -> Result<usize, BusError>;

    /// Read a retained key
    async fn get(&self, key: &ChannelId) -> Result<Option<String>, BusError>;

    /// Write a retained key
    async fn set(&self, key: &ChannelId, payload: String) -> Result<(), BusError>;

    /// Release the connection. Open streams end, later calls fail.
    async fn close(&self);
}

/// Inbound messages of one subscription
#[async_trait]
pub trait MessageStream: Send {
    /// Next message, or `None` once the subscription is closed
    async fn next_message(&mut self) -> Option<RawMessage>;
}
