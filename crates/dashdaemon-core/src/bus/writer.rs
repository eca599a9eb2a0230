//! Typed bus writer

use super::transport::{BusConnection, BusEndpoint, Transport};
use super::BusError;
use crate::channel::ChannelId;
use crate::value::TelemetryValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, trace};

/// Default upper bound for a single publish
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(100);

/// Publishes values, encoded according to each channel's type tag
pub struct BusWriter {
    connection: Arc<dyn BusConnection>,
    endpoint: BusEndpoint,
    timeout: Duration,
}

impl BusWriter {
    /// Connect to `endpoint`
    pub async fn connect(transport: &dyn Transport, endpoint: BusEndpoint) -> Result<Self, BusError> {
        info!(endpoint = %endpoint, "Connecting to data target");
        let connection = transport.connect(&endpoint).await?;
        Ok(Self::from_connection(connection, endpoint))
    }

    /// Wrap an already open connection
    pub fn from_connection(connection: Arc<dyn BusConnection>, endpoint: BusEndpoint) -> Self {
        Self {
            connection,
            endpoint,
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Set the per-publish timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Encode `value` for `channel` and emit it. No delivery acknowledgment.
    pub async fn publish(&self, channel: &ChannelId, value: impl Into<TelemetryValue>) -> Result<(), BusError> {
        let value = value.into();
        let expected = channel.payload_type();
        let encoded = value
            .coerce(expected)
            .ok_or_else(|| BusError::TypeMismatch {
                channel: channel.clone(),
                expected,
                actual: value.payload_type(),
            })?
            .encode();

        let receivers = tokio::time::timeout(self.timeout, self.connection.publish(channel, encoded))
            .await
            .map_err(|_| BusError::Timeout)??;
        trace!(channel = %channel, value = %value, receivers, "Published");
        Ok(())
    }

    /// Endpoint this writer publishes to
    pub fn endpoint(&self) -> &BusEndpoint {
        &self.endpoint
    }

    /// Release the connection
    pub async fn close(&self) {
        self.connection.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::transport::{MessageStream, RawMessage};
    use crate::bus::InMemoryTransport;
    use async_trait::async_trait;

    #[tokio::test]
    async fn test_publish_encodes_per_tag() {
        let transport = InMemoryTransport::new();
        let endpoint = BusEndpoint::default();
        let conn = transport.connect(&endpoint).await.unwrap();
        let fuel = ChannelId::new("%carpi.dashboard.fuelusage");
        let flag = ChannelId::new("?carpi.dashboard.fuelfailflag");
        let mut stream = conn.subscribe(&[fuel.clone(), flag.clone()]).await.unwrap();

        let writer = BusWriter::connect(&transport, endpoint).await.unwrap();
        // Integer widened to float for a float channel
        writer.publish(&fuel, 6i64).await.unwrap();
        writer.publish(&flag, true).await.unwrap();

        assert_eq!(stream.next_message().await, Some(RawMessage::new(fuel, "6")));
        assert_eq!(stream.next_message().await, Some(RawMessage::new(flag, "1")));
    }

    #[tokio::test]
    async fn test_type_mismatch_rejected() {
        let transport = InMemoryTransport::new();
        let writer = BusWriter::connect(&transport, BusEndpoint::default()).await.unwrap();
        let speed = ChannelId::new("#carpi.dashboard.speed");

        let err = writer.publish(&speed, 12.5).await.unwrap_err();
        assert!(matches!(err, BusError::TypeMismatch { .. }));
    }

    struct StalledConnection;

    #[async_trait]
    impl BusConnection for StalledConnection {
        async fn subscribe(&self, _: &[ChannelId]) -> Result<Box<dyn MessageStream>, BusError> {
            Err(BusError::NotConnected)
        }
        async fn publish(&self, _: &ChannelId, _: String) -> Result<usize, BusError> {
            std::future::pending().await
        }
        async fn get(&self, _: &ChannelId) -> Result<Option<String>, BusError> {
            Ok(None)
        }
        async fn set(&self, _: &ChannelId, _: String) -> Result<(), BusError> {
            Ok(())
        }
        async fn close(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_publish_times_out() {
        let writer = BusWriter::from_connection(Arc::new(StalledConnection), BusEndpoint::default())
            .with_timeout(Duration::from_millis(50));
        let err = writer
            .publish(&ChannelId::new("#carpi.dashboard.speed"), 0i64)
            .await
            .unwrap_err();
        assert_eq!(err, BusError::Timeout);
    }
}
