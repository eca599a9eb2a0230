//! Bus errors

use crate::channel::{ChannelId, PayloadType};
use thiserror::Error;

/// Errors that can occur talking to the data bus
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Not connected to bus")]
    NotConnected,

    #[error("Bus operation timed out")]
    Timeout,

    #[error("Subscription closed")]
    SubscriptionClosed,

    #[error("Publish to {channel} failed: {reason}")]
    PublishFailed { channel: ChannelId, reason: String },

    #[error("Channel {channel} carries {expected} payloads, got {actual}")]
    TypeMismatch {
        channel: ChannelId,
        expected: PayloadType,
        actual: PayloadType,
    },

    #[error("{command} failed: {reason}")]
    CommandFailed { command: &'static str, reason: String },

    #[error("Invalid bus URL '{0}'")]
    InvalidUrl(String),
}
