//! Data bus
//!
//! Typed publish/subscribe on top of an injected [`Transport`].
//!
//! - [`BusListener`] decodes inbound payloads and forwards them to a callback
//! - [`BusWriter`] encodes and publishes outbound values
//! - [`RedisTransport`] talks to a Redis server
//! - [`InMemoryTransport`] is the in-process broker used in demo mode and tests

mod error;
pub mod listener;
pub mod memory;
pub mod network;
pub mod transport;
pub mod writer;

pub use error::BusError;
pub use listener::{BusListener, ListenerStats, ValueCallback};
pub use memory::{InMemoryBus, InMemoryTransport};
pub use network::RedisTransport;
pub use transport::{BusConnection, BusEndpoint, MessageStream, RawMessage, Transport};
pub use writer::BusWriter;
