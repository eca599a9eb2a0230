//! Channel identifiers
//!
//! Every signal on the data bus is addressed by a type-tagged, dotted key such
//! as `#carpi.obd.rpm`. The leading tag declares the payload type carried on
//! that channel for its whole lifetime.

pub mod keys;

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Payload type declared by a channel's type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadType {
    /// `#` - signed integer
    Int,
    /// `%` - floating point
    Float,
    /// `?` - boolean
    Bool,
    /// No tag - raw text
    Untyped,
}

impl PayloadType {
    /// The one-character tag written in front of the key, if any
    pub const fn prefix(self) -> Option<char> {
        match self {
            PayloadType::Int => Some(TYPE_PREFIX_INT),
            PayloadType::Float => Some(TYPE_PREFIX_FLOAT),
            PayloadType::Bool => Some(TYPE_PREFIX_BOOL),
            PayloadType::Untyped => None,
        }
    }

    /// Resolve a type tag character
    pub const fn from_prefix(c: char) -> Option<Self> {
        match c {
            TYPE_PREFIX_INT => Some(PayloadType::Int),
            TYPE_PREFIX_FLOAT => Some(PayloadType::Float),
            TYPE_PREFIX_BOOL => Some(PayloadType::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadType::Int => "int",
            PayloadType::Float => "float",
            PayloadType::Bool => "bool",
            PayloadType::Untyped => "untyped",
        };
        f.write_str(name)
    }
}

/// Type tag for integer channels
pub const TYPE_PREFIX_INT: char = '#';
/// Type tag for float channels
pub const TYPE_PREFIX_FLOAT: char = '%';
/// Type tag for boolean channels
pub const TYPE_PREFIX_BOOL: char = '?';

/// A type-tagged, namespaced channel key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wrap an already tagged key such as `%carpi.gps.speed`
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build a key from its parts: tag, namespace base (with trailing dot) and name
    pub fn build(payload: PayloadType, base: &str, name: &str) -> Self {
        let mut raw = String::with_capacity(base.len() + name.len() + 1);
        if let Some(tag) = payload.prefix() {
            raw.push(tag);
        }
        raw.push_str(base);
        raw.push_str(name);
        Self(raw)
    }

    /// Full key including the type tag
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Payload type declared by the leading tag
    pub fn payload_type(&self) -> PayloadType {
        self.0
            .chars()
            .next()
            .and_then(PayloadType::from_prefix)
            .unwrap_or(PayloadType::Untyped)
    }

    /// Key without its type tag (`carpi.obd.rpm` for `#carpi.obd.rpm`)
    pub fn name(&self) -> &str {
        match self.payload_type() {
            PayloadType::Untyped => &self.0,
            // Every tag is a single ASCII byte
            _ => &self.0[1..],
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ChannelId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ChannelId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_type_from_tag() {
        assert_eq!(ChannelId::new("#carpi.obd.rpm").payload_type(), PayloadType::Int);
        assert_eq!(ChannelId::new("%carpi.gps.speed").payload_type(), PayloadType::Float);
        assert_eq!(ChannelId::new("?carpi.dashboard.fuelfailflag").payload_type(), PayloadType::Bool);
        assert_eq!(ChannelId::new("carpi.gps.fix").payload_type(), PayloadType::Untyped);
    }

    #[test]
    fn test_build_matches_tagged_key() {
        let id = ChannelId::build(PayloadType::Float, "carpi.dashboard.", "fuelusage");
        assert_eq!(id.as_str(), "%carpi.dashboard.fuelusage");
        assert_eq!(id.name(), "carpi.dashboard.fuelusage");

        let untyped = ChannelId::build(PayloadType::Untyped, "carpi.gps.", "fix");
        assert_eq!(untyped.as_str(), "carpi.gps.fix");
        assert_eq!(untyped.name(), "carpi.gps.fix");
    }

    #[test]
    fn test_empty_key_is_untyped() {
        let id = ChannelId::new("");
        assert_eq!(id.payload_type(), PayloadType::Untyped);
        assert_eq!(id.name(), "");
    }
}
