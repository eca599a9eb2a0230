//! Live value store
//!
//! Latest observed value per channel. Writes come from the bus listener's
//! delivery task, reads from the daemon tick; every operation holds the lock
//! for its whole duration so a snapshot never sees a half-applied write.

use crate::channel::ChannelId;
use crate::value::TelemetryValue;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Internally synchronized map of channel -> last value
#[derive(Debug, Default)]
pub struct ValueStore {
    values: RwLock<HashMap<ChannelId, TelemetryValue>>,
}

impl ValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored value for `channel`
    pub fn record(&self, channel: ChannelId, value: TelemetryValue) {
        // `insert` is the only mutation, a poisoned map is still whole
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(channel, value);
    }

    /// Copy of the full current mapping
    pub fn snapshot(&self) -> Snapshot {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            values: values.clone(),
        }
    }

    /// Current value of a single channel
    pub fn get(&self, channel: &ChannelId) -> Option<TelemetryValue> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(channel).cloned()
    }

    /// Number of channels observed so far
    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True until the first value is recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Point-in-time copy of the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    values: HashMap<ChannelId, TelemetryValue>,
}

impl Snapshot {
    /// Value of `channel`, if it was ever observed
    pub fn get(&self, channel: &ChannelId) -> Option<&TelemetryValue> {
        self.values.get(channel)
    }

    /// Numeric value of `channel` (ints widen to f64)
    pub fn number(&self, channel: &ChannelId) -> Option<f64> {
        self.values.get(channel).and_then(TelemetryValue::as_f64)
    }

    /// Whether `channel` was ever observed
    pub fn contains(&self, channel: &ChannelId) -> bool {
        self.values.contains_key(channel)
    }

    /// Numeric values of all `channels`, or the ones that are missing.
    ///
    /// A channel holding a non-numeric value counts as missing.
    pub fn require<const N: usize>(&self, channels: [&ChannelId; N]) -> Availability<N> {
        let mut found = [0.0; N];
        let mut missing = Vec::new();
        for (slot, channel) in found.iter_mut().zip(channels) {
            match self.number(channel) {
                Some(v) => *slot = v,
                None => missing.push(channel.clone()),
            }
        }
        if missing.is_empty() {
            Availability::Complete(found)
        } else {
            Availability::Incomplete(missing)
        }
    }

    /// Number of channels in the snapshot
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing was observed yet
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&ChannelId, &TelemetryValue)> {
        self.values.iter()
    }
}

/// Result of [`Snapshot::require`]
#[derive(Debug, Clone, PartialEq)]
pub enum Availability<const N: usize> {
    /// Every requested channel had a numeric value, in request order
    Complete([f64; N]),
    /// These channels were absent
    Incomplete(Vec<ChannelId>),
}
