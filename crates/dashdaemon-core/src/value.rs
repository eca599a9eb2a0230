//! Telemetry values
//!
//! Typed scalars carried on the bus, and their text wire encoding.

use crate::channel::PayloadType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed value observed on (or published to) a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryValue {
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Boolean flag
    Bool(bool),
    /// Raw text from an untyped channel
    Text(String),
}

impl TelemetryValue {
    /// Numeric view of int and float values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Int(v) => Some(*v as f64),
            TelemetryValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as integer, returning None if not an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TelemetryValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as bool, returning None if not a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TelemetryValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Payload type this value naturally encodes as
    pub fn payload_type(&self) -> PayloadType {
        match self {
            TelemetryValue::Int(_) => PayloadType::Int,
            TelemetryValue::Float(_) => PayloadType::Float,
            TelemetryValue::Bool(_) => PayloadType::Bool,
            TelemetryValue::Text(_) => PayloadType::Untyped,
        }
    }

    /// Decode a raw payload according to the channel's payload type
    pub fn decode(payload_type: PayloadType, raw: &str) -> Result<Self, DecodeError> {
        let trimmed = raw.trim();
        let err = || DecodeError {
            payload_type,
            raw: raw.to_string(),
        };

        match payload_type {
            PayloadType::Int => {
                if let Ok(v) = trimmed.parse::<i64>() {
                    return Ok(TelemetryValue::Int(v));
                }
                // Some producers write integral readings as "42.0"
                let f = trimmed.parse::<f64>().map_err(|_| err())?;
                // `i64::MAX as f64` rounds up to 2^63, hence the open upper bound
                if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&f) {
                    Ok(TelemetryValue::Int(f as i64))
                } else {
                    Err(err())
                }
            }
            PayloadType::Float => trimmed
                .parse::<f64>()
                .map(TelemetryValue::Float)
                .map_err(|_| err()),
            PayloadType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(TelemetryValue::Bool(true)),
                "0" | "false" | "no" | "off" => Ok(TelemetryValue::Bool(false)),
                _ => Err(err()),
            },
            PayloadType::Untyped => Ok(TelemetryValue::Text(raw.to_string())),
        }
    }

    /// Convert to the representation a channel of `payload_type` carries.
    ///
    /// Lossless widenings (int to float, anything to text) are allowed,
    /// everything else returns `None`.
    pub fn coerce(&self, payload_type: PayloadType) -> Option<TelemetryValue> {
        match (payload_type, self) {
            (PayloadType::Int, TelemetryValue::Int(_))
            | (PayloadType::Float, TelemetryValue::Float(_))
            | (PayloadType::Bool, TelemetryValue::Bool(_))
            | (PayloadType::Untyped, TelemetryValue::Text(_)) => Some(self.clone()),
            (PayloadType::Float, TelemetryValue::Int(v)) => Some(TelemetryValue::Float(*v as f64)),
            (PayloadType::Untyped, other) => Some(TelemetryValue::Text(other.encode())),
            _ => None,
        }
    }

    /// Wire encoding
    pub fn encode(&self) -> String {
        match self {
            TelemetryValue::Int(v) => v.to_string(),
            TelemetryValue::Float(v) => v.to_string(),
            TelemetryValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            TelemetryValue::Text(v) => v.clone(),
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryValue::Bool(v) => write!(f, "{}", v),
            other => f.write_str(&other.encode()),
        }
    }
}

impl From<i64> for TelemetryValue {
    fn from(v: i64) -> Self {
        TelemetryValue::Int(v)
    }
}

impl From<f64> for TelemetryValue {
    fn from(v: f64) -> Self {
        TelemetryValue::Float(v)
    }
}

impl From<bool> for TelemetryValue {
    fn from(v: bool) -> Self {
        TelemetryValue::Bool(v)
    }
}

/// A payload that does not parse as its channel's declared type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot decode '{raw}' as {payload_type}")]
pub struct DecodeError {
    /// Type the channel declares
    pub payload_type: PayloadType,
    /// Offending payload
    pub raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_int() {
        assert_eq!(
            TelemetryValue::decode(PayloadType::Int, "2000"),
            Ok(TelemetryValue::Int(2000))
        );
        assert_eq!(
            TelemetryValue::decode(PayloadType::Int, " 60.0 "),
            Ok(TelemetryValue::Int(60))
        );
        assert!(TelemetryValue::decode(PayloadType::Int, "60.5").is_err());
        assert!(TelemetryValue::decode(PayloadType::Int, "fast").is_err());
    }

    #[test]
    fn test_decode_int_out_of_range() {
        for raw in ["1e30", "-1e30", "9223372036854775808.0", "inf", "NaN"] {
            let err = TelemetryValue::decode(PayloadType::Int, raw).unwrap_err();
            assert_eq!(err.raw, raw);
        }
        assert_eq!(
            TelemetryValue::decode(PayloadType::Int, "-9223372036854775808.0"),
            Ok(TelemetryValue::Int(i64::MIN))
        );
        assert_eq!(
            TelemetryValue::decode(PayloadType::Int, "1e3"),
            Ok(TelemetryValue::Int(1000))
        );
    }

    #[test]
    fn test_decode_bool() {
        assert_eq!(
            TelemetryValue::decode(PayloadType::Bool, "True"),
            Ok(TelemetryValue::Bool(true))
        );
        assert_eq!(
            TelemetryValue::decode(PayloadType::Bool, "0"),
            Ok(TelemetryValue::Bool(false))
        );
        assert!(TelemetryValue::decode(PayloadType::Bool, "maybe").is_err());
    }

    #[test]
    fn test_untyped_keeps_raw_text() {
        assert_eq!(
            TelemetryValue::decode(PayloadType::Untyped, " 3D fix "),
            Ok(TelemetryValue::Text(" 3D fix ".to_string()))
        );
    }

    #[test]
    fn test_coerce() {
        let v = TelemetryValue::Int(40);
        assert_eq!(v.coerce(PayloadType::Float), Some(TelemetryValue::Float(40.0)));
        assert_eq!(v.coerce(PayloadType::Untyped), Some(TelemetryValue::Text("40".into())));
        assert_eq!(v.coerce(PayloadType::Bool), None);
        assert_eq!(TelemetryValue::Float(1.5).coerce(PayloadType::Int), None);
    }

    #[test]
    fn test_numeric_view() {
        assert_eq!(TelemetryValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(TelemetryValue::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(TelemetryValue::Bool(true).as_f64(), None);
        assert_eq!(TelemetryValue::Bool(true).encode(), "1");
    }
}
