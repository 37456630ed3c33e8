//! Tick and Reading - the sensor's input and output entities.

use serde::{Deserialize, Serialize};
use std::str::Utf8Error;

/// An external time-advancement event.
///
/// The timestamp is opaque: it is never parsed, trimmed or validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tick {
    pub timestamp: String,
}

impl Tick {
    /// Creates a tick carrying `timestamp`.
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
        }
    }
    
    /// Decodes a tick from a raw message payload (UTF-8 text).
    pub fn from_payload(payload: &[u8]) -> Result<Self, Utf8Error> {
        std::str::from_utf8(payload).map(|text| Self::new(text))
    }
}

/// One randomized sensor value paired with the timestamp of its tick.
///
/// Wire form (schema v1) is a JSON object with `payload` and `timestamp`.
/// Unknown fields are ignored on decode so the record can grow additively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Value in `VALUE_MIN..=VALUE_MAX`
    #[serde(rename = "payload")]
    pub value: u8,
    
    /// Copied verbatim from the triggering tick
    pub timestamp: String,
}

impl Reading {
    /// Pairs a value with the tick it answers.
    pub fn new(value: u8, tick: Tick) -> Self {
        Self {
            value,
            timestamp: tick.timestamp,
        }
    }
    
    /// Serializes the reading to its wire form.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
    
    /// Decodes a reading from its wire form.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_tick_from_payload_is_verbatim() {
        let tick = Tick::from_payload(b" 2024-01-01T00:00:00Z\n").unwrap();
        assert_eq!(tick.timestamp, " 2024-01-01T00:00:00Z\n");
        
        let tick = Tick::from_payload(b"17").unwrap();
        assert_eq!(tick.timestamp, "17");
        
        let tick = Tick::from_payload(b"").unwrap();
        assert_eq!(tick.timestamp, "");
    }
    
    #[test]
    fn test_tick_from_invalid_utf8() {
        assert!(Tick::from_payload(&[0x32, 0xff, 0x30]).is_err());
    }
    
    #[test]
    fn test_reading_wire_fields() {
        let reading = Reading::new(57, Tick::new("2024-01-01T00:00:00Z"));
        let payload = reading.to_payload().unwrap();
        
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let object = json.as_object().unwrap();
        
        assert_eq!(object.len(), 2);
        assert_eq!(object["payload"], 57);
        assert_eq!(object["timestamp"], "2024-01-01T00:00:00Z");
    }
    
    #[test]
    fn test_reading_decode_ignores_field_order_and_extras() {
        let payload = br#"{"timestamp":"t-1","schema":2,"payload":100}"#;
        let reading = Reading::from_payload(payload).unwrap();
        
        assert_eq!(reading.value, 100);
        assert_eq!(reading.timestamp, "t-1");
    }
    
    #[test]
    fn test_reading_decode_requires_both_fields() {
        assert!(Reading::from_payload(br#"{"payload":1}"#).is_err());
        assert!(Reading::from_payload(br#"{"timestamp":"t"}"#).is_err());
    }
    
    #[test]
    fn test_timestamp_with_escapes_survives_encoding() {
        let odd = "2024-01-01T00:00:00Z \"quoted\" \\ ünïcode";
        let reading = Reading::new(3, Tick::new(odd));
        let decoded = Reading::from_payload(&reading.to_payload().unwrap()).unwrap();
        
        assert_eq!(decoded.timestamp, odd);
    }
}
