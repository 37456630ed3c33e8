//! Common types for the chaos sensor transport abstraction.

use serde::{Deserialize, Serialize};

/// Where and as whom a transport connects.
///
/// These are launch-time constants for a sensor, never negotiated at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerEndpoint {
    /// Broker host name or address
    pub host: String,
    
    /// Broker TCP port
    pub port: u16,
    
    /// Client identifier presented to the broker
    pub client_id: String,
}

impl BrokerEndpoint {
    /// Creates a new endpoint.
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
        }
    }
}

impl std::fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.client_id, self.host, self.port)
    }
}

/// A message delivered to a subscriber.
///
/// The payload is opaque bytes; handlers decide how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Concrete topic the message was published on
    pub topic: String,
    
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl Message {
    /// Creates a new message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
    
    /// Returns the payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
    
    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
