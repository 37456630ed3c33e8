//! Error types for the chaos sensor transport abstraction.

use thiserror::Error;

/// Errors that can occur in the transport abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Could not establish the broker connection (fatal at startup)
    #[error("Connection error: {0}")]
    ConnectionError(String),
    
    /// Publish request rejected (queue full, connection closed, etc.)
    #[error("Publish error: {0}")]
    PublishError(String),
    
    /// Subscribe request rejected by the transport
    #[error("Subscribe error: {0}")]
    SubscribeError(String),
    
    /// Topic or topic filter is malformed
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),
    
    /// The serve loop ended abnormally
    #[error("Transport error: {0}")]
    TransportError(String),
    
    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }
    
    /// Creates a publish error.
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::PublishError(msg.into())
    }
    
    /// Creates an invalid-topic error.
    pub fn invalid_topic(topic: impl std::fmt::Display) -> Self {
        Self::InvalidTopic(topic.to_string())
    }
}
