//! Error types for the chaos sensor runtime.

use chaos_env::EnvError;
use thiserror::Error;

/// Errors surfaced by sensor startup and the serve loop.
///
/// Tick handling itself never fails; these all come from configuration or
/// the transport.
#[derive(Debug, Error)]
pub enum SensorError {
    /// Configuration missing, unreadable or invalid
    #[error("Configuration error: {0}")]
    Config(String),
    
    /// Transport failed (connect, subscribe, serve or stop)
    #[error("Transport error: {0}")]
    Transport(#[from] EnvError),
}

impl SensorError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
