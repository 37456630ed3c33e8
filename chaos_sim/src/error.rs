//! Error types for the simulation harness.

use chaos_core::SensorError;
use chaos_env::EnvError;
use thiserror::Error;

/// Errors raised while setting up or driving a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Simulated transport failure
    #[error("Transport error: {0}")]
    Env(#[from] EnvError),
    
    /// Sensor runtime failure
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),
    
    /// A published reading could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    
    /// Tick delay control payload was not a millisecond count
    #[error("Invalid tick delay: {0:?}")]
    InvalidTickDelay(String),
    
    /// Virtual clock left the representable date range
    #[error("Virtual clock overflow")]
    ClockOverflow,
    
    /// Async runtime could not be created
    #[error("Runtime error: {0}")]
    Runtime(String),
}
