//! Simulated clock source - the testbed's tick generator.
//!
//! Emits ISO-8601 UTC timestamps on the tick topic. Time is virtual: each
//! emitted tick advances the clock by the current interval, no real waiting.
//! The interval can be changed through the tick-delay control topic, whose
//! payload is a millisecond count.

use chaos_core::Tick;
use chaos_env::{Message, MessageHandler, Publisher};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use tracing::{info, warn};

use crate::error::SimError;

/// Virtual time 0 (2024-01-01 00:00:00 UTC).
pub const DEFAULT_EPOCH_SECS: i64 = 1_704_067_200;

/// Control topic for the tick interval.
pub const TICK_DELAY_TOPIC: &str = "tickgen/tick_delay";

/// Deterministic tick source.
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Timestamp of the next tick
    current: DateTime<Utc>,
    
    /// Virtual time between ticks
    interval: TimeDelta,
    
    /// Topic ticks are published on
    tick_topic: String,
    
    /// Ticks emitted so far
    tick_count: u64,
}

impl SimClock {
    /// Creates a clock at the default epoch with a 1s interval.
    pub fn new(tick_topic: impl Into<String>) -> Self {
        Self {
            current: DateTime::from_timestamp(DEFAULT_EPOCH_SECS, 0).unwrap_or_default(),
            interval: TimeDelta::seconds(1),
            tick_topic: tick_topic.into(),
            tick_count: 0,
        }
    }
    
    /// Moves virtual time 0 to `epoch_secs` (Unix seconds).
    pub fn with_epoch(mut self, epoch_secs: i64) -> Result<Self, SimError> {
        self.current = DateTime::from_timestamp(epoch_secs, 0).ok_or(SimError::ClockOverflow)?;
        Ok(self)
    }
    
    /// Sets the interval in milliseconds.
    pub fn with_interval_ms(mut self, ms: u32) -> Self {
        self.set_interval_ms(ms);
        self
    }
    
    /// Sets the interval in milliseconds.
    pub fn set_interval_ms(&mut self, ms: u32) {
        self.interval = TimeDelta::milliseconds(i64::from(ms));
    }
    
    /// Returns the interval in milliseconds.
    pub fn interval_ms(&self) -> i64 {
        self.interval.num_milliseconds()
    }
    
    /// Returns the number of ticks emitted.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
    
    /// Returns the tick topic.
    pub fn tick_topic(&self) -> &str {
        &self.tick_topic
    }
    
    /// Formats the timestamp the next tick will carry.
    ///
    /// Whole seconds print as `2024-01-01T00:00:00Z`; sub-second intervals
    /// add a fractional part.
    pub fn peek_timestamp(&self) -> String {
        self.current.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
    
    /// Produces the next tick and advances virtual time.
    pub fn next_tick(&mut self) -> Result<Tick, SimError> {
        let tick = Tick::new(self.peek_timestamp());
        self.current = self
            .current
            .checked_add_signed(self.interval)
            .ok_or(SimError::ClockOverflow)?;
        self.tick_count += 1;
        Ok(tick)
    }
    
    /// Produces the timestamps of the next `n` ticks.
    pub fn take_timestamps(&mut self, n: usize) -> Result<Vec<String>, SimError> {
        (0..n).map(|_| self.next_tick().map(|t| t.timestamp)).collect()
    }
    
    /// Publishes the next tick through `publisher`.
    pub fn emit(&mut self, publisher: &dyn Publisher) -> Result<Tick, SimError> {
        let tick = self.next_tick()?;
        publisher.publish(&self.tick_topic, tick.timestamp.clone().into_bytes())?;
        Ok(tick)
    }
    
    /// Applies a tick-delay control payload (milliseconds as text).
    ///
    /// An invalid payload leaves the interval unchanged.
    pub fn apply_delay_payload(&mut self, payload: &[u8]) -> Result<u32, SimError> {
        let text = String::from_utf8_lossy(payload);
        let ms: u32 = text
            .trim()
            .parse()
            .map_err(|_| SimError::InvalidTickDelay(text.to_string()))?;
        self.set_interval_ms(ms);
        Ok(ms)
    }
}

impl MessageHandler for SimClock {
    fn on_message(&mut self, message: &Message, _publisher: &dyn Publisher) {
        match self.apply_delay_payload(&message.payload) {
            Ok(ms) => info!("Tick interval set to {}ms", ms),
            Err(e) => warn!("Ignoring tick delay on {}: {}", message.topic, e),
        }
    }
}
