//! TickReactor - turns every tick into exactly one published reading.
//!
//! # Contract
//!
//! For each inbound tick, in arrival order:
//! 1. draw one value from the owned [`SeededGenerator`]
//! 2. pair it with the tick's timestamp (verbatim)
//! 3. publish the reading on the data topic, synchronously, before returning
//!
//! There is no batching, filtering or retrying. A failed publish is logged
//! and counted; it still consumed its draw, so the value sequence of later
//! ticks is unaffected.
//!
//! # State
//!
//! A reactor only exists once its generator is seeded, so a tick can never
//! be handled in an unseeded state.

use chaos_env::{Message, MessageHandler, Publisher};
use tracing::{debug, error, warn};

use crate::generator::SeededGenerator;
use crate::reading::{Reading, Tick};

/// The sensor's tick handler.
#[derive(Debug)]
pub struct TickReactor {
    /// Owned value source (one draw per tick)
    generator: SeededGenerator,
    
    /// Topic every reading is published on
    data_topic: String,
    
    /// Ticks handled since construction
    ticks_handled: u64,
    
    /// Publish calls the transport rejected
    publish_failures: u64,
}

impl TickReactor {
    /// Creates a reactor around an already-seeded generator.
    pub fn new(generator: SeededGenerator, data_topic: impl Into<String>) -> Self {
        Self {
            generator,
            data_topic: data_topic.into(),
            ticks_handled: 0,
            publish_failures: 0,
        }
    }
    
    /// Creates a reactor with a fresh generator seeded with `seed`.
    pub fn with_seed(seed: u64, data_topic: impl Into<String>) -> Self {
        Self::new(SeededGenerator::new(seed), data_topic)
    }
    
    /// Handles one tick: draw, pair, publish.
    pub fn on_tick(&mut self, tick: Tick, publisher: &dyn Publisher) -> Reading {
        let reading = Reading::new(self.generator.next_value(), tick);
        self.ticks_handled += 1;
        
        match reading.to_payload() {
            Ok(payload) => {
                if let Err(e) = publisher.publish(&self.data_topic, payload) {
                    self.publish_failures += 1;
                    warn!("Publish of reading for {:?} failed: {}", reading.timestamp, e);
                } else {
                    debug!(value = reading.value, timestamp = %reading.timestamp, "reading published");
                }
            }
            Err(e) => {
                self.publish_failures += 1;
                error!("Could not encode reading for {:?}: {}", reading.timestamp, e);
            }
        }
        
        reading
    }
    
    /// Returns the generator seed.
    pub fn seed(&self) -> u64 {
        self.generator.seed()
    }
    
    /// Returns the number of ticks handled.
    pub fn ticks_handled(&self) -> u64 {
        self.ticks_handled
    }
    
    /// Returns the number of rejected publish calls.
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures
    }
    
    /// Returns the number of generator draws (always equals `ticks_handled`).
    pub fn draws(&self) -> u64 {
        self.generator.draws()
    }
}

impl MessageHandler for TickReactor {
    fn on_message(&mut self, message: &Message, publisher: &dyn Publisher) {
        match Tick::from_payload(&message.payload) {
            Ok(tick) => {
                self.on_tick(tick, publisher);
            }
            Err(e) => {
                warn!("Dropping tick on {} with non-UTF-8 payload: {}", message.topic, e);
            }
        }
    }
}
