//! Chaos Sensor Core - Deterministic Tick-to-Reading Reactor
//!
//! A synthetic sensor for simulated-environment testbeds: every clock tick
//! produces exactly one randomized reading, tagged with the tick's timestamp.
//!
//! 1. **Reproducibility**: one seeded ChaCha8 generator, one draw per tick,
//!    in arrival order, so a seed and a tick sequence fix the whole output.
//! 2. **Fidelity**: timestamps are copied verbatim, never parsed.
//! 3. **One-to-one**: no batching, filtering or dropping between tick and
//!    publish.

pub mod config;
pub mod error;
pub mod generator;
pub mod reactor;
pub mod reading;
pub mod runtime;

// Re-export key types for convenience
pub use config::{SensorConfig, DEFAULT_DATA_TOPIC, DEFAULT_TICK_TOPIC};
pub use error::SensorError;
pub use generator::{SeededGenerator, DEFAULT_SEED, VALUE_MAX, VALUE_MIN};
pub use reactor::TickReactor;
pub use reading::{Reading, Tick};
pub use runtime::ChaosSensor;
