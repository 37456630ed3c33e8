//! Chaos Sensor Deterministic Simulation Harness
//!
//! A controlled testbed where the sensor runs its full lifecycle against an
//! in-memory broker and a virtual clock:
//! - **Time**: ticks carry virtual ISO-8601 timestamps, no real waiting
//! - **Transport**: FIFO in-memory broker with publish/connect fault injection
//! - **Randomness**: only the sensor's own seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                       SimWorld                       │
//! │  ┌──────────┐   tickgen/tick   ┌──────────────────┐  │
//! │  │ SimClock │ ───────────────> │                  │  │
//! │  └──────────┘                  │    SimBroker     │  │
//! │  ┌──────────────────────┐      │  (FIFO routing,  │  │
//! │  │ ChaosSensor          │ <─── │   fault windows) │  │
//! │  │  └─ TickReactor      │ ───> │                  │  │
//! │  └──────────────────────┘ data └──────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use chaos_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_ticks(100).run(ScenarioId::RapidFire);
//! assert!(result.passed);
//! ```

mod broker;
mod clock;
mod error;
mod runner;
mod world;
pub mod scenarios;

pub use broker::{SimBroker, SimPublisher, SimTransport};
pub use clock::{SimClock, DEFAULT_EPOCH_SECS, TICK_DELAY_TOPIC};
pub use error::SimError;
pub use runner::{check_one_to_one, check_range, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use world::{SimWorld, WorldRun, CLOCK_CLIENT_ID, SIM_HOST};
