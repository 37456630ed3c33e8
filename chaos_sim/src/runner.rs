//! Scenario runner - executes property scenarios against a SimWorld.

use crate::broker::SimBroker;
use crate::clock::{SimClock, TICK_DELAY_TOPIC};
use crate::error::SimError;
use crate::scenarios::ScenarioId;
use crate::world::{SimWorld, CLOCK_CLIENT_ID, SIM_HOST};

use chaos_core::{Reading, SeededGenerator, TickReactor, DEFAULT_DATA_TOPIC, DEFAULT_TICK_TOPIC, VALUE_MAX};
use chaos_env::{BrokerEndpoint, Message, MessageHandler, PubSubTransport};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Minimum burst size for the rapid-fire scenario.
const RAPID_FIRE_TICKS: usize = 1000;

/// Threads used by the concurrent-delivery scenario.
const DELIVERY_THREADS: usize = 4;

/// Timestamps no clock would produce, which must still pass through untouched.
const ODD_TIMESTAMPS: [&str; 6] = [
    "",
    "  padded  ",
    "not-a-date",
    "2024-13-45T99:99:99Z",
    "ünïcödé ⏱ \"quoted\"",
    "1704067200",
];

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,
    
    /// Seed used
    pub seed: u64,
    
    /// Whether the property held
    pub passed: bool,
    
    /// Ticks delivered to the sensor(s)
    pub total_ticks: u64,
    
    /// Readings observed on the data topic
    pub total_readings: usize,
    
    /// Failure message if any
    pub failure_reason: Option<String>,
}

/// What a scenario observed before judging it.
struct Outcome {
    ticks: u64,
    readings: usize,
    violation: Option<String>,
}

/// Runs property scenarios.
pub struct ScenarioRunner {
    /// Sensor seed
    seed: u64,
    
    /// Ticks per scenario
    ticks: usize,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self { seed, ticks: 100 }
    }
    
    /// Sets the number of ticks per scenario.
    pub fn with_ticks(mut self, ticks: usize) -> Self {
        self.ticks = ticks;
        self
    }
    
    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());
        
        let outcome = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| SimError::Runtime(e.to_string()))
            .and_then(|runtime| runtime.block_on(self.dispatch(scenario)));
        
        match outcome {
            Ok(outcome) => ScenarioResult {
                scenario,
                seed: self.seed,
                passed: outcome.violation.is_none(),
                total_ticks: outcome.ticks,
                total_readings: outcome.readings,
                failure_reason: outcome.violation,
            },
            Err(e) => ScenarioResult {
                scenario,
                seed: self.seed,
                passed: false,
                total_ticks: 0,
                total_readings: 0,
                failure_reason: Some(format!("harness error: {}", e)),
            },
        }
    }
    
    async fn dispatch(&self, scenario: ScenarioId) -> Result<Outcome, SimError> {
        match scenario {
            ScenarioId::Determinism => self.run_determinism().await,
            ScenarioId::Range => self.run_range().await,
            ScenarioId::Fidelity => self.run_fidelity().await,
            ScenarioId::OneToOne => self.run_one_to_one().await,
            ScenarioId::RapidFire => self.run_rapid_fire().await,
            ScenarioId::ConcurrentDelivery => self.run_concurrent_delivery(),
            ScenarioId::PublishFailure => self.run_publish_failure().await,
            ScenarioId::TickDelay => self.run_tick_delay().await,
        }
    }
    
    fn clock_timestamps(&self, n: usize) -> Result<Vec<String>, SimError> {
        SimClock::new(DEFAULT_TICK_TOPIC).take_timestamps(n)
    }
    
    async fn run_determinism(&self) -> Result<Outcome, SimError> {
        let stamps = self.clock_timestamps(self.ticks)?;
        let first = SimWorld::new(self.seed).run(&stamps).await?;
        let second = SimWorld::new(self.seed).run(&stamps).await?;
        
        let violation = first
            .readings
            .iter()
            .zip(second.readings.iter())
            .position(|(a, b)| a != b)
            .map(|i| format!("runs diverge at tick {}: {:?} vs {:?}", i, first.readings[i], second.readings[i]))
            .or_else(|| {
                (first.readings.len() != second.readings.len()).then(|| {
                    format!("run lengths differ: {} vs {}", first.readings.len(), second.readings.len())
                })
            })
            .or_else(|| check_one_to_one(&stamps, &first.readings));
        
        Ok(Outcome {
            ticks: 2 * stamps.len() as u64,
            readings: first.readings.len() + second.readings.len(),
            violation,
        })
    }
    
    async fn run_range(&self) -> Result<Outcome, SimError> {
        let mut clock = SimClock::new(DEFAULT_TICK_TOPIC);
        let run = SimWorld::new(self.seed).run_clock(&mut clock, self.ticks).await?;
        
        Ok(Outcome {
            ticks: run.sent.len() as u64,
            readings: run.readings.len(),
            violation: check_range(&run.readings),
        })
    }
    
    async fn run_fidelity(&self) -> Result<Outcome, SimError> {
        let mut stamps = Vec::new();
        for (i, stamp) in self.clock_timestamps(self.ticks)?.into_iter().enumerate() {
            stamps.push(stamp);
            stamps.push(ODD_TIMESTAMPS[i % ODD_TIMESTAMPS.len()].to_string());
        }
        
        let run = SimWorld::new(self.seed).run(&stamps).await?;
        
        Ok(Outcome {
            ticks: stamps.len() as u64,
            readings: run.readings.len(),
            violation: check_one_to_one(&stamps, &run.readings),
        })
    }
    
    async fn run_one_to_one(&self) -> Result<Outcome, SimError> {
        let mut clock = SimClock::new(DEFAULT_TICK_TOPIC);
        let run = SimWorld::new(self.seed).run_clock(&mut clock, self.ticks).await?;
        
        let violation = check_one_to_one(&run.sent, &run.readings).or_else(|| {
            (run.ticks_handled != run.sent.len() as u64)
                .then(|| format!("reactor handled {} of {} ticks", run.ticks_handled, run.sent.len()))
        });
        
        Ok(Outcome {
            ticks: run.sent.len() as u64,
            readings: run.readings.len(),
            violation,
        })
    }
    
    async fn run_rapid_fire(&self) -> Result<Outcome, SimError> {
        let n = self.ticks.max(RAPID_FIRE_TICKS);
        let stamps: Vec<String> = (0..n).map(|i| format!("burst-{:06}", i)).collect();
        let run = SimWorld::new(self.seed).run(&stamps).await?;
        
        Ok(Outcome {
            ticks: n as u64,
            readings: run.readings.len(),
            violation: check_one_to_one(&stamps, &run.readings),
        })
    }
    
    fn run_concurrent_delivery(&self) -> Result<Outcome, SimError> {
        let broker = SimBroker::new();
        let transport = broker.connect(BrokerEndpoint::new(SIM_HOST, 1883, "chaossensor_1"))?;
        let publisher = transport.publisher();
        let reactor = Arc::new(Mutex::new(TickReactor::with_seed(self.seed, DEFAULT_DATA_TOPIC)));
        
        let stamps = self.clock_timestamps(self.ticks)?;
        let chunk = stamps.len().div_ceil(DELIVERY_THREADS).max(1);
        
        std::thread::scope(|scope| {
            for part in stamps.chunks(chunk) {
                let mut handler = Arc::clone(&reactor);
                let publisher = publisher.clone();
                scope.spawn(move || {
                    for stamp in part {
                        let message = Message::new(DEFAULT_TICK_TOPIC, stamp.clone());
                        handler.on_message(&message, &publisher);
                    }
                });
            }
        });
        
        let readings = broker
            .published_on(DEFAULT_DATA_TOPIC)
            .iter()
            .map(|m| Reading::from_payload(&m.payload))
            .collect::<Result<Vec<_>, _>>()?;
        
        // Draws happen under the lock, so publish order is draw order.
        let mut generator = SeededGenerator::new(self.seed);
        let expected: Vec<u8> = (0..stamps.len()).map(|_| generator.next_value()).collect();
        let values: Vec<u8> = readings.iter().map(|r| r.value).collect();
        
        let mut seen: Vec<&str> = readings.iter().map(|r| r.timestamp.as_str()).collect();
        let mut sent: Vec<&str> = stamps.iter().map(String::as_str).collect();
        seen.sort_unstable();
        sent.sort_unstable();
        
        let violation = if values != expected {
            Some("value sequence differs from one draw per tick".to_string())
        } else if seen != sent {
            Some(format!("{} ticks sent, {} distinct readings seen", sent.len(), seen.len()))
        } else {
            None
        };
        
        Ok(Outcome {
            ticks: stamps.len() as u64,
            readings: readings.len(),
            violation,
        })
    }
    
    async fn run_publish_failure(&self) -> Result<Outcome, SimError> {
        let stamps = self.clock_timestamps(self.ticks)?;
        let baseline = SimWorld::new(self.seed).run(&stamps).await?;
        
        let skip = stamps.len() / 3;
        let rejected = stamps.len() / 3;
        let world = SimWorld::new(self.seed);
        world.broker.reject_window(&world.config.data_topic, skip, rejected);
        let run = world.run(&stamps).await?;
        
        let expected: Vec<Reading> = baseline
            .readings
            .iter()
            .enumerate()
            .filter(|(i, _)| *i < skip || *i >= skip + rejected)
            .map(|(_, r)| r.clone())
            .collect();
        
        let violation = if run.publish_failures != rejected as u64 {
            Some(format!("{} publish failures, expected {}", run.publish_failures, rejected))
        } else if run.ticks_handled != stamps.len() as u64 {
            Some(format!("reactor handled {} of {} ticks", run.ticks_handled, stamps.len()))
        } else if run.readings != expected {
            Some("surviving readings differ from a clean run".to_string())
        } else {
            None
        };
        
        Ok(Outcome {
            ticks: stamps.len() as u64,
            readings: run.readings.len(),
            violation,
        })
    }
    
    async fn run_tick_delay(&self) -> Result<Outcome, SimError> {
        let broker = SimBroker::new();
        let clock = Arc::new(Mutex::new(SimClock::new(DEFAULT_TICK_TOPIC)));
        
        let mut clock_transport = broker.connect(BrokerEndpoint::new(SIM_HOST, 1883, CLOCK_CLIENT_ID))?;
        clock_transport
            .subscribe_with_handler(TICK_DELAY_TOPIC, Box::new(Arc::clone(&clock)))
            .await?;
        
        let control = broker.connect(BrokerEndpoint::new(SIM_HOST, 1883, "testbed_control"))?;
        control.publish(TICK_DELAY_TOPIC, b"500".to_vec())?;
        control.publish(TICK_DELAY_TOPIC, b"later".to_vec())?;
        clock_transport.run_until_idle();
        
        let (interval_ms, stamps) = {
            let mut clock = clock.lock().unwrap_or_else(PoisonError::into_inner);
            (clock.interval_ms(), clock.take_timestamps(self.ticks.max(2))?)
        };
        
        let run = SimWorld::new(self.seed).run(&stamps).await?;
        
        let violation = if interval_ms != 500 {
            Some(format!("interval is {}ms, expected 500ms", interval_ms))
        } else if stamps[1] != "2024-01-01T00:00:00.500Z" {
            Some(format!("second tick at {}, expected half a second in", stamps[1]))
        } else {
            check_one_to_one(&stamps, &run.readings)
        };
        
        Ok(Outcome {
            ticks: stamps.len() as u64,
            readings: run.readings.len(),
            violation,
        })
    }
}

/// Checks that `readings` answer `stamps` one-to-one, in order, in range.
pub fn check_one_to_one(stamps: &[String], readings: &[Reading]) -> Option<String> {
    if let Some(i) = stamps
        .iter()
        .zip(readings.iter())
        .position(|(stamp, reading)| *stamp != reading.timestamp)
    {
        return Some(format!(
            "reading {} has timestamp {:?}, tick had {:?}",
            i, readings[i].timestamp, stamps[i]
        ));
    }
    if stamps.len() != readings.len() {
        return Some(format!("{} ticks produced {} readings", stamps.len(), readings.len()));
    }
    check_range(readings)
}

/// Checks that every reading's value is within range.
pub fn check_range(readings: &[Reading]) -> Option<String> {
    readings
        .iter()
        .find(|r| r.value > VALUE_MAX)
        .map(|r| format!("value {} out of range at {:?}", r.value, r.timestamp))
}
