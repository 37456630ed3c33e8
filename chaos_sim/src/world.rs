//! SimWorld - a sensor, a clock client and a broker in one process.

use chaos_core::{ChaosSensor, Reading, SensorConfig};
use chaos_env::{BrokerEndpoint, PubSubTransport, Publisher};

use crate::broker::SimBroker;
use crate::clock::SimClock;
use crate::error::SimError;

/// Host name used for simulated endpoints.
pub const SIM_HOST: &str = "simbroker";

/// Client id of the simulated tick generator.
pub const CLOCK_CLIENT_ID: &str = "tickgen";

/// Yields the feeder allows before concluding the sensor never subscribed.
const SUBSCRIBE_WAIT_YIELDS: usize = 10_000;

/// What one sensor run produced.
#[derive(Debug, Clone)]
pub struct WorldRun {
    /// Tick timestamps the clock published, in order
    pub sent: Vec<String>,
    
    /// Readings as published on the data topic, in publish order
    pub readings: Vec<Reading>,
    
    /// Ticks the reactor handled
    pub ticks_handled: u64,
    
    /// Publishes the broker rejected
    pub publish_failures: u64,
}

/// The simulation harness container.
pub struct SimWorld {
    /// Sensor configuration (seed, topics, client id)
    pub config: SensorConfig,
    
    /// The broker every client connects to
    pub broker: SimBroker,
}

impl SimWorld {
    /// Creates a world whose sensor uses `seed` and default topics.
    pub fn new(seed: u64) -> Self {
        Self::with_config(SensorConfig {
            host: SIM_HOST.to_string(),
            seed,
            ..SensorConfig::default()
        })
    }
    
    /// Creates a world around an explicit sensor configuration.
    ///
    /// The tick topic must be a concrete topic so the clock can publish on it.
    pub fn with_config(config: SensorConfig) -> Self {
        Self {
            config,
            broker: SimBroker::new(),
        }
    }
    
    /// Runs the full sensor lifecycle against `timestamps`.
    ///
    /// The sensor is seeded, connects and subscribes; then every timestamp
    /// is published back-to-back before the sensor gets to handle any of
    /// them, and the session is closed so the serve loop drains and stops.
    pub async fn run(&self, timestamps: &[String]) -> Result<WorldRun, SimError> {
        let tick_topic = self.config.tick_topic.clone();
        self.drive(move |publisher| {
            for stamp in timestamps {
                publisher.publish(&tick_topic, stamp.clone().into_bytes())?;
            }
            Ok(timestamps.to_vec())
        })
        .await
    }
    
    /// Runs the sensor lifecycle with `ticks` ticks emitted by `clock`.
    ///
    /// The clock must publish on the sensor's tick topic.
    pub async fn run_clock(&self, clock: &mut SimClock, ticks: usize) -> Result<WorldRun, SimError> {
        if clock.tick_topic() != self.config.tick_topic {
            return Err(SimError::Runtime(format!(
                "clock publishes on {}, sensor listens on {}",
                clock.tick_topic(),
                self.config.tick_topic
            )));
        }
        
        self.drive(move |publisher| {
            (0..ticks)
                .map(|_| clock.emit(publisher).map(|tick| tick.timestamp))
                .collect()
        })
        .await
    }
    
    /// Starts the sensor, calls `feed` once it has subscribed, then closes
    /// its session and collects what it published.
    async fn drive<F>(&self, feed: F) -> Result<WorldRun, SimError>
    where
        F: FnOnce(&dyn Publisher) -> Result<Vec<String>, SimError>,
    {
        let sensor = ChaosSensor::new(self.config.clone())?;
        let earlier = self.broker.published_on(&self.config.data_topic).len();
        
        let clock = self.broker.connect(BrokerEndpoint::new(
            SIM_HOST,
            self.config.port,
            CLOCK_CLIENT_ID,
        ))?;
        let clock_publisher = clock.publisher();
        
        let connect_broker = self.broker.clone();
        let serve = sensor.run(
            move |endpoint| async move { connect_broker.connect(endpoint) },
            std::future::pending::<()>(),
        );
        
        let fed = async {
            let mut yields = 0;
            while self.broker.subscriber_count(&self.config.tick_topic) == 0 {
                if yields == SUBSCRIBE_WAIT_YIELDS {
                    return Err(SimError::Runtime("sensor never subscribed".to_string()));
                }
                yields += 1;
                tokio::task::yield_now().await;
            }
            
            let sent = feed(&clock_publisher)?;
            self.broker.disconnect(&self.config.client_id);
            Ok::<Vec<String>, SimError>(sent)
        };
        
        let (served, sent) = tokio::join!(serve, fed);
        served?;
        let sent = sent?;
        drop(clock);
        
        let readings = self
            .broker
            .published_on(&self.config.data_topic)
            .iter()
            .skip(earlier)
            .map(|m| Reading::from_payload(&m.payload))
            .collect::<Result<Vec<_>, _>>()?;
        
        let reactor = sensor.reactor();
        let reactor = reactor.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        
        Ok(WorldRun {
            sent,
            readings,
            ticks_handled: reactor.ticks_handled(),
            publish_failures: reactor.publish_failures(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_core::SeededGenerator;
    
    fn stamps(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("2024-01-01T00:00:{:02}Z", i)).collect()
    }
    
    #[tokio::test]
    async fn test_world_run_pairs_every_tick() {
        let world = SimWorld::new(42);
        let run = world.run(&stamps(3)).await.unwrap();
        
        assert_eq!(run.ticks_handled, 3);
        assert_eq!(run.publish_failures, 0);
        
        let mut gen = SeededGenerator::new(42);
        for (reading, stamp) in run.readings.iter().zip(stamps(3)) {
            assert_eq!(reading.timestamp, stamp);
            assert_eq!(reading.value, gen.next_value());
        }
        assert!(!world.broker.is_connected(&world.config.client_id));
    }
    
    #[tokio::test]
    async fn test_world_runs_are_independent() {
        let world = SimWorld::new(42);
        let first = world.run(&stamps(4)).await.unwrap();
        let second = world.run(&stamps(4)).await.unwrap();
        
        assert_eq!(second.readings.len(), 4);
        assert_eq!(first.readings, second.readings);
    }
    
    #[tokio::test]
    async fn test_world_run_clock_feeds_emitted_ticks() {
        let world = SimWorld::new(7);
        let mut clock = SimClock::new(world.config.tick_topic.clone()).with_interval_ms(250);
        let run = world.run_clock(&mut clock, 4).await.unwrap();
        
        assert_eq!(
            run.sent,
            vec![
                "2024-01-01T00:00:00Z",
                "2024-01-01T00:00:00.250Z",
                "2024-01-01T00:00:00.500Z",
                "2024-01-01T00:00:00.750Z",
            ]
        );
        assert_eq!(clock.tick_count(), 4);
        assert_eq!(run.ticks_handled, 4);
        
        let stamps: Vec<&str> = run.readings.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(stamps, run.sent);
    }
    
    #[tokio::test]
    async fn test_world_run_clock_rejects_foreign_topic() {
        let world = SimWorld::new(7);
        let mut clock = SimClock::new("othergen/tick");
        
        let result = world.run_clock(&mut clock, 1).await;
        assert!(matches!(result, Err(SimError::Runtime(_))));
        assert_eq!(clock.tick_count(), 0);
    }
    
    #[tokio::test]
    async fn test_sensor_connect_failure_is_fatal() {
        use chaos_core::SensorError;
        use chaos_env::EnvError;
        
        let world = SimWorld::new(42);
        let _squatter = world
            .broker
            .connect(BrokerEndpoint::new(SIM_HOST, 1883, world.config.client_id.clone()))
            .unwrap();
        
        let result = world.run(&stamps(1)).await;
        assert!(matches!(
            result,
            Err(SimError::Sensor(SensorError::Transport(EnvError::ConnectionError(_))))
        ));
    }
}
