//! Sensor Runtime - wires the TickReactor to a transport.
//!
//! # Startup order
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌───────┐   ┌──────┐
//! │ seed gen │──>│ connect │──>│ subscribe │──>│ serve │──>│ stop │
//! └──────────┘   └─────────┘   └───────────┘   └───────┘   └──────┘
//!   ChaosSensor::new    run()        serve()       until end/shutdown
//! ```
//!
//! Seeding happens when the `ChaosSensor` is built, so no transport can
//! deliver a tick to an unseeded generator. Once connected, the transport is
//! stopped on every exit path.

use chaos_env::{BrokerEndpoint, EnvError, PubSubTransport};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info};

use crate::config::SensorConfig;
use crate::error::SensorError;
use crate::reactor::TickReactor;

/// A seeded sensor, ready to be attached to a transport.
pub struct ChaosSensor {
    /// Configuration
    config: SensorConfig,
    
    /// The reactor, shared with the transport's serve loop
    reactor: Arc<Mutex<TickReactor>>,
}

impl ChaosSensor {
    /// Validates `config` and seeds the generator.
    pub fn new(config: SensorConfig) -> Result<Self, SensorError> {
        config.validate()?;
        
        let reactor = TickReactor::with_seed(config.seed, config.data_topic.clone());
        info!("Generator seeded with {}", config.seed);
        
        Ok(Self {
            config,
            reactor: Arc::new(Mutex::new(reactor)),
        })
    }
    
    /// Returns a handle to the reactor (for inspection).
    pub fn reactor(&self) -> Arc<Mutex<TickReactor>> {
        Arc::clone(&self.reactor)
    }
    
    /// Returns the number of ticks handled so far.
    pub fn ticks_handled(&self) -> u64 {
        self.lock_reactor().ticks_handled()
    }
    
    fn lock_reactor(&self) -> std::sync::MutexGuard<'_, TickReactor> {
        self.reactor.lock().unwrap_or_else(PoisonError::into_inner)
    }
    
    /// Connects with `connect`, then serves until the transport ends or
    /// `shutdown` resolves.
    ///
    /// A connection failure is returned as-is; there is nothing to release.
    pub async fn run<T, C, Fut, S>(&self, connect: C, shutdown: S) -> Result<(), SensorError>
    where
        T: PubSubTransport,
        C: FnOnce(BrokerEndpoint) -> Fut,
        Fut: Future<Output = Result<T, EnvError>>,
        S: Future<Output = ()>,
    {
        let endpoint = self.config.endpoint();
        info!("Connecting to {}", endpoint);
        let transport = connect(endpoint).await?;
        self.serve(transport, shutdown).await
    }
    
    /// Subscribes the reactor on the tick topic and serves `transport`.
    ///
    /// The transport is always stopped before this returns. A serve or
    /// subscribe error takes precedence over a stop error.
    pub async fn serve<T, S>(&self, mut transport: T, shutdown: S) -> Result<(), SensorError>
    where
        T: PubSubTransport,
        S: Future<Output = ()>,
    {
        let tick_topic = self.config.tick_topic.clone();
        
        let outcome = match transport
            .subscribe_with_handler(&tick_topic, Box::new(self.reactor()))
            .await
        {
            Ok(()) => {
                info!(
                    "Serving ticks from {} -> readings on {}",
                    tick_topic, self.config.data_topic
                );
                tokio::select! {
                    result = transport.serve_forever() => result,
                    _ = shutdown => {
                        info!("Shutdown requested");
                        Ok(())
                    }
                }
            }
            Err(e) => Err(e),
        };
        
        let stopped = transport.stop().await;
        
        {
            let reactor = self.lock_reactor();
            info!(
                "Sensor stopped after {} ticks ({} publish failures)",
                reactor.ticks_handled(),
                reactor.publish_failures()
            );
        }
        
        if let Err(e) = &outcome {
            error!("Sensor transport failed: {}", e);
        }
        outcome?;
        stopped?;
        Ok(())
    }
}
