//! Chaos Sensor - synthetic testbed sensor over MQTT
//!
//! Subscribes to the testbed clock and answers every tick with one seeded
//! random reading:
//! - `tickgen/tick` in: opaque timestamp text
//! - `chaossensor/1/data` out: `{"payload": 0..=100, "timestamp": "<tick>"}`
//!
//! Configuration layers: built-in defaults < TOML file < env vars / flags.

use anyhow::{Context, Result};
use chaos_core::{ChaosSensor, SensorConfig};
use chaos_env::{MqttSettings, MqttTransport};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when present.
const DEFAULT_CONFIG_PATH: &str = "chaos-sensor.toml";

/// Chaos sensor: one random reading per clock tick
#[derive(Parser, Debug)]
#[command(name = "chaos-sensor", version)]
#[command(about = "Publish one seeded random reading per testbed clock tick", long_about = None)]
struct Args {
    /// TOML config file (default: ./chaos-sensor.toml if it exists)
    #[arg(short, long, env = "CHAOS_SENSOR_CONFIG")]
    config: Option<PathBuf>,
    
    /// Broker host
    #[arg(long, env = "CHAOS_SENSOR_HOST")]
    host: Option<String>,
    
    /// Broker port
    #[arg(long, env = "CHAOS_SENSOR_PORT")]
    port: Option<u16>,
    
    /// MQTT client identifier
    #[arg(long, env = "CHAOS_SENSOR_CLIENT_ID")]
    client_id: Option<String>,
    
    /// Generator seed
    #[arg(long, env = "CHAOS_SENSOR_SEED")]
    seed: Option<u64>,
    
    /// Tick subscription filter
    #[arg(long, env = "CHAOS_SENSOR_TICK_TOPIC")]
    tick_topic: Option<String>,
    
    /// Reading topic
    #[arg(long, env = "CHAOS_SENSOR_DATA_TOPIC")]
    data_topic: Option<String>,
    
    /// MQTT keep-alive in seconds
    #[arg(long, env = "CHAOS_SENSOR_KEEP_ALIVE_SECS")]
    keep_alive_secs: Option<u64>,
    
    /// Log filter, e.g. "info" or "chaos_core=debug" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Builds the effective configuration from file and overrides.
    fn effective_config(&self) -> Result<SensorConfig> {
        let base = match &self.config {
            Some(path) => SensorConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => SensorConfig::load(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("loading {}", DEFAULT_CONFIG_PATH))?,
            None => SensorConfig::default(),
        };
        Ok(self.apply_overrides(base))
    }
    
    fn apply_overrides(&self, base: SensorConfig) -> SensorConfig {
        SensorConfig {
            host: self.host.clone().unwrap_or(base.host),
            port: self.port.unwrap_or(base.port),
            client_id: self.client_id.clone().unwrap_or(base.client_id),
            tick_topic: self.tick_topic.clone().unwrap_or(base.tick_topic),
            data_topic: self.data_topic.clone().unwrap_or(base.data_topic),
            seed: self.seed.unwrap_or(base.seed),
            keep_alive_secs: self.keep_alive_secs.unwrap_or(base.keep_alive_secs),
        }
    }
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    
    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());
    
    let config = args.effective_config()?;
    let settings = MqttSettings {
        keep_alive: Duration::from_secs(config.keep_alive_secs),
        ..MqttSettings::default()
    };
    
    info!("Chaos sensor v{} starting", env!("CARGO_PKG_VERSION"));
    let sensor = ChaosSensor::new(config).context("invalid sensor configuration")?;
    
    sensor
        .run(
            |endpoint| MqttTransport::connect(endpoint, settings),
            shutdown_signal(),
        )
        .await
        .context("chaos sensor stopped with an error")?;
    
    info!("Shutdown complete");
    Ok(())
}
