//! Sensor configuration: launch-time constants with optional TOML overrides.

use chaos_env::{validate_filter, validate_topic, BrokerEndpoint};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SensorError;
use crate::generator::DEFAULT_SEED;

/// Topic the testbed clock publishes ticks on.
pub const DEFAULT_TICK_TOPIC: &str = "tickgen/tick";

/// Topic readings are published on.
pub const DEFAULT_DATA_TOPIC: &str = "chaossensor/1/data";

/// Configuration for one chaos sensor.
///
/// Every field has a default, so a TOML file only lists what it overrides:
///
/// ```toml
/// host = "localhost"
/// seed = 7
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    /// Broker host (default: "mqttbroker")
    pub host: String,
    
    /// Broker port (default: 1883)
    pub port: u16,
    
    /// Client identifier (default: "chaossensor_1")
    pub client_id: String,
    
    /// Tick subscription filter (default: "tickgen/tick")
    pub tick_topic: String,
    
    /// Reading topic (default: "chaossensor/1/data")
    pub data_topic: String,
    
    /// Generator seed (default: 42)
    pub seed: u64,
    
    /// MQTT keep-alive in seconds (default: 5)
    pub keep_alive_secs: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            host: "mqttbroker".to_string(),
            port: 1883,
            client_id: "chaossensor_1".to_string(),
            tick_topic: DEFAULT_TICK_TOPIC.to_string(),
            data_topic: DEFAULT_DATA_TOPIC.to_string(),
            seed: DEFAULT_SEED,
            keep_alive_secs: 5,
        }
    }
}

impl SensorConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SensorError> {
        toml::from_str(text).map_err(|e| SensorError::config(format!("bad config: {}", e)))
    }
    
    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SensorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SensorError::config(format!("cannot read config {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
            .map_err(|e| SensorError::config(format!("{} ({})", e, path.display())))
    }
    
    /// Checks the configuration for values no transport could use.
    pub fn validate(&self) -> Result<(), SensorError> {
        if self.host.trim().is_empty() {
            return Err(SensorError::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(SensorError::config("port must not be 0"));
        }
        if self.client_id.is_empty() {
            return Err(SensorError::config("client_id must not be empty"));
        }
        if self.keep_alive_secs < 5 {
            return Err(SensorError::config("keep_alive_secs must be at least 5"));
        }
        // CONNECT carries keep-alive as a 16-bit field.
        if self.keep_alive_secs > u64::from(u16::MAX) {
            return Err(SensorError::config(format!(
                "keep_alive_secs must be at most {}",
                u16::MAX
            )));
        }
        validate_filter(&self.tick_topic)
            .map_err(|e| SensorError::config(format!("tick_topic: {}", e)))?;
        validate_topic(&self.data_topic)
            .map_err(|e| SensorError::config(format!("data_topic: {}", e)))?;
        Ok(())
    }
    
    /// Returns the broker endpoint described by this configuration.
    pub fn endpoint(&self) -> BrokerEndpoint {
        BrokerEndpoint::new(self.host.clone(), self.port, self.client_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_defaults_match_testbed() {
        let config = SensorConfig::default();
        assert_eq!(config.host, "mqttbroker");
        assert_eq!(config.port, 1883);
        assert_eq!(config.client_id, "chaossensor_1");
        assert_eq!(config.tick_topic, "tickgen/tick");
        assert_eq!(config.data_topic, "chaossensor/1/data");
        assert_eq!(config.seed, 42);
        assert!(config.validate().is_ok());
    }
    
    #[test]
    fn test_partial_toml_overrides() {
        let config = SensorConfig::from_toml_str("host = \"localhost\"\nseed = 7\n").unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.seed, 7);
        assert_eq!(config.port, 1883);
        assert_eq!(config.data_topic, DEFAULT_DATA_TOPIC);
    }
    
    #[test]
    fn test_unknown_key_rejected() {
        let result = SensorConfig::from_toml_str("hots = \"typo\"\n");
        assert!(matches!(result, Err(SensorError::Config(_))));
    }
    
    #[test]
    fn test_missing_file_is_config_error() {
        let result = SensorConfig::load("/nonexistent/chaos-sensor.toml");
        assert!(matches!(result, Err(SensorError::Config(_))));
    }
    
    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            SensorConfig { host: " ".into(), ..SensorConfig::default() },
            SensorConfig { port: 0, ..SensorConfig::default() },
            SensorConfig { client_id: String::new(), ..SensorConfig::default() },
            SensorConfig { keep_alive_secs: 1, ..SensorConfig::default() },
            SensorConfig { keep_alive_secs: 70_000, ..SensorConfig::default() },
            SensorConfig { tick_topic: "tickgen/#/x".into(), ..SensorConfig::default() },
            SensorConfig { data_topic: "chaossensor/+/data".into(), ..SensorConfig::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "accepted {:?}", config);
        }
    }
    
    #[test]
    fn test_keep_alive_fits_connect_field() {
        let widest = SensorConfig { keep_alive_secs: u64::from(u16::MAX), ..SensorConfig::default() };
        assert!(widest.validate().is_ok());
        
        let wrapped = SensorConfig { keep_alive_secs: u64::from(u16::MAX) + 1, ..SensorConfig::default() };
        assert!(matches!(wrapped.validate(), Err(SensorError::Config(_))));
    }
    
    #[test]
    fn test_wildcard_tick_topic_allowed() {
        let config = SensorConfig {
            tick_topic: "tickgen/+".into(),
            ..SensorConfig::default()
        };
        assert!(config.validate().is_ok());
    }
    
    #[test]
    fn test_endpoint() {
        let endpoint = SensorConfig::default().endpoint();
        assert_eq!(endpoint, BrokerEndpoint::new("mqttbroker", 1883, "chaossensor_1"));
    }
}
