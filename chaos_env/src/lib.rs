//! Chaos Sensor Transport Abstraction Layer
//!
//! This crate provides the publish/subscribe seam that lets the chaos sensor
//! run against a **Production** MQTT broker (rumqttc) or a **Simulation**
//! in-memory broker with identical reactor code.
//!
//! # Core Concept: Handler Registration
//!
//! The reactor never owns a socket. It is handed to the transport as a
//! [`MessageHandler`] and receives a [`Publisher`] on every delivery:
//!
//! ```text
//! broker ──tick──> PubSubTransport::serve_forever
//!                        │
//!                        ├─> MessageHandler::on_message(msg, publisher)
//!                        │          └─> publisher.publish(reading)
//!                        ▼
//! broker <──reading──────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use chaos_env::{BrokerEndpoint, MqttSettings, MqttTransport, PubSubTransport};
//!
//! let endpoint = BrokerEndpoint::new("mqttbroker", 1883, "chaossensor_1");
//! let mut transport = MqttTransport::connect(endpoint, MqttSettings::default()).await?;
//! transport.subscribe_with_handler("tickgen/tick", Box::new(reactor)).await?;
//!
//! tokio::select! {
//!     result = transport.serve_forever() => result?,
//!     _ = tokio::signal::ctrl_c() => {}
//! }
//! transport.stop().await?;
//! ```

mod error;
mod mqtt;
mod topic;
mod transport;
mod types;

pub use error::EnvError;
pub use mqtt::{MqttPublisher, MqttSettings, MqttTransport};
pub use topic::{topic_matches, validate_filter, validate_topic};
pub use transport::{HandlerRegistry, MessageHandler, PubSubTransport, Publisher};
pub use types::{BrokerEndpoint, Message};
