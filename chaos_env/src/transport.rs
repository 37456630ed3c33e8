//! Publish/subscribe transport abstraction for the chaos sensor.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::EnvError;
use crate::topic::topic_matches;
use crate::types::{BrokerEndpoint, Message};

/// Fire-and-forget publishing capability.
///
/// Must be safe to call from inside a [`MessageHandler`] while the
/// transport's serve loop is running; implementations never block on I/O.
pub trait Publisher: Send + Sync {
    /// Queues `payload` for delivery on `topic`.
    ///
    /// # Returns
    /// * `Ok(())` - Request accepted by the transport
    /// * `Err(EnvError::PublishError)` - Immediate failure (queue full, closed)
    ///
    /// # Note
    /// Success does not guarantee delivery.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), EnvError>;
}

/// Single-method callback invoked for every message on a subscribed filter.
///
/// The serve loop owns registered handlers and calls them through `&mut self`,
/// one message at a time, so handler state needs no internal locking.
pub trait MessageHandler: Send + 'static {
    /// Handles one inbound message. `publisher` may be used to respond.
    fn on_message(&mut self, message: &Message, publisher: &dyn Publisher);
}

/// Serializes deliveries from transports that dispatch on several threads.
impl<H: MessageHandler> MessageHandler for Arc<Mutex<H>> {
    fn on_message(&mut self, message: &Message, publisher: &dyn Publisher) {
        let mut inner = self.lock().unwrap_or_else(PoisonError::into_inner);
        inner.on_message(message, publisher);
    }
}

/// A connected publish/subscribe client.
///
/// # Implementations
///
/// - **Production**: `MqttTransport` - MQTT 3.1.1 over TCP via rumqttc
/// - **Simulation**: `SimTransport` - in-memory broker, deterministic delivery
///
/// Construction is the `connect(host, port, client_id)` step and is provided
/// by each implementation; a value of this trait is always connected.
///
/// # Lifecycle
///
/// ```text
/// connect ──> subscribe_with_handler* ──> serve_forever ──> stop
///                                            │    ▲
///                                 handler ◄──┘    │
///                                    └── publish ─┘
/// ```
#[async_trait]
pub trait PubSubTransport: Send + 'static {
    /// Cloneable publishing handle for use outside the serve loop.
    type Publisher: Publisher + Clone + 'static;
    
    /// Returns the endpoint this transport is connected to.
    fn endpoint(&self) -> &BrokerEndpoint;
    
    /// Returns a publishing handle.
    fn publisher(&self) -> Self::Publisher;
    
    /// Subscribes to `filter` and routes matching messages to `handler`.
    ///
    /// Subscribing to a filter that is already registered replaces its handler.
    async fn subscribe_with_handler(
        &mut self,
        filter: &str,
        handler: Box<dyn MessageHandler>,
    ) -> Result<(), EnvError>;
    
    /// Publishes `payload` on `topic` (see [`Publisher::publish`]).
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), EnvError> {
        self.publisher().publish(topic, payload)
    }
    
    /// Runs the delivery loop until the connection ends.
    ///
    /// Callers that need shutdown race this against a signal with
    /// `tokio::select!` and then call [`PubSubTransport::stop`].
    async fn serve_forever(&mut self) -> Result<(), EnvError>;
    
    /// Releases the connection. Safe to call more than once.
    async fn stop(&mut self) -> Result<(), EnvError>;
}

/// Subscription table shared by transport implementations.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<(String, Box<dyn MessageHandler>)>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Registers `handler` for `filter`, replacing any previous handler.
    pub fn insert(&mut self, filter: &str, handler: Box<dyn MessageHandler>) {
        match self.entries.iter_mut().find(|(f, _)| f == filter) {
            Some(entry) => entry.1 = handler,
            None => self.entries.push((filter.to_string(), handler)),
        }
    }
    
    /// Returns the registered filters in subscription order.
    pub fn filters(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(f, _)| f.as_str())
    }
    
    /// Returns true if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    
    /// Delivers `message` to every handler whose filter matches.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&mut self, message: &Message, publisher: &dyn Publisher) -> usize {
        let mut delivered = 0;
        for (filter, handler) in self.entries.iter_mut() {
            if topic_matches(filter, &message.topic) {
                handler.on_message(message, publisher);
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    struct NullPublisher;
    
    impl Publisher for NullPublisher {
        fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), EnvError> {
            Ok(())
        }
    }
    
    struct Recorder(Arc<Mutex<Vec<String>>>, &'static str);
    
    impl MessageHandler for Recorder {
        fn on_message(&mut self, message: &Message, _publisher: &dyn Publisher) {
            self.0.lock().unwrap().push(format!("{}:{}", self.1, message.topic));
        }
    }
    
    #[test]
    fn test_registry_dispatches_to_matching_filters() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.insert("tickgen/tick", Box::new(Recorder(log.clone(), "exact")));
        registry.insert("tickgen/#", Box::new(Recorder(log.clone(), "all")));
        
        let delivered = registry.dispatch(&Message::new("tickgen/tick", "1"), &NullPublisher);
        assert_eq!(delivered, 2);
        
        let delivered = registry.dispatch(&Message::new("tickgen/tick_delay", "500"), &NullPublisher);
        assert_eq!(delivered, 1);
        
        let delivered = registry.dispatch(&Message::new("other", "x"), &NullPublisher);
        assert_eq!(delivered, 0);
        
        assert_eq!(
            *log.lock().unwrap(),
            vec!["exact:tickgen/tick", "all:tickgen/tick", "all:tickgen/tick_delay"]
        );
    }
    
    #[test]
    fn test_registry_replaces_handler_for_same_filter() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.insert("tickgen/tick", Box::new(Recorder(log.clone(), "old")));
        registry.insert("tickgen/tick", Box::new(Recorder(log.clone(), "new")));
        
        assert_eq!(registry.filters().count(), 1);
        registry.dispatch(&Message::new("tickgen/tick", "1"), &NullPublisher);
        assert_eq!(*log.lock().unwrap(), vec!["new:tickgen/tick"]);
    }
    
    #[test]
    fn test_mutex_handler_delegates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::new(Mutex::new(Recorder(log.clone(), "shared")));
        let mut handle = shared.clone();
        
        handle.on_message(&Message::new("t", "1"), &NullPublisher);
        assert_eq!(*log.lock().unwrap(), vec!["shared:t"]);
    }
}
