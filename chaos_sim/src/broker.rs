//! In-memory publish/subscribe broker with fault injection.
//!
//! Delivery is FIFO per client and fully deterministic: a message published
//! before another is always delivered before it.

use async_trait::async_trait;
use chaos_env::{
    topic_matches, validate_filter, validate_topic, BrokerEndpoint, EnvError, HandlerRegistry,
    Message, MessageHandler, PubSubTransport, Publisher,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// One connected client as seen by the broker.
struct Session {
    /// Subscribed filters
    filters: Vec<String>,
    
    /// Delivery queue into the client's transport
    inbox: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct BrokerState {
    /// Connected clients by client id
    sessions: HashMap<String, Session>,
    
    /// Every accepted publish, in order
    published: Vec<Message>,
    
    /// Reject all publishes (simulated outage)
    reject_publishes: bool,
    
    /// Refuse new connections (simulated broker down)
    refuse_connections: bool,
    
    /// Targeted outage on matching topics
    reject_window: Option<RejectWindow>,
}

/// Rejects `count` publishes matching `filter` after letting `skip` through.
struct RejectWindow {
    filter: String,
    skip: usize,
    count: usize,
    seen: usize,
}

impl RejectWindow {
    /// Records one matching publish; returns true if it must be rejected.
    fn reject_next(&mut self) -> bool {
        let index = self.seen;
        self.seen += 1;
        index >= self.skip && index < self.skip + self.count
    }
}

/// Shared handle to the simulated broker.
#[derive(Clone, Default)]
pub struct SimBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl SimBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }
    
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
    
    /// Opens a session for `endpoint.client_id`.
    pub fn connect(&self, endpoint: BrokerEndpoint) -> Result<SimTransport, EnvError> {
        let mut state = self.state();
        
        if state.refuse_connections {
            return Err(EnvError::connection(format!("{}: connection refused", endpoint)));
        }
        if state.sessions.contains_key(&endpoint.client_id) {
            return Err(EnvError::connection(format!(
                "{}: client id already connected",
                endpoint
            )));
        }
        
        let (tx, rx) = mpsc::unbounded_channel();
        state.sessions.insert(
            endpoint.client_id.clone(),
            Session {
                filters: Vec::new(),
                inbox: tx,
            },
        );
        debug!("Sim broker: {} connected", endpoint);
        
        Ok(SimTransport {
            publisher: SimPublisher {
                broker: self.clone(),
            },
            endpoint,
            inbox: rx,
            handlers: HandlerRegistry::new(),
            stopped: false,
        })
    }
    
    /// Routes `payload` to every session with a matching filter.
    ///
    /// Each session receives the message at most once.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), EnvError> {
        validate_topic(topic)?;
        let mut state = self.state();
        
        if state.reject_publishes {
            return Err(EnvError::publish("broker rejecting publishes"));
        }
        if let Some(window) = state.reject_window.as_mut() {
            if topic_matches(&window.filter, topic) && window.reject_next() {
                return Err(EnvError::publish(format!("broker rejecting publishes on {}", topic)));
            }
        }
        
        let message = Message::new(topic, payload);
        for session in state.sessions.values() {
            if session.filters.iter().any(|f| topic_matches(f, topic)) {
                // A closed inbox means the transport is gone; the session is
                // cleaned up on disconnect.
                let _ = session.inbox.send(message.clone());
            }
        }
        state.published.push(message);
        Ok(())
    }
    
    fn subscribe(&self, client_id: &str, filter: &str) -> Result<(), EnvError> {
        validate_filter(filter)?;
        let mut state = self.state();
        let session = state
            .sessions
            .get_mut(client_id)
            .ok_or_else(|| EnvError::SubscribeError(format!("{} is not connected", client_id)))?;
        
        if !session.filters.iter().any(|f| f == filter) {
            session.filters.push(filter.to_string());
        }
        Ok(())
    }
    
    /// Ends a client's session; its transport drains what is queued and stops.
    pub fn disconnect(&self, client_id: &str) -> bool {
        self.state().sessions.remove(client_id).is_some()
    }
    
    /// Ends every session.
    pub fn close(&self) {
        self.state().sessions.clear();
    }
    
    /// Returns true if `client_id` has an open session.
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.state().sessions.contains_key(client_id)
    }
    
    /// Returns how many sessions would receive a message on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state()
            .sessions
            .values()
            .filter(|s| s.filters.iter().any(|f| topic_matches(f, topic)))
            .count()
    }
    
    /// Returns every accepted publish, in order.
    pub fn published(&self) -> Vec<Message> {
        self.state().published.clone()
    }
    
    /// Returns accepted publishes whose topic matches `filter`, in order.
    pub fn published_on(&self, filter: &str) -> Vec<Message> {
        self.state()
            .published
            .iter()
            .filter(|m| topic_matches(filter, &m.topic))
            .cloned()
            .collect()
    }
    
    /// Starts or ends a publish outage.
    pub fn set_reject_publishes(&self, reject: bool) {
        self.state().reject_publishes = reject;
    }
    
    /// Rejects `count` publishes matching `filter`, after the next `skip`.
    pub fn reject_window(&self, filter: &str, skip: usize, count: usize) {
        self.state().reject_window = Some(RejectWindow {
            filter: filter.to_string(),
            skip,
            count,
            seen: 0,
        });
    }
    
    /// Starts or ends a connection outage.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.state().refuse_connections = refuse;
    }
}

/// Publishing handle into a [`SimBroker`].
#[derive(Clone)]
pub struct SimPublisher {
    broker: SimBroker,
}

impl Publisher for SimPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), EnvError> {
        self.broker.publish(topic, payload)
    }
}

/// A client session on a [`SimBroker`].
pub struct SimTransport {
    endpoint: BrokerEndpoint,
    publisher: SimPublisher,
    inbox: mpsc::UnboundedReceiver<Message>,
    handlers: HandlerRegistry,
    stopped: bool,
}

impl SimTransport {
    /// Delivers every queued message (including ones published by handlers
    /// along the way) and returns how many were processed.
    pub fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(message) = self.inbox.try_recv() {
            self.handlers.dispatch(&message, &self.publisher);
            processed += 1;
        }
        processed
    }
}

impl Drop for SimTransport {
    fn drop(&mut self) {
        if !self.stopped {
            self.publisher.broker.disconnect(&self.endpoint.client_id);
        }
    }
}

#[async_trait]
impl PubSubTransport for SimTransport {
    type Publisher = SimPublisher;
    
    fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }
    
    fn publisher(&self) -> SimPublisher {
        self.publisher.clone()
    }
    
    async fn subscribe_with_handler(
        &mut self,
        filter: &str,
        handler: Box<dyn MessageHandler>,
    ) -> Result<(), EnvError> {
        self.publisher.broker.subscribe(&self.endpoint.client_id, filter)?;
        self.handlers.insert(filter, handler);
        Ok(())
    }
    
    /// Delivers messages until the broker ends the session.
    async fn serve_forever(&mut self) -> Result<(), EnvError> {
        while let Some(message) = self.inbox.recv().await {
            self.handlers.dispatch(&message, &self.publisher);
        }
        Ok(())
    }
    
    async fn stop(&mut self) -> Result<(), EnvError> {
        if !self.stopped {
            self.stopped = true;
            self.publisher.broker.disconnect(&self.endpoint.client_id);
            self.inbox.close();
        }
        Ok(())
    }
}
