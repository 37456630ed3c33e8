//! Production transport: MQTT 3.1.1 over TCP, backed by rumqttc.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::EnvError;
use crate::topic::{validate_filter, validate_topic};
use crate::transport::{HandlerRegistry, MessageHandler, PubSubTransport, Publisher};
use crate::types::{BrokerEndpoint, Message};

/// Tunables for the MQTT connection.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// MQTT keep-alive interval (must be at least 5s)
    pub keep_alive: Duration,
    
    /// Capacity of the outgoing request queue
    pub request_capacity: usize,
    
    /// How long `connect` waits for CONNACK
    pub connect_timeout: Duration,
    
    /// Pause between reconnect attempts after a poll error
    pub retry_delay: Duration,
    
    /// Consecutive poll errors tolerated before `serve_forever` fails
    /// (None = retry forever)
    pub max_consecutive_errors: Option<u32>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(5),
            request_capacity: 1024,
            connect_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
            max_consecutive_errors: None,
        }
    }
}

/// Cloneable publishing handle over the rumqttc request queue.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), EnvError> {
        validate_topic(topic)?;
        // Non-blocking: the event loop may be the caller's own serve loop.
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| EnvError::publish(e.to_string()))
    }
}

/// MQTT client transport.
pub struct MqttTransport {
    endpoint: BrokerEndpoint,
    settings: MqttSettings,
    publisher: MqttPublisher,
    eventloop: EventLoop,
    handlers: HandlerRegistry,
    stopped: bool,
}

impl MqttTransport {
    /// Connects to the broker and waits for CONNACK.
    ///
    /// A broker that is unreachable or refuses the session is reported as
    /// `EnvError::ConnectionError`; `EnvError::Timeout` if no answer arrives
    /// within `settings.connect_timeout`.
    pub async fn connect(endpoint: BrokerEndpoint, settings: MqttSettings) -> Result<Self, EnvError> {
        let mut options = MqttOptions::new(
            endpoint.client_id.clone(),
            endpoint.host.clone(),
            endpoint.port,
        );
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);
        
        let (client, mut eventloop) = AsyncClient::new(options, settings.request_capacity);
        
        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        debug!("CONNACK from {}: {:?}", endpoint, ack.code);
                        return Ok(());
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(EnvError::connection(format!("{}: {}", endpoint, e))),
                }
            }
        };
        
        let timeout_ms = settings.connect_timeout.as_millis() as u64;
        tokio::time::timeout(settings.connect_timeout, handshake)
            .await
            .map_err(|_| EnvError::Timeout(timeout_ms))??;
        
        info!("Connected to MQTT broker {}", endpoint);
        
        Ok(Self {
            endpoint,
            settings,
            publisher: MqttPublisher { client },
            eventloop,
            handlers: HandlerRegistry::new(),
            stopped: false,
        })
    }
    
    /// Re-issues every subscription (clean sessions forget them on reconnect).
    fn resubscribe(&self) {
        for filter in self.handlers.filters() {
            if let Err(e) = self.publisher.client.try_subscribe(filter, QoS::AtMostOnce) {
                warn!("Resubscribe to {} failed: {}", filter, e);
            }
        }
    }
}

#[async_trait]
impl PubSubTransport for MqttTransport {
    type Publisher = MqttPublisher;
    
    fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }
    
    fn publisher(&self) -> MqttPublisher {
        self.publisher.clone()
    }
    
    async fn subscribe_with_handler(
        &mut self,
        filter: &str,
        handler: Box<dyn MessageHandler>,
    ) -> Result<(), EnvError> {
        validate_filter(filter)?;
        self.publisher
            .client
            .subscribe(filter, QoS::AtMostOnce)
            .await
            .map_err(|e| EnvError::SubscribeError(e.to_string()))?;
        self.handlers.insert(filter, handler);
        info!("Subscribed to {}", filter);
        Ok(())
    }
    
    async fn serve_forever(&mut self) -> Result<(), EnvError> {
        let mut consecutive_errors = 0u32;
        
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    consecutive_errors = 0;
                    let message = Message::new(publish.topic, publish.payload.to_vec());
                    if self.handlers.dispatch(&message, &self.publisher) == 0 {
                        debug!("No handler for {}", message.topic);
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    consecutive_errors = 0;
                    info!("Reconnected to {}", self.endpoint);
                    self.resubscribe();
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("Disconnected from {}", self.endpoint);
                    return Ok(());
                }
                Ok(_) => {
                    consecutive_errors = 0;
                }
                Err(e) => {
                    if self.stopped {
                        return Ok(());
                    }
                    consecutive_errors += 1;
                    warn!("MQTT connection error ({} in a row): {}", consecutive_errors, e);
                    
                    if let Some(max) = self.settings.max_consecutive_errors {
                        if consecutive_errors >= max {
                            return Err(EnvError::TransportError(format!(
                                "giving up after {} consecutive errors: {}",
                                consecutive_errors, e
                            )));
                        }
                    }
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
            }
        }
    }
    
    async fn stop(&mut self) -> Result<(), EnvError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        
        self.publisher
            .client
            .disconnect()
            .await
            .map_err(|e| EnvError::TransportError(e.to_string()))?;
        
        // Drive the event loop until the DISCONNECT packet is flushed.
        let timeout = self.settings.connect_timeout;
        let eventloop = &mut self.eventloop;
        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        };
        tokio::time::timeout(timeout, flush)
            .await
            .map_err(|_| EnvError::Timeout(timeout.as_millis() as u64))?;
        
        info!("MQTT connection to {} released", self.endpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    
    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    
    /// Reads one MQTT packet: (packet type, body after the fixed header).
    async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
        let header = stream.read_u8().await?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await?;
            len |= usize::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        stream.read_exact(&mut body).await?;
        Ok((header >> 4, body))
    }
    
    /// Reads packets until one of type `kind` arrives.
    async fn expect_packet(stream: &mut TcpStream, kind: u8) -> Vec<u8> {
        loop {
            let (packet_type, body) = read_packet(stream).await.unwrap();
            if packet_type == kind {
                return body;
            }
        }
    }
    
    /// Accepts a client and completes the CONNECT/CONNACK handshake.
    async fn accept_session(listener: &TcpListener) -> TcpStream {
        let (mut stream, _) = listener.accept().await.unwrap();
        expect_packet(&mut stream, 1).await;
        stream.write_all(&CONNACK).await.unwrap();
        stream
    }
    
    /// Answers the next SUBSCRIBE and returns its first filter.
    async fn ack_subscribe(stream: &mut TcpStream) -> String {
        let body = expect_packet(stream, 8).await;
        let filter_len = usize::from(u16::from_be_bytes([body[2], body[3]]));
        let filter = String::from_utf8(body[4..4 + filter_len].to_vec()).unwrap();
        stream.write_all(&[0x90, 0x03, body[0], body[1], 0x00]).await.unwrap();
        filter
    }
    
    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0x30, (2 + topic.len() + payload.len()) as u8];
        packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }
    
    /// Splits a QoS 0 PUBLISH body into topic and payload.
    fn split_publish(body: &[u8]) -> (String, Vec<u8>) {
        let topic_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
        let topic = String::from_utf8(body[2..2 + topic_len].to_vec()).unwrap();
        (topic, body[2 + topic_len..].to_vec())
    }
    
    async fn loopback() -> (TcpListener, BrokerEndpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, BrokerEndpoint::new("127.0.0.1", port, "chaossensor_test"))
    }
    
    fn fast_settings() -> MqttSettings {
        MqttSettings {
            connect_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(10),
            ..MqttSettings::default()
        }
    }
    
    /// Records every delivery and answers it on the data topic.
    struct Answer(Arc<Mutex<Vec<Message>>>);
    
    impl MessageHandler for Answer {
        fn on_message(&mut self, message: &Message, publisher: &dyn Publisher) {
            self.0.lock().unwrap().push(message.clone());
            publisher.publish("chaossensor/1/data", message.payload.clone()).unwrap();
        }
    }
    
    #[tokio::test]
    async fn test_serve_dispatches_and_publishes_from_handler() {
        let (listener, endpoint) = loopback().await;
        let broker = tokio::spawn(async move {
            let mut stream = accept_session(&listener).await;
            let filter = ack_subscribe(&mut stream).await;
            stream.write_all(&publish_packet("tickgen/tick", b"T1")).await.unwrap();
            let reply = expect_packet(&mut stream, 3).await;
            (filter, split_publish(&reply))
        });
        
        let mut transport = MqttTransport::connect(endpoint, fast_settings()).await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        transport
            .subscribe_with_handler("tickgen/tick", Box::new(Answer(seen.clone())))
            .await
            .unwrap();
        
        let (filter, (topic, payload)) = tokio::select! {
            result = transport.serve_forever() => panic!("serve loop ended: {:?}", result),
            received = broker => received.unwrap(),
        };
        
        assert_eq!(filter, "tickgen/tick");
        assert_eq!(topic, "chaossensor/1/data");
        assert_eq!(payload, b"T1");
        
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].topic, "tickgen/tick");
        assert_eq!(seen[0].payload_str(), Some("T1"));
    }
    
    #[tokio::test]
    async fn test_resubscribes_after_reconnect() {
        let (listener, endpoint) = loopback().await;
        let broker = tokio::spawn(async move {
            let mut first = accept_session(&listener).await;
            ack_subscribe(&mut first).await;
            drop(first);
            
            let mut second = accept_session(&listener).await;
            ack_subscribe(&mut second).await
        });
        
        let mut transport = MqttTransport::connect(endpoint, fast_settings()).await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        transport
            .subscribe_with_handler("tickgen/tick", Box::new(Answer(seen)))
            .await
            .unwrap();
        
        let filter = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::select! {
                result = transport.serve_forever() => panic!("serve loop ended: {:?}", result),
                received = broker => received.unwrap(),
            }
        })
        .await
        .unwrap();
        assert_eq!(filter, "tickgen/tick");
    }
    
    #[tokio::test]
    async fn test_error_cap_ends_serve_loop() {
        let (listener, endpoint) = loopback().await;
        let broker = tokio::spawn(async move {
            // Close the session and stop listening so every reconnect fails.
            drop(accept_session(&listener).await);
        });
        
        let settings = MqttSettings {
            max_consecutive_errors: Some(2),
            ..fast_settings()
        };
        let mut transport = MqttTransport::connect(endpoint, settings).await.unwrap();
        broker.await.unwrap();
        
        let result = tokio::time::timeout(Duration::from_secs(10), transport.serve_forever())
            .await
            .unwrap();
        match result {
            Err(EnvError::TransportError(msg)) => assert!(msg.contains("2 consecutive errors"), "{}", msg),
            other => panic!("expected TransportError, got {:?}", other),
        }
    }
    
    #[tokio::test]
    async fn test_stop_flushes_disconnect() {
        let (listener, endpoint) = loopback().await;
        let broker = tokio::spawn(async move {
            let mut stream = accept_session(&listener).await;
            expect_packet(&mut stream, 14).await;
        });
        
        let mut transport = MqttTransport::connect(endpoint, fast_settings()).await.unwrap();
        transport.stop().await.unwrap();
        
        tokio::time::timeout(Duration::from_secs(5), broker)
            .await
            .unwrap()
            .unwrap();
        
        // Second stop is a no-op.
        transport.stop().await.unwrap();
    }
    
    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Nothing listens on port 1 in the test environment.
        let endpoint = BrokerEndpoint::new("127.0.0.1", 1, "chaossensor_test");
        let settings = MqttSettings {
            connect_timeout: Duration::from_secs(5),
            ..MqttSettings::default()
        };
        
        let result = MqttTransport::connect(endpoint, settings).await;
        assert!(matches!(result, Err(EnvError::ConnectionError(_))));
    }
    
    #[tokio::test]
    async fn test_publisher_rejects_wildcard_topic() {
        let options = MqttOptions::new("chaossensor_test", "127.0.0.1", 1);
        let (client, _eventloop) = AsyncClient::new(options, 4);
        let publisher = MqttPublisher { client };
        
        let result = publisher.publish("chaossensor/+/data", b"{}".to_vec());
        assert!(matches!(result, Err(EnvError::InvalidTopic(_))));
    }
    
    #[tokio::test]
    async fn test_publisher_reports_full_queue() {
        let options = MqttOptions::new("chaossensor_test", "127.0.0.1", 1);
        let (client, _eventloop) = AsyncClient::new(options, 1);
        let publisher = MqttPublisher { client };
        
        // The event loop is never polled, so the second request cannot be queued.
        assert!(publisher.publish("chaossensor/1/data", b"{}".to_vec()).is_ok());
        let result = publisher.publish("chaossensor/1/data", b"{}".to_vec());
        assert!(matches!(result, Err(EnvError::PublishError(_))));
    }
    
    #[test]
    fn test_default_settings() {
        let settings = MqttSettings::default();
        assert_eq!(settings.keep_alive, Duration::from_secs(5));
        assert!(settings.max_consecutive_errors.is_none());
    }
}
