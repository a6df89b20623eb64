//! Broker connection with automatic reconnection

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::traits::{Bus, BusError};
use crate::config::BusConfig;
use crate::retry::Backoff;
use crate::shutdown::{self, Shutdown, ShutdownTrigger};

/// Events emitted by the connection loop
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Broker accepted the session
    Connected,
    /// Session lost, reconnection is in progress
    Disconnected { reason: String },
    /// Message on a subscribed topic
    Received(InboundMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Handle to the broker session
///
/// Cloning is cheap; every clone drives the same session.
#[derive(Clone)]
pub struct BusConnection {
    client: AsyncClient,
    subscriptions: Arc<Mutex<Vec<String>>>,
    connected: Arc<AtomicBool>,
    stop: Arc<ShutdownTrigger>,
}

impl BusConnection {
    /// Start the connection loop
    pub fn spawn(config: &BusConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), config.request_capacity);
        let (event_tx, event_rx) = mpsc::channel(256);
        let (stop, stop_rx) = shutdown::channel();

        let connection = Self {
            client,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(stop),
        };

        let backoff = Backoff::new(config.reconnect_delay(), config.max_reconnect_delay());
        tokio::spawn(connection_loop(
            eventloop,
            connection.clone(),
            backoff,
            event_tx,
            stop_rx,
        ));

        info!("[BUS] Connecting to {}:{}", config.host, config.port);
        (connection, event_rx)
    }

    /// Register a topic pattern
    ///
    /// Patterns are kept and re-subscribed after every reconnect.
    pub fn subscribe(&self, pattern: impl Into<String>) -> Result<(), BusError> {
        let pattern = pattern.into();
        {
            let mut subscriptions = self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if subscriptions.contains(&pattern) {
                return Ok(());
            }
            subscriptions.push(pattern.clone());
        }

        if self.is_connected() {
            self.client
                .try_subscribe(pattern, QoS::AtMostOnce)
                .map_err(|e| BusError::Rejected(e.to_string()))?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn resubscribe(&self) {
        let patterns = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for pattern in patterns {
            match self.client.try_subscribe(pattern.as_str(), QoS::AtMostOnce) {
                Ok(()) => debug!("[BUS] Subscribed to {}", pattern),
                Err(e) => warn!("[BUS] Failed to subscribe to {}: {}", pattern, e),
            }
        }
    }
}

#[async_trait]
impl Bus for BusConnection {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| BusError::Rejected(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        let result = if self.is_connected() {
            self.client
                .try_disconnect()
                .map_err(|e| BusError::Rejected(e.to_string()))
        } else {
            Ok(())
        };
        self.stop.trigger();
        result
    }
}

fn mqtt_options(config: &BusConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username.clone(), password.clone());
    }
    if config.use_tls {
        options.set_transport(Transport::tls_with_default_config());
    }
    options
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    mut eventloop: EventLoop,
    connection: BusConnection,
    mut backoff: Backoff,
    event_tx: mpsc::Sender<ConnectionEvent>,
    mut stop: Shutdown,
) {
    loop {
        let polled = tokio::select! {
            _ = stop.recv() => break,
            polled = eventloop.poll() => polled,
        };

        match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                connection.connected.store(true, Ordering::SeqCst);
                info!("[BUS] Connected");
                connection.resubscribe();
                let _ = event_tx.send(ConnectionEvent::Connected).await;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                if event_tx.send(ConnectionEvent::Received(message)).await.is_err() {
                    debug!("[BUS] Event receiver dropped");
                }
            }
            Ok(_) => {}
            Err(e) => {
                if connection.connected.swap(false, Ordering::SeqCst) {
                    warn!("[BUS] Disconnected: {}", e);
                    let _ = event_tx
                        .send(ConnectionEvent::Disconnected {
                            reason: e.to_string(),
                        })
                        .await;
                }

                let delay = backoff.next_delay();
                debug!("[BUS] Reconnecting in {:?} ({})", delay, e);
                if !stop.sleep(delay).await {
                    break;
                }
            }
        }
    }

    // Let a queued DISCONNECT reach the broker
    if connection.connected.swap(false, Ordering::SeqCst) {
        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        let _ = tokio::time::timeout(Duration::from_secs(1), flush).await;
    }
    info!("[BUS] Connection loop stopped");
}
