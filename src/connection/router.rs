//! Inbound message routing

use fleetnav_shared::codec::{self, CodecError};
use fleetnav_shared::topics::{InboundTopic, Topics};
use fleetnav_shared::{GoToStatus, Position};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::manager::{ConnectionEvent, InboundMessage};
use crate::telemetry::{StatusBoard, TelemetryCache};

/// What happened to an inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Position { device_id: String, position: Position },
    Status { device_id: String, status: GoToStatus, delivered: bool },
    /// Topic not recognised for this organisation
    Ignored,
    /// Payload failed to decode
    Malformed,
}

/// Dispatches inbound messages to the telemetry cache and status board
pub struct InboundRouter {
    topics: Topics,
    telemetry: Arc<TelemetryCache>,
    status: StatusBoard,
}

impl InboundRouter {
    pub fn new(topics: Topics, telemetry: Arc<TelemetryCache>, status: StatusBoard) -> Self {
        Self {
            topics,
            telemetry,
            status,
        }
    }

    /// Drain connection events until the connection loop stops
    pub async fn run(self, mut events: mpsc::Receiver<ConnectionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Connected => info!("[ROUTER] Bus connected"),
                ConnectionEvent::Disconnected { reason } => {
                    warn!("[ROUTER] Bus disconnected: {}", reason)
                }
                ConnectionEvent::Received(message) => {
                    self.route(&message).await;
                }
            }
        }
        error!("[ROUTER] Connection event channel closed");
    }

    pub async fn route(&self, message: &InboundMessage) -> RouteOutcome {
        let Some(kind) = self.topics.parse(&message.topic) else {
            debug!("[ROUTER] Ignoring message on {}", message.topic);
            return RouteOutcome::Ignored;
        };

        match kind {
            InboundTopic::GlobalPosition { device_id } => {
                match codec::decode_position(&message.payload) {
                    Ok(position) => {
                        self.telemetry.update(&device_id, position).await;
                        RouteOutcome::Position {
                            device_id,
                            position,
                        }
                    }
                    Err(e) => malformed(&message.topic, e),
                }
            }
            InboundTopic::GoToLocationState { device_id } => {
                match codec::decode_go_to_state(&message.payload) {
                    Ok(status) => {
                        debug!("[ROUTER] {} go-to state {:?}", device_id, status);
                        let delivered = self.status.deliver(&device_id, status);
                        RouteOutcome::Status {
                            device_id,
                            status,
                            delivered,
                        }
                    }
                    Err(e) => malformed(&message.topic, e),
                }
            }
        }
    }
}

fn malformed(topic: &str, error: CodecError) -> RouteOutcome {
    warn!("[ROUTER] Dropping malformed message on {}: {}", topic, error);
    RouteOutcome::Malformed
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn message(topic: &str, payload: &str) -> InboundMessage {
        InboundMessage {
            topic: topic.into(),
            payload: Bytes::from(payload.to_string()),
        }
    }

    fn router() -> (InboundRouter, Arc<TelemetryCache>, StatusBoard) {
        let telemetry = Arc::new(TelemetryCache::new());
        let status = StatusBoard::new();
        let router = InboundRouter::new(Topics::new("org"), telemetry.clone(), status.clone());
        (router, telemetry, status)
    }

    #[tokio::test]
    async fn test_position_updates_cache() {
        let (router, telemetry, _) = router();

        let outcome = router
            .route(&message(
                "org/d1/global_position",
                r#"{"position": {"latitude": 18.5, "longitude": 73.7}}"#,
            ))
            .await;

        assert!(matches!(outcome, RouteOutcome::Position { .. }));
        assert_eq!(telemetry.read("d1").await, Position::new(18.5, 73.7));
        assert_eq!(telemetry.read("d2").await, Position::UNKNOWN);
    }

    #[tokio::test]
    async fn test_status_reaches_registered_device() {
        let (router, _, status) = router();
        let mut rx = status.register("d1");

        let outcome = router
            .route(&message("org/d1/go_to_location_state", r#"{"state": 2}"#))
            .await;

        assert_eq!(
            outcome,
            RouteOutcome::Status {
                device_id: "d1".into(),
                status: GoToStatus::Complete,
                delivered: true,
            }
        );
        assert_eq!(rx.try_recv().unwrap(), GoToStatus::Complete);
    }

    #[tokio::test]
    async fn test_status_for_unknown_device_is_dropped() {
        let (router, _, _) = router();
        let outcome = router
            .route(&message("org/ghost/go_to_location_state", r#"{"state": 4}"#))
            .await;
        assert!(matches!(outcome, RouteOutcome::Status { delivered: false, .. }));
    }

    #[tokio::test]
    async fn test_malformed_and_foreign_messages() {
        let (router, telemetry, _) = router();

        let outcome = router
            .route(&message("org/d1/global_position", "not json"))
            .await;
        assert_eq!(outcome, RouteOutcome::Malformed);
        assert_eq!(telemetry.read("d1").await, Position::UNKNOWN);

        let outcome = router
            .route(&message("other/d1/global_position", r#"{"position": {}}"#))
            .await;
        assert_eq!(outcome, RouteOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_run_routes_received_events() {
        let (router, telemetry, _) = router();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(router.run(rx));

        tx.send(ConnectionEvent::Connected).await.unwrap();
        tx.send(ConnectionEvent::Received(message(
            "org/d1/global_position",
            r#"{"position": {"latitude": 1.0, "longitude": 2.0}}"#,
        )))
        .await
        .unwrap();
        drop(tx);

        task.await.unwrap();
        assert_eq!(telemetry.read("d1").await, Position::new(1.0, 2.0));
    }
}
