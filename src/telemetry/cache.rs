//! Telemetry Cache
//!
//! Holds the last reported position of every device. Written only by the
//! inbound router, read by mission controllers while monitoring.

use fleetnav_shared::Position;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct TelemetryCache {
    positions: RwLock<HashMap<String, Position>>,
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a device's position
    pub async fn update(&self, device_id: &str, position: Position) {
        self.positions
            .write()
            .await
            .insert(device_id.to_string(), position);
    }

    /// Last known position, or [`Position::UNKNOWN`] before any report
    pub async fn read(&self, device_id: &str) -> Position {
        self.positions
            .read()
            .await
            .get(device_id)
            .copied()
            .unwrap_or(Position::UNKNOWN)
    }
}
