//! Command Publisher
//!
//! Translates mission decisions into bus requests for a device.

use fleetnav_shared::codec;
use fleetnav_shared::topics::Topics;
use fleetnav_shared::{GoToRequest, RthRequest, Waypoint};
use std::sync::Arc;
use tracing::{debug, info};

use crate::connection::{Bus, BusError};

/// Publishes navigation commands to devices
pub struct CommandPublisher {
    bus: Arc<dyn Bus>,
    topics: Topics,
    /// Cruise speed sent with every go-to (m/s)
    speed: f64,
    /// Return-to-home altitude sent with every go-to (m)
    rth_height: f64,
}

impl CommandPublisher {
    pub fn new(bus: Arc<dyn Bus>, topics: Topics, speed: f64, rth_height: f64) -> Self {
        Self {
            bus,
            topics,
            speed,
            rth_height,
        }
    }

    /// Send a device to a waypoint
    pub async fn go_to(&self, device_id: &str, waypoint: &Waypoint) -> Result<(), BusError> {
        let request = GoToRequest::go_to(device_id, waypoint, self.speed, self.rth_height);
        let payload = codec::encode(&request)?;

        debug!("[CMD] go-to {} flight_id={}", device_id, request.data.flight_id);
        self.bus
            .publish(&self.topics.go_to_request(device_id), payload)
            .await?;

        info!(
            "[CMD] Sent {} to ({}, {}) at {}m",
            device_id, waypoint.latitude, waypoint.longitude, waypoint.height
        );
        Ok(())
    }

    /// Order a device home
    pub async fn return_to_home(&self, device_id: &str) -> Result<(), BusError> {
        let payload = codec::encode(&RthRequest::return_to_home(device_id))?;
        self.bus
            .publish(&self.topics.rth_request(device_id), payload)
            .await?;

        info!("[CMD] Sent {} home", device_id);
        Ok(())
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }
}
