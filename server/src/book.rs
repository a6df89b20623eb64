//! In-memory waypoint book
//!
//! Holds the per-device waypoint lists pushed by `POST /waypoints` and hands
//! them out in order. Every waypoint issued through the stateful endpoints gets
//! a `waypoint_no` that is unique across the whole fleet.

use fleetnav_shared::{FleetSetup, Waypoint};
use std::collections::HashMap;
use std::time::Duration;

/// A waypoint handed out by the book
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Issued {
    pub waypoint: Waypoint,
    pub waypoint_no: u64,
    /// How long to hold the response before sending it
    pub delay: Duration,
}

#[derive(Debug, Default)]
pub struct WaypointBook {
    devices: Vec<String>,
    waypoints: HashMap<String, Vec<Waypoint>>,
    delays: HashMap<String, Vec<f64>>,
    /// Next index per device for `GET /waypoints/{device_id}`
    cursors: HashMap<String, usize>,
    /// Next index into the flattened pool for `GET /waypoints`
    pool_cursor: usize,
    next_waypoint_no: u64,
}

impl WaypointBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the book contents and rewind every cursor
    pub fn setup(&mut self, setup: FleetSetup) {
        self.devices = setup.devices;
        self.waypoints = setup.waypoints;
        self.delays = setup.delays;
        self.cursors.clear();
        self.pool_cursor = 0;
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Total number of waypoints across all devices
    pub fn total_waypoints(&self) -> usize {
        self.waypoints.values().map(Vec::len).sum()
    }

    /// Next waypoint for a device, advancing its cursor
    pub fn next_for_device(&mut self, device_id: &str) -> Option<Issued> {
        let index = self.cursors.get(device_id).copied().unwrap_or(0);
        let waypoint = *self.waypoints.get(device_id)?.get(index)?;
        let delay = self.delay_for(device_id, index);

        self.cursors.insert(device_id.to_string(), index + 1);
        Some(self.issue(waypoint, delay))
    }

    /// Next waypoint from the shared pool (devices in setup order)
    pub fn next_from_pool(&mut self) -> Option<Issued> {
        let (device_id, index) = self.pool_slot(self.pool_cursor)?;
        let waypoint = self.waypoints[&device_id][index];
        let delay = self.delay_for(&device_id, index);

        self.pool_cursor += 1;
        Some(self.issue(waypoint, delay))
    }

    /// Waypoint at a fixed index, without touching any cursor
    pub fn at_index(&self, device_id: &str, index: usize) -> Option<(Waypoint, Duration)> {
        let waypoint = *self.waypoints.get(device_id)?.get(index)?;
        Some((waypoint, self.delay_for(device_id, index)))
    }

    fn issue(&mut self, waypoint: Waypoint, delay: Duration) -> Issued {
        self.next_waypoint_no += 1;
        Issued {
            waypoint,
            waypoint_no: self.next_waypoint_no,
            delay,
        }
    }

    fn pool_slot(&self, mut position: usize) -> Option<(String, usize)> {
        for device_id in &self.devices {
            let len = self.waypoints.get(device_id).map(Vec::len).unwrap_or(0);
            if position < len {
                return Some((device_id.clone(), position));
            }
            position -= len;
        }
        None
    }

    fn delay_for(&self, device_id: &str, index: usize) -> Duration {
        self.delays
            .get(device_id)
            .and_then(|d| d.get(index))
            .and_then(|secs| Duration::try_from_secs_f64(*secs).ok())
            .unwrap_or_default()
    }
}
