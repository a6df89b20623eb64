//! Waypoint Source Adapter
//!
//! Fetches from the configured source and registers the result, so a
//! sequence already in flight on another device is never handed out twice.

use fleetnav_shared::WaypointAssignment;
use std::sync::Arc;
use tracing::info;

use super::registry::{AssignmentRegistry, Registration};
use super::source::{FetchError, WaypointSource};

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Registered to the requesting device
    Accepted(WaypointAssignment),
    /// Sequence is in flight on another device
    Stale { sequence: u64, holder: String },
    /// Source has nothing for this device right now
    Empty,
}

#[derive(Clone)]
pub struct WaypointSourceAdapter {
    source: Arc<dyn WaypointSource>,
    registry: Arc<AssignmentRegistry>,
}

impl WaypointSourceAdapter {
    pub fn new(source: Arc<dyn WaypointSource>, registry: Arc<AssignmentRegistry>) -> Self {
        Self { source, registry }
    }

    pub async fn fetch_next(&self, device_id: &str) -> Result<FetchOutcome, FetchError> {
        let Some(assignment) = self.source.fetch(device_id).await? else {
            return Ok(FetchOutcome::Empty);
        };

        match self.registry.try_register(assignment.sequence, device_id) {
            Registration::Accepted | Registration::AlreadyHeld => {
                info!(
                    "[SOURCE] {} assigned waypoint {}: {:?}",
                    device_id, assignment.sequence, assignment.waypoint
                );
                Ok(FetchOutcome::Accepted(assignment))
            }
            Registration::Conflict { holder } => Ok(FetchOutcome::Stale {
                sequence: assignment.sequence,
                holder,
            }),
        }
    }

    /// Drop the device's claim on a sequence
    pub fn release(&self, device_id: &str, sequence: u64) -> bool {
        self.registry.release(sequence, device_id)
    }

    /// Claim a sequence again without going through the source
    pub fn reacquire(&self, device_id: &str, sequence: u64) -> Registration {
        self.registry.try_register(sequence, device_id)
    }

    /// No sequence is claimed by any device
    pub fn is_idle(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }
}
