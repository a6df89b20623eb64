//! fleetnav Shared Protocol Types
//!
//! This crate provides the wire types, JSON codec, topic naming and mission
//! state machine shared by the navigation manager and the waypoint server.

pub mod codec;
pub mod state_machine;
pub mod topics;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in seconds since Unix epoch (fractional)
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Default mission parameters
pub mod defaults {
    /// Delay before retrying a failed fetch or publish
    pub const RETRY_DELAY_MS: u64 = 5000;

    /// Upper bound for backed-off retry delays
    pub const MAX_RETRY_DELAY_MS: u64 = 30000;

    /// Interval between telemetry checks while monitoring a go-to
    pub const POLL_INTERVAL_MS: u64 = 1000;

    /// Per-axis arrival tolerance in degrees
    pub const ARRIVAL_THRESHOLD_DEG: f64 = 0.001;

    /// Cruise speed sent with every go-to command (m/s)
    pub const GOTO_SPEED_MPS: f64 = 10.0;

    /// Return-to-home altitude sent with every go-to command (m)
    pub const RTH_HEIGHT_M: f64 = 40.0;

    /// How long shutdown keeps retrying return-to-home publishes
    pub const SHUTDOWN_GRACE_MS: u64 = 10000;

    /// After a go-to, a completion report with no prior progress report is
    /// taken as a repeat of the previous completion for this long
    pub const COMPLETION_SETTLE_MS: u64 = 2000;
}

/// A navigation target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub height: f64,
}

/// A waypoint handed to one device, tagged with its fleet-wide ordinal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaypointAssignment {
    pub waypoint: Waypoint,
    pub sequence: u64,
}

/// Last known horizontal position of a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    /// Placeholder reported before any telemetry has arrived
    pub const UNKNOWN: Position = Position {
        latitude: -1.0,
        longitude: -1.0,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether this is a real fix rather than the placeholder
    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN && self.latitude.is_finite() && self.longitude.is_finite()
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Body of `GET /waypoints[/{device_id}]`
///
/// Both fields are nullable; a response lacking either one means no waypoint
/// is available yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaypointResponse {
    #[serde(default)]
    pub waypoint: Option<Waypoint>,
    #[serde(default)]
    pub waypoint_no: Option<u64>,
}

impl WaypointResponse {
    pub fn exhausted() -> Self {
        Self::default()
    }

    /// Convert into an assignment, if both fields are present
    pub fn into_assignment(self) -> Option<WaypointAssignment> {
        match (self.waypoint, self.waypoint_no) {
            (Some(waypoint), Some(sequence)) => Some(WaypointAssignment { waypoint, sequence }),
            _ => None,
        }
    }
}

/// Body of `GET /devices/{device_id}/{index}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedWaypointResponse {
    pub device_id: String,
    #[serde(default)]
    pub waypoint: Option<Waypoint>,
}

/// Body of `POST /waypoints`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSetup {
    pub devices: Vec<String>,
    #[serde(default)]
    pub waypoints: HashMap<String, Vec<Waypoint>>,
    /// Per-waypoint response delays in seconds
    #[serde(default)]
    pub delays: HashMap<String, Vec<f64>>,
}

/// Response to `POST /waypoints`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupResponse {
    pub message: String,
}

/// Inbound `global_position` telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalPositionMessage {
    pub position: Position,
}

/// Inbound `go_to_location_state` report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoToStateMessage {
    pub state: i64,
}

/// Interpreted go-to status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoToStatus {
    /// Device reports the go-to finished
    Complete,
    /// Device aborted the go-to
    Aborted,
    /// Any other progress code
    Other(i64),
}

impl GoToStatus {
    pub const COMPLETE_CODE: i64 = 2;
    pub const ABORTED_CODE: i64 = 4;
}

impl From<i64> for GoToStatus {
    fn from(code: i64) -> Self {
        match code {
            Self::COMPLETE_CODE => GoToStatus::Complete,
            Self::ABORTED_CODE => GoToStatus::Aborted,
            other => GoToStatus::Other(other),
        }
    }
}

impl From<GoToStateMessage> for GoToStatus {
    fn from(msg: GoToStateMessage) -> Self {
        msg.state.into()
    }
}

/// Parameters of a go-to command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoToData {
    pub latitude: f64,
    pub longitude: f64,
    pub height: f64,
    pub speed: f64,
    pub flight_id: String,
    pub rth_height: f64,
}

/// Empty object payload (`{}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Empty {}

/// Outbound command request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest<T> {
    pub timestamp: f64,
    pub job_id: String,
    pub data: T,
}

pub type GoToRequest = CommandRequest<GoToData>;
pub type RthRequest = CommandRequest<Empty>;

/// Builder helpers for creating command requests
impl GoToRequest {
    /// Create a go-to request for a device
    pub fn go_to(device_id: &str, waypoint: &Waypoint, speed: f64, rth_height: f64) -> Self {
        let timestamp = now_secs();
        Self {
            timestamp,
            job_id: format!("Job-{}", device_id),
            data: GoToData {
                latitude: waypoint.latitude,
                longitude: waypoint.longitude,
                height: waypoint.height,
                speed,
                flight_id: format!("{}+{}", device_id, timestamp),
                rth_height,
            },
        }
    }
}

impl RthRequest {
    /// Create a return-to-home request for a device
    pub fn return_to_home(device_id: &str) -> Self {
        Self {
            timestamp: now_secs(),
            job_id: format!("Job-{}-RTDS", device_id),
            data: Empty {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_position_is_not_known() {
        assert!(!Position::UNKNOWN.is_known());
        assert!(!Position::default().is_known());
        assert!(Position::new(18.5674, 73.7716).is_known());
        assert!(!Position::new(f64::NAN, 73.0).is_known());
    }

    #[test]
    fn test_waypoint_response_requires_both_fields() {
        let wp = Waypoint {
            latitude: 1.0,
            longitude: 2.0,
            height: 30.0,
        };

        let full = WaypointResponse {
            waypoint: Some(wp),
            waypoint_no: Some(3),
        };
        assert_eq!(
            full.into_assignment(),
            Some(WaypointAssignment {
                waypoint: wp,
                sequence: 3
            })
        );

        let missing_no = WaypointResponse {
            waypoint: Some(wp),
            waypoint_no: None,
        };
        assert_eq!(missing_no.into_assignment(), None);
        assert_eq!(WaypointResponse::exhausted().into_assignment(), None);
    }

    #[test]
    fn test_go_to_status_codes() {
        assert_eq!(GoToStatus::from(2), GoToStatus::Complete);
        assert_eq!(GoToStatus::from(4), GoToStatus::Aborted);
        assert_eq!(GoToStatus::from(1), GoToStatus::Other(1));
    }

    #[test]
    fn test_go_to_request_ids() {
        let wp = Waypoint {
            latitude: 18.56,
            longitude: 73.77,
            height: 30.0,
        };
        let req = GoToRequest::go_to("drone-1", &wp, 5.0, 50.0);
        assert_eq!(req.job_id, "Job-drone-1");
        assert!(req.data.flight_id.starts_with("drone-1+"));
        assert_eq!(req.data.speed, 5.0);
        assert_eq!(req.data.rth_height, 50.0);
        assert_eq!(req.data.height, 30.0);

        let rth = RthRequest::return_to_home("drone-1");
        assert_eq!(rth.job_id, "Job-drone-1-RTDS");
        assert!(rth.timestamp > 0.0);
    }
}
