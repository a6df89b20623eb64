//! Mission State Machine
//!
//! Defines the phases a device moves through while working a waypoint
//! mission and the only transitions allowed between them.

use std::fmt;

/// Phase of a device's mission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissionPhase {
    /// Requesting the next waypoint
    Fetching,
    /// Publishing the go-to command for the current goal
    Dispatching,
    /// Waiting for arrival or an abort report
    Monitoring,
    /// Goal reached, assignment about to be released
    Arrived,
    /// Go-to aborted or timed out, goal will be re-sent
    Failed,
    /// Publishing return-to-home
    Returning,
    /// Return-to-home published, mission over
    Terminated,
}

impl MissionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionPhase::Terminated)
    }
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissionPhase::Fetching => "FETCHING",
            MissionPhase::Dispatching => "DISPATCHING",
            MissionPhase::Monitoring => "MONITORING",
            MissionPhase::Arrived => "ARRIVED",
            MissionPhase::Failed => "FAILED",
            MissionPhase::Returning => "RETURNING",
            MissionPhase::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// Events that can trigger phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionEvent {
    /// Waypoint source returned an assignment the registry accepted
    AssignmentAccepted,
    /// Fetch failed, was stale, or returned nothing
    FetchRetry,
    /// Command reached the bus
    CommandPublished,
    /// Command could not be handed to the bus
    PublishFailed,
    /// Telemetry or a completion report confirmed arrival
    ArrivalConfirmed,
    /// Device reported the go-to as aborted
    AbortReceived,
    /// Monitoring exceeded its configured timeout
    MonitorTimedOut,
    /// Assignment released, more waypoints to fly
    NextWaypoint,
    /// Assignment released, that was the last configured waypoint
    FinalWaypointReached,
    /// Failed goal is about to be re-sent
    Redispatch,
    /// Shutdown requested
    ReturnRequested,
    /// Return-to-home command reached the bus
    ReturnPublished,
}

/// Result of a transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and the phase changed (or stayed, for retries)
    Success(MissionPhase),
    /// Transition was invalid from the current phase
    Invalid { from: MissionPhase, event: MissionEvent },
}

/// Per-device mission state machine
#[derive(Debug)]
pub struct MissionStateMachine {
    current_phase: MissionPhase,
}

impl Default for MissionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionStateMachine {
    /// Create a new state machine in the Fetching phase
    pub fn new() -> Self {
        Self {
            current_phase: MissionPhase::Fetching,
        }
    }

    /// Get current phase
    pub fn phase(&self) -> MissionPhase {
        self.current_phase
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: MissionEvent) -> TransitionResult {
        match next_phase(self.current_phase, event) {
            Some(phase) => {
                self.current_phase = phase;
                TransitionResult::Success(phase)
            }
            None => TransitionResult::Invalid {
                from: self.current_phase,
                event,
            },
        }
    }
}

/// Get the next phase for a given event, if the transition is valid
fn next_phase(from: MissionPhase, event: MissionEvent) -> Option<MissionPhase> {
    use MissionEvent::*;
    use MissionPhase::*;

    match (from, event) {
        // Nothing leaves Terminated
        (Terminated, _) => None,

        // Shutdown can interrupt any live phase
        (_, ReturnRequested) => Some(Returning),

        // From Fetching
        (Fetching, AssignmentAccepted) => Some(Dispatching),
        (Fetching, FetchRetry) => Some(Fetching),

        // From Dispatching
        (Dispatching, CommandPublished) => Some(Monitoring),
        (Dispatching, PublishFailed) => Some(Dispatching),

        // From Monitoring
        (Monitoring, ArrivalConfirmed) => Some(Arrived),
        (Monitoring, AbortReceived | MonitorTimedOut) => Some(Failed),

        // From Arrived
        (Arrived, NextWaypoint) => Some(Fetching),
        (Arrived, FinalWaypointReached) => Some(Returning),

        // From Failed - same goal goes out again
        (Failed, Redispatch) => Some(Dispatching),

        // From Returning
        (Returning, PublishFailed) => Some(Returning),
        (Returning, ReturnPublished) => Some(Terminated),

        // Invalid transition
        _ => None,
    }
}

/// Check if a transition from one phase to another is valid
pub fn is_valid_transition(from: MissionPhase, to: MissionPhase) -> bool {
    use MissionPhase::*;

    match (from, to) {
        (Terminated, _) => false,

        // Retried phases
        (Fetching, Fetching) | (Dispatching, Dispatching) | (Returning, Returning) => true,

        (_, Returning) => true,

        (Fetching, Dispatching) => true,
        (Dispatching, Monitoring) => true,
        (Monitoring, Arrived) => true,
        (Monitoring, Failed) => true,
        (Arrived, Fetching) => true,
        (Failed, Dispatching) => true,
        (Returning, Terminated) => true,

        _ => false,
    }
}
