//! Test doubles for the bus and the waypoint source

use async_trait::async_trait;
use fleetnav_shared::state_machine::MissionPhase;
use fleetnav_shared::topics::Topics;
use fleetnav_shared::{Waypoint, WaypointAssignment};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::command::CommandPublisher;
use crate::connection::{Bus, BusError};
use crate::mission::{ArrivalThreshold, DeviceHandle, MissionContext, MissionTiming};
use crate::telemetry::{StatusBoard, TelemetryCache};
use crate::waypoint::{AssignmentRegistry, FetchError, WaypointSource, WaypointSourceAdapter};

pub const GO_TO: &str = "navigation/go_to_location/request";
pub const RTH: &str = "navigation/rth/request";

pub fn waypoint(lat: f64) -> Waypoint {
    Waypoint {
        latitude: lat,
        longitude: 73.7716,
        height: 30.0,
    }
}

pub fn assignment(sequence: u64, lat: f64) -> WaypointAssignment {
    WaypointAssignment {
        waypoint: waypoint(lat),
        sequence,
    }
}

/// Bus that records every publish instead of sending it
#[derive(Default)]
pub struct RecordingBus {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    failing: AtomicBool,
    disconnected: AtomicBool,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail with `NotConnected`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, payload)| (topic.clone(), serde_json::from_slice(payload).unwrap()))
            .collect()
    }

    /// Number of publishes on topics ending with `suffix`
    pub fn count(&self, suffix: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(topic, _)| topic.ends_with(suffix))
            .count()
    }

    pub fn count_for(&self, device_id: &str, suffix: &str) -> usize {
        self.count(&format!("/{}/{}", device_id, suffix))
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bus for RecordingBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::NotConnected);
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

type Scripted = Result<Option<WaypointAssignment>, FetchError>;

/// Waypoint source replaying queued responses per device, then `None`
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    fetches: Mutex<HashMap<String, usize>>,
    observed: Mutex<Option<Arc<AssignmentRegistry>>>,
    registry_sizes: Mutex<Vec<usize>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, device_id: &str, response: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(device_id.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn fetch_count(&self, device_id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(device_id)
            .copied()
            .unwrap_or(0)
    }

    /// Record the registry size at every fetch
    pub fn observe(&self, registry: Arc<AssignmentRegistry>) {
        *self.observed.lock().unwrap() = Some(registry);
    }

    pub fn registry_sizes(&self) -> Vec<usize> {
        self.registry_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl WaypointSource for ScriptedSource {
    async fn fetch(&self, device_id: &str) -> Result<Option<WaypointAssignment>, FetchError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(device_id.to_string())
            .or_default() += 1;

        if let Some(registry) = self.observed.lock().unwrap().as_ref() {
            self.registry_sizes.lock().unwrap().push(registry.len());
        }

        self.scripts
            .lock()
            .unwrap()
            .get_mut(device_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(None))
    }
}

/// Everything a controller needs, wired to test doubles
pub struct TestRig {
    pub bus: Arc<RecordingBus>,
    pub source: Arc<ScriptedSource>,
    pub registry: Arc<AssignmentRegistry>,
    pub telemetry: Arc<TelemetryCache>,
    pub status: StatusBoard,
    pub ctx: Arc<MissionContext>,
}

impl TestRig {
    pub fn new() -> Self {
        Self::with_monitor_timeout(None)
    }

    pub fn with_monitor_timeout(monitor_timeout: Option<Duration>) -> Self {
        Self::with_timing(MissionTiming {
            monitor_timeout,
            ..Self::timing()
        })
    }

    pub fn with_completion_settle(completion_settle: Duration) -> Self {
        Self::with_timing(MissionTiming {
            completion_settle,
            ..Self::timing()
        })
    }

    /// Fast timing; completion reports count immediately
    pub fn timing() -> MissionTiming {
        MissionTiming {
            poll_interval: Duration::from_millis(5),
            retry_delay: Duration::from_millis(5),
            max_retry_delay: Duration::from_millis(20),
            monitor_timeout: None,
            completion_settle: Duration::ZERO,
        }
    }

    pub fn with_timing(timing: MissionTiming) -> Self {
        let bus = Arc::new(RecordingBus::new());
        let source = Arc::new(ScriptedSource::new());
        let registry = Arc::new(AssignmentRegistry::new());
        let telemetry = Arc::new(TelemetryCache::new());

        let ctx = Arc::new(MissionContext {
            adapter: WaypointSourceAdapter::new(source.clone(), registry.clone()),
            publisher: CommandPublisher::new(bus.clone(), Topics::new("org"), 10.0, 40.0),
            telemetry: telemetry.clone(),
            arrival: ArrivalThreshold::new(0.001, 0.001),
            timing,
        });

        Self {
            bus,
            source,
            registry,
            telemetry,
            status: StatusBoard::new(),
            ctx,
        }
    }
}

/// Poll `condition` until it holds, panicking after five seconds
pub async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

pub async fn wait_for_phase(handle: &DeviceHandle, phase: MissionPhase) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.read().await.mission_phase != phase {
        assert!(Instant::now() < deadline, "timed out waiting for {}", phase);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
