//! Mission Controller
//!
//! Drives one device through FETCHING, DISPATCHING, MONITORING and back until
//! its waypoints run out or shutdown is requested. Every wait observes the
//! shutdown signal.

use fleetnav_shared::state_machine::{
    MissionEvent, MissionPhase, MissionStateMachine, TransitionResult,
};
use fleetnav_shared::{GoToStatus, Waypoint, WaypointAssignment};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::arrival::ArrivalThreshold;
use crate::command::CommandPublisher;
use crate::config::{DeviceConfig, MissionConfig};
use crate::retry::Backoff;
use crate::shutdown::Shutdown;
use crate::telemetry::TelemetryCache;
use crate::waypoint::{FetchOutcome, Registration, WaypointSourceAdapter};

#[derive(Debug, Clone)]
pub struct MissionTiming {
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub monitor_timeout: Option<Duration>,
    /// Window after a go-to in which a bare completion report is a repeat
    pub completion_settle: Duration,
}

impl From<&MissionConfig> for MissionTiming {
    fn from(config: &MissionConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            retry_delay: config.retry_delay(),
            max_retry_delay: config.max_retry_delay(),
            monitor_timeout: config.monitor_timeout(),
            completion_settle: config.completion_settle(),
        }
    }
}

/// Collaborators shared by every controller in the fleet
pub struct MissionContext {
    pub adapter: WaypointSourceAdapter,
    pub publisher: CommandPublisher,
    pub telemetry: Arc<TelemetryCache>,
    pub arrival: ArrivalThreshold,
    pub timing: MissionTiming,
}

/// Observable state of one device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub id: String,
    pub mission_phase: MissionPhase,
    pub goal_waypoint: Option<Waypoint>,
    pub last_assigned_sequence: Option<u64>,
    pub waypoints_completed: usize,
}

impl DeviceState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mission_phase: MissionPhase::Fetching,
            goal_waypoint: None,
            last_assigned_sequence: None,
            waypoints_completed: 0,
        }
    }
}

pub type DeviceHandle = Arc<RwLock<DeviceState>>;

enum Step {
    Event(MissionEvent),
    Cancelled,
}

pub struct MissionController {
    device_id: String,
    /// Return home after this many arrivals
    waypoint_limit: Option<usize>,
    fsm: MissionStateMachine,
    current: Option<WaypointAssignment>,
    last_sequence: Option<u64>,
    waypoints_completed: usize,
    state: DeviceHandle,
    ctx: Arc<MissionContext>,
    status_rx: mpsc::Receiver<GoToStatus>,
    shutdown: Shutdown,
    backoff: Backoff,
}

impl MissionController {
    pub fn new(
        device: &DeviceConfig,
        ctx: Arc<MissionContext>,
        status_rx: mpsc::Receiver<GoToStatus>,
        shutdown: Shutdown,
    ) -> Self {
        let backoff = Backoff::new(ctx.timing.retry_delay, ctx.timing.max_retry_delay);
        Self {
            device_id: device.id.clone(),
            waypoint_limit: device.waypoint_count,
            fsm: MissionStateMachine::new(),
            current: None,
            last_sequence: None,
            waypoints_completed: 0,
            state: Arc::new(RwLock::new(DeviceState::new(device.id.clone()))),
            ctx,
            status_rx,
            shutdown,
            backoff,
        }
    }

    pub fn handle(&self) -> DeviceHandle {
        self.state.clone()
    }

    /// Run until TERMINATED, or until shutdown leaves the device in RETURNING
    pub async fn run(mut self) -> MissionPhase {
        info!("[MISSION] {} starting", self.device_id);

        loop {
            let step = match self.fsm.phase() {
                MissionPhase::Terminated => break,
                MissionPhase::Fetching => self.fetch().await,
                MissionPhase::Dispatching => self.dispatch().await,
                MissionPhase::Monitoring => self.monitor().await,
                MissionPhase::Arrived => self.complete_waypoint(),
                MissionPhase::Failed => self.retry_goal(),
                MissionPhase::Returning => self.return_to_home().await,
            };

            match step {
                Step::Event(event) => self.apply(event).await,
                Step::Cancelled => {
                    self.abandon();
                    self.apply(MissionEvent::ReturnRequested).await;
                    info!("[MISSION] {} stopped by shutdown", self.device_id);
                    break;
                }
            }
        }

        self.fsm.phase()
    }

    async fn fetch(&mut self) -> Step {
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.recv() => return Step::Cancelled,
            outcome = self.ctx.adapter.fetch_next(&self.device_id) => outcome,
        };

        let wait = match outcome {
            Ok(FetchOutcome::Accepted(assignment)) => {
                self.backoff.reset();
                self.current = Some(assignment);
                self.last_sequence = Some(assignment.sequence);
                return Step::Event(MissionEvent::AssignmentAccepted);
            }
            Ok(FetchOutcome::Stale { sequence, holder }) => {
                debug!(
                    "[MISSION] {} skipping waypoint {}, in flight on {}",
                    self.device_id, sequence, holder
                );
                self.ctx.timing.poll_interval
            }
            Ok(FetchOutcome::Empty) => {
                debug!("[MISSION] No waypoint for {} yet", self.device_id);
                self.ctx.timing.retry_delay
            }
            Err(e) => {
                warn!("[MISSION] {} fetch failed: {}", self.device_id, e);
                self.backoff.next_delay()
            }
        };

        if !self.shutdown.sleep(wait).await {
            return Step::Cancelled;
        }
        Step::Event(MissionEvent::FetchRetry)
    }

    async fn dispatch(&mut self) -> Step {
        let Some(assignment) = self.current else {
            error!("[MISSION] {} dispatching without a goal", self.device_id);
            return Step::Event(MissionEvent::ReturnRequested);
        };

        // Reports from an earlier go-to must not complete this one
        while self.status_rx.try_recv().is_ok() {}

        let published = tokio::select! {
            biased;
            _ = self.shutdown.recv() => return Step::Cancelled,
            published = self.ctx.publisher.go_to(&self.device_id, &assignment.waypoint) => published,
        };

        match published {
            Ok(()) => {
                self.backoff.reset();
                Step::Event(MissionEvent::CommandPublished)
            }
            Err(e) => {
                warn!("[MISSION] {} go-to publish failed: {}", self.device_id, e);
                self.retry_after_backoff(MissionEvent::PublishFailed).await
            }
        }
    }

    async fn monitor(&mut self) -> Step {
        let Some(goal) = self.current.map(|a| a.waypoint) else {
            error!("[MISSION] {} monitoring without a goal", self.device_id);
            return Step::Event(MissionEvent::ReturnRequested);
        };

        let started = Instant::now();
        let deadline = self.ctx.timing.monitor_timeout.map(|t| started + t);
        let settled = started + self.ctx.timing.completion_settle;
        let mut ticker = interval(self.ctx.timing.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut status_open = true;
        // Set once the device reports progress on this go-to
        let mut acknowledged = false;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.recv() => return Step::Cancelled,
                status = self.status_rx.recv(), if status_open => match status {
                    Some(GoToStatus::Complete) => {
                        if acknowledged || Instant::now() >= settled {
                            info!("[MISSION] {} reports go-to complete", self.device_id);
                            return Step::Event(MissionEvent::ArrivalConfirmed);
                        }
                        debug!(
                            "[MISSION] {} completion before progress, treating as repeat",
                            self.device_id
                        );
                    }
                    Some(GoToStatus::Aborted) => {
                        warn!("[MISSION] {} aborted go-to", self.device_id);
                        return Step::Event(MissionEvent::AbortReceived);
                    }
                    Some(GoToStatus::Other(code)) => {
                        debug!("[MISSION] {} go-to state {}", self.device_id, code);
                        acknowledged = true;
                    }
                    None => status_open = false,
                },
                _ = ticker.tick() => {
                    let position = self.ctx.telemetry.read(&self.device_id).await;
                    if self.ctx.arrival.is_arrived(&goal, &position) {
                        info!(
                            "[MISSION] {} at ({}, {})",
                            self.device_id, position.latitude, position.longitude
                        );
                        return Step::Event(MissionEvent::ArrivalConfirmed);
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        warn!("[MISSION] {} did not arrive in time", self.device_id);
                        return Step::Event(MissionEvent::MonitorTimedOut);
                    }
                }
            }
        }
    }

    fn complete_waypoint(&mut self) -> Step {
        if let Some(done) = self.current.take() {
            self.ctx.adapter.release(&self.device_id, done.sequence);
            self.waypoints_completed += 1;
            info!(
                "[MISSION] {} completed waypoint {} ({} so far)",
                self.device_id, done.sequence, self.waypoints_completed
            );
        }

        match self.waypoint_limit {
            Some(limit) if self.waypoints_completed >= limit => {
                Step::Event(MissionEvent::FinalWaypointReached)
            }
            _ => Step::Event(MissionEvent::NextWaypoint),
        }
    }

    fn retry_goal(&mut self) -> Step {
        if let Some(goal) = self.current {
            // The failed attempt ends here; the retry claims the sequence anew
            self.ctx.adapter.release(&self.device_id, goal.sequence);
            if let Registration::Conflict { holder } =
                self.ctx.adapter.reacquire(&self.device_id, goal.sequence)
            {
                warn!(
                    "[MISSION] {} re-sending waypoint {} now held by {}",
                    self.device_id, goal.sequence, holder
                );
            }
        }
        Step::Event(MissionEvent::Redispatch)
    }

    async fn return_to_home(&mut self) -> Step {
        let published = tokio::select! {
            biased;
            _ = self.shutdown.recv() => return Step::Cancelled,
            published = self.ctx.publisher.return_to_home(&self.device_id) => published,
        };

        match published {
            Ok(()) => Step::Event(MissionEvent::ReturnPublished),
            Err(e) => {
                warn!("[MISSION] {} return-to-home publish failed: {}", self.device_id, e);
                self.retry_after_backoff(MissionEvent::PublishFailed).await
            }
        }
    }

    async fn retry_after_backoff(&mut self, event: MissionEvent) -> Step {
        let delay = self.backoff.next_delay();
        if self.shutdown.sleep(delay).await {
            Step::Event(event)
        } else {
            Step::Cancelled
        }
    }

    /// Drop the in-flight claim so the registry holds nothing for this device
    fn abandon(&mut self) {
        if let Some(assignment) = self.current.take() {
            self.ctx.adapter.release(&self.device_id, assignment.sequence);
            debug!(
                "[MISSION] {} abandoned waypoint {}",
                self.device_id, assignment.sequence
            );
        }
    }

    async fn apply(&mut self, event: MissionEvent) {
        let from = self.fsm.phase();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) => {
                if from != to {
                    info!("[MISSION] {}: {} -> {}", self.device_id, from, to);
                }
            }
            TransitionResult::Invalid { from, event } => {
                error!(
                    "[MISSION] {}: {:?} is not valid in {}, returning home",
                    self.device_id, event, from
                );
                self.abandon();
                self.fsm.process_event(MissionEvent::ReturnRequested);
            }
        }

        let mut state = self.state.write().await;
        state.mission_phase = self.fsm.phase();
        state.goal_waypoint = self.current.map(|a| a.waypoint);
        state.last_assigned_sequence = self.last_sequence;
        state.waypoints_completed = self.waypoints_completed;
    }
}
