//! Fleet Orchestrator
//!
//! Owns one mission controller task per device. On shutdown it stops every
//! controller, orders the whole fleet home and closes the bus session.

use fleetnav_shared::state_machine::MissionPhase;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::config::DeviceConfig;
use crate::mission::{DeviceHandle, DeviceState, MissionContext, MissionController};
use crate::retry::Backoff;
use crate::shutdown::{self, ShutdownTrigger};
use crate::telemetry::StatusBoard;

/// Which devices acknowledged the final return-to-home publish
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ShutdownReport {
    pub returned: Vec<String>,
    pub unconfirmed: Vec<String>,
}

pub struct FleetOrchestrator {
    ctx: Arc<MissionContext>,
    status: StatusBoard,
    devices: Vec<(String, DeviceHandle)>,
    tasks: JoinSet<(String, MissionPhase)>,
    trigger: ShutdownTrigger,
    shutdown_grace: Duration,
}

impl FleetOrchestrator {
    pub fn new(ctx: Arc<MissionContext>, status: StatusBoard, shutdown_grace: Duration) -> Self {
        let (trigger, _) = shutdown::channel();
        Self {
            ctx,
            status,
            devices: Vec::new(),
            tasks: JoinSet::new(),
            trigger,
            shutdown_grace,
        }
    }

    /// Spawn a controller per device
    pub fn start(&mut self, devices: &[DeviceConfig]) {
        for device in devices {
            let status_rx = self.status.register(&device.id);
            let controller = MissionController::new(
                device,
                self.ctx.clone(),
                status_rx,
                self.trigger.subscribe(),
            );
            self.devices.push((device.id.clone(), controller.handle()));

            let device_id = device.id.clone();
            self.tasks
                .spawn(async move { (device_id, controller.run().await) });
        }
        info!("[FLEET] Started {} mission controllers", devices.len());
    }

    pub async fn snapshot(&self) -> Vec<DeviceState> {
        let mut states = Vec::with_capacity(self.devices.len());
        for (_, handle) in &self.devices {
            states.push(handle.read().await.clone());
        }
        states
    }

    /// Resolves once every controller has finished
    pub async fn wait_all(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((device_id, phase)) => info!("[FLEET] {} finished in {}", device_id, phase),
                Err(e) => error!("[FLEET] Mission controller failed: {}", e),
            }
        }
    }

    /// Stop all controllers, publish return-to-home to every device, disconnect
    ///
    /// Return-to-home publishes are retried until they succeed or the grace
    /// period runs out.
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!("[FLEET] Shutting down {} devices", self.devices.len());
        for state in self.snapshot().await {
            info!(
                "[FLEET] {} in {}, {} waypoints done, goal {:?} (sequence {:?})",
                state.id,
                state.mission_phase,
                state.waypoints_completed,
                state.goal_waypoint,
                state.last_assigned_sequence
            );
        }
        let deadline = Instant::now() + self.shutdown_grace;

        self.trigger.trigger();
        if timeout_at(deadline, self.wait_all()).await.is_err() {
            warn!("[FLEET] Controllers did not stop in time, aborting");
            self.tasks.abort_all();
        }
        if !self.ctx.adapter.is_idle() {
            warn!(
                "[FLEET] {} waypoints still claimed after controllers stopped",
                self.ctx.adapter.in_flight()
            );
        }

        let results = join_all(
            self.devices
                .iter()
                .map(|(device_id, handle)| self.send_home(device_id, handle, deadline)),
        )
        .await;

        let mut report = ShutdownReport::default();
        for ((device_id, _), returned) in self.devices.iter().zip(results) {
            if returned {
                report.returned.push(device_id.clone());
            } else {
                report.unconfirmed.push(device_id.clone());
            }
        }
        if !report.unconfirmed.is_empty() {
            error!(
                "[FLEET] Return-to-home not published for: {}",
                report.unconfirmed.join(", ")
            );
        }

        if let Err(e) = self.ctx.publisher.bus().disconnect().await {
            warn!("[FLEET] Bus disconnect failed: {}", e);
        }
        info!("[FLEET] Shutdown complete");
        report
    }

    async fn send_home(&self, device_id: &str, handle: &DeviceHandle, deadline: Instant) -> bool {
        let timing = &self.ctx.timing;
        let mut backoff = Backoff::new(timing.retry_delay, timing.max_retry_delay);

        loop {
            match self.ctx.publisher.return_to_home(device_id).await {
                Ok(()) => {
                    handle.write().await.mission_phase = MissionPhase::Terminated;
                    return true;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    if Instant::now() + delay >= deadline {
                        warn!("[FLEET] Giving up on return-to-home for {}: {}", device_id, e);
                        return false;
                    }
                    warn!("[FLEET] Return-to-home for {} failed, retrying: {}", device_id, e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
