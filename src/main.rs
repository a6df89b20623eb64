mod command;
mod config;
mod connection;
mod fleet;
mod mission;
mod retry;
mod shutdown;
mod telemetry;
mod waypoint;

#[cfg(test)]
mod testing;

use anyhow::Context;
use command::CommandPublisher;
use config::NavigatorConfig;
use connection::{BusConnection, InboundRouter};
use fleet::FleetOrchestrator;
use fleetnav_shared::topics::Topics;
use mission::{ArrivalThreshold, MissionContext, MissionTiming};
use retry::Backoff;
use std::path::PathBuf;
use std::sync::Arc;
use telemetry::{StatusBoard, TelemetryCache};
use waypoint::{AssignmentRegistry, HttpWaypointSource, WaypointSourceAdapter};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FLEETNAV_CONFIG").ok())
        .map(PathBuf::from);
    let config = NavigatorConfig::load(config_path.as_deref()).context("loading configuration")?;

    info!("Fleet navigator starting: org {}", config.org_id);
    info!("  Broker: {}:{}", config.bus.host, config.bus.port);
    info!(
        "  Waypoint source: {} ({:?})",
        config.waypoint_source.base_url, config.waypoint_source.mode
    );
    info!("  Devices: {}", config.device_ids().join(", "));

    let topics = Topics::new(config.org_id.clone());

    // Bus connection and inbound routing
    let (bus, events) = BusConnection::spawn(&config.bus);
    for device_id in config.device_ids() {
        for topic in topics.device_subscriptions(&device_id) {
            bus.subscribe(topic)?;
        }
    }

    let telemetry = Arc::new(TelemetryCache::new());
    let status = StatusBoard::new();
    let router = InboundRouter::new(topics.clone(), telemetry.clone(), status.clone());
    tokio::spawn(router.run(events));

    // Waypoint source
    let source = Arc::new(HttpWaypointSource::new(
        &config.waypoint_source,
        &config.device_ids(),
    )?);
    if let Some(setup) = config.fleet_setup() {
        tokio::select! {
            _ = push_setup(&source, &setup, &config) => {}
            _ = shutdown_signal() => {
                info!("Interrupted before missions started");
                return Ok(());
            }
        }
    }

    let ctx = Arc::new(MissionContext {
        adapter: WaypointSourceAdapter::new(source, Arc::new(AssignmentRegistry::new())),
        publisher: CommandPublisher::new(
            Arc::new(bus),
            topics,
            config.mission.speed,
            config.mission.rth_height,
        ),
        telemetry,
        arrival: ArrivalThreshold::new(config.mission.lat_threshold, config.mission.lon_threshold),
        timing: MissionTiming::from(&config.mission),
    });

    let mut orchestrator = FleetOrchestrator::new(ctx, status, config.mission.shutdown_grace());
    orchestrator.start(&config.device_plans());

    tokio::select! {
        _ = orchestrator.wait_all() => info!("All missions complete"),
        _ = shutdown_signal() => info!("Shutdown requested"),
    }

    let report = orchestrator.shutdown().await;
    if !report.unconfirmed.is_empty() {
        anyhow::bail!(
            "return-to-home not confirmed for {}",
            report.unconfirmed.join(", ")
        );
    }
    Ok(())
}

/// Push configured waypoints to the source, retrying until it accepts them
async fn push_setup(
    source: &HttpWaypointSource,
    setup: &fleetnav_shared::FleetSetup,
    config: &NavigatorConfig,
) {
    let mut backoff = Backoff::new(config.mission.retry_delay(), config.mission.max_retry_delay());
    loop {
        match source.push_setup(setup).await {
            Ok(reply) => {
                info!("Waypoint source setup: {}", reply.message);
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!("Waypoint source setup failed, retrying in {:?}: {}", delay, e);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
