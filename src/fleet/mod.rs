//! Fleet-level coordination

mod orchestrator;

pub use orchestrator::{FleetOrchestrator, ShutdownReport};
