//! Latest per-device telemetry and go-to status delivery

mod cache;
mod status;

pub use cache::TelemetryCache;
pub use status::StatusBoard;
