//! Message bus connection
//!
//! This module handles:
//! - A persistent broker session with automatic reconnection
//! - Re-subscribing every registered topic after each reconnect
//! - Routing inbound telemetry and status messages by topic

mod manager;
mod router;
mod traits;

pub use manager::{BusConnection, ConnectionEvent, InboundMessage};
pub use router::{InboundRouter, RouteOutcome};
pub use traits::{Bus, BusError};
