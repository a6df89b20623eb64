//! Waypoint acquisition
//!
//! The HTTP source hands out waypoints; the adapter filters them through the
//! fleet-wide registry so no two devices fly the same sequence at once.

mod adapter;
mod registry;
mod source;

pub use adapter::{FetchOutcome, WaypointSourceAdapter};
pub use registry::{AssignmentRegistry, Registration};
pub use source::{FetchError, HttpWaypointSource, WaypointSource};
