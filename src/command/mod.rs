//! Outbound device commands
//!
//! This module handles:
//! - Building go-to and return-to-home requests
//! - Publishing them on the device's request topics

mod publisher;

pub use publisher::CommandPublisher;
