//! Message bus abstraction

use async_trait::async_trait;
use fleetnav_shared::codec::CodecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Not connected to broker")]
    NotConnected,

    #[error("Broker client rejected request: {0}")]
    Rejected(String),

    #[error("Encode error: {0}")]
    Codec(#[from] CodecError),
}

/// Outbound side of the message bus
///
/// Delivery is at-most-once. A successful publish means the message was
/// handed to the transport, not that any device received it.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish a payload on a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Close the broker session
    async fn disconnect(&self) -> Result<(), BusError>;
}
