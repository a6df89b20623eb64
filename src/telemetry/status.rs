//! Per-device go-to status channels

use fleetnav_shared::GoToStatus;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::warn;

const STATUS_CAPACITY: usize = 16;

/// Routes `go_to_location_state` reports to the controller that owns the device
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    senders: Arc<RwLock<HashMap<String, mpsc::Sender<GoToStatus>>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the status channel for a device, replacing any previous one
    pub fn register(&self, device_id: &str) -> mpsc::Receiver<GoToStatus> {
        let (tx, rx) = mpsc::channel(STATUS_CAPACITY);
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.to_string(), tx);
        rx
    }

    /// Hand a status to the device's controller
    ///
    /// Returns `false` if nobody is listening or the channel is full.
    pub fn deliver(&self, device_id: &str, status: GoToStatus) -> bool {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = senders.get(device_id) else {
            return false;
        };

        match tx.try_send(status) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("[STATUS] Channel full for {}, dropping {:?}", device_id, status);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_to_registered_device() {
        let board = StatusBoard::new();
        assert!(!board.deliver("d1", GoToStatus::Complete));

        let mut rx = board.register("d1");
        assert!(board.deliver("d1", GoToStatus::Aborted));
        assert_eq!(rx.try_recv().unwrap(), GoToStatus::Aborted);

        drop(rx);
        assert!(!board.deliver("d1", GoToStatus::Complete));
    }

    #[test]
    fn test_full_channel_drops() {
        let board = StatusBoard::new();
        let _rx = board.register("d1");
        for _ in 0..STATUS_CAPACITY {
            assert!(board.deliver("d1", GoToStatus::Other(1)));
        }
        assert!(!board.deliver("d1", GoToStatus::Complete));
    }
}
