//! Bus topic naming
//!
//! All topics follow `{org}/{device_id}/{suffix}`.

pub const GLOBAL_POSITION: &str = "global_position";
pub const GO_TO_LOCATION_STATE: &str = "go_to_location_state";
pub const GO_TO_REQUEST: &str = "navigation/go_to_location/request";
pub const RTH_REQUEST: &str = "navigation/rth/request";

/// Kind of inbound message, derived from its topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTopic {
    GlobalPosition { device_id: String },
    GoToLocationState { device_id: String },
}

/// Topic builder bound to one organisation
#[derive(Debug, Clone)]
pub struct Topics {
    org_id: String,
}

impl Topics {
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
        }
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn global_position(&self, device_id: &str) -> String {
        format!("{}/{}/{}", self.org_id, device_id, GLOBAL_POSITION)
    }

    pub fn go_to_location_state(&self, device_id: &str) -> String {
        format!("{}/{}/{}", self.org_id, device_id, GO_TO_LOCATION_STATE)
    }

    pub fn go_to_request(&self, device_id: &str) -> String {
        format!("{}/{}/{}", self.org_id, device_id, GO_TO_REQUEST)
    }

    pub fn rth_request(&self, device_id: &str) -> String {
        format!("{}/{}/{}", self.org_id, device_id, RTH_REQUEST)
    }

    /// Subscription patterns for the inbound topics of one device
    pub fn device_subscriptions(&self, device_id: &str) -> [String; 2] {
        [
            self.global_position(device_id),
            self.go_to_location_state(device_id),
        ]
    }

    /// Classify an inbound topic
    ///
    /// Returns `None` for topics outside this organisation or with an
    /// unrecognised suffix.
    pub fn parse(&self, topic: &str) -> Option<InboundTopic> {
        let rest = topic.strip_prefix(&self.org_id)?.strip_prefix('/')?;
        let (device_id, suffix) = rest.split_once('/')?;
        if device_id.is_empty() {
            return None;
        }

        match suffix {
            GLOBAL_POSITION => Some(InboundTopic::GlobalPosition {
                device_id: device_id.to_string(),
            }),
            GO_TO_LOCATION_STATE => Some(InboundTopic::GoToLocationState {
                device_id: device_id.to_string(),
            }),
            _ => None,
        }
    }
}
