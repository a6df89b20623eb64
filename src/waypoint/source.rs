//! HTTP waypoint source

use async_trait::async_trait;
use fleetnav_shared::{
    FleetSetup, IndexedWaypointResponse, SetupResponse, WaypointAssignment, WaypointResponse,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

use crate::config::{SourceMode, WaypointSourceConfig};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Waypoint source returned {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),
}

/// Provider of waypoints for a device
#[async_trait]
pub trait WaypointSource: Send + Sync {
    /// Next waypoint for the device, `None` if none is available yet
    async fn fetch(&self, device_id: &str) -> Result<Option<WaypointAssignment>, FetchError>;
}

/// Waypoint server client
pub struct HttpWaypointSource {
    client: reqwest::Client,
    base_url: String,
    mode: SourceMode,
    /// Device position in the configured fleet, used to keep indexed sequences
    /// unique across devices
    slots: HashMap<String, u64>,
    /// Next index per device in indexed mode
    cursors: Mutex<HashMap<String, u64>>,
}

impl HttpWaypointSource {
    pub fn new(config: &WaypointSourceConfig, device_ids: &[String]) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            mode: config.mode,
            slots: device_ids
                .iter()
                .enumerate()
                .map(|(slot, id)| (id.clone(), slot as u64))
                .collect(),
            cursors: Mutex::new(HashMap::new()),
        })
    }

    /// Push waypoint lists and delays to the server (`POST /waypoints`)
    pub async fn push_setup(&self, setup: &FleetSetup) -> Result<SetupResponse, FetchError> {
        let response = self
            .client
            .post(format!("{}/waypoints", self.base_url))
            .json(setup)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        parse_body(response).await
    }

    async fn fetch_stateful(&self, url: String) -> Result<Option<WaypointAssignment>, FetchError> {
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body: WaypointResponse = parse_body(response).await?;
        Ok(body.into_assignment())
    }

    async fn fetch_indexed(&self, device_id: &str) -> Result<Option<WaypointAssignment>, FetchError> {
        let slot = *self
            .slots
            .get(device_id)
            .ok_or_else(|| FetchError::UnknownDevice(device_id.to_string()))?;
        let index = self.cursor(device_id);

        let url = format!("{}/devices/{}/{}", self.base_url, device_id, index);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("[SOURCE] No waypoint {} for {} yet", index, device_id);
                return Ok(None);
            }
            status if !status.is_success() => return Err(FetchError::Status(status.as_u16())),
            _ => {}
        }

        let body: IndexedWaypointResponse = parse_body(response).await?;
        let Some(waypoint) = body.waypoint else {
            return Ok(None);
        };

        self.advance(device_id, index + 1);
        Ok(Some(WaypointAssignment {
            waypoint,
            sequence: (slot << 32) | index,
        }))
    }

    fn cursor(&self, device_id: &str) -> u64 {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .copied()
            .unwrap_or(0)
    }

    fn advance(&self, device_id: &str, next: u64) {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.to_string(), next);
    }
}

#[async_trait]
impl WaypointSource for HttpWaypointSource {
    async fn fetch(&self, device_id: &str) -> Result<Option<WaypointAssignment>, FetchError> {
        match self.mode {
            SourceMode::DevicePull => {
                self.fetch_stateful(format!("{}/waypoints/{}", self.base_url, device_id))
                    .await
            }
            SourceMode::SharedPool => {
                self.fetch_stateful(format!("{}/waypoints", self.base_url))
                    .await
            }
            SourceMode::Indexed => self.fetch_indexed(device_id).await,
        }
    }
}

async fn parse_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, FetchError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))
}
