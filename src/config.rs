//! Navigator configuration
//!
//! Loaded from a TOML file, then patched from `FLEETNAV_*` environment
//! variables so credentials and endpoints never have to live in the file.

use fleetnav_shared::{defaults, FleetSetup, Waypoint};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Organisation id, first segment of every topic
    pub org_id: String,
    pub bus: BusConfig,
    pub waypoint_source: WaypointSourceConfig,
    pub mission: MissionConfig,
    pub devices: Vec<DeviceConfig>,
    /// Waypoints pushed to the waypoint source at startup
    pub setup: Option<SetupConfig>,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            org_id: "fleetnav".into(),
            bus: BusConfig::default(),
            waypoint_source: WaypointSourceConfig::default(),
            mission: MissionConfig::default(),
            devices: Vec::new(),
            setup: None,
        }
    }
}

/// MQTT broker connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub keep_alive_secs: u64,
    /// Reconnection delay (initial)
    pub reconnect_delay_ms: u64,
    /// Maximum reconnection delay
    pub max_reconnect_delay_ms: u64,
    /// Outgoing request buffer size
    pub request_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8883,
            client_id: "fleetnav".into(),
            username: None,
            password: None,
            use_tls: true,
            keep_alive_secs: 60,
            reconnect_delay_ms: defaults::RETRY_DELAY_MS,
            max_reconnect_delay_ms: defaults::MAX_RETRY_DELAY_MS,
            request_capacity: 100,
        }
    }
}

impl BusConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }
}

/// Which waypoint source endpoint to pull from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// `GET /waypoints/{device_id}`, server tracks each device's progress
    #[default]
    DevicePull,
    /// `GET /waypoints`, one pool shared by the whole fleet
    SharedPool,
    /// `GET /devices/{device_id}/{index}`, caller tracks progress
    Indexed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WaypointSourceConfig {
    pub base_url: String,
    pub mode: SourceMode,
    pub request_timeout_ms: u64,
}

impl Default for WaypointSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".into(),
            mode: SourceMode::default(),
            request_timeout_ms: 30000,
        }
    }
}

impl WaypointSourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Mission tuning shared by every device
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Per-axis arrival tolerance, degrees latitude
    pub lat_threshold: f64,
    /// Per-axis arrival tolerance, degrees longitude
    pub lon_threshold: f64,
    pub poll_interval_ms: u64,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Give up on a go-to after this long and re-send it; unset waits forever
    pub monitor_timeout_ms: Option<u64>,
    /// Ignore unacknowledged completion reports this soon after a go-to
    pub completion_settle_ms: u64,
    pub speed: f64,
    pub rth_height: f64,
    pub shutdown_grace_ms: u64,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            lat_threshold: defaults::ARRIVAL_THRESHOLD_DEG,
            lon_threshold: defaults::ARRIVAL_THRESHOLD_DEG,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            max_retry_delay_ms: defaults::MAX_RETRY_DELAY_MS,
            monitor_timeout_ms: None,
            completion_settle_ms: defaults::COMPLETION_SETTLE_MS,
            speed: defaults::GOTO_SPEED_MPS,
            rth_height: defaults::RTH_HEIGHT_M,
            shutdown_grace_ms: defaults::SHUTDOWN_GRACE_MS,
        }
    }
}

impl MissionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn monitor_timeout(&self) -> Option<Duration> {
        self.monitor_timeout_ms.map(Duration::from_millis)
    }

    pub fn completion_settle(&self) -> Duration {
        Duration::from_millis(self.completion_settle_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// One fleet member
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    /// Return home after this many confirmed arrivals
    #[serde(default)]
    pub waypoint_count: Option<usize>,
}

impl DeviceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            waypoint_count: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    pub waypoints: HashMap<String, Vec<Waypoint>>,
    /// Per-waypoint response delays in seconds
    pub delays: HashMap<String, Vec<f64>>,
}

impl NavigatorConfig {
    /// Load from an optional TOML file, apply environment overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Patch values from `FLEETNAV_*` variables
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(org_id) = lookup("FLEETNAV_ORG_ID") {
            self.org_id = org_id;
        }
        if let Some(host) = lookup("FLEETNAV_BUS_HOST") {
            self.bus.host = host;
        }
        if let Some(port) = lookup("FLEETNAV_BUS_PORT") {
            self.bus.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "FLEETNAV_BUS_PORT".into(),
                value: port,
            })?;
        }
        if let Some(username) = lookup("FLEETNAV_BUS_USERNAME") {
            self.bus.username = Some(username);
        }
        if let Some(password) = lookup("FLEETNAV_BUS_PASSWORD") {
            self.bus.password = Some(password);
        }
        if let Some(url) = lookup("FLEETNAV_WAYPOINT_URL") {
            self.waypoint_source.base_url = url;
        }
        if let Some(devices) = lookup("FLEETNAV_DEVICES") {
            self.devices = devices
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(DeviceConfig::new)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.org_id.is_empty() {
            return Err(ConfigError::Invalid("org_id is empty".into()));
        }
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid("no devices configured".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if device.id.is_empty() || device.id.contains(['/', '+', '#']) {
                return Err(ConfigError::InvalidValue {
                    key: "devices.id".into(),
                    value: device.id.clone(),
                });
            }
            if device.waypoint_count == Some(0) {
                return Err(ConfigError::InvalidValue {
                    key: format!("devices.{}.waypoint_count", device.id),
                    value: "0".into(),
                });
            }
            if !seen.insert(device.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate device {}", device.id)));
            }
        }

        for (key, value) in [
            ("mission.lat_threshold", self.mission.lat_threshold),
            ("mission.lon_threshold", self.mission.lon_threshold),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    value: value.to_string(),
                });
            }
        }

        if self.mission.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("mission.poll_interval_ms must be > 0".into()));
        }
        // Every retry loop must pause between attempts
        for (key, value) in [
            ("mission.retry_delay_ms", self.mission.retry_delay_ms),
            ("bus.reconnect_delay_ms", self.bus.reconnect_delay_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    value: value.to_string(),
                });
            }
        }
        if self.mission.max_retry_delay_ms < self.mission.retry_delay_ms {
            return Err(ConfigError::Invalid(
                "mission.max_retry_delay_ms is below mission.retry_delay_ms".into(),
            ));
        }
        if self.bus.max_reconnect_delay_ms < self.bus.reconnect_delay_ms {
            return Err(ConfigError::Invalid(
                "bus.max_reconnect_delay_ms is below bus.reconnect_delay_ms".into(),
            ));
        }
        if self.bus.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidValue {
                key: "bus.keep_alive_secs".into(),
                value: self.bus.keep_alive_secs.to_string(),
            });
        }
        if self.bus.username.is_some() != self.bus.password.is_some() {
            return Err(ConfigError::Invalid(
                "bus.username and bus.password must be set together".into(),
            ));
        }

        Ok(())
    }

    /// Device list with `waypoint_count` filled in from setup data when unset
    pub fn device_plans(&self) -> Vec<DeviceConfig> {
        self.devices
            .iter()
            .map(|device| {
                let from_setup = self
                    .setup
                    .as_ref()
                    .and_then(|s| s.waypoints.get(&device.id))
                    .map(Vec::len);
                DeviceConfig {
                    id: device.id.clone(),
                    waypoint_count: device.waypoint_count.or(from_setup),
                }
            })
            .collect()
    }

    /// Body for `POST /waypoints`, if setup data is configured
    pub fn fleet_setup(&self) -> Option<FleetSetup> {
        let setup = self.setup.as_ref()?;
        Some(FleetSetup {
            devices: self.devices.iter().map(|d| d.id.clone()).collect(),
            waypoints: setup.waypoints.clone(),
            delays: setup.delays.clone(),
        })
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.id.clone()).collect()
    }
}
