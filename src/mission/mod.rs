//! Per-device mission control

mod arrival;
mod controller;

pub use arrival::ArrivalThreshold;
pub use controller::{
    DeviceHandle, DeviceState, MissionContext, MissionController, MissionTiming,
};
