//! JSON codec for bus payloads
//!
//! Every message on the bus is a single UTF-8 JSON document. Inbound payloads
//! may carry extra fields (telemetry includes altitude, heading, ...) which are
//! ignored.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::{GlobalPositionMessage, GoToStateMessage, GoToStatus, Position};

/// Maximum accepted payload size (1 MB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload too large: {0} bytes (max: {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge(usize),

    #[error("Payload is empty")]
    EmptyPayload,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a message into a JSON payload
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    let buf = serde_json::to_vec(message)?;

    if buf.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(buf.len()));
    }

    Ok(buf)
}

/// Decode a JSON payload into a message
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    Ok(serde_json::from_slice(payload)?)
}

/// Decode a `global_position` payload
pub fn decode_position(payload: &[u8]) -> Result<Position, CodecError> {
    decode::<GlobalPositionMessage>(payload).map(|msg| msg.position)
}

/// Decode a `go_to_location_state` payload
pub fn decode_go_to_state(payload: &[u8]) -> Result<GoToStatus, CodecError> {
    decode::<GoToStateMessage>(payload).map(GoToStatus::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RthRequest, Waypoint, GoToRequest};

    #[test]
    fn test_decode_position_ignores_extra_fields() {
        let payload = br#"{"position":{"latitude":18.5,"longitude":73.7,"altitude":30.2,"heading":90}}"#;
        let pos = decode_position(payload).unwrap();
        assert_eq!(pos, Position::new(18.5, 73.7));
    }

    #[test]
    fn test_decode_position_missing_field() {
        let payload = br#"{"position":{"latitude":18.5}}"#;
        assert!(matches!(decode_position(payload), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_decode_go_to_state() {
        assert_eq!(decode_go_to_state(br#"{"state":2}"#).unwrap(), GoToStatus::Complete);
        assert_eq!(decode_go_to_state(br#"{"state":4}"#).unwrap(), GoToStatus::Aborted);
        assert_eq!(decode_go_to_state(br#"{"state":1,"msg":"x"}"#).unwrap(), GoToStatus::Other(1));
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(matches!(decode_position(b""), Err(CodecError::EmptyPayload)));
    }

    #[test]
    fn test_encoded_go_to_shape() {
        let wp = Waypoint {
            latitude: 1.5,
            longitude: 2.5,
            height: 40.0,
        };
        let bytes = encode(&GoToRequest::go_to("d1", &wp, 10.0, 40.0)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["job_id"], "Job-d1");
        assert_eq!(value["data"]["latitude"], 1.5);
        assert_eq!(value["data"]["longitude"], 2.5);
        assert_eq!(value["data"]["height"], 40.0);
        assert!(value["timestamp"].is_f64());
    }

    #[test]
    fn test_encoded_rth_has_empty_data() {
        let bytes = encode(&RthRequest::return_to_home("d1")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["data"], serde_json::json!({}));
        assert_eq!(value["job_id"], "Job-d1-RTDS");
    }
}
