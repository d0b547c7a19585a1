use mexec_core::{Frame, Notification, SessionResponse};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::ExecError;

/// Serializes a value to compact JSON for a text frame.
pub fn encode<T: Serialize>(value: &T) -> Result<String, ExecError> {
    serde_json::to_string(value).map_err(|err| ExecError::Encode(err.to_string()))
}

/// Deserializes a frame payload into a typed value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ExecError> {
    serde_json::from_slice(bytes).map_err(|err| ExecError::MalformedFrame(err.to_string()))
}

/// Decodes a control frame, telling responses (`result`) from notifications (`method`).
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, ExecError> {
    let value: Value = decode(bytes)?;
    let Some(object) = value.as_object() else {
        return Err(ExecError::MalformedFrame(
            "expected a json object".to_string(),
        ));
    };

    let is_response = object.contains_key("result");
    let is_notification = object.contains_key("method");

    if is_response {
        serde_json::from_value::<SessionResponse>(value)
            .map(Frame::Response)
            .map_err(|err| ExecError::MalformedFrame(err.to_string()))
    } else if is_notification {
        serde_json::from_value::<Notification>(value)
            .map(Frame::Notification)
            .map_err(|err| ExecError::MalformedFrame(err.to_string()))
    } else {
        Err(ExecError::MalformedFrame(
            "frame carries neither result nor method".to_string(),
        ))
    }
}
