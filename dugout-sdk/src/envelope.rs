//! The REST boundary's `{status, message, data}` response envelope.
//!
//! Decoded exactly once, at the HTTP layer, into a tagged result — downstream
//! code never probes a loosely-typed payload for a `status` field.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Tag the backend puts on every successful envelope.
const STATUS_SUCCESS: &str = "success";

/// Wire shape of every REST response body.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct Envelope<T> {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Collapse the envelope into `Ok(data)` or `Err(ApiError::Api)`.
    ///
    /// A success envelope with no `data` field decodes `T` from JSON null,
    /// so `()` and `Option<_>` payloads work without a special case.
    pub fn into_result(self) -> Result<T, ApiError> {
        if self.status == STATUS_SUCCESS {
            match self.data {
                Some(data) => Ok(data),
                None => Ok(serde_json::from_value(serde_json::Value::Null)?),
            }
        } else {
            Err(ApiError::Api {
                status: self.status,
                message: self.message.unwrap_or_default(),
            })
        }
    }
}

/// Decode a raw response body into the envelope's payload.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;
    envelope.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn success_envelope_yields_data() {
        let body = json!({"status": "success", "data": {"id": 7}}).to_string();
        let value: Value = decode(&body).unwrap();
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn error_envelope_yields_api_error() {
        let body = json!({"status": "error", "message": "sold out"}).to_string();
        let err = decode::<Value>(&body).unwrap_err();
        match err {
            ApiError::Api { status, message } => {
                assert_eq!(status, "error");
                assert_eq!(message, "sold out");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn success_without_data_decodes_unit() {
        let body = json!({"status": "success"}).to_string();
        decode::<()>(&body).unwrap();
        let opt: Option<Value> = decode(&body).unwrap();
        assert!(opt.is_none());
    }

    #[test]
    fn unknown_status_is_not_success() {
        let body = json!({"status": "fail", "data": 1}).to_string();
        assert!(decode::<Value>(&body).is_err());
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        let err = decode::<Value>("<!doctype html>").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
