use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

/// A captured request, as seen by the proxy before forwarding.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

/// A captured response, after content-encoding decode and JSON parse.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

/// One complete request/response exchange, ready for buffer insertion.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureRecord {
    pub ordinal: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub request: CapturedRequest,
    pub response: CapturedResponse,
}

/// Parses `body` as JSON if possible, else falls back to a raw string,
/// else `null` for an empty body. Used for `request.body` per the capture
/// contract: JSON when valid, raw text otherwise.
pub fn body_to_json_or_string(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(v) => v,
        Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_null() {
        assert_eq!(body_to_json_or_string(b""), Value::Null);
    }

    #[test]
    fn json_body_parses() {
        assert_eq!(body_to_json_or_string(br#"{"x":1}"#), serde_json::json!({"x": 1}));
    }

    #[test]
    fn non_json_body_is_raw_string() {
        assert_eq!(
            body_to_json_or_string(b"not json"),
            Value::String("not json".to_string())
        );
    }
}
