use std::collections::BTreeMap;

use async_compression::tokio::bufread::{BrotliDecoder, DeflateDecoder, GzipDecoder};
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use super::record::{body_to_json_or_string, CaptureRecord, CapturedRequest, CapturedResponse};

/// Response bodies larger than this, once decoded, are never captured.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

pub struct RequestMeta {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

pub struct ResponseMeta {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
}

/// Decodes `body` per `content_encoding`, capped at `max_body_bytes`.
/// Returns `None` if decoding fails or the decoded size exceeds the cap.
async fn decode_body(
    body: &[u8],
    content_encoding: Option<&str>,
    max_body_bytes: usize,
) -> Option<Vec<u8>> {
    let decoded = match content_encoding.map(|e| e.to_ascii_lowercase()).as_deref() {
        None | Some("identity") | Some("") => body.to_vec(),
        Some("gzip") => read_capped(GzipDecoder::new(body), max_body_bytes).await.ok()?,
        Some("deflate") => read_capped(DeflateDecoder::new(body), max_body_bytes)
            .await
            .ok()?,
        Some("br") => read_capped(BrotliDecoder::new(body), max_body_bytes)
            .await
            .ok()?,
        Some(other) => {
            warn!(encoding = other, "unsupported content-encoding, skipping capture");
            return None;
        }
    };

    if decoded.len() > max_body_bytes {
        None
    } else {
        Some(decoded)
    }
}

async fn read_capped<R: tokio::io::AsyncRead + Unpin>(
    mut decoder: R,
    max_body_bytes: usize,
) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = decoder.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
        if out.len() > max_body_bytes {
            break;
        }
    }
    Ok(out)
}

fn is_json_content_type(headers: &BTreeMap<String, String>) -> bool {
    headers
        .get("content-type")
        .map(|v| v.to_ascii_lowercase().contains("json"))
        .unwrap_or(false)
}

/// Builds a capture record from a completed exchange, applying the
/// content-type / size / JSON-parse gates. Returns `None` (and logs why)
/// when any gate fails; capture failure never affects client forwarding.
pub async fn try_capture(
    req: RequestMeta,
    resp: ResponseMeta,
    raw_body: &[u8],
    max_body_bytes: usize,
) -> Option<CaptureRecord> {
    if !is_json_content_type(&resp.headers) {
        return None;
    }

    let content_encoding = resp.headers.get("content-encoding").map(String::as_str);
    let decoded = match decode_body(raw_body, content_encoding, max_body_bytes).await {
        Some(d) => d,
        None => {
            warn!(
                url = %req.url,
                "response body exceeded cap or failed to decode, skipping capture"
            );
            return None;
        }
    };

    let body: serde_json::Value = match serde_json::from_slice(&decoded) {
        Ok(v) => v,
        Err(e) => {
            warn!(url = %req.url, error = %e, "response body is not valid JSON, skipping capture");
            return None;
        }
    };

    let record = CaptureRecord {
        ordinal: 0,
        timestamp: OffsetDateTime::now_utc(),
        request: CapturedRequest {
            url: req.url.clone(),
            method: req.method,
            headers: req.headers,
            body: body_to_json_or_string(&req.body),
        },
        response: CapturedResponse {
            status_code: resp.status_code,
            headers: resp.headers,
            body,
        },
    };

    info!(url = %req.url, status = record.response.status_code, "captured response");
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::write::GzipEncoder;
    use tokio::io::AsyncWriteExt;

    async fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzipEncoder::new(Vec::new());
        enc.write_all(data).await.unwrap();
        enc.shutdown().await.unwrap();
        enc.into_inner()
    }

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn captures_plain_json() {
        let req = RequestMeta {
            url: "http://upstream.test/data".into(),
            method: "GET".into(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        };
        let resp = ResponseMeta {
            status_code: 200,
            headers: headers(&[("content-type", "application/json")]),
        };
        let record = try_capture(req, resp, br#"{"x":1}"#, MAX_BODY_BYTES)
            .await
            .unwrap();
        assert_eq!(record.response.body, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn captures_gzip_json() {
        let body = gzip(br#"{"a":[1,2,3]}"#).await;
        let req = RequestMeta {
            url: "http://upstream.test/data".into(),
            method: "GET".into(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        };
        let resp = ResponseMeta {
            status_code: 200,
            headers: headers(&[
                ("content-type", "application/json"),
                ("content-encoding", "gzip"),
            ]),
        };
        let record = try_capture(req, resp, &body, MAX_BODY_BYTES).await.unwrap();
        assert_eq!(record.response.body, serde_json::json!({"a": [1, 2, 3]}));
    }

    #[tokio::test]
    async fn non_json_content_type_is_not_captured() {
        let req = RequestMeta {
            url: "http://upstream.test/data".into(),
            method: "GET".into(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        };
        let resp = ResponseMeta {
            status_code: 200,
            headers: headers(&[("content-type", "text/plain")]),
        };
        assert!(try_capture(req, resp, br#"{"x":1}"#, MAX_BODY_BYTES).await.is_none());
    }

    #[tokio::test]
    async fn json_content_type_with_invalid_bytes_is_not_captured() {
        let req = RequestMeta {
            url: "http://upstream.test/data".into(),
            method: "GET".into(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        };
        let resp = ResponseMeta {
            status_code: 200,
            headers: headers(&[("content-type", "application/json")]),
        };
        assert!(try_capture(req, resp, b"not json", MAX_BODY_BYTES).await.is_none());
    }

    #[tokio::test]
    async fn oversize_body_is_not_captured() {
        let big = vec![b' '; MAX_BODY_BYTES + 1];
        let mut body = big;
        body.extend_from_slice(b"1");
        let req = RequestMeta {
            url: "http://upstream.test/data".into(),
            method: "GET".into(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        };
        let resp = ResponseMeta {
            status_code: 200,
            headers: headers(&[("content-type", "application/json")]),
        };
        assert!(try_capture(req, resp, &body, MAX_BODY_BYTES).await.is_none());
    }

    #[tokio::test]
    async fn exactly_cap_sized_body_is_captured() {
        let mut body = Vec::with_capacity(MAX_BODY_BYTES);
        body.push(b'"');
        body.resize(MAX_BODY_BYTES - 1, b'a');
        body.push(b'"');
        assert_eq!(body.len(), MAX_BODY_BYTES);

        let req = RequestMeta {
            url: "http://upstream.test/data".into(),
            method: "GET".into(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        };
        let resp = ResponseMeta {
            status_code: 200,
            headers: headers(&[("content-type", "application/json")]),
        };
        let record = try_capture(req, resp, &body, MAX_BODY_BYTES).await;
        assert!(record.is_some());
    }
}
