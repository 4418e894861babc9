use std::collections::BTreeMap;

use http::{HeaderMap, Uri};
use jojq_core::http::RequestHeader;

/// Headers that identify the proxy hop itself and must never be forwarded
/// upstream or reflected back to the client.
const HOP_BY_HOP: &[&str] = &[
    "proxy-connection",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Splits an absolute-form request target (`http://host:port/path?q`) into
/// `(host, port, origin-form path)`. Falls back to the `Host` header when
/// the request-target is already origin-form (common once a client is
/// tunneled through `CONNECT`).
pub fn resolve_target(req: &RequestHeader, default_port: u16) -> Option<(String, u16, String)> {
    let uri = req.get_uri();

    if let Some(host) = uri.host() {
        let port = uri.port_u16().unwrap_or(default_port);
        let path = origin_form(uri);
        return Some((host.to_string(), port, path));
    }

    let host_header = req
        .get_header(http::header::HOST)
        .and_then(|v| v.to_str().ok())?;
    let (host, port) = split_host_port(host_header, default_port);
    let path = String::from_utf8_lossy(req.get_raw_path()).into_owned();
    Some((host, port, path))
}

fn origin_form(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

fn split_host_port(host_header: &str, default_port: u16) -> (String, u16) {
    match host_header.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(p) => (host.to_string(), p),
            Err(_) => (host_header.to_string(), default_port),
        },
        None => (host_header.to_string(), default_port),
    }
}

/// Collects the HTTP map into a plain string map for capture records,
/// dropping hop-by-hop headers.
pub fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Version;

    #[test]
    fn resolves_absolute_uri() {
        let req = RequestHeader::build("GET", "http://upstream.test:8080/data?x=1", Version::HTTP_11, None);
        let (host, port, path) = resolve_target(&req, 80).unwrap();
        assert_eq!(host, "upstream.test");
        assert_eq!(port, 8080);
        assert_eq!(path, "/data?x=1");
    }

    #[test]
    fn resolves_absolute_uri_default_port() {
        let req = RequestHeader::build("GET", "http://upstream.test/data", Version::HTTP_11, None);
        let (host, port, _) = resolve_target(&req, 80).unwrap();
        assert_eq!(host, "upstream.test");
        assert_eq!(port, 80);
    }

    #[test]
    fn strips_hop_by_hop_headers() {
        assert!(is_hop_by_hop("Proxy-Connection"));
        assert!(is_hop_by_hop("Connection"));
        assert!(!is_hop_by_hop("Content-Type"));
    }
}
