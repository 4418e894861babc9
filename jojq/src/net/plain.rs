use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::Version;
use jojq_core::conn::{Inbound, Outbound};
use jojq_core::http::RequestHeader;
use jojq_core::stream::Stream;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::headers::{headers_to_map, is_hop_by_hop, resolve_target};
use crate::capture::{try_capture, RequestMeta, ResponseMeta};
use crate::context::ProxyContext;
use crate::error::{ProxyError, ProxyResult};

/// Forwards each request on a plain-HTTP (non-`CONNECT`) connection,
/// teeing JSON responses into the capture buffer. Handles keep-alive:
/// loops reading further requests off the same socket until the client
/// closes it.
pub async fn handle(mut inbound: Inbound, ctx: Arc<ProxyContext>, peer: SocketAddr) {
    loop {
        if inbound.request_header.is_none() {
            match inbound.read_request().await {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    warn!(%peer, error = %e, "failed reading request");
                    return;
                }
            }
        }

        if let Err(e) = handle_one(&mut inbound, &ctx).await {
            warn!(%peer, error = %e, "plain request failed");
            let _ = inbound
                .write_plain_response(502, "Bad Gateway", "Bad Gateway")
                .await;
            return;
        }

        inbound.request_header = None;
    }
}

async fn handle_one(inbound: &mut Inbound, ctx: &ProxyContext) -> ProxyResult<()> {
    let req = inbound.get_request_header().clone();
    let (host, port, origin_path) = resolve_target(&req, 80).ok_or_else(|| {
        ProxyError::RequestParse(tokio::io::Error::new(tokio::io::ErrorKind::InvalidInput, "no resolvable target"))
    })?;

    debug!(method = %req.get_method(), %host, port, "forwarding plain request");

    let tcp = tokio::time::timeout(ctx.config.connect_timeout(), TcpStream::connect((host.as_str(), port)))
        .await
        .map_err(|_| ProxyError::UpstreamConnect(tokio::io::Error::new(tokio::io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(ProxyError::UpstreamConnect)?;
    tcp.set_nodelay(true).ok();

    let mut outbound = Outbound::new(Stream::new(tcp));
    let forwarded = build_forwarded_request(&req, &origin_path, &host, port);
    outbound.write_request_header(&forwarded).await?;

    let mut request_body = BytesMut::new();
    loop {
        match inbound.read_request_body().await? {
            Some(chunk) => {
                if request_body.len() < ctx.config.max_body_bytes {
                    request_body.extend_from_slice(&chunk);
                }
                outbound.write_request_body(&chunk).await?;
            }
            None => break,
        }
        if inbound.is_request_body_finished() {
            break;
        }
    }
    outbound.finish_request_body().await?;

    tokio::time::timeout(ctx.config.read_timeout(), outbound.read_response())
        .await
        .map_err(|_| ProxyError::ResponseParse(tokio::io::Error::new(tokio::io::ErrorKind::TimedOut, "upstream read timed out")))?
        .map_err(ProxyError::ResponseParse)?;

    let response_header = outbound.get_response_header().clone();
    inbound.write_response_header(&response_header).await?;

    let mut response_body = BytesMut::new();
    loop {
        let chunk = tokio::time::timeout(ctx.config.read_timeout(), outbound.read_response_body())
            .await
            .map_err(|_| tokio::io::Error::new(tokio::io::ErrorKind::TimedOut, "upstream read timed out"))??;
        match chunk {
            Some(bytes) => {
                if response_body.len() < ctx.config.max_body_bytes {
                    response_body.extend_from_slice(&bytes);
                }
                inbound.write_response_body(&bytes).await?;
            }
            None => break,
        }
        if outbound.is_response_body_finished() {
            break;
        }
    }
    inbound.finish_response_body().await?;

    try_record_capture(ctx, &req, &response_header, &request_body.freeze(), &response_body.freeze(), &host, port, &origin_path).await;

    Ok(())
}

/// Builds the request sent upstream: origin-form path, `Host` header
/// guaranteed present, proxy-only/hop-by-hop headers stripped.
fn build_forwarded_request(req: &RequestHeader, origin_path: &str, host: &str, port: u16) -> RequestHeader {
    let mut forwarded = RequestHeader::build(
        req.get_method().clone(),
        origin_path,
        Version::HTTP_11,
        Some(req.metadata.headers.len()),
    );

    for (name, value) in req.metadata.headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        forwarded.append_header(name.clone(), value.clone());
    }

    if forwarded.get_header(http::header::HOST).is_none() {
        let host_value = if port == 80 {
            host.to_string()
        } else {
            format!("{host}:{port}")
        };
        forwarded.insert_header(http::header::HOST, host_value.as_str());
    }
    forwarded.insert_header(http::header::CONNECTION, "close");

    forwarded
}

async fn try_record_capture(
    ctx: &ProxyContext,
    req: &RequestHeader,
    resp: &jojq_core::http::ResponseHeader,
    request_body: &Bytes,
    response_body: &Bytes,
    host: &str,
    port: u16,
    origin_path: &str,
) {
    let scheme = "http";
    let url = if port == 80 {
        format!("{scheme}://{host}{origin_path}")
    } else {
        format!("{scheme}://{host}:{port}{origin_path}")
    };

    let req_meta = RequestMeta {
        url: url.clone(),
        method: req.get_method().to_string(),
        headers: headers_to_map(&req.metadata.headers),
        body: request_body.clone(),
    };
    let resp_meta = ResponseMeta {
        status_code: resp.get_raw_status_code(),
        headers: headers_to_map(resp.headers()),
    };

    if let Some(record) = try_capture(req_meta, resp_meta, response_body, ctx.config.max_body_bytes).await {
        let ordinal = ctx.captures.append(record);
        tracing::info!(ordinal, %url, status = resp.get_raw_status_code(), size = response_body.len(), "capture recorded");
    }
}
