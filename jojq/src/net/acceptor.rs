use std::net::SocketAddr;
use std::sync::Arc;

use http::Method;
use jojq_core::conn::Inbound;
use jojq_core::listener;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use super::{mitm, plain, tunnel};
use crate::context::ProxyContext;
use crate::error::{ProxyError, ProxyResult};

/// Binds the proxy's listening socket. Split out from `serve` so `main`
/// can `?`-propagate a bind failure (address in use, permission denied)
/// before spawning anything, per SPEC_FULL's "bind failure is fatal".
pub async fn bind(port: u16) -> ProxyResult<TcpListener> {
    let addr = format!("0.0.0.0:{port}");
    let tcp_listener = listener::bind_tcp(&addr).await.map_err(ProxyError::Bind)?;
    tracing::info!(%addr, "proxy listening");
    Ok(tcp_listener)
}

/// TCP accept loop: one task per connection, dispatching to the plain
/// HTTP handler or the `CONNECT` handler (tunnel or MITM) based on the
/// first request line. Runs until the listener itself errors out.
pub async fn serve(tcp_listener: TcpListener, ctx: Arc<ProxyContext>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = match listener::accept_stream(&tcp_listener).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        debug!(%peer, "accepted connection");

        let ctx = ctx.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, ctx).await;
        });
    }
}

/// Dispatches one accepted connection to the plain or `CONNECT` handler.
/// Exposed (not just used by `run`'s accept loop) so tests can drive a
/// single connection against a loopback listener bound on an ephemeral port.
pub async fn handle_connection(stream: jojq_core::stream::Stream, peer: SocketAddr, ctx: Arc<ProxyContext>) {
    let mut inbound = Inbound::new(stream);

    match inbound.read_request().await {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            warn!(%peer, error = %e, "failed reading first request");
            return;
        }
    }

    let req = inbound.get_request_header();
    if req.get_method() == Method::CONNECT {
        let target = String::from_utf8_lossy(req.get_raw_path()).into_owned();
        let (host, port) = split_authority(&target);

        let Inbound { stream, .. } = inbound;

        if ctx.config.insecure {
            mitm::handle(stream, host, port, ctx).await;
        } else {
            tunnel::handle(stream, host, port, &ctx).await;
        }
    } else {
        plain::handle(inbound, ctx, peer).await;
    }
}

fn split_authority(authority: &str) -> (String, u16) {
    match authority.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(p) => (host.to_string(), p),
            Err(_) => (authority.to_string(), 443),
        },
        None => (authority.to_string(), 443),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_and_port() {
        assert_eq!(split_authority("upstream.test:443"), ("upstream.test".to_string(), 443));
    }

    #[test]
    fn defaults_to_443_without_port() {
        assert_eq!(split_authority("upstream.test"), ("upstream.test".to_string(), 443));
    }
}
