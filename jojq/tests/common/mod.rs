use std::net::SocketAddr;
use std::sync::Arc;

use jojq::config::ProxyConfig;
use jojq::context::ProxyContext;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A `ProxyConfig` with every field pinned to a test-friendly default.
/// Individual tests override whichever field the scenario cares about.
pub fn test_config() -> ProxyConfig {
    ProxyConfig {
        port: 0,
        insecure: false,
        ca_dir: None,
        max_captures: 100,
        max_body_bytes: 25 * 1024 * 1024,
        max_leaf_cache: 1000,
        connect_timeout_ms: 2_000,
        read_timeout_ms: 2_000,
        export_dir: std::env::temp_dir().join("jojq-test-exports"),
    }
}

pub fn test_ctx(config: ProxyConfig) -> Arc<ProxyContext> {
    Arc::new(ProxyContext::new(config, None))
}

/// Spawns a TCP server that answers every connection with the same raw
/// HTTP/1.1 response bytes, closing the socket afterward. Stands in for
/// the upstream origin server in end-to-end tests.
pub async fn spawn_fixed_response_upstream(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if buf[..n].windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

pub fn json_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

/// Binds a listener nothing keeps accepting on, so `TcpStream::connect`
/// against it fails the way an unreachable upstream would.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Writes a raw request on a fresh client connection to `proxy_addr` and
/// reads the full response back (until the peer closes the socket).
pub async fn send_and_read(proxy_addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(request).await.unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    response
}
