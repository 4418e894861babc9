mod common;

use jojq_core::listener;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// An opaque `CONNECT` tunnel (MITM disabled) must pass bytes through
/// unmodified in both directions, and the proxy must never touch the
/// capture buffer for tunneled traffic.
#[tokio::test]
async fn opaque_tunnel_relays_bytes_untouched() {
    let echo_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let echo_addr = echo_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = echo_listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    if socket.write_all(&buf[..n]).await.is_err() {
                        return;
                    }
                }
            }
        }
    });

    let mut config = common::test_config();
    config.insecure = false;
    let ctx = common::test_ctx(config);

    let proxy_listener = listener::bind_tcp("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy_listener.local_addr().unwrap();

    let accept_ctx = ctx.clone();
    tokio::spawn(async move {
        let (stream, peer) = listener::accept_stream(&proxy_listener).await.unwrap();
        jojq::net::acceptor::handle_connection(stream, peer, accept_ctx).await;
    });

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let connect_req = format!("CONNECT {echo_addr} HTTP/1.1\r\nHost: {echo_addr}\r\n\r\n");
    client.write_all(connect_req.as_bytes()).await.unwrap();

    let mut established = [0u8; 64];
    let n = client.read(&mut established).await.unwrap();
    assert!(String::from_utf8_lossy(&established[..n]).starts_with("HTTP/1.1 200"));

    client.write_all(b"ping-through-tunnel").await.unwrap();
    let mut echoed = [0u8; 64];
    let n = client.read(&mut echoed).await.unwrap();
    assert_eq!(&echoed[..n], b"ping-through-tunnel");

    assert_eq!(ctx.captures.len(), 0);
}
