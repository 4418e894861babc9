use std::net::{SocketAddr as StdSocketAddr, ToSocketAddrs};

use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::stream::{Stream, UniqueID};

const LISTENER_BACKLOG: u32 = 65535;

/// Binds a TCP listener with `SO_REUSEADDR` set and a large backlog, the
/// way a proxy accepting bursts of short-lived client connections wants.
pub async fn bind_tcp(address: &str) -> std::io::Result<TcpListener> {
    let socket_address = address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "could not resolve address"))?;

    let socket = match socket_address {
        StdSocketAddr::V4(_) => TcpSocket::new_v4()?,
        StdSocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(socket_address)?;
    socket.listen(LISTENER_BACKLOG)
}

/// Accepts one connection, boxing it into the proxy's type-erased stream.
pub async fn accept_stream(listener: &TcpListener) -> std::io::Result<(Stream, StdSocketAddr)> {
    let (tcp_stream, peer) = listener.accept().await?;
    tcp_stream.set_nodelay(true).ok();
    Ok((Stream::new(tcp_stream), peer))
}

pub fn stream_id(stream: &TcpStream) -> i32 {
    stream.id()
}
