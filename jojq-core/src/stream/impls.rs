use std::os::unix::io::AsRawFd;

use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::server::TlsStream as ServerTlsStream;

use super::traits::UniqueID;

impl UniqueID for TcpStream {
    fn id(&self) -> i32 {
        self.as_raw_fd()
    }
}

// MITM re-terminates TLS over an already-boxed `Stream` (the inbound
// client socket accepted by the listener), so these impls are generic
// over any inner id-bearing stream rather than pinned to `TcpStream`.
impl<S: UniqueID> UniqueID for ServerTlsStream<S> {
    fn id(&self) -> i32 {
        self.get_ref().0.id()
    }
}

impl<S: UniqueID> UniqueID for ClientTlsStream<S> {
    fn id(&self) -> i32 {
        self.get_ref().0.id()
    }
}
