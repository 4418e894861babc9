use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{self, AsyncRead, AsyncWrite, ReadBuf};

use super::traits::UniqueID;

/// Large read buffering helps reduce syscalls with little trade-off. TLS
/// always does "small" reads in 16k (TLS record size) so a sizeable L4
/// read buffer helps a lot.
pub const BUF_READ_SIZE: usize = 64 * 1024;

/// A trait object requirement for anything that can stand in as one side
/// of a proxied connection: a plain TCP socket, a TLS server stream
/// (client-facing MITM termination), or a TLS client stream (MITM'd
/// upstream connection).
pub trait StreamRules: AsyncRead + AsyncWrite + UniqueID + Unpin + Send + Sync {}

impl<T> StreamRules for T where T: AsyncRead + AsyncWrite + UniqueID + Unpin + Send + Sync {}

/// A concrete type for one half of a proxied connection, type-erased so
/// that handlers don't need to be generic over Tcp vs TlsStream.
pub struct Stream(Box<dyn StreamRules>);

impl Stream {
    pub fn new(inner: impl StreamRules + 'static) -> Self {
        Stream(Box::new(inner))
    }
}

impl UniqueID for Stream {
    fn id(&self) -> i32 {
        self.0.id()
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.0).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.0.is_write_vectored()
    }
}
