use jojq_core::stream::Stream;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::warn;

use crate::context::ProxyContext;

const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Opaque `CONNECT` tunnel: once the client is told the tunnel is up, the
/// proxy observes nothing further. Used when MITM mode is disabled.
pub async fn handle(mut stream: Stream, host: String, port: u16, ctx: &ProxyContext) {
    let upstream = match tokio::time::timeout(
        ctx.config.connect_timeout(),
        TcpStream::connect((host.as_str(), port)),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(%host, port, error = %e, "tunnel upstream connect failed");
            return;
        }
        Err(_) => {
            warn!(%host, port, "tunnel upstream connect timed out");
            return;
        }
    };
    upstream.set_nodelay(true).ok();

    if let Err(e) = stream.write_all(CONNECTION_ESTABLISHED).await {
        warn!(%host, error = %e, "failed writing 200 Connection Established");
        return;
    }
    if let Err(e) = stream.flush().await {
        warn!(%host, error = %e, "failed flushing 200 Connection Established");
        return;
    }

    let mut upstream = upstream;
    match tokio::io::copy_bidirectional(&mut stream, &mut upstream).await {
        Ok((to_upstream, to_client)) => {
            tracing::debug!(%host, to_upstream, to_client, "tunnel closed");
        }
        Err(e) => {
            warn!(%host, error = %e, "tunnel closed with error");
        }
    }
}
