use std::sync::Arc;

use bytes::BytesMut;
use http::Version;
use jojq_core::conn::{Inbound, Outbound};
use jojq_core::http::RequestHeader;
use jojq_core::stream::Stream;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, DigitallySignedStruct, Error as TlsError, ServerConfig, SignatureScheme};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::warn;

use super::headers::{headers_to_map, is_hop_by_hop, resolve_target};
use crate::ca::CaManager;
use crate::capture::{try_capture, RequestMeta, ResponseMeta};
use crate::context::ProxyContext;
use crate::error::{ProxyError, ProxyResult};

const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Resolves a leaf certificate by the client's SNI hostname, minting one
/// through the CA manager on first use. Falls back to the `CONNECT`
/// target when the client TLS handshake carries no SNI.
struct SniResolver {
    ca: Arc<CaManager>,
    fallback_host: String,
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let host = client_hello
            .server_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.fallback_host.clone());

        let leaf = match self.ca.leaf_for(&host) {
            Ok(leaf) => leaf,
            Err(e) => {
                warn!(host = %host, error = %e, "leaf mint failed during handshake");
                return None;
            }
        };

        let signing_key = rustls::crypto::ring::sign::any_supported_type(&leaf.key).ok()?;
        Some(Arc::new(CertifiedKey::new(leaf.chain.clone(), signing_key)))
    }
}

#[derive(Debug)]
struct NoVerify;

impl ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn insecure_client_config() -> Arc<ClientConfig> {
    let mut config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerify))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

/// Terminates TLS with the client, SNI-selecting a freshly minted leaf,
/// then parses the decrypted byte stream as HTTP/1.1, forwarding each
/// request over its own fresh upstream TLS connection (verification
/// disabled) and running the capture pipeline on JSON responses.
pub async fn handle(mut stream: Stream, connect_host: String, connect_port: u16, ctx: Arc<ProxyContext>) {
    let ca = match &ctx.ca {
        Some(ca) => ca.clone(),
        None => {
            warn!("MITM requested but CA manager is not configured");
            return;
        }
    };

    if let Err(e) = stream.write_all(CONNECTION_ESTABLISHED).await {
        warn!(host = %connect_host, error = %e, "failed writing 200 Connection Established");
        return;
    }
    if let Err(e) = stream.flush().await {
        warn!(host = %connect_host, error = %e, "failed flushing 200 Connection Established");
        return;
    }

    let resolver = Arc::new(SniResolver {
        ca: ca.clone(),
        fallback_host: connect_host.clone(),
    });
    let server_config = Arc::new(
        ServerConfig::builder()
            .with_no_client_auth()
            .with_cert_resolver(resolver),
    );
    let acceptor = TlsAcceptor::from(server_config);

    let tls_stream = match acceptor.accept(stream).await {
        Ok(s) => s,
        Err(e) => {
            let err = ProxyError::ClientTls(e.to_string());
            warn!(host = %connect_host, error = %err, "client TLS handshake failed");
            return;
        }
    };

    let mut inbound = Inbound::new(Stream::new(tls_stream));
    let client_config = insecure_client_config();

    loop {
        match inbound.read_request().await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(host = %connect_host, error = %e, "failed reading MITM'd request");
                return;
            }
        }

        if let Err(e) = handle_one(
            &mut inbound,
            &ctx,
            &connect_host,
            connect_port,
            client_config.clone(),
        )
        .await
        {
            warn!(host = %connect_host, error = %e, "MITM request failed");
            let _ = inbound
                .write_plain_response(502, "Bad Gateway", "Bad Gateway")
                .await;
            return;
        }
    }
}

async fn handle_one(
    inbound: &mut Inbound,
    ctx: &ProxyContext,
    connect_host: &str,
    connect_port: u16,
    client_config: Arc<ClientConfig>,
) -> ProxyResult<()> {
    let req = inbound.get_request_header().clone();
    let (host, port, origin_path) =
        resolve_target(&req, connect_port).unwrap_or_else(|| (connect_host.to_string(), connect_port, "/".to_string()));

    let tcp = tokio::time::timeout(ctx.config.connect_timeout(), TcpStream::connect((host.as_str(), port)))
        .await
        .map_err(|_| ProxyError::UpstreamConnect(tokio::io::Error::new(tokio::io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(ProxyError::UpstreamConnect)?;
    tcp.set_nodelay(true).ok();

    let server_name = ServerName::try_from(host.clone())
        .map_err(|_| ProxyError::UpstreamTls("invalid server name".to_string()))?;
    let connector = TlsConnector::from(client_config);
    let upstream_tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| ProxyError::UpstreamTls(e.to_string()))?;

    let mut outbound = Outbound::new(Stream::new(upstream_tls));
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

    let url = format!("https://{host}{}", if port == 443 { String::new() } else { format!(":{port}") }) + &origin_path;
    let req_meta = RequestMeta {
        url,
        method: req.get_method().to_string(),
        headers: headers_to_map(&req.metadata.headers),
        body: request_body.freeze(),
    };
    let resp_meta = ResponseMeta {
        status_code: response_header.get_raw_status_code(),
        headers: headers_to_map(response_header.headers()),
    };

    if let Some(record) = try_capture(req_meta, resp_meta, &response_body.freeze(), ctx.config.max_body_bytes).await {
        let ordinal = ctx.captures.append(record);
        tracing::info!(ordinal, host = %host, status = response_header.get_raw_status_code(), "capture recorded");
    }

    Ok(())
}

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
        let host_value = if port == 443 {
            host.to_string()
        } else {
            format!("{host}:{port}")
        };
        forwarded.insert_header(http::header::HOST, host_value.as_str());
    }
    forwarded.insert_header(http::header::CONNECTION, "close");

    forwarded
}
