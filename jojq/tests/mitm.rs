mod common;

use std::sync::Arc;

use async_compression::tokio::write::GzipEncoder;
use jojq::ca::CaManager;
use jojq_core::listener;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, DigitallySignedStruct, Error as TlsError, SignatureScheme};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Test-side mirror of `net::mitm::NoVerify`: the test client has no
/// interest in validating the freshly minted leaf's chain (that's covered
/// by the `ca` module's own tests), only in completing the handshake.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
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

fn test_client_config() -> Arc<ClientConfig> {
    let mut config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

fn ca_test_dir(name: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("jojq-mitm-test-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[tokio::test]
async fn mitm_decrypts_and_captures_gzip_json() {
    rustls::crypto::ring::default_provider().install_default().ok();

    let mut enc = GzipEncoder::new(Vec::new());
    enc.write_all(br#"{"secret":42}"#).await.unwrap();
    enc.shutdown().await.unwrap();
    let gzipped = enc.into_inner();

    let response = {
        let mut header = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            gzipped.len()
        )
        .into_bytes();
        header.extend_from_slice(&gzipped);
        header
    };
    let upstream = common::spawn_fixed_response_upstream(Box::leak(response.into_boxed_slice())).await;

    let mut config = common::test_config();
    config.insecure = true;
    let ca_dir = ca_test_dir("gzip");
    let ca = CaManager::load_or_generate(&ca_dir, 10).unwrap();
    let ctx = Arc::new(jojq::context::ProxyContext::new(config, Some(Arc::new(ca))));

    let proxy_listener = listener::bind_tcp("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy_listener.local_addr().unwrap();

    let accept_ctx = ctx.clone();
    tokio::spawn(async move {
        let (stream, peer) = listener::accept_stream(&proxy_listener).await.unwrap();
        jojq::net::acceptor::handle_connection(stream, peer, accept_ctx).await;
    });

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let connect_req = "CONNECT mitm.local.test:443 HTTP/1.1\r\nHost: mitm.local.test:443\r\n\r\n";
    client.write_all(connect_req.as_bytes()).await.unwrap();

    let mut established = [0u8; 64];
    let n = client.read(&mut established).await.unwrap();
    assert!(String::from_utf8_lossy(&established[..n]).starts_with("HTTP/1.1 200"));

    let connector = TlsConnector::from(test_client_config());
    let server_name = ServerName::try_from("mitm.local.test").unwrap();
    let mut tls = connector.connect(server_name, client).await.unwrap();

    let request = format!(
        "GET / HTTP/1.1\r\nHost: {upstream}\r\nConnection: close\r\n\r\n"
    );
    tls.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tls.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200"));

    assert_eq!(ctx.captures.len(), 1);
    let record = ctx.captures.get(1).unwrap();
    assert_eq!(record.response.body, serde_json::json!({"secret": 42}));

    std::fs::remove_dir_all(&ca_dir).ok();
}
