use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind proxy listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("CA directory is unwritable: {0}")]
    CaDirUnwritable(#[source] std::io::Error),

    #[error("failed to generate CA material: {0}")]
    CaGenerate(String),

    #[error("failed to mint leaf certificate for {host}: {source}")]
    LeafMint { host: String, source: String },

    #[error("upstream connect failed: {0}")]
    UpstreamConnect(#[source] std::io::Error),

    #[error("upstream TLS handshake failed: {0}")]
    UpstreamTls(String),

    #[error("client TLS handshake failed: {0}")]
    ClientTls(String),

    #[error("request parse failed: {0}")]
    RequestParse(#[source] std::io::Error),

    #[error("response parse failed: {0}")]
    ResponseParse(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProxyResult<T> = Result<T, ProxyError>;
