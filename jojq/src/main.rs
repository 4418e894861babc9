use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use jojq::ca::CaManager;
use jojq::config::ProxyConfig;
use jojq::context::ProxyContext;
use jojq::{console, net};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ProxyConfig::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let ca = if config.insecure {
        let ca_dir = config.ca_dir();
        info!(dir = %ca_dir.display(), "MITM mode enabled, loading CA");
        let manager = CaManager::load_or_generate(&ca_dir, config.max_leaf_cache)
            .context("failed to load or generate CA")?;
        info!(cert = %manager.ca_cert_path().display(), "import this certificate into your client to trust MITM'd traffic");
        Some(Arc::new(manager))
    } else {
        None
    };

    let port = config.port;
    let tcp_listener = net::acceptor::bind(port)
        .await
        .with_context(|| format!("failed to bind proxy listener on port {port}"))?;

    let ctx = Arc::new(ProxyContext::new(config, ca));

    let acceptor_ctx = ctx.clone();
    let mut acceptor = tokio::spawn(async move { net::acceptor::serve(tcp_listener, acceptor_ctx).await });

    let console_ctx = ctx.clone();
    let mut console_task = tokio::spawn(console::run(console_ctx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = &mut console_task => {
            info!("operator console exited");
        }
        result = &mut acceptor => {
            match result {
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "listener failed");
                    std::process::exit(1);
                }
                Err(e) => {
                    tracing::error!(error = %e, "acceptor task panicked");
                    std::process::exit(1);
                }
                Ok(Ok(())) => {
                    tracing::error!("acceptor exited unexpectedly");
                    std::process::exit(1);
                }
            }
        }
    }

    acceptor.abort();
    console_task.abort();
    Ok(())
}
