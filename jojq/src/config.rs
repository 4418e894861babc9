use std::path::PathBuf;

use clap::Parser;

/// Interactive HTTP(S) interception proxy for capturing JSON API traffic.
#[derive(Debug, Parser, Clone)]
#[command(name = "jojq", version, about)]
pub struct ProxyConfig {
    /// Port to accept proxy connections on.
    #[arg(long, default_value_t = 8888)]
    pub port: u16,

    /// Enable MITM mode: terminate TLS and decrypt CONNECT tunnels instead
    /// of forwarding them opaquely.
    #[arg(long)]
    pub insecure: bool,

    /// Directory holding ca-key.pem / ca-cert.pem, created on first run.
    #[arg(long)]
    pub ca_dir: Option<PathBuf>,

    /// Maximum number of capture records retained in memory.
    #[arg(long, default_value_t = 100)]
    pub max_captures: usize,

    /// Maximum decoded response body size considered for capture, in bytes.
    #[arg(long, default_value_t = 25 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Maximum number of leaf certificates cached in memory.
    #[arg(long, default_value_t = 1000)]
    pub max_leaf_cache: usize,

    /// Timeout for connecting to the upstream host, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub connect_timeout_ms: u64,

    /// Idle timeout while reading from the upstream host, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub read_timeout_ms: u64,

    /// Directory exported captures are written to.
    #[arg(long, default_value = "./captures")]
    pub export_dir: PathBuf,
}

impl ProxyConfig {
    pub fn ca_dir(&self) -> PathBuf {
        self.ca_dir.clone().unwrap_or_else(default_ca_dir)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.read_timeout_ms)
    }
}

fn default_ca_dir() -> PathBuf {
    dirs_ca_dir().unwrap_or_else(|| PathBuf::from(".jojq/ca"))
}

fn dirs_ca_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".jojq").join("ca"))
}
