use std::sync::Arc;

use crate::ca::CaManager;
use crate::capture::CaptureBuffer;
use crate::config::ProxyConfig;

/// Collaborators shared across every accepted connection: the parsed
/// configuration, the capture buffer, and (in MITM mode) the CA manager.
/// Constructed once in `main` and handed down by `Arc` rather than reached
/// for as global state.
pub struct ProxyContext {
    pub config: ProxyConfig,
    pub captures: CaptureBuffer,
    pub ca: Option<Arc<CaManager>>,
}

impl ProxyContext {
    pub fn new(config: ProxyConfig, ca: Option<Arc<CaManager>>) -> Self {
        let captures = CaptureBuffer::new(config.max_captures);
        ProxyContext { config, captures, ca }
    }
}
