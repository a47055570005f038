use std::time::Duration;

use upbench_protocol::RequestMode;
use upbench_protocol::constants::DEFAULT_BASE_URL;

/// Default connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on waiting for response bytes.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection parameters shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Server root, e.g. `http://localhost:8080`.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Read timeout while waiting for the server.
    pub response_timeout: Duration,
    /// Optional bound on the whole request, upload included.
    pub request_timeout: Option<Duration>,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Full URL of the endpoint serving `mode`.
    pub fn url_for(&self, mode: RequestMode) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), mode.path())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
            request_timeout: None,
        }
    }
}
