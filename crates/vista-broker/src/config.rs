//! Connection parameters for a broker session.

use std::time::Duration;

/// Default TCP connect timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-operation read/write timeout (30 seconds).
///
/// The legacy client used blocking sockets with no timeout; a bound is
/// applied here so a hung listener cannot pin a caller forever.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Reply substrings that indicate the application context was lost and the
/// session must reconnect. Deployments phrase these differently, so the
/// list is configuration with these defaults.
pub const DEFAULT_CONTEXT_LOST_MARKERS: [&str; 2] =
    ["has not been created", "does not exist"];

/// Immutable parameters for one broker session.
///
/// A session is re-created, not mutated, when parameters change.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// VistA listener host.
    pub host: String,
    /// VistA listener port.
    pub port: u16,
    /// ACCESS code, passed through to the server unvalidated.
    pub access_code: String,
    /// VERIFY code, passed through to the server unvalidated.
    pub verify_code: String,
    /// The application context this session is pinned to.
    pub context: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Read/write timeout applied to each protocol step.
    pub io_timeout: Duration,
    /// Reply substrings treated as context loss.
    pub context_lost_markers: Vec<String>,
}

impl BrokerConfig {
    /// Create a configuration with default timeouts and markers.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        access_code: impl Into<String>,
        verify_code: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            access_code: access_code.into(),
            verify_code: verify_code.into(),
            context: context.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            context_lost_markers: DEFAULT_CONTEXT_LOST_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Set the TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-operation I/O timeout.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Replace the context-lost marker list.
    pub fn with_context_lost_markers(mut self, markers: Vec<String>) -> Self {
        self.context_lost_markers = markers;
        self
    }

    /// The `host:port` pair identifying this site.
    pub fn site(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
