//! Gateway configuration.
//!
//! Everything tunable lives here: listener address and credentials, the
//! two pinned contexts, cache sizing, heartbeat cadence, and the two
//! phrase lists the protocol layer treats as configuration rather than
//! constants (context-lost markers and document-retrieval failure
//! markers).

use std::env;
use std::time::Duration;

use vista_broker::{BrokerConfig, CipherTable, DEFAULT_CONTEXT_LOST_MARKERS};

use crate::error::{GatewayError, Result};

/// Default chart-context name.
pub const DEFAULT_CHART_CONTEXT: &str = "OR CPRS GUI CHART";

/// Default patient-data-XML context name.
pub const DEFAULT_VPR_CONTEXT: &str = "VPR APPLICATION PROXY";

/// Default domain-cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default domain-cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Default heartbeat interval (3 minutes).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(180);

/// Default idle threshold before the heartbeat probes (5 minutes).
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(300);

/// Contexts tried in order when fetching document text; deployments
/// grant different subsets.
pub const DEFAULT_DOCUMENT_CONTEXTS: [&str; 3] = [
    "OR CPRS GUI CHART",
    "DVBA CAPRI GUI",
    "VPR APPLICATION PROXY",
];

/// Reply substrings marking a failed document-text fetch.
pub const DEFAULT_DOCUMENT_FAILURE_MARKERS: [&str; 4] = [
    "not authorized",
    "does not exist",
    "no such",
    "cannot be accessed",
];

/// Configuration for a [`crate::VistaGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub access_code: String,
    pub verify_code: String,
    /// Context for TIU document, lab, and generic chart RPCs.
    pub chart_context: String,
    /// Context for the VPR domain-fetch RPC.
    pub vpr_context: String,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub heartbeat_interval: Duration,
    pub idle_threshold: Duration,
    pub context_lost_markers: Vec<String>,
    pub document_contexts: Vec<String>,
    pub document_failure_markers: Vec<String>,
}

impl GatewayConfig {
    /// Create a configuration with default contexts and tunables.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        access_code: impl Into<String>,
        verify_code: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            access_code: access_code.into(),
            verify_code: verify_code.into(),
            chart_context: DEFAULT_CHART_CONTEXT.to_string(),
            vpr_context: DEFAULT_VPR_CONTEXT.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            context_lost_markers: DEFAULT_CONTEXT_LOST_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            document_contexts: DEFAULT_DOCUMENT_CONTEXTS.iter().map(|s| s.to_string()).collect(),
            document_failure_markers: DEFAULT_DOCUMENT_FAILURE_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Load configuration and cipher table from the environment.
    ///
    /// Required: `VISTA_HOST`, `VISTA_PORT`, `VISTA_ACCESS_CODE`,
    /// `VISTA_VERIFY_CODE`, and one of `VISTA_CIPHER_TABLE` (inline JSON
    /// array) or `VISTA_CIPHER_FILE` (newline-delimited rows). Optional:
    /// `VISTA_CHART_CONTEXT`, `VISTA_VPR_CONTEXT`,
    /// `VISTA_CACHE_TTL_SECS`, `VISTA_CACHE_CAPACITY`,
    /// `VISTA_HEARTBEAT_SECS`, `VISTA_IDLE_SECS`.
    pub fn from_env() -> Result<(Self, CipherTable)> {
        let host = require_env("VISTA_HOST")?;
        let port: u16 = require_env("VISTA_PORT")?
            .parse()
            .map_err(|_| GatewayError::Config("VISTA_PORT is not a port number".to_string()))?;
        let access = require_env("VISTA_ACCESS_CODE")?;
        let verify = require_env("VISTA_VERIFY_CODE")?;

        let cipher = if let Ok(inline) = env::var("VISTA_CIPHER_TABLE") {
            CipherTable::from_json(&inline)?
        } else if let Ok(path) = env::var("VISTA_CIPHER_FILE") {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| GatewayError::Config(format!("reading {}: {}", path, e)))?;
            CipherTable::from_lines(&raw)?
        } else {
            return Err(GatewayError::Config(
                "set VISTA_CIPHER_TABLE or VISTA_CIPHER_FILE".to_string(),
            ));
        };

        let mut config = Self::new(host, port, access, verify);
        if let Ok(context) = env::var("VISTA_CHART_CONTEXT") {
            config.chart_context = context;
        }
        if let Ok(context) = env::var("VISTA_VPR_CONTEXT") {
            config.vpr_context = context;
        }
        if let Some(secs) = optional_secs("VISTA_CACHE_TTL_SECS")? {
            config.cache_ttl = secs;
        }
        if let Ok(capacity) = env::var("VISTA_CACHE_CAPACITY") {
            config.cache_capacity = capacity.parse().map_err(|_| {
                GatewayError::Config("VISTA_CACHE_CAPACITY is not a count".to_string())
            })?;
        }
        if let Some(secs) = optional_secs("VISTA_HEARTBEAT_SECS")? {
            config.heartbeat_interval = secs;
        }
        if let Some(secs) = optional_secs("VISTA_IDLE_SECS")? {
            config.idle_threshold = secs;
        }
        Ok((config, cipher))
    }

    /// Set both pinned context names.
    pub fn with_contexts(
        mut self,
        chart_context: impl Into<String>,
        vpr_context: impl Into<String>,
    ) -> Self {
        self.chart_context = chart_context.into();
        self.vpr_context = vpr_context.into();
        self
    }

    /// Set the domain-cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the domain-cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Replace the document-context priority list.
    pub fn with_document_contexts(mut self, contexts: Vec<String>) -> Self {
        self.document_contexts = contexts;
        self
    }

    /// The `host:port` site identity used in cache keys.
    pub fn site(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Broker configuration for the session pinned to `context`.
    pub fn broker_config(&self, context: &str) -> BrokerConfig {
        BrokerConfig::new(
            self.host.clone(),
            self.port,
            self.access_code.clone(),
            self.verify_code.clone(),
            context,
        )
        .with_context_lost_markers(self.context_lost_markers.clone())
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| GatewayError::Config(format!("{} is not set", name)))
}

fn optional_secs(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|_| GatewayError::Config(format!("{} is not a number of seconds", name)))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}
