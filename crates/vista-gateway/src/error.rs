//! Error types for gateway operations.

use thiserror::Error;
use vista_broker::BrokerError;

/// Errors surfaced by gateway operations.
///
/// Parse problems never appear here: the VPR layer recovers them to empty
/// item lists, so callers can distinguish "no data" (empty list) from
/// "could not reach VistA" (an error).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A broker session failed (transport, handshake, or protocol).
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// A caller-supplied domain name did not resolve.
    #[error("Unknown clinical domain: {0:?}")]
    UnknownDomain(String),

    /// No configured context yielded text for a document.
    #[error("No context yielded text for document {id}")]
    NoDocumentText { id: String },

    /// Configuration was missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
