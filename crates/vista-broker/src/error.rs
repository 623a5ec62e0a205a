//! Error types for RPC Broker operations.

use std::io;
use thiserror::Error;

/// Errors that can occur while talking to an RPC Broker listener.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// I/O error from the underlying TCP connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection was closed by the server before a frame terminator arrived.
    #[error("Connection closed mid-frame")]
    ConnectionClosed,

    /// An operation exceeded its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The TCPConnect preamble was not accepted by the listener.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// ACCESS/VERIFY pair rejected after both encrypted and plaintext attempts.
    #[error("Invalid ACCESS CODE/VERIFY CODE pair")]
    AccessDenied,

    /// Application context could not be created after both plaintext and
    /// encrypted attempts.
    #[error("Context {context:?} rejected: {reply}")]
    ContextRejected { context: String, reply: String },

    /// RPC names are length-prefixed with a single byte on the wire.
    #[error("RPC name too long: {len} bytes (max: 255)")]
    RpcNameTooLong { len: usize },

    /// Parameter lengths are encoded as three decimal digits on the wire.
    #[error("RPC parameter too long: {len} bytes (max: 999)")]
    ParamTooLong { len: usize },

    /// An invoke was attempted on a session that has no live socket and
    /// could not re-establish one.
    #[error("Session not connected")]
    NotConnected,

    /// The cipher table failed validation at load time.
    #[error("Invalid cipher table: {0}")]
    InvalidCipherTable(String),
}

/// Result type alias for Broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
