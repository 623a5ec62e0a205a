//! Error types for VPR response parsing.
//!
//! These surface from the strict parse entry points only; the recovering
//! entry point ([`crate::parse_domain_response`]) falls back through every
//! parse path and returns an empty item list rather than an error, so one
//! malformed domain cannot abort a fullchart aggregation.

use thiserror::Error;

/// Errors from strict VPR parsing.
#[derive(Debug, Error)]
pub enum VprError {
    /// The text was not well-formed XML.
    #[error("XML error: {0}")]
    Xml(String),

    /// The XML parsed but did not carry the expected shape.
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),
}

/// Result type alias for VPR parsing.
pub type Result<T> = std::result::Result<T, VprError>;
