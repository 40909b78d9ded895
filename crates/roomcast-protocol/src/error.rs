//! Error types for the protocol layer.
//!
//! Each crate in Roomcast defines its own error enum. A `ProtocolError`
//! always means the problem is in turning packets into frames (or back),
//! never in routing or room membership.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a packet header to JSON failed.
    ///
    /// The inner `serde_json::Error` is kept so callers can log the
    /// original cause.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Parsing a packet header from JSON failed.
    ///
    /// Common causes: malformed JSON, missing required fields, or a
    /// binary frame where the header was expected.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frames are well-formed JSON but violate packet rules, e.g.
    /// the header announces three attachments and only two follow.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
}
