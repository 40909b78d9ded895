//! Unified error type for Roomcast.

use roomcast_adapter::{AdapterError, ConfigError};
use roomcast_protocol::ProtocolError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RoomcastError {
    /// Encoding or decoding a packet failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A batch flush failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// A configuration variable couldn't be used.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
