//! Error types for the adapter layer.
//!
//! Membership and routing never fail; these errors only come out of a
//! flush (reported to the scheduler, which logs them) and out of config
//! parsing (reported to the host at startup).

use roomcast_protocol::{ProtocolError, RoomId};

/// Errors that can occur while draining a room's batch buffer.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The aggregate packet couldn't be encoded. The dequeued entries
    /// are dropped.
    #[error("flush of room {room} dropped {dropped} entries: {source}")]
    Drain {
        room: RoomId,
        dropped: usize,
        #[source]
        source: ProtocolError,
    },
}

/// A configuration variable holds a value the adapter can't run with.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}
