//! Lifecycle notifications emitted by the membership index.

use roomcast_protocol::{ConnId, RoomId};

/// A membership change, emitted synchronously at the point of mutation.
///
/// Ordering guarantees per call:
/// - `RoomCreated` precedes the first `JoinedRoom` for that room;
/// - `LeftRoom` precedes the `RoomDeleted` it caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    RoomCreated(RoomId),
    RoomDeleted(RoomId),
    JoinedRoom { room: RoomId, conn: ConnId },
    LeftRoom { room: RoomId, conn: ConnId },
}

impl LifecycleEvent {
    /// The room this event is about.
    pub fn room(&self) -> &RoomId {
        match self {
            Self::RoomCreated(room)
            | Self::RoomDeleted(room)
            | Self::JoinedRoom { room, .. }
            | Self::LeftRoom { room, .. } => room,
        }
    }
}
