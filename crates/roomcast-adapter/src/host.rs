//! What the adapter requires of its host.
//!
//! The host owns the live connections. The adapter only stores ids and
//! asks the registry for a handle at delivery time, so a connection that
//! went away between resolution and delivery is skipped.

use std::sync::Arc;

use roomcast_protocol::{ConnId, EncodedFrame, RoomId, TransmitOptions};

/// The host's registry of live connections for one namespace.
pub trait SocketRegistry: Send + Sync + 'static {
    /// The connection handle type.
    type Socket: Socket;

    /// Name stamped on every broadcast packet.
    fn namespace(&self) -> &str;

    /// Looks up a live connection. `None` if it has gone away.
    fn get(&self, id: &ConnId) -> Option<Arc<Self::Socket>>;
}

/// A live connection as seen by the adapter.
///
/// None of these may block: they're called once per matched connection
/// on the broadcast path and from flush tasks.
pub trait Socket: Send + Sync + 'static {
    fn id(&self) -> &ConnId;

    /// Queues pre-encoded frames for delivery.
    fn send(&self, frames: &[EncodedFrame], options: &TransmitOptions);

    /// Joins additional rooms. Hosts route this back into
    /// [`Adapter::add_all`](crate::Adapter::add_all).
    fn join(&self, rooms: &[RoomId]);

    /// Leaves one room. Hosts route this back into
    /// [`Adapter::del`](crate::Adapter::del).
    fn leave(&self, room: &RoomId);

    /// Disconnects the connection, closing the underlying transport if
    /// `close` is set.
    fn disconnect(&self, close: bool);
}
