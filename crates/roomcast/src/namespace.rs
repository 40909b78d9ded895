//! An in-process host: a namespace of local connections driving an
//! [`InMemoryAdapter`].
//!
//! Each connection is a [`LocalSocket`] whose outbound traffic lands on an
//! unbounded channel, so a transport (or a test) just reads [`Outbound`]
//! items off the receiver returned by [`LocalNamespace::connect`].

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use roomcast_adapter::{
    Adapter, AdapterConfig, BroadcastFilter, InMemoryAdapter, Socket,
    SocketRegistry,
};
use roomcast_protocol::{
    ConnId, EncodedFrame, JsonCodec, Packet, RoomId, TransmitOptions,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::RoomcastError;

/// The adapter type a [`LocalNamespace`] runs on.
pub type LocalAdapter = InMemoryAdapter<LocalRegistry, JsonCodec>;

/// Something a local connection is told to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Pre-encoded frames to write to the transport.
    Frames {
        frames: Vec<EncodedFrame>,
        options: TransmitOptions,
    },
    /// The connection was disconnected by the server.
    Disconnect { close: bool },
}

/// Receiving half of a local connection.
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

// ---------------------------------------------------------------------------
// LocalRegistry
// ---------------------------------------------------------------------------

/// Live connections of one namespace, looked up by the adapter at
/// delivery time.
pub struct LocalRegistry {
    name: String,
    sockets: RwLock<HashMap<ConnId, Arc<LocalSocket>>>,
}

impl LocalRegistry {
    fn remove(&self, id: &ConnId) -> Option<Arc<LocalSocket>> {
        self.sockets.write().remove(id)
    }
}

impl SocketRegistry for LocalRegistry {
    type Socket = LocalSocket;

    fn namespace(&self) -> &str {
        &self.name
    }

    fn get(&self, id: &ConnId) -> Option<Arc<LocalSocket>> {
        self.sockets.read().get(id).cloned()
    }
}

// ---------------------------------------------------------------------------
// LocalSocket
// ---------------------------------------------------------------------------

/// One local connection.
///
/// Holds only weak references back to its namespace: the adapter owns the
/// registry, the registry owns the sockets.
pub struct LocalSocket {
    id: ConnId,
    tx: mpsc::UnboundedSender<Outbound>,
    adapter: Weak<LocalAdapter>,
    registry: Weak<LocalRegistry>,
}

impl LocalSocket {
    /// Rooms this connection is in, including its own id room.
    pub fn rooms(&self) -> BTreeSet<RoomId> {
        self.adapter
            .upgrade()
            .and_then(|adapter| adapter.socket_rooms(&self.id))
            .unwrap_or_default()
    }

    /// Sends an event to every member of `room` except this connection.
    pub fn broadcast_to(&self, room: impl Into<RoomId>, event: &str, data: Value) {
        if let Some(adapter) = self.adapter.upgrade() {
            let filter = BroadcastFilter::to_room(room).except_conn(self.id.clone());
            adapter.broadcast(
                Packet::event(event, data),
                &filter,
                TransmitOptions::default(),
            );
        }
    }

    fn push(&self, item: Outbound) {
        if self.tx.send(item).is_err() {
            tracing::trace!(conn = %self.id, "receiver dropped, discarding outbound");
        }
    }
}

impl Socket for LocalSocket {
    fn id(&self) -> &ConnId {
        &self.id
    }

    fn send(&self, frames: &[EncodedFrame], options: &TransmitOptions) {
        self.push(Outbound::Frames {
            frames: frames.to_vec(),
            options: *options,
        });
    }

    fn join(&self, rooms: &[RoomId]) {
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.add_all(&self.id, rooms);
        }
    }

    fn leave(&self, room: &RoomId) {
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.del(&self.id, room);
        }
    }

    /// Removes the connection from the namespace and every room, then
    /// tells its receiver. A second call does nothing.
    fn disconnect(&self, close: bool) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if registry.remove(&self.id).is_none() {
            return;
        }
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.del_all(&self.id);
        }
        tracing::debug!(conn = %self.id, close, "connection disconnected");
        self.push(Outbound::Disconnect { close });
    }
}

// ---------------------------------------------------------------------------
// LocalNamespace
// ---------------------------------------------------------------------------

/// A namespace of local connections.
///
/// ```rust
/// use roomcast::prelude::*;
/// use serde_json::json;
///
/// let nsp = LocalNamespace::new("/chat", AdapterConfig::default());
/// let (alice, mut rx) = nsp.connect();
/// alice.join(&[RoomId::from("lobby")]);
///
/// nsp.emit_to(["lobby"], "hello", json!("world"));
/// assert!(matches!(rx.try_recv(), Ok(Outbound::Frames { .. })));
/// ```
pub struct LocalNamespace {
    registry: Arc<LocalRegistry>,
    adapter: Arc<LocalAdapter>,
}

impl LocalNamespace {
    pub fn new(name: impl Into<String>, config: AdapterConfig) -> Self {
        let registry = Arc::new(LocalRegistry {
            name: name.into(),
            sockets: RwLock::new(HashMap::new()),
        });
        let adapter = InMemoryAdapter::new(Arc::clone(&registry), JsonCodec, config);
        tracing::info!(nsp = %registry.name, "namespace created");
        Self { registry, adapter }
    }

    /// A namespace configured from the `ROOMCAST_*` environment variables.
    ///
    /// # Errors
    /// Returns [`RoomcastError::Config`] if a variable is malformed.
    pub fn from_env(name: impl Into<String>) -> Result<Self, RoomcastError> {
        Ok(Self::new(name, AdapterConfig::from_env()?))
    }

    pub fn name(&self) -> &str {
        &self.registry.name
    }

    pub fn adapter(&self) -> &Arc<LocalAdapter> {
        &self.adapter
    }

    /// Registers a new connection with a random id and joins it to the
    /// room named after that id, so it can be addressed directly.
    pub fn connect(&self) -> (Arc<LocalSocket>, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = Arc::new(LocalSocket {
            id: ConnId::generate(),
            tx,
            adapter: Arc::downgrade(&self.adapter),
            registry: Arc::downgrade(&self.registry),
        });

        self.registry
            .sockets
            .write()
            .insert(socket.id.clone(), Arc::clone(&socket));
        self.adapter
            .add_all(&socket.id, &[RoomId::from(&socket.id)]);
        tracing::debug!(conn = %socket.id, nsp = %self.registry.name, "connection registered");

        (socket, rx)
    }

    /// Looks up a live connection.
    pub fn socket(&self, id: &ConnId) -> Option<Arc<LocalSocket>> {
        self.registry.get(id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.registry.sockets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends an event to every member of `rooms`.
    pub fn emit_to<I, R>(&self, rooms: I, event: &str, data: Value)
    where
        I: IntoIterator<Item = R>,
        R: Into<RoomId>,
    {
        self.adapter.broadcast(
            Packet::event(event, data),
            &BroadcastFilter::to_rooms(rooms),
            TransmitOptions::default(),
        );
    }

    /// Sends an event to every connection.
    pub fn emit_all(&self, event: &str, data: Value) {
        self.adapter.broadcast(
            Packet::event(event, data),
            &BroadcastFilter::all(),
            TransmitOptions::default(),
        );
    }

    /// Disconnects every connection matching `filter`.
    pub fn disconnect_all(&self, filter: &BroadcastFilter, close: bool) {
        self.adapter.disconnect_sockets(filter, close);
    }

    /// Flushes pending batches and stops the flush timer.
    pub async fn close(&self) {
        self.adapter.close().await;
        tracing::info!(nsp = %self.registry.name, "namespace closed");
    }
}
