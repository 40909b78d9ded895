//! Core protocol types: identifiers, packets, transmit options, frames.
//!
//! Everything in here is plain data. Rooms, routing and batching live in
//! `roomcast-adapter`; this module only describes what gets routed.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name carried by the aggregate packet a flush produces.
///
/// Clients that receive an event with this name unpack its payload with
/// [`Packet::batch_entries`] and process each entry as if it had arrived
/// on its own.
pub const BATCH_EVENT: &str = "batched-broadcast";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque identifier for a connection attached to the host.
///
/// A newtype over `String` so a `ConnId` can't be passed where a
/// `RoomId` is expected. `#[serde(transparent)]` keeps it a plain JSON
/// string on the wire.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConnId(String);

impl ConnId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier (20 hex characters, 80 bits).
    pub fn generate() -> Self {
        let bytes: [u8; 10] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ConnId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a room: a named group of connections.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wraps an existing room name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the room name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A connection is implicitly addressable as a room of its own.
impl From<&ConnId> for RoomId {
    fn from(id: &ConnId) -> Self {
        Self(id.0.clone())
    }
}

// ---------------------------------------------------------------------------
// PacketType
// ---------------------------------------------------------------------------

/// The logical category of a packet.
///
/// The snake_case name doubles as the "category" half of a batching
/// exemption (`event:typing` exempts `Event` packets named `typing`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketType {
    /// The name used in logs and exemption lists.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Event => "event",
            Self::Ack => "ack",
            Self::ConnectError => "connect_error",
            Self::BinaryEvent => "binary_event",
            Self::BinaryAck => "binary_ack",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One logical outbound message.
///
/// For events, `data` is a JSON array whose first element is the event
/// name: `["chat", {"text": "hi"}]`. Binary payloads travel as
/// `attachments` and are encoded as separate frames after the header.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub packet_type: PacketType,
    /// Namespace the packet belongs to. Stamped by the adapter on
    /// broadcast, so callers can leave it empty.
    pub nsp: String,
    /// Acknowledgement id, if the sender expects an ack.
    pub id: Option<u64>,
    pub data: Value,
    pub attachments: Vec<Vec<u8>>,
}

impl Packet {
    /// Creates an event packet: `data = [event, payload]`.
    pub fn event(event: &str, payload: Value) -> Self {
        Self {
            packet_type: PacketType::Event,
            nsp: String::new(),
            id: None,
            data: Value::Array(vec![Value::String(event.to_owned()), payload]),
            attachments: Vec::new(),
        }
    }

    /// Creates a binary event carrying `attachments` after the header.
    pub fn binary_event(
        event: &str,
        payload: Value,
        attachments: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            packet_type: PacketType::BinaryEvent,
            attachments,
            ..Self::event(event, payload)
        }
    }

    /// Creates the aggregate packet a flush sends: one event named
    /// [`BATCH_EVENT`] whose payload is the list of encoded entries,
    /// oldest first.
    pub fn batch(entries: Vec<String>) -> Self {
        let entries = entries.into_iter().map(Value::String).collect();
        Self::event(BATCH_EVENT, Value::Array(entries))
    }

    /// Returns the event name (first element of `data`), if any.
    ///
    /// This is the "action" half of a batching exemption.
    pub fn event_name(&self) -> Option<&str> {
        match &self.data {
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Returns the encoded entries of an aggregate packet, or `None` if
    /// this packet isn't one.
    pub fn batch_entries(&self) -> Option<Vec<&str>> {
        if self.event_name() != Some(BATCH_EVENT) {
            return None;
        }
        let entries = self.data.get(1)?.as_array()?;
        entries.iter().map(Value::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// TransmitOptions
// ---------------------------------------------------------------------------

/// Per-send delivery options handed to the host's send primitive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub struct TransmitOptions {
    /// Frames are already encoded; the host must not re-encode them.
    pub pre_encoded: bool,
    /// The message may be dropped if the connection isn't writable.
    pub volatile: bool,
    /// The host may compress the frames.
    pub compress: bool,
}

impl TransmitOptions {
    /// Options for a volatile send.
    pub fn volatile() -> Self {
        Self {
            volatile: true,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// EncodedFrame
// ---------------------------------------------------------------------------

/// One unit produced by a [`Codec`](crate::Codec): a text header or a
/// binary attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl EncodedFrame {
    /// Returns the text content, or `None` for binary frames.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
