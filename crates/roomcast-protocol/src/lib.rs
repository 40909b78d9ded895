//! Packet model for Roomcast.
//!
//! This crate defines what the room adapter routes:
//!
//! - **Identifiers** ([`ConnId`], [`RoomId`]) — opaque string newtypes.
//! - **Packets** ([`Packet`], [`PacketType`], [`TransmitOptions`]) — one
//!   logical outbound message plus its delivery options.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how a packet becomes
//!   [`EncodedFrame`]s, once per broadcast.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer doesn't know about rooms or connections; it only
//! knows how to describe and encode messages.

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    BATCH_EVENT, ConnId, EncodedFrame, Packet, PacketType, RoomId,
    TransmitOptions,
};
