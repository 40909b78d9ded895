//! # Roomcast
//!
//! Room membership and broadcast routing for real-time servers.
//!
//! A namespace's connections join named rooms; a broadcast names target
//! rooms and exclusions and reaches each matching connection exactly
//! once. With batching enabled, room broadcasts are held per room and
//! flushed on a timer as a single aggregate packet.
//!
//! ## Quick Start
//!
//! ```rust
//! use roomcast::prelude::*;
//! use serde_json::json;
//!
//! roomcast::init_tracing();
//!
//! let nsp = LocalNamespace::new("/game", AdapterConfig::default());
//! let (player, mut rx) = nsp.connect();
//! player.join(&[RoomId::from("table-1")]);
//!
//! nsp.emit_to(["table-1"], "deal", json!({"cards": 2}));
//! assert!(rx.try_recv().is_ok());
//! ```

mod error;
mod namespace;

pub use error::RoomcastError;
pub use namespace::{
    LocalAdapter, LocalNamespace, LocalRegistry, LocalSocket, Outbound,
    OutboundReceiver,
};

pub use roomcast_adapter as adapter;
pub use roomcast_protocol as protocol;

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub mod prelude {
    pub use crate::{LocalNamespace, LocalSocket, Outbound, RoomcastError};
    pub use roomcast_adapter::{
        Adapter, AdapterConfig, BatchConfig, BatchExemption, BroadcastFilter,
        InMemoryAdapter, LifecycleEvent, Socket, SocketRegistry,
    };
    pub use roomcast_protocol::{
        Codec, ConnId, EncodedFrame, JsonCodec, Packet, RoomId, TransmitOptions,
    };
}
