//! Room membership and broadcast routing for Roomcast.
//!
//! An adapter tracks which connections are in which rooms, resolves a
//! broadcast's target set, and hands encoded packets to the host's
//! connections. With batching enabled, room-targeted broadcasts are
//! queued per room and flushed periodically as one aggregate packet.
//!
//! # Key types
//!
//! - [`Adapter`] — the contract a host namespace talks to
//! - [`InMemoryAdapter`] — the single-process implementation
//! - [`SocketRegistry`] / [`Socket`] — what the host provides in return
//! - [`BroadcastFilter`] — target rooms plus exclusions
//! - [`AdapterConfig`] — batching settings, loadable from the environment
//! - [`LifecycleEvent`] — room created/deleted, joined/left notifications

#![allow(async_fn_in_trait)]

mod adapter;
mod buffer;
pub mod config;
mod error;
mod events;
mod filter;
mod host;
mod index;

pub use adapter::{Adapter, InMemoryAdapter};
pub use config::{AdapterConfig, BatchConfig, BatchExemption, BufferState};
pub use error::{AdapterError, ConfigError};
pub use events::LifecycleEvent;
pub use filter::BroadcastFilter;
pub use host::{Socket, SocketRegistry};
pub use index::MembershipIndex;
pub use roomcast_flush::FlushMetrics;
