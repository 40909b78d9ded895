//! Adapter configuration and the batch-buffer state machine.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use roomcast_flush::FlushConfig;
use roomcast_protocol::Packet;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Environment variable names read by [`AdapterConfig::from_env`].
pub mod env {
    pub const BATCH_ENABLED: &str = "ROOMCAST_BATCH_ENABLED";
    pub const FLUSH_INTERVAL_MS: &str = "ROOMCAST_FLUSH_INTERVAL_MS";
    pub const MAX_BATCH_SIZE: &str = "ROOMCAST_MAX_BATCH_SIZE";
    pub const BATCH_EXEMPT: &str = "ROOMCAST_BATCH_EXEMPT";
    pub const EVENT_CAPACITY: &str = "ROOMCAST_EVENT_CAPACITY";
}

// ---------------------------------------------------------------------------
// BatchExemption
// ---------------------------------------------------------------------------

/// A `(category, action)` pair that is always delivered immediately.
///
/// `category` is the packet type name (`event`, `binary_event`, ...) and
/// `action` the event name, so `event:typing` exempts typing indicators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchExemption {
    pub category: String,
    pub action: String,
}

impl BatchExemption {
    pub fn new(category: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
        }
    }

    /// Returns `true` if `packet` has this category and action.
    pub fn matches(&self, packet: &Packet) -> bool {
        packet.packet_type.as_str() == self.category
            && packet.event_name() == Some(self.action.as_str())
    }
}

// ---------------------------------------------------------------------------
// BatchConfig
// ---------------------------------------------------------------------------

/// Settings for deferred, aggregated broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Master switch. When off, every broadcast is delivered immediately
    /// and no batch buffers are created.
    pub enabled: bool,

    /// Time between flushes. Bounds the extra latency of a batched send.
    pub flush_interval: Duration,

    /// Maximum entries drained per room per flush (0 = unlimited).
    pub max_batch_size: usize,

    /// Packets that bypass batching regardless of eligibility.
    pub exempt: HashSet<BatchExemption>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            flush_interval: Duration::from_millis(5_000),
            max_batch_size: 0,
            exempt: HashSet::new(),
        }
    }
}

impl BatchConfig {
    /// Returns `true` if `packet` is on the exemption list.
    pub fn is_exempt(&self, packet: &Packet) -> bool {
        self.exempt.iter().any(|e| e.matches(packet))
    }

    /// Scheduler settings derived from this config.
    pub fn flush_config(&self) -> FlushConfig {
        FlushConfig {
            interval: self.flush_interval,
        }
    }
}

// ---------------------------------------------------------------------------
// AdapterConfig
// ---------------------------------------------------------------------------

/// Configuration for an [`InMemoryAdapter`](crate::InMemoryAdapter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub batch: BatchConfig,

    /// Capacity of the lifecycle event channel. Subscribers that fall
    /// further behind than this skip events.
    pub event_capacity: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            event_capacity: 1024,
        }
    }
}

impl AdapterConfig {
    /// A default config with batching switched on at `interval`.
    pub fn batched(interval: Duration) -> Self {
        Self {
            batch: BatchConfig {
                enabled: true,
                flush_interval: interval,
                ..BatchConfig::default()
            },
            ..Self::default()
        }
    }

    /// Reads the `ROOMCAST_*` variables from the process environment.
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for a value that doesn't parse,
    /// a zero flush interval, or a malformed exemption list.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading values through
    /// `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(env::BATCH_ENABLED) {
            config.batch.enabled = parse_bool(env::BATCH_ENABLED, &value)?;
        }
        if let Some(value) = lookup(env::FLUSH_INTERVAL_MS) {
            let ms = parse_positive(env::FLUSH_INTERVAL_MS, &value)?;
            config.batch.flush_interval = Duration::from_millis(ms);
        }
        if let Some(value) = lookup(env::MAX_BATCH_SIZE) {
            config.batch.max_batch_size = value.trim().parse().map_err(|_| {
                invalid(env::MAX_BATCH_SIZE, &value, "expected a non-negative integer")
            })?;
        }
        if let Some(value) = lookup(env::BATCH_EXEMPT) {
            config.batch.exempt = parse_exemptions(&value)?;
        }
        if let Some(value) = lookup(env::EVENT_CAPACITY) {
            config.event_capacity =
                parse_positive(env::EVENT_CAPACITY, &value)? as usize;
        }

        Ok(config)
    }
}

fn invalid(var: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_owned(),
        reason,
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(var, value, "expected true or false")),
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(invalid(var, value, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(_) => Err(invalid(var, value, "expected a positive integer")),
    }
}

/// Parses `category:action` pairs separated by commas.
fn parse_exemptions(value: &str) -> Result<HashSet<BatchExemption>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((category, action))
                if !category.trim().is_empty() && !action.trim().is_empty() =>
            {
                Ok(BatchExemption::new(category.trim(), action.trim()))
            }
            _ => Err(invalid(
                env::BATCH_EXEMPT,
                value,
                "expected comma-separated category:action pairs",
            )),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// BufferState
// ---------------------------------------------------------------------------

/// Lifecycle of a room's batch buffer.
///
/// ```text
/// Absent → Active ⇄ Draining
///            │         │
///            └─────────┴──→ Absent
/// ```
///
/// - **Absent**: no buffer (room doesn't exist, or batching is off).
/// - **Active**: buffer exists and accepts entries.
/// - **Draining**: a flush is dispatching a slice of the buffer; new
///   entries are still accepted and the scan skips the room.
///
/// A room destroyed mid-drain goes straight to `Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferState {
    Absent,
    Active,
    Draining,
}

impl BufferState {
    /// Returns `true` if entries can be appended.
    pub fn accepts_entries(&self) -> bool {
        matches!(self, Self::Active | Self::Draining)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Absent, Self::Active)
                | (Self::Active, Self::Draining)
                | (Self::Draining, Self::Active)
                | (Self::Active, Self::Absent)
                | (Self::Draining, Self::Absent)
        )
    }
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "Absent"),
            Self::Active => write!(f, "Active"),
            Self::Draining => write!(f, "Draining"),
        }
    }
}
