//! Per-room FIFO of encoded entries awaiting a flush.

use std::collections::VecDeque;

use roomcast_protocol::TransmitOptions;

use crate::BufferState;

/// Entries queued for one room.
///
/// Only text frames are batched, so an entry is the encoded header plus
/// the options it was broadcast with. The options of the newest entry
/// apply to the whole flushed slice.
#[derive(Debug)]
pub(crate) struct PendingBatch {
    entries: VecDeque<(String, TransmitOptions)>,
    last_options: TransmitOptions,
    state: BufferState,
}

impl PendingBatch {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            last_options: TransmitOptions::default(),
            state: BufferState::Active,
        }
    }

    pub(crate) fn push(&mut self, entry: String, options: TransmitOptions) {
        self.entries.push_back((entry, options));
        self.last_options = options;
    }

    /// Dequeues up to `max` entries, oldest first (`0` = all of them).
    /// Returns `None` when the buffer is empty.
    pub(crate) fn take(&mut self, max: usize) -> Option<(Vec<String>, TransmitOptions)> {
        if self.entries.is_empty() {
            return None;
        }
        let n = if max == 0 {
            self.entries.len()
        } else {
            max.min(self.entries.len())
        };
        let entries = self.entries.drain(..n).map(|(entry, _)| entry).collect();
        Some((entries, self.last_options))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn state(&self) -> BufferState {
        self.state
    }

    /// Moves to `target` if the transition is legal. Returns whether it moved.
    pub(crate) fn transition(&mut self, target: BufferState) -> bool {
        if self.state.can_transition_to(target) {
            self.state = target;
            true
        } else {
            false
        }
    }
}
