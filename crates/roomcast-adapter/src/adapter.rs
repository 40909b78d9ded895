//! The `Adapter` trait and its in-memory implementation.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use roomcast_flush::{FlushMetrics, FlushScheduler, FlushTarget};
use roomcast_protocol::{
    Codec, ConnId, EncodedFrame, Packet, RoomId, TransmitOptions,
};
use tokio::sync::broadcast;

use crate::buffer::PendingBatch;
use crate::index::MembershipIndex;
use crate::{
    AdapterConfig, AdapterError, BroadcastFilter, BufferState, LifecycleEvent,
    Socket, SocketRegistry,
};

/// Room membership and broadcast routing for one namespace.
///
/// The host calls the mutators on connect, room change, and disconnect,
/// and [`broadcast`](Self::broadcast) for every outbound message. None of
/// these fail: unknown ids are ignored and connections that disappeared
/// are skipped.
///
/// `init` and `close` are lifecycle hooks with no-op defaults, so other
/// backends can plug in setup and teardown without touching callers.
pub trait Adapter: Send + Sync + 'static {
    /// Connection handle returned by [`fetch_sockets`](Self::fetch_sockets).
    type Socket;

    /// Called by the host once before use. Default: no-op.
    async fn init(&self) {}

    /// Called by the host on shutdown. Default: no-op.
    async fn close(&self) {}

    /// Adds `conn` to each of `rooms`.
    fn add_all(&self, conn: &ConnId, rooms: &[RoomId]);

    /// Removes `conn` from `room`.
    fn del(&self, conn: &ConnId, room: &RoomId);

    /// Removes `conn` from every room. Used on disconnect.
    fn del_all(&self, conn: &ConnId);

    /// Delivers `packet` to the connections matching `filter`, either
    /// immediately or through the room batch buffers.
    fn broadcast(
        &self,
        packet: Packet,
        filter: &BroadcastFilter,
        options: TransmitOptions,
    );

    /// Ids of the live connections in any of `rooms` (all if empty).
    fn sockets(&self, rooms: &[RoomId]) -> BTreeSet<ConnId>;

    /// Rooms `conn` has joined, or `None` if it isn't tracked.
    fn socket_rooms(&self, conn: &ConnId) -> Option<BTreeSet<RoomId>>;

    /// Handles of the live connections matching `filter`.
    fn fetch_sockets(&self, filter: &BroadcastFilter) -> Vec<Arc<Self::Socket>>;

    /// Makes the matching connections join `rooms`.
    fn add_sockets(&self, filter: &BroadcastFilter, rooms: &[RoomId]);

    /// Makes the matching connections leave `rooms`.
    fn del_sockets(&self, filter: &BroadcastFilter, rooms: &[RoomId]);

    /// Disconnects the matching connections.
    fn disconnect_sockets(&self, filter: &BroadcastFilter, close: bool);
}

/// Index and buffers share one lock: a room and its batch buffer are
/// created and destroyed in the same critical section.
#[derive(Default)]
struct AdapterState {
    index: MembershipIndex,
    batches: HashMap<RoomId, PendingBatch>,
}

/// Single-process, memory-resident [`Adapter`].
///
/// Always handled through an `Arc` (see [`new`](Self::new)): the flush
/// timer holds a weak reference back to the adapter it drains.
pub struct InMemoryAdapter<R: SocketRegistry, C: Codec> {
    me: Weak<Self>,
    registry: Arc<R>,
    codec: C,
    config: AdapterConfig,
    state: Mutex<AdapterState>,
    events: broadcast::Sender<LifecycleEvent>,
    scheduler: FlushScheduler,
    closed: AtomicBool,
}

impl<R: SocketRegistry, C: Codec> InMemoryAdapter<R, C> {
    /// Creates an adapter routing through `registry`.
    ///
    /// The flush timer isn't started here; it starts with the first room
    /// created while batching is enabled, or with the first batched
    /// broadcast if no runtime was available at that point.
    pub fn new(registry: Arc<R>, codec: C, config: AdapterConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let scheduler = FlushScheduler::new(config.batch.flush_config());

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            registry,
            codec,
            config,
            state: Mutex::new(AdapterState::default()),
            events,
            scheduler,
            closed: AtomicBool::new(false),
        })
    }

    /// Subscribes to lifecycle events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.state.lock().index.room_count()
    }

    /// Names of all rooms, sorted.
    pub fn rooms(&self) -> Vec<RoomId> {
        let state = self.state.lock();
        let mut rooms: Vec<RoomId> = state.index.room_ids().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Members of `room`, whether or not they are still in the registry.
    pub fn members(&self, room: &RoomId) -> Option<BTreeSet<ConnId>> {
        self.state.lock().index.members(room).cloned()
    }

    /// Entries waiting in `room`'s batch buffer.
    pub fn batch_len(&self, room: &RoomId) -> usize {
        self.state
            .lock()
            .batches
            .get(room)
            .map_or(0, PendingBatch::len)
    }

    /// Where `room`'s batch buffer is in its lifecycle.
    pub fn buffer_state(&self, room: &RoomId) -> BufferState {
        self.state
            .lock()
            .batches
            .get(room)
            .map_or(BufferState::Absent, PendingBatch::state)
    }

    /// Whether the flush timer is running.
    pub fn is_flushing(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn flush_metrics(&self) -> FlushMetrics {
        self.scheduler.metrics()
    }

    /// Resolves `filter` and calls `action` once per live connection.
    ///
    /// The lock is released before `action` runs, so actions may call
    /// back into the adapter.
    pub fn apply<F>(&self, filter: &BroadcastFilter, mut action: F)
    where
        F: FnMut(&Arc<R::Socket>),
    {
        let ids = self.state.lock().index.resolve(filter);
        for id in &ids {
            match self.registry.get(id) {
                Some(socket) => action(&socket),
                None => tracing::trace!(conn = %id, "connection gone, skipping"),
            }
        }
    }

    /// Drains one slice of `room`'s buffer and sends it as one aggregate
    /// packet to the room's members.
    ///
    /// Returns the number of entries sent. A room that no longer exists,
    /// has nothing queued, or is already draining yields `Ok(0)`.
    ///
    /// # Errors
    /// [`AdapterError::Drain`] if the aggregate can't be encoded; the
    /// dequeued entries are lost.
    pub fn flush_room(&self, room: &RoomId) -> Result<usize, AdapterError> {
        let (entries, options) = {
            let mut state = self.state.lock();
            let Some(batch) = state.batches.get_mut(room) else {
                return Ok(0);
            };
            if batch.state() != BufferState::Active {
                return Ok(0);
            }
            let Some(taken) = batch.take(self.config.batch.max_batch_size) else {
                return Ok(0);
            };
            batch.transition(BufferState::Draining);
            taken
        };
        let _guard = DrainGuard { adapter: self, room };

        let count = entries.len();
        let mut packet = Packet::batch(entries);
        packet.nsp = self.registry.namespace().to_owned();
        let frames = self.codec.encode(&packet).map_err(|source| {
            AdapterError::Drain {
                room: room.clone(),
                dropped: count,
                source,
            }
        })?;

        let mut delivered = 0usize;
        self.apply(&BroadcastFilter::to_room(room.clone()), |socket| {
            socket.send(&frames, &options);
            delivered += 1;
        });
        tracing::debug!(%room, entries = count, delivered, "batch flushed");
        Ok(count)
    }

    /// Queues `frames` in every target room's buffer if the broadcast is
    /// eligible for batching. Returns `false` to request immediate delivery.
    fn enqueue(
        &self,
        packet: &Packet,
        filter: &BroadcastFilter,
        frames: &[EncodedFrame],
        options: TransmitOptions,
    ) -> bool {
        let batch = &self.config.batch;
        // Nothing drains buffers after close.
        if !batch.enabled
            || self.closed.load(Ordering::Acquire)
            || filter.rooms.is_empty()
            || filter.has_exclusions()
            || options.volatile
            || batch.is_exempt(packet)
        {
            return false;
        }
        // Multi-frame encodings can't be carried inside an aggregate.
        let [EncodedFrame::Text(entry)] = frames else {
            return false;
        };

        let mut state = self.state.lock();
        let all_buffered = filter.rooms.iter().all(|room| {
            state
                .batches
                .get(room)
                .is_some_and(|b| b.state().accepts_entries())
        });
        if !all_buffered {
            return false;
        }
        for room in &filter.rooms {
            if let Some(b) = state.batches.get_mut(room) {
                b.push(entry.clone(), options);
            }
        }
        true
    }

    /// Applies the buffer side effects of `events` and publishes them.
    /// Returns `true` if a batch buffer was created.
    fn commit(&self, state: &mut AdapterState, events: Vec<LifecycleEvent>) -> bool {
        let mut buffer_created = false;

        for event in events {
            match &event {
                LifecycleEvent::RoomCreated(room) => {
                    if self.config.batch.enabled {
                        state.batches.insert(room.clone(), PendingBatch::new());
                        buffer_created = true;
                    }
                    tracing::info!(%room, "room created");
                }
                LifecycleEvent::RoomDeleted(room) => {
                    let discarded = state.batches.remove(room).map_or(0, |b| b.len());
                    tracing::info!(%room, discarded, "room deleted");
                }
                LifecycleEvent::JoinedRoom { room, conn } => {
                    tracing::debug!(%room, %conn, "joined room");
                }
                LifecycleEvent::LeftRoom { room, conn } => {
                    tracing::debug!(%room, %conn, "left room");
                }
            }
            // No subscribers is fine.
            let _ = self.events.send(event);
        }

        buffer_created
    }

    /// Rooms with queued entries, whatever their buffer state.
    fn queued(&self) -> Vec<(RoomId, BufferState)> {
        self.state
            .lock()
            .batches
            .iter()
            .filter(|(_, b)| !b.is_empty())
            .map(|(room, b)| (room.clone(), b.state()))
            .collect()
    }

    fn ensure_flushing(&self) {
        if !self.closed.load(Ordering::Acquire) {
            self.scheduler.start(self.me.clone());
        }
    }
}

impl<R: SocketRegistry, C: Codec> Adapter for InMemoryAdapter<R, C> {
    type Socket = R::Socket;

    /// Stops the flush timer and flushes whatever is still queued.
    ///
    /// Buffers a drain task is still dispatching are waited for, so entries
    /// queued behind an in-flight drain go out too.
    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.scheduler.stop();

        // Enqueue refuses entries once closed, so this runs out.
        loop {
            let queued = self.queued();
            if queued.is_empty() {
                break;
            }
            for (room, state) in queued {
                if state == BufferState::Draining {
                    continue;
                }
                loop {
                    match self.flush_room(&room) {
                        Ok(0) => break,
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "final flush failed"),
                    }
                }
            }
            tokio::task::yield_now().await;
        }
    }

    fn add_all(&self, conn: &ConnId, rooms: &[RoomId]) {
        let buffer_created = {
            let mut state = self.state.lock();
            let events = state.index.join(conn, rooms);
            self.commit(&mut state, events)
        };
        if buffer_created {
            self.ensure_flushing();
        }
    }

    fn del(&self, conn: &ConnId, room: &RoomId) {
        let mut state = self.state.lock();
        let events = state.index.leave(conn, room);
        self.commit(&mut state, events);
    }

    fn del_all(&self, conn: &ConnId) {
        let mut state = self.state.lock();
        let events = state.index.leave_all(conn);
        self.commit(&mut state, events);
    }

    fn broadcast(
        &self,
        mut packet: Packet,
        filter: &BroadcastFilter,
        options: TransmitOptions,
    ) {
        packet.nsp = self.registry.namespace().to_owned();
        let frames = match self.codec.encode(&packet) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode broadcast, dropping");
                return;
            }
        };
        let options = TransmitOptions {
            pre_encoded: true,
            ..options
        };

        if self.enqueue(&packet, filter, &frames, options) {
            // Rooms created outside a runtime have no timer yet.
            self.ensure_flushing();
            tracing::trace!(rooms = filter.rooms.len(), "broadcast batched");
            return;
        }

        let mut delivered = 0usize;
        self.apply(filter, |socket| {
            socket.send(&frames, &options);
            delivered += 1;
        });
        tracing::trace!(delivered, "broadcast sent");
    }

    fn sockets(&self, rooms: &[RoomId]) -> BTreeSet<ConnId> {
        let mut ids = BTreeSet::new();
        self.apply(&BroadcastFilter::to_rooms(rooms.iter().cloned()), |socket| {
            ids.insert(socket.id().clone());
        });
        ids
    }

    fn socket_rooms(&self, conn: &ConnId) -> Option<BTreeSet<RoomId>> {
        self.state.lock().index.rooms_of(conn).cloned()
    }

    fn fetch_sockets(&self, filter: &BroadcastFilter) -> Vec<Arc<R::Socket>> {
        let mut sockets = Vec::new();
        self.apply(filter, |socket| sockets.push(Arc::clone(socket)));
        sockets
    }

    fn add_sockets(&self, filter: &BroadcastFilter, rooms: &[RoomId]) {
        self.apply(filter, |socket| socket.join(rooms));
    }

    fn del_sockets(&self, filter: &BroadcastFilter, rooms: &[RoomId]) {
        self.apply(filter, |socket| {
            for room in rooms {
                socket.leave(room);
            }
        });
    }

    fn disconnect_sockets(&self, filter: &BroadcastFilter, close: bool) {
        self.apply(filter, |socket| socket.disconnect(close));
    }
}

impl<R: SocketRegistry, C: Codec> FlushTarget for InMemoryAdapter<R, C> {
    type Key = RoomId;
    type Error = AdapterError;

    /// Rooms with queued entries that aren't already draining.
    fn pending(&self) -> Vec<RoomId> {
        self.state
            .lock()
            .batches
            .iter()
            .filter(|(_, b)| b.state() == BufferState::Active && !b.is_empty())
            .map(|(room, _)| room.clone())
            .collect()
    }

    fn drain(&self, room: &RoomId) -> Result<usize, AdapterError> {
        self.flush_room(room)
    }
}

/// Returns a draining buffer to `Active`, even if dispatch panicked.
/// A buffer destroyed in the meantime stays absent.
struct DrainGuard<'a, R: SocketRegistry, C: Codec> {
    adapter: &'a InMemoryAdapter<R, C>,
    room: &'a RoomId,
}

impl<R: SocketRegistry, C: Codec> Drop for DrainGuard<'_, R, C> {
    fn drop(&mut self) {
        if let Some(batch) = self.adapter.state.lock().batches.get_mut(self.room) {
            batch.transition(BufferState::Active);
        }
    }
}
