//! Integration tests for `InMemoryAdapter` against a mock host.
//!
//! Batching tests run on a paused clock so a flush happens exactly when
//! the test sleeps past the interval.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use roomcast_adapter::{
    Adapter, AdapterConfig, AdapterError, BatchExemption, BroadcastFilter,
    BufferState, InMemoryAdapter, LifecycleEvent, Socket, SocketRegistry,
};
use roomcast_flush::FlushTarget;
use roomcast_protocol::{
    BATCH_EVENT, Codec, ConnId, EncodedFrame, JsonCodec, Packet, ProtocolError,
    RoomId, TransmitOptions,
};
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

// =========================================================================
// Mock host
// =========================================================================

/// The subset of the adapter a socket routes its own join/leave through.
trait Membership: Send + Sync {
    fn join_rooms(&self, conn: &ConnId, rooms: &[RoomId]);
    fn leave_room(&self, conn: &ConnId, room: &RoomId);
    fn leave_all(&self, conn: &ConnId);
}

impl<C: Codec> Membership for InMemoryAdapter<MockRegistry, C> {
    fn join_rooms(&self, conn: &ConnId, rooms: &[RoomId]) {
        self.add_all(conn, rooms);
    }
    fn leave_room(&self, conn: &ConnId, room: &RoomId) {
        self.del(conn, room);
    }
    fn leave_all(&self, conn: &ConnId) {
        self.del_all(conn);
    }
}

#[derive(Default)]
struct MockRegistry {
    sockets: Mutex<HashMap<ConnId, Arc<MockSocket>>>,
}

impl MockRegistry {
    fn remove(&self, id: &ConnId) {
        self.sockets.lock().remove(id);
    }
}

impl SocketRegistry for MockRegistry {
    type Socket = MockSocket;

    fn namespace(&self) -> &str {
        "/chat"
    }

    fn get(&self, id: &ConnId) -> Option<Arc<MockSocket>> {
        self.sockets.lock().get(id).cloned()
    }
}

struct MockSocket {
    id: ConnId,
    adapter: Weak<dyn Membership>,
    registry: Weak<MockRegistry>,
    sent: Mutex<Vec<(Vec<EncodedFrame>, TransmitOptions)>>,
    closed_with: Mutex<Option<bool>>,
    /// Blocks every send this long, to hold a drain mid-flight.
    send_delay: Mutex<Duration>,
}

impl MockSocket {
    /// Every packet received so far, decoded.
    fn packets(&self) -> Vec<Packet> {
        self.sent
            .lock()
            .iter()
            .map(|(frames, _)| JsonCodec.decode(frames).unwrap())
            .collect()
    }

    fn options(&self) -> Vec<TransmitOptions> {
        self.sent.lock().iter().map(|(_, options)| *options).collect()
    }

    /// Event names received, with aggregates expanded to their entries.
    fn events(&self) -> Vec<String> {
        let mut names = Vec::new();
        for packet in self.packets() {
            match packet.batch_entries() {
                Some(entries) => {
                    for entry in entries {
                        let inner = JsonCodec
                            .decode(&[EncodedFrame::Text(entry.to_owned())])
                            .unwrap();
                        names.push(inner.event_name().unwrap().to_owned());
                    }
                }
                None => names.push(packet.event_name().unwrap().to_owned()),
            }
        }
        names
    }
}

impl Socket for MockSocket {
    fn id(&self) -> &ConnId {
        &self.id
    }

    fn send(&self, frames: &[EncodedFrame], options: &TransmitOptions) {
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.sent.lock().push((frames.to_vec(), *options));
    }

    fn join(&self, rooms: &[RoomId]) {
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.join_rooms(&self.id, rooms);
        }
    }

    fn leave(&self, room: &RoomId) {
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.leave_room(&self.id, room);
        }
    }

    fn disconnect(&self, close: bool) {
        *self.closed_with.lock() = Some(close);
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.leave_all(&self.id);
        }
    }
}

/// Encodes normally but fails on aggregates while `fail_batches` is set.
#[derive(Default)]
struct FlakyCodec {
    fail_batches: AtomicBool,
}

impl Codec for FlakyCodec {
    fn encode(&self, packet: &Packet) -> Result<Vec<EncodedFrame>, ProtocolError> {
        if packet.event_name() == Some(BATCH_EVENT)
            && self.fail_batches.load(Ordering::SeqCst)
        {
            return Err(ProtocolError::InvalidPacket("refusing aggregate".into()));
        }
        JsonCodec.encode(packet)
    }

    fn decode(&self, frames: &[EncodedFrame]) -> Result<Packet, ProtocolError> {
        JsonCodec.decode(frames)
    }
}

// =========================================================================
// Helpers
// =========================================================================

const INTERVAL: Duration = Duration::from_millis(100);

struct Harness<C: Codec = JsonCodec> {
    registry: Arc<MockRegistry>,
    adapter: Arc<InMemoryAdapter<MockRegistry, C>>,
}

fn harness(config: AdapterConfig) -> Harness {
    harness_with(JsonCodec, config)
}

fn harness_with<C: Codec>(codec: C, config: AdapterConfig) -> Harness<C> {
    let registry = Arc::new(MockRegistry::default());
    let adapter = InMemoryAdapter::new(Arc::clone(&registry), codec, config);
    Harness { registry, adapter }
}

impl<C: Codec> Harness<C> {
    fn connect(&self, id: &str, rooms: &[&str]) -> Arc<MockSocket> {
        let adapter: Weak<dyn Membership> = Arc::<InMemoryAdapter<MockRegistry, C>>::downgrade(&self.adapter);
        let socket = Arc::new(MockSocket {
            id: c(id),
            adapter,
            registry: Arc::downgrade(&self.registry),
            sent: Mutex::new(Vec::new()),
            closed_with: Mutex::new(None),
            send_delay: Mutex::new(Duration::ZERO),
        });
        self.registry
            .sockets
            .lock()
            .insert(c(id), Arc::clone(&socket));
        if !rooms.is_empty() {
            self.adapter.add_all(&c(id), &rs(rooms));
        }
        socket
    }

    fn emit(&self, event: &str, filter: &BroadcastFilter) {
        self.adapter.broadcast(
            Packet::event(event, json!({})),
            filter,
            TransmitOptions::default(),
        );
    }
}

fn c(id: &str) -> ConnId {
    ConnId::from(id)
}

fn r(name: &str) -> RoomId {
    RoomId::from(name)
}

fn rs(names: &[&str]) -> Vec<RoomId> {
    names.iter().map(|n| r(n)).collect()
}

fn batched() -> AdapterConfig {
    AdapterConfig::batched(INTERVAL)
}

async fn advance(by: Duration) {
    tokio::time::sleep(by).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

// =========================================================================
// Membership
// =========================================================================

#[test]
fn test_add_all_and_socket_rooms() {
    let h = harness(AdapterConfig::default());
    h.connect("a", &["r1", "r2"]);

    let rooms = h.adapter.socket_rooms(&c("a")).unwrap();
    assert_eq!(rooms, rs(&["r1", "r2"]).into_iter().collect::<BTreeSet<_>>());
    assert_eq!(h.adapter.rooms(), rs(&["r1", "r2"]));
    assert!(h.adapter.socket_rooms(&c("nobody")).is_none());
}

#[test]
fn test_join_leave_scenario_emits_ordered_events() {
    let h = harness(AdapterConfig::default());
    let mut events = h.adapter.subscribe();
    h.connect("a", &[]);
    h.connect("b", &[]);

    h.adapter.add_all(&c("a"), &rs(&["r"]));
    h.adapter.add_all(&c("b"), &rs(&["r"]));
    h.adapter.del(&c("a"), &r("r"));
    h.adapter.del_all(&c("b"));

    let expected = vec![
        LifecycleEvent::RoomCreated(r("r")),
        LifecycleEvent::JoinedRoom { room: r("r"), conn: c("a") },
        LifecycleEvent::JoinedRoom { room: r("r"), conn: c("b") },
        LifecycleEvent::LeftRoom { room: r("r"), conn: c("a") },
        LifecycleEvent::LeftRoom { room: r("r"), conn: c("b") },
        LifecycleEvent::RoomDeleted(r("r")),
    ];
    for event in expected {
        assert_eq!(events.try_recv().unwrap(), event);
    }
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(h.adapter.room_count(), 0);
    assert!(h.adapter.socket_rooms(&c("b")).is_none());
}

#[test]
fn test_del_unknown_ids_is_silent() {
    let h = harness(AdapterConfig::default());
    let mut events = h.adapter.subscribe();

    h.adapter.del(&c("ghost"), &r("nowhere"));
    h.adapter.del_all(&c("ghost"));

    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn test_leave_then_broadcast_reaches_no_one() {
    let h = harness(AdapterConfig::default());
    let mut events = h.adapter.subscribe();
    let a = h.connect("a", &["r"]);
    let b = h.connect("b", &["elsewhere"]);

    h.adapter.del(&c("a"), &r("r"));
    h.emit("gone", &BroadcastFilter::to_room("r"));

    let deleted = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| *e == LifecycleEvent::RoomDeleted(r("r")))
        .count();
    assert_eq!(deleted, 1);
    assert!(h.adapter.socket_rooms(&c("a")).is_none());
    assert!(a.packets().is_empty());
    assert!(b.packets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_leave_then_batched_broadcast_reaches_no_one() {
    let h = harness(batched());
    let a = h.connect("a", &["r"]);
    h.connect("b", &["keepalive"]);

    h.adapter.del(&c("a"), &r("r"));
    h.emit("gone", &BroadcastFilter::to_room("r"));
    advance(INTERVAL * 2).await;

    assert_eq!(h.adapter.buffer_state(&r("r")), BufferState::Absent);
    assert!(a.packets().is_empty());
}

// =========================================================================
// Immediate broadcast
// =========================================================================

#[test]
fn test_broadcast_to_overlapping_rooms_delivers_once() {
    let h = harness(AdapterConfig::default());
    let a = h.connect("a", &["r1", "r2"]);
    let b = h.connect("b", &["r2"]);
    let outsider = h.connect("x", &["r3"]);

    h.emit("news", &BroadcastFilter::to_rooms(["r1", "r2"]));

    assert_eq!(a.events(), vec!["news"]);
    assert_eq!(b.events(), vec!["news"]);
    assert!(outsider.events().is_empty());
}

#[test]
fn test_broadcast_stamps_namespace_and_marks_pre_encoded() {
    let h = harness(AdapterConfig::default());
    let a = h.connect("a", &["r"]);

    h.adapter.broadcast(
        Packet::event("chat", json!("hi")),
        &BroadcastFilter::to_room("r"),
        TransmitOptions {
            compress: true,
            ..TransmitOptions::default()
        },
    );

    let packets = a.packets();
    assert_eq!(packets[0].nsp, "/chat");
    let options = a.options()[0];
    assert!(options.pre_encoded);
    assert!(options.compress);
}

#[test]
fn test_broadcast_honours_exclusions() {
    let h = harness(AdapterConfig::default());
    let a = h.connect("a", &["lobby"]);
    let b = h.connect("b", &["lobby", "muted"]);
    let d = h.connect("d", &["lobby"]);

    let filter = BroadcastFilter::to_room("lobby")
        .except_room("muted")
        .except_conn("d");
    h.emit("news", &filter);

    assert_eq!(a.events(), vec!["news"]);
    assert!(b.events().is_empty());
    assert!(d.events().is_empty());
}

#[test]
fn test_broadcast_all_reaches_every_joined_connection() {
    let h = harness(AdapterConfig::default());
    let a = h.connect("a", &["r1"]);
    let b = h.connect("b", &["r2"]);

    h.emit("hello", &BroadcastFilter::all());

    assert_eq!(a.events(), vec!["hello"]);
    assert_eq!(b.events(), vec!["hello"]);
}

#[test]
fn test_broadcast_skips_connection_missing_from_registry() {
    let h = harness(AdapterConfig::default());
    let a = h.connect("a", &["r"]);
    let gone = h.connect("gone", &["r"]);
    h.registry.remove(&c("gone"));

    h.emit("news", &BroadcastFilter::to_room("r"));

    assert_eq!(a.events(), vec!["news"]);
    assert!(gone.events().is_empty());
}

#[test]
fn test_binary_broadcast_sends_every_frame() {
    let h = harness(AdapterConfig::default());
    let a = h.connect("a", &["r"]);

    h.adapter.broadcast(
        Packet::binary_event("file", json!({}), vec![vec![1, 2, 3]]),
        &BroadcastFilter::to_room("r"),
        TransmitOptions::default(),
    );

    let sent = a.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.len(), 2);
    assert_eq!(sent[0].0[1], EncodedFrame::Binary(vec![1, 2, 3]));
}

// =========================================================================
// Batching
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_batched_broadcasts_flush_as_one_aggregate() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);
    let b = h.connect("b", &["room"]);

    h.emit("m1", &BroadcastFilter::to_room("room"));
    h.emit("m2", &BroadcastFilter::to_room("room"));
    assert!(a.packets().is_empty());
    assert_eq!(h.adapter.batch_len(&r("room")), 2);

    advance(INTERVAL + Duration::from_millis(1)).await;

    for socket in [&a, &b] {
        let packets = socket.packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].event_name(), Some(BATCH_EVENT));
        assert_eq!(packets[0].nsp, "/chat");
        assert_eq!(socket.events(), vec!["m1", "m2"]);
    }
    assert_eq!(h.adapter.batch_len(&r("room")), 0);
    assert_eq!(h.adapter.buffer_state(&r("room")), BufferState::Active);
    assert_eq!(h.adapter.flush_metrics().total_flushed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_batched_broadcast_to_two_rooms_queues_in_both() {
    let h = harness(batched());
    let a = h.connect("a", &["r1"]);
    let b = h.connect("b", &["r2"]);

    h.emit("m", &BroadcastFilter::to_rooms(["r1", "r2"]));
    assert_eq!(h.adapter.batch_len(&r("r1")), 1);
    assert_eq!(h.adapter.batch_len(&r("r2")), 1);

    advance(INTERVAL + Duration::from_millis(1)).await;
    assert_eq!(a.events(), vec!["m"]);
    assert_eq!(b.events(), vec!["m"]);
}

#[test]
fn test_flush_room_respects_max_batch_size() {
    let mut config = batched();
    config.batch.max_batch_size = 2;
    let h = harness(config);
    let a = h.connect("a", &["room"]);
    for i in 1..=5 {
        h.emit(&format!("m{i}"), &BroadcastFilter::to_room("room"));
    }

    let room = r("room");
    assert_eq!(h.adapter.flush_room(&room).unwrap(), 2);
    assert_eq!(h.adapter.flush_room(&room).unwrap(), 2);
    assert_eq!(h.adapter.flush_room(&room).unwrap(), 1);
    assert_eq!(h.adapter.flush_room(&room).unwrap(), 0);

    assert_eq!(a.packets().len(), 3);
    assert_eq!(a.events(), vec!["m1", "m2", "m3", "m4", "m5"]);
}

#[test]
fn test_flush_room_unknown_room_is_zero() {
    let h = harness(batched());
    assert_eq!(h.adapter.flush_room(&r("nowhere")).unwrap(), 0);
}

#[test]
fn test_exclusions_bypass_batching() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);
    h.connect("b", &["room"]);

    h.emit("m", &BroadcastFilter::to_room("room").except_conn("b"));

    assert_eq!(a.events(), vec!["m"]);
    assert_eq!(h.adapter.batch_len(&r("room")), 0);
}

#[test]
fn test_volatile_bypasses_batching() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);

    h.adapter.broadcast(
        Packet::event("pos", json!([1, 2])),
        &BroadcastFilter::to_room("room"),
        TransmitOptions::volatile(),
    );

    assert_eq!(a.events(), vec!["pos"]);
    assert!(a.options()[0].volatile);
}

#[test]
fn test_exempt_event_bypasses_batching() {
    let mut config = batched();
    config.batch.exempt.insert(BatchExemption::new("event", "typing"));
    let h = harness(config);
    let a = h.connect("a", &["room"]);

    h.emit("typing", &BroadcastFilter::to_room("room"));
    h.emit("chat", &BroadcastFilter::to_room("room"));

    assert_eq!(a.events(), vec!["typing"]);
    assert_eq!(h.adapter.batch_len(&r("room")), 1);
}

#[test]
fn test_binary_event_bypasses_batching() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);

    h.adapter.broadcast(
        Packet::binary_event("file", json!({}), vec![vec![0xff]]),
        &BroadcastFilter::to_room("room"),
        TransmitOptions::default(),
    );

    assert_eq!(a.packets().len(), 1);
    assert_eq!(h.adapter.batch_len(&r("room")), 0);
}

#[test]
fn test_broadcast_to_everyone_bypasses_batching() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);

    h.emit("hello", &BroadcastFilter::all());

    assert_eq!(a.events(), vec!["hello"]);
    assert_eq!(h.adapter.batch_len(&r("room")), 0);
}

#[test]
fn test_room_without_buffer_forces_immediate_delivery() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);

    h.emit("m", &BroadcastFilter::to_rooms(["room", "ghost"]));

    assert_eq!(a.events(), vec!["m"]);
    assert_eq!(h.adapter.batch_len(&r("room")), 0);
}

#[test]
fn test_batching_disabled_creates_no_buffers() {
    let h = harness(AdapterConfig::default());
    let a = h.connect("a", &["room"]);

    h.emit("m", &BroadcastFilter::to_room("room"));

    assert_eq!(a.events(), vec!["m"]);
    assert_eq!(h.adapter.buffer_state(&r("room")), BufferState::Absent);
}

#[test]
fn test_room_deletion_discards_pending_entries() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);
    h.emit("lost", &BroadcastFilter::to_room("room"));
    assert_eq!(h.adapter.buffer_state(&r("room")), BufferState::Active);

    h.adapter.del(&c("a"), &r("room"));
    assert_eq!(h.adapter.buffer_state(&r("room")), BufferState::Absent);

    // Recreating the room starts from an empty buffer.
    h.adapter.add_all(&c("a"), &rs(&["room"]));
    assert_eq!(h.adapter.batch_len(&r("room")), 0);
    assert_eq!(h.adapter.flush_room(&r("room")).unwrap(), 0);
    assert!(a.packets().is_empty());
}

#[test]
fn test_failed_aggregate_encode_drops_slice_and_reactivates_buffer() {
    let h = harness_with(FlakyCodec::default(), batched());
    h.connect("a", &["room"]);
    h.emit("m1", &BroadcastFilter::to_room("room"));
    h.emit("m2", &BroadcastFilter::to_room("room"));
    h.adapter.codec().fail_batches.store(true, Ordering::SeqCst);

    let err = h.adapter.flush_room(&r("room")).unwrap_err();
    match err {
        AdapterError::Drain { room, dropped, .. } => {
            assert_eq!(room, r("room"));
            assert_eq!(dropped, 2);
        }
    }
    assert_eq!(h.adapter.batch_len(&r("room")), 0);
    assert_eq!(h.adapter.buffer_state(&r("room")), BufferState::Active);
}

#[test]
fn test_drain_after_room_deleted_since_scan_is_noop() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);
    h.emit("m", &BroadcastFilter::to_room("room"));

    let pending = h.adapter.pending();
    assert_eq!(pending, rs(&["room"]));

    // The last member leaves before the drain task runs.
    h.adapter.del(&c("a"), &r("room"));
    h.adapter.add_all(&c("a"), &rs(&["other"]));

    assert_eq!(h.adapter.drain(&pending[0]).unwrap(), 0);
    assert!(a.packets().is_empty());
    assert_eq!(h.adapter.buffer_state(&r("room")), BufferState::Absent);
}

// =========================================================================
// Flush timer lifecycle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_timer_starts_with_first_buffered_room() {
    let h = harness(batched());
    assert!(!h.adapter.is_flushing());

    h.connect("a", &["room"]);
    assert!(h.adapter.is_flushing());

    h.connect("b", &["other"]);
    advance(INTERVAL * 3).await;
    assert!(h.adapter.is_flushing());
}

#[tokio::test(start_paused = true)]
async fn test_timer_not_started_without_batching() {
    let h = harness(AdapterConfig::default());
    h.connect("a", &["room"]);
    assert!(!h.adapter.is_flushing());
}

#[tokio::test(start_paused = true)]
async fn test_close_flushes_remaining_and_stops_timer() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);
    h.emit("m1", &BroadcastFilter::to_room("room"));

    h.adapter.close().await;

    assert!(!h.adapter.is_flushing());
    assert_eq!(a.events(), vec!["m1"]);

    // A room created after close doesn't restart the timer.
    h.connect("b", &["late"]);
    assert!(!h.adapter.is_flushing());
}

#[tokio::test(start_paused = true)]
async fn test_init_is_a_noop() {
    let h = harness(batched());
    h.adapter.init().await;
    assert!(!h.adapter.is_flushing());
    assert_eq!(h.adapter.room_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_after_close_is_delivered_immediately() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);

    h.adapter.close().await;
    h.emit("late", &BroadcastFilter::to_room("room"));

    assert_eq!(a.events(), vec!["late"]);
    assert_eq!(h.adapter.batch_len(&r("room")), 0);
}

#[test]
fn test_rooms_created_before_runtime_still_flush() {
    let h = harness(batched());
    let a = h.connect("a", &["room"]);
    assert!(!h.adapter.is_flushing());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    rt.block_on(async {
        h.emit("m", &BroadcastFilter::to_room("room"));
        assert!(h.adapter.is_flushing());
        advance(INTERVAL + Duration::from_millis(1)).await;
    });

    assert_eq!(a.events(), vec!["m"]);
    assert_eq!(h.adapter.batch_len(&r("room")), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_waits_for_in_flight_drain() {
    // Long interval: only the explicit drain below runs.
    let h = harness(AdapterConfig::batched(Duration::from_secs(60)));
    let a = h.connect("a", &["room"]);
    h.emit("m1", &BroadcastFilter::to_room("room"));
    *a.send_delay.lock() = Duration::from_millis(50);

    let adapter = Arc::clone(&h.adapter);
    let drain = tokio::task::spawn_blocking(move || adapter.flush_room(&r("room")));
    while h.adapter.buffer_state(&r("room")) != BufferState::Draining {
        tokio::task::yield_now().await;
    }

    h.emit("m2", &BroadcastFilter::to_room("room"));
    assert_eq!(h.adapter.batch_len(&r("room")), 1);

    h.adapter.close().await;

    assert_eq!(drain.await.unwrap().unwrap(), 1);
    assert_eq!(a.events(), vec!["m1", "m2"]);
    assert_eq!(h.adapter.batch_len(&r("room")), 0);
}

// =========================================================================
// Bulk operations
// =========================================================================

#[test]
fn test_sockets_and_fetch_sockets() {
    let h = harness(AdapterConfig::default());
    h.connect("a", &["r1"]);
    h.connect("b", &["r1", "r2"]);
    h.connect("d", &["r3"]);

    let ids = h.adapter.sockets(&rs(&["r1", "r2"]));
    assert_eq!(ids, BTreeSet::from([c("a"), c("b")]));
    assert_eq!(h.adapter.sockets(&[]).len(), 3);

    let fetched = h
        .adapter
        .fetch_sockets(&BroadcastFilter::to_room("r1").except_conn("a"));
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].id(), &c("b"));
}

#[test]
fn test_add_sockets_routes_through_socket_join() {
    let h = harness(AdapterConfig::default());
    h.connect("a", &["r1"]);
    h.connect("b", &["r2"]);

    h.adapter
        .add_sockets(&BroadcastFilter::to_room("r1"), &rs(&["vip"]));

    assert_eq!(h.adapter.members(&r("vip")), Some(BTreeSet::from([c("a")])));
}

#[test]
fn test_del_sockets_removes_matching_memberships() {
    let h = harness(AdapterConfig::default());
    h.connect("a", &["r1", "vip"]);
    h.connect("b", &["r2", "vip"]);

    h.adapter
        .del_sockets(&BroadcastFilter::to_room("r1"), &rs(&["vip"]));

    assert_eq!(h.adapter.members(&r("vip")), Some(BTreeSet::from([c("b")])));
    assert_eq!(
        h.adapter.socket_rooms(&c("a")),
        Some(BTreeSet::from([r("r1")]))
    );
}

#[test]
fn test_disconnect_sockets_passes_close_flag() {
    let h = harness(AdapterConfig::default());
    let a = h.connect("a", &["r"]);
    let b = h.connect("b", &["r"]);
    let d = h.connect("d", &["other"]);

    h.adapter
        .disconnect_sockets(&BroadcastFilter::to_room("r"), true);

    assert_eq!(*a.closed_with.lock(), Some(true));
    assert_eq!(*b.closed_with.lock(), Some(true));
    assert_eq!(*d.closed_with.lock(), None);
    assert!(h.adapter.members(&r("r")).is_none());
    assert_eq!(h.adapter.rooms(), rs(&["other"]));
}
