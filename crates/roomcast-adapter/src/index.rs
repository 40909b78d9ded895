//! Bidirectional room ↔ connection membership index.
//!
//! Two plain lookup tables keyed by id, no back-pointers:
//!
//! ```text
//! rooms: RoomId → {ConnId}      conns: ConnId → {RoomId}
//! ```
//!
//! Every mutation updates both tables before returning, so
//! `c ∈ rooms[r] ⇔ r ∈ conns[c]` holds whenever the index is observable.
//! Neither table ever holds an empty set.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use roomcast_protocol::{ConnId, RoomId};

use crate::{BroadcastFilter, LifecycleEvent};

#[derive(Debug, Default)]
pub struct MembershipIndex {
    rooms: HashMap<RoomId, BTreeSet<ConnId>>,
    conns: BTreeMap<ConnId, BTreeSet<RoomId>>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `conn` to each of `rooms`, creating rooms as needed.
    ///
    /// Returns the resulting lifecycle events in emission order. Joining a
    /// room twice yields no event.
    pub fn join(&mut self, conn: &ConnId, rooms: &[RoomId]) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();

        for room in rooms {
            let members = self.rooms.entry(room.clone()).or_insert_with(|| {
                events.push(LifecycleEvent::RoomCreated(room.clone()));
                BTreeSet::new()
            });

            if members.insert(conn.clone()) {
                events.push(LifecycleEvent::JoinedRoom {
                    room: room.clone(),
                    conn: conn.clone(),
                });
            }
            self.conns
                .entry(conn.clone())
                .or_default()
                .insert(room.clone());
        }

        events
    }

    /// Removes `conn` from `room`. Unknown ids are ignored.
    pub fn leave(&mut self, conn: &ConnId, room: &RoomId) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();

        if let Some(joined) = self.conns.get_mut(conn) {
            joined.remove(room);
            if joined.is_empty() {
                self.conns.remove(conn);
            }
        }
        self.remove_member(room, conn, &mut events);

        events
    }

    /// Removes `conn` from every room and forgets it.
    pub fn leave_all(&mut self, conn: &ConnId) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();

        if let Some(joined) = self.conns.remove(conn) {
            for room in &joined {
                self.remove_member(room, conn, &mut events);
            }
        }

        events
    }

    fn remove_member(
        &mut self,
        room: &RoomId,
        conn: &ConnId,
        events: &mut Vec<LifecycleEvent>,
    ) {
        let Some(members) = self.rooms.get_mut(room) else {
            return;
        };

        if members.remove(conn) {
            events.push(LifecycleEvent::LeftRoom {
                room: room.clone(),
                conn: conn.clone(),
            });
        }
        if members.is_empty() {
            self.rooms.remove(room);
            events.push(LifecycleEvent::RoomDeleted(room.clone()));
        }
    }

    /// Rooms `conn` has joined, or `None` if it isn't tracked.
    pub fn rooms_of(&self, conn: &ConnId) -> Option<&BTreeSet<RoomId>> {
        self.conns.get(conn)
    }

    /// Members of `room`, or `None` if the room doesn't exist.
    pub fn members(&self, room: &RoomId) -> Option<&BTreeSet<ConnId>> {
        self.rooms.get(room)
    }

    pub fn contains_room(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn conn_count(&self) -> usize {
        self.conns.len()
    }

    pub fn room_ids(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.keys()
    }

    /// Resolves `filter` to a deduplicated list of connection ids.
    ///
    /// Target rooms are visited in order and each room's members in
    /// order; a connection reached through a second room is skipped.
    /// With no target rooms every tracked connection is a candidate.
    pub fn resolve(&self, filter: &BroadcastFilter) -> Vec<ConnId> {
        let except = self.excluded(filter);

        if filter.rooms.is_empty() {
            return self
                .conns
                .keys()
                .filter(|id| !except.contains(id))
                .cloned()
                .collect();
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for room in &filter.rooms {
            let Some(members) = self.rooms.get(room) else {
                continue;
            };
            for id in members {
                if except.contains(id) || !seen.insert(id) {
                    continue;
                }
                resolved.push(id.clone());
            }
        }
        resolved
    }

    /// Members of the excluded rooms plus the excluded connection ids.
    fn excluded<'a>(&'a self, filter: &'a BroadcastFilter) -> HashSet<&'a ConnId> {
        let mut except: HashSet<&ConnId> = filter.except_conns.iter().collect();
        for room in &filter.except_rooms {
            if let Some(members) = self.rooms.get(room) {
                except.extend(members);
            }
        }
        except
    }
}
