//! The `{rooms, except rooms, except connections}` filter of a broadcast.

use std::collections::BTreeSet;

use roomcast_protocol::{ConnId, RoomId};

/// Selects the recipients of a broadcast or bulk operation.
///
/// An empty `rooms` set means every connection currently joined to at
/// least one room. Ordered sets keep fan-out order deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastFilter {
    pub rooms: BTreeSet<RoomId>,
    pub except_rooms: BTreeSet<RoomId>,
    pub except_conns: BTreeSet<ConnId>,
}

impl BroadcastFilter {
    /// Every known connection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Members of any of `rooms`.
    pub fn to_rooms<I, R>(rooms: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoomId>,
    {
        Self {
            rooms: rooms.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Members of `room`.
    pub fn to_room(room: impl Into<RoomId>) -> Self {
        Self::to_rooms([room])
    }

    /// Also exclude every member of `room`.
    pub fn except_room(mut self, room: impl Into<RoomId>) -> Self {
        self.except_rooms.insert(room.into());
        self
    }

    /// Also exclude one connection.
    pub fn except_conn(mut self, conn: impl Into<ConnId>) -> Self {
        self.except_conns.insert(conn.into());
        self
    }

    /// Returns `true` if anything is excluded.
    pub fn has_exclusions(&self) -> bool {
        !self.except_rooms.is_empty() || !self.except_conns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_has_no_rooms_and_no_exclusions() {
        let filter = BroadcastFilter::all();
        assert!(filter.rooms.is_empty());
        assert!(!filter.has_exclusions());
    }

    #[test]
    fn test_builders_collect_rooms_and_exclusions() {
        let filter = BroadcastFilter::to_rooms(["b", "a", "b"])
            .except_room("c")
            .except_conn("x");

        let rooms: Vec<&str> = filter.rooms.iter().map(RoomId::as_str).collect();
        assert_eq!(rooms, vec!["a", "b"]);
        assert!(filter.except_rooms.contains(&RoomId::from("c")));
        assert!(filter.except_conns.contains(&ConnId::from("x")));
        assert!(filter.has_exclusions());
    }
}
