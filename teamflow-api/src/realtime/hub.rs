/// Connection registry for realtime broadcast
///
/// The hub maps room names to the connections currently in them. A
/// connection is a `Uuid` plus the unbounded sender half of its outbound
/// channel; the WebSocket task owns the receiver half and forwards frames
/// to the client. Sends never block and never fail the caller - a closed
/// channel just means the client went away, and the entry is dropped.
///
/// Rooms are plain strings: `team:{teamId}` for team-wide events and
/// `user:{userId}` for personal notifications. Every connection is bound to
/// exactly one user room for its lifetime and joins team rooms explicitly,
/// gated by a membership check in the socket handler.
///
/// The hub is constructed once at startup and handed to every controller
/// through `AppState`; there is no lazily-initialized global.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Room name for a team's broadcast group
pub fn team_room(team_id: Uuid) -> String {
    format!("team:{}", team_id)
}

/// Room name for a user's personal notifications
pub fn user_room(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

type RoomMap = HashMap<String, HashMap<Uuid, UnboundedSender<String>>>;

/// Room-based broadcast registry
#[derive(Debug, Clone, Default)]
pub struct RealtimeHub {
    rooms: Arc<RwLock<RoomMap>>,
}

impl RealtimeHub {
    /// Creates an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a room
    ///
    /// Joining a room the connection is already in just replaces the sender.
    pub fn join(&self, room: &str, conn_id: Uuid, sender: UnboundedSender<String>) {
        let mut rooms = self.write_rooms();
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id, sender);
        tracing::debug!(room, %conn_id, "Connection joined room");
    }

    /// Removes a connection from a room
    pub fn leave(&self, room: &str, conn_id: Uuid) {
        let mut rooms = self.write_rooms();
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
        tracing::debug!(room, %conn_id, "Connection left room");
    }

    /// Removes a connection from every room it is in
    ///
    /// Called when the socket closes.
    pub fn remove_connection(&self, conn_id: Uuid) {
        let mut rooms = self.write_rooms();
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    /// Delivers a frame to every connection in a room
    ///
    /// Returns the number of connections the frame was handed to.
    /// Connections whose channel has closed are evicted.
    pub fn broadcast(&self, room: &str, frame: String) -> usize {
        let mut dead: Vec<Uuid> = Vec::new();
        let mut delivered = 0;

        {
            let rooms = self.read_rooms();
            let Some(members) = rooms.get(room) else {
                return 0;
            };

            for (conn_id, sender) in members {
                if sender.send(frame.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*conn_id);
                }
            }
        }

        if !dead.is_empty() {
            let mut rooms = self.write_rooms();
            if let Some(members) = rooms.get_mut(room) {
                for conn_id in dead {
                    members.remove(&conn_id);
                }
                if members.is_empty() {
                    rooms.remove(room);
                }
            }
        }

        delivered
    }

    /// Number of connections currently in a room
    pub fn room_size(&self, room: &str) -> usize {
        self.read_rooms().get(room).map_or(0, HashMap::len)
    }

    fn read_rooms(&self) -> std::sync::RwLockReadGuard<'_, RoomMap> {
        // A poisoned lock only means a panic elsewhere; the map itself is
        // still coherent.
        self.rooms.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_rooms(&self) -> std::sync::RwLockWriteGuard<'_, RoomMap> {
        self.rooms.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_join_and_broadcast() {
        let hub = RealtimeHub::new();
        let conn = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        hub.join("team:abc", conn, tx);
        assert_eq!(hub.room_size("team:abc"), 1);

        let delivered = hub.broadcast("team:abc", "hello".to_string());
        assert_eq!(delivered, 1);
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_broadcast_to_empty_room() {
        let hub = RealtimeHub::new();
        assert_eq!(hub.broadcast("team:nobody", "hello".to_string()), 0);
    }

    #[test]
    fn test_leave_stops_delivery() {
        let hub = RealtimeHub::new();
        let conn = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        hub.join("team:abc", conn, tx);
        hub.leave("team:abc", conn);

        assert_eq!(hub.broadcast("team:abc", "hello".to_string()), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_connection_clears_all_rooms() {
        let hub = RealtimeHub::new();
        let conn = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();

        hub.join("team:a", conn, tx.clone());
        hub.join("team:b", conn, tx.clone());
        hub.join("user:me", conn, tx);

        hub.remove_connection(conn);
        assert_eq!(hub.room_size("team:a"), 0);
        assert_eq!(hub.room_size("team:b"), 0);
        assert_eq!(hub.room_size("user:me"), 0);
    }

    #[test]
    fn test_dead_connections_evicted_on_broadcast() {
        let hub = RealtimeHub::new();
        let conn = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        hub.join("team:abc", conn, tx);
        drop(rx);

        assert_eq!(hub.broadcast("team:abc", "hello".to_string()), 0);
        assert_eq!(hub.room_size("team:abc"), 0);
    }

    #[test]
    fn test_rooms_are_isolated() {
        let hub = RealtimeHub::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        hub.join("team:a", Uuid::new_v4(), tx_a);
        hub.join("team:b", Uuid::new_v4(), tx_b);

        hub.broadcast("team:a", "only a".to_string());
        assert_eq!(rx_a.try_recv().unwrap(), "only a");
        assert!(rx_b.try_recv().is_err());
    }
}
