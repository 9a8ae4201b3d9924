//! Process-wide room table.
//!
//! One mutex guards the table itself and serializes join/leave, so a
//! capacity check and the matching insert can never interleave with another
//! connection's join or with the teardown of the room being joined.
//! In-room traffic never touches this lock: callers clone the room's `Arc`
//! out of the table and work against the room's own mutex.

use crate::room::{Outbound, Room};
use log::{error, info};
use shared::ROOM_CAPACITY;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SharedRoom = Arc<Mutex<Room>>;

pub struct Registry {
    rooms: Mutex<HashMap<String, SharedRoom>>,
    next_room_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            next_room_id: AtomicU64::new(1),
        }
    }

    /// Places a connection into the first room with free capacity, creating
    /// a room when none has space. The join itself happens inside this
    /// critical section. Returns the room, the join deliveries and whether
    /// the connection is the room's first player (the caller then starts the
    /// room's spawn scheduler).
    pub async fn join_room(
        &self,
        client_id: u32,
        addr: SocketAddr,
    ) -> (String, SharedRoom, Vec<Outbound>, bool) {
        let mut rooms = self.rooms.lock().await;

        for shared in rooms.values() {
            let mut room = shared.lock().await;
            if room.alive && room.players.len() < ROOM_CAPACITY {
                match room.join(client_id, addr) {
                    Ok((out, first)) => {
                        let room_id = room.id.clone();
                        drop(room);
                        return (room_id, Arc::clone(shared), out, first);
                    }
                    Err(_) => {
                        // capacity was checked above under the same lock
                        error!("Room {} rejected a join it had capacity for", room.id);
                    }
                }
            }
        }

        let room_id = format!("room-{}", self.next_room_id.fetch_add(1, Ordering::Relaxed));
        info!("Creating room {}", room_id);
        let mut room = Room::new(room_id.clone());
        let (out, first) = match room.join(client_id, addr) {
            Ok(result) => result,
            Err(_) => unreachable!("fresh room cannot be full"),
        };

        let shared = Arc::new(Mutex::new(room));
        rooms.insert(room_id.clone(), Arc::clone(&shared));
        (room_id, shared, out, first)
    }

    /// Removes a connection from its room. When the last player leaves, the
    /// room is released from the table in the same critical section, so a
    /// concurrent join can never land in a room that is being destroyed.
    pub async fn leave_room(&self, room_id: &str, client_id: u32) -> Vec<Outbound> {
        let mut rooms = self.rooms.lock().await;
        let Some(shared) = rooms.get(room_id).cloned() else {
            return Vec::new();
        };

        let mut room = shared.lock().await;
        let (out, empty) = room.leave(client_id);
        if empty {
            drop(room);
            rooms.remove(room_id);
            info!("Room {} closed", room_id);
        }
        out
    }

    pub async fn get(&self, room_id: &str) -> Option<SharedRoom> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    /// Snapshot of the current rooms for the global AI pass. The table lock
    /// is held only to clone the handles; each room is then locked
    /// individually so a slow room cannot block the others.
    pub async fn snapshot(&self) -> Vec<SharedRoom> {
        self.rooms.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[tokio::test]
    async fn test_first_fit_then_overflow() {
        let registry = Registry::new();

        let mut room_ids = Vec::new();
        for i in 1..=5 {
            let (room_id, _, _, _) = registry.join_room(i, addr(41000 + i as u16)).await;
            room_ids.push(room_id);
        }

        // players 1-4 share the first room, the 5th overflows to a new one
        assert_eq!(room_ids[0], room_ids[1]);
        assert_eq!(room_ids[0], room_ids[2]);
        assert_eq!(room_ids[0], room_ids[3]);
        assert_ne!(room_ids[0], room_ids[4]);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_first_player_flag() {
        let registry = Registry::new();
        let (_, _, _, first) = registry.join_room(1, addr(41001)).await;
        assert!(first);
        let (_, _, _, first) = registry.join_room(2, addr(41002)).await;
        assert!(!first);
    }

    #[tokio::test]
    async fn test_empty_room_is_released() {
        let registry = Registry::new();
        let (room_id, _, _, _) = registry.join_room(1, addr(41001)).await;
        assert_eq!(registry.len().await, 1);

        registry.leave_room(&room_id, 1).await;
        assert!(registry.is_empty().await);
        assert!(registry.get(&room_id).await.is_none());
    }

    #[tokio::test]
    async fn test_leave_unknown_room_is_noop() {
        let registry = Registry::new();
        let out = registry.leave_room("room-404", 1).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_released_id_not_reused() {
        let registry = Registry::new();
        let (first_id, _, _, _) = registry.join_room(1, addr(41001)).await;
        registry.leave_room(&first_id, 1).await;

        let (second_id, _, _, _) = registry.join_room(2, addr(41002)).await;
        assert_ne!(first_id, second_id);
    }
}
