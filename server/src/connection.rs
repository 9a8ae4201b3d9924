//! Connection tracking for the session layer.
//!
//! Each live transport session gets a connection id that doubles as the
//! player id inside its room. The manager owns the id -> address mapping,
//! liveness timestamps and the back-reference to the owning room; it never
//! holds an owning reference to room state.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A single live session.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: u32,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    /// Back-reference only; the room owns all game state.
    pub room_id: Option<String>,
}

impl Connection {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            room_id: None,
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks every live connection and detects silent disconnects.
pub struct ConnectionManager {
    connections: HashMap<u32, Connection>,
    next_connection_id: u32,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
        }
    }

    /// Registers a new session and returns its connection id. Ids increase
    /// monotonically and are never reused, so a reconnecting client always
    /// rejoins as a brand-new player.
    pub fn add(&mut self, addr: SocketAddr) -> u32 {
        let id = self.next_connection_id;
        self.next_connection_id += 1;

        info!("Connection {} opened from {}", id, addr);
        self.connections.insert(id, Connection::new(id, addr));
        id
    }

    /// Removes a session, returning it so the caller can run room cleanup.
    pub fn remove(&mut self, id: u32) -> Option<Connection> {
        let connection = self.connections.remove(&id);
        if connection.is_some() {
            info!("Connection {} closed", id);
        }
        connection
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.connections
            .iter()
            .find(|(_, connection)| connection.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Refreshes the liveness timestamp; any inbound packet counts.
    pub fn touch(&mut self, id: u32) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.last_seen = Instant::now();
        }
    }

    pub fn set_room(&mut self, id: u32, room_id: String) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.room_id = Some(room_id);
        }
    }

    pub fn room_of(&self, id: u32) -> Option<String> {
        self.connections.get(&id).and_then(|c| c.room_id.clone())
    }

    /// Removes every session that has gone silent and returns them for
    /// cleanup. Runs the exact same leave path as an explicit disconnect.
    pub fn check_timeouts(&mut self) -> Vec<Connection> {
        let timed_out: Vec<u32> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.is_timed_out(CONNECTION_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| {
                info!("Connection {} timed out", id);
                self.remove(id)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_add_assigns_increasing_ids() {
        let mut manager = ConnectionManager::new();
        let first = manager.add(test_addr());
        let second = manager.add(test_addr2());

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_remove_returns_connection() {
        let mut manager = ConnectionManager::new();
        let id = manager.add(test_addr());
        manager.set_room(id, "room-1".to_string());

        let removed = manager.remove(id).unwrap();
        assert_eq!(removed.room_id.as_deref(), Some("room-1"));
        assert!(manager.is_empty());

        assert!(manager.remove(id).is_none());
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let mut manager = ConnectionManager::new();
        let first = manager.add(test_addr());
        manager.remove(first);

        let second = manager.add(test_addr());
        assert_ne!(first, second);
    }

    #[test]
    fn test_find_by_addr() {
        let mut manager = ConnectionManager::new();
        let id = manager.add(test_addr());
        manager.add(test_addr2());

        assert_eq!(manager.find_by_addr(test_addr()), Some(id));

        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_by_addr(unknown), None);
    }

    #[test]
    fn test_room_back_reference() {
        let mut manager = ConnectionManager::new();
        let id = manager.add(test_addr());
        assert_eq!(manager.room_of(id), None);

        manager.set_room(id, "room-7".to_string());
        assert_eq!(manager.room_of(id), Some("room-7".to_string()));
    }

    #[test]
    fn test_timeout_detection() {
        let mut manager = ConnectionManager::new();
        let stale = manager.add(test_addr());
        let fresh = manager.add(test_addr2());

        manager
            .connections
            .get_mut(&stale)
            .unwrap()
            .last_seen = Instant::now() - Duration::from_secs(10);

        let removed = manager.check_timeouts();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, stale);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.room_of(fresh), None);
    }

    #[test]
    fn test_touch_resets_timeout() {
        let mut manager = ConnectionManager::new();
        let id = manager.add(test_addr());
        manager.connections.get_mut(&id).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        manager.touch(id);
        assert!(manager.check_timeouts().is_empty());
    }
}
