//! Score-driven spawn scheduling.
//!
//! Each room gets one self-rescheduling spawn task, started by the first
//! join and by a building exit. The task re-reads the room's difficulty
//! after every firing so the spawn rate ramps as soon as the score moves,
//! stops itself when the room empties, and is aborted deterministically by
//! room teardown (`Room::leave` takes and aborts the handle).

use crate::network::{deliver, GameMessage};
use crate::registry::SharedRoom;
use log::debug;
use shared::{Scene, BUILDING_SPAWN_DELAY_MS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Starts the room's spawn scheduler. A no-op if one is already running or
/// the room is being torn down.
pub async fn start(room_ref: SharedRoom, tx: mpsc::UnboundedSender<GameMessage>) {
    let mut room = room_ref.lock().await;
    if !room.alive || room.spawn_task.is_some() {
        return;
    }
    debug!("Starting spawn scheduler for room {}", room.id);

    let task_room = Arc::clone(&room_ref);
    let handle = tokio::spawn(async move {
        loop {
            let (events, delay) = {
                let mut room = task_room.lock().await;
                if !room.alive || room.players.is_empty() {
                    debug!("Spawn scheduler for room {} stopping", room.id);
                    room.spawn_task = None;
                    return;
                }
                (room.spawn_enemy(), room.current_spawn_delay())
            };
            deliver(&tx, events);
            sleep(delay).await;
        }
    });
    room.spawn_task = Some(handle);
}

/// Schedules the delayed interior wave after a building entry. The task
/// re-checks the room before spawning so a scene change or teardown during
/// the delay cancels the wave.
pub fn schedule_building_spawn(
    room_ref: SharedRoom,
    building_id: u32,
    tx: mpsc::UnboundedSender<GameMessage>,
) {
    tokio::spawn(async move {
        sleep(Duration::from_millis(BUILDING_SPAWN_DELAY_MS)).await;

        let events = {
            let mut room = room_ref.lock().await;
            if !room.alive
                || room.scene != Scene::Building
                || room.building_id != Some(building_id)
            {
                return;
            }
            room.spawn_building_enemies()
        };
        deliver(&tx, events);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::Room;
    use shared::Packet;
    use std::net::SocketAddr;
    use tokio::sync::Mutex;
    use tokio::time::timeout;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    async fn occupied_room() -> SharedRoom {
        let mut room = Room::new("room-1".to_string());
        room.join(1, addr(42001)).unwrap();
        Arc::new(Mutex::new(room))
    }

    #[tokio::test]
    async fn test_scheduler_fires_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let room_ref = occupied_room().await;

        start(Arc::clone(&room_ref), tx).await;
        assert!(room_ref.lock().await.spawn_task.is_some());

        let message = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("scheduler did not fire")
            .unwrap();
        match message {
            GameMessage::Deliver { packet, .. } => {
                assert!(matches!(packet, Packet::EnemySpawned(_)));
            }
        }
        assert_eq!(room_ref.lock().await.enemies.len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_double_start_is_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let room_ref = occupied_room().await;

        start(Arc::clone(&room_ref), tx.clone()).await;
        start(Arc::clone(&room_ref), tx).await;

        // one immediate firing; a duplicate scheduler would produce a second
        let _ = timeout(Duration::from_millis(500), rx.recv()).await.unwrap();
        assert!(timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err());
        assert_eq!(room_ref.lock().await.enemies.len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_stops_when_room_empties() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let room_ref = occupied_room().await;

        start(Arc::clone(&room_ref), tx).await;
        let _ = timeout(Duration::from_millis(500), rx.recv()).await.unwrap();

        room_ref.lock().await.leave(1);
        let room = room_ref.lock().await;
        assert!(room.spawn_task.is_none());
        assert!(!room.alive);
    }

    #[tokio::test]
    async fn test_building_wave_spawns_after_delay() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let room_ref = occupied_room().await;
        room_ref.lock().await.enter_building(3);

        schedule_building_spawn(Arc::clone(&room_ref), 3, tx);
        assert!(room_ref.lock().await.enemies.is_empty());

        sleep(Duration::from_millis(BUILDING_SPAWN_DELAY_MS + 300)).await;
        // difficulty 0 -> min(2 + 0, 8) = 2 interior enemies
        assert_eq!(room_ref.lock().await.enemies.len(), 2);
    }

    #[tokio::test]
    async fn test_building_wave_cancelled_by_scene_change() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let room_ref = occupied_room().await;
        room_ref.lock().await.enter_building(3);

        schedule_building_spawn(Arc::clone(&room_ref), 3, tx);
        room_ref.lock().await.exit_building();

        sleep(Duration::from_millis(BUILDING_SPAWN_DELAY_MS + 300)).await;
        assert!(room_ref.lock().await.enemies.is_empty());
    }
}
