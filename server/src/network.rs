//! UDP front-end: session handshake, intent routing and outbound fan-out.
//!
//! Inbound datagrams are funneled into the main loop through one channel;
//! outbound deliveries go through another and are written by a dedicated
//! sender task, so no room operation ever blocks on socket I/O.

use crate::ai;
use crate::connection::{Connection, ConnectionManager};
use crate::registry::{Registry, SharedRoom};
use crate::spawner;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ConnectionTimeout {
        connection: Connection,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Outbound work for the sender task
#[derive(Debug)]
pub enum GameMessage {
    Deliver {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

/// Queues room deliveries for transmission. Called after the producing room
/// lock has been released; sending is best-effort by design.
pub fn deliver(tx: &mpsc::UnboundedSender<GameMessage>, events: Vec<crate::room::Outbound>) {
    for event in events {
        if event.addrs.is_empty() {
            continue;
        }
        if let Err(e) = tx.send(GameMessage::Deliver {
            packet: event.packet,
            addrs: event.addrs,
        }) {
            error!("Failed to queue outbound packet: {}", e);
        }
    }
}

/// Main server coordinating the transport, connection table and room registry
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: Arc<RwLock<ConnectionManager>>,
    registry: Arc<Registry>,
    ai_tick: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, ai_tick: Duration) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            connections: Arc::new(RwLock::new(ConnectionManager::new())),
            registry: Arc::new(Registry::new()),
            ai_tick,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outbound queue; packets are serialized
    /// once and fanned out to every recipient address
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::Deliver { packet, addrs } => {
                        let data = match serialize(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to serialize outbound packet: {}", e);
                                continue;
                            }
                        };
                        for addr in addrs {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                debug!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors connection timeouts
    fn spawn_timeout_checker(&self) {
        let connections = Arc::clone(&self.connections);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut connections = connections.write().await;
                    connections.check_timeouts()
                };

                for connection in timed_out {
                    if server_tx
                        .send(ServerMessage::ConnectionTimeout { connection })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    /// Finds the caller's session and room for an in-room intent, refreshing
    /// liveness on the way. `None` for unknown senders or sessions that have
    /// not joined a room; such intents are dropped silently.
    async fn session_room(&self, addr: SocketAddr) -> Option<(u32, SharedRoom)> {
        let (client_id, room_id) = {
            let mut connections = self.connections.write().await;
            let client_id = connections.find_by_addr(addr)?;
            connections.touch(client_id);
            let room_id = connections.room_of(client_id)?;
            (client_id, room_id)
        };

        let room = self.registry.get(&room_id).await?;
        Some((client_id, room))
    }

    /// Runs the leave path for a session that is already out of the
    /// connection table. Exactly once per connection by construction: the
    /// table removal is the only entry point.
    async fn cleanup_session(&self, connection: Connection) {
        if let Some(room_id) = connection.room_id {
            let events = self.registry.leave_room(&room_id, connection.id).await;
            deliver(&self.game_tx, events);
        }
    }

    async fn handle_connect(&self, addr: SocketAddr, client_version: u32) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        // A duplicate connect from a known address replaces the old session
        let existing = {
            let mut connections = self.connections.write().await;
            connections
                .find_by_addr(addr)
                .and_then(|id| connections.remove(id))
        };
        if let Some(connection) = existing {
            info!("Replacing existing session {} from {}", connection.id, addr);
            self.cleanup_session(connection).await;
        }

        let client_id = {
            let mut connections = self.connections.write().await;
            connections.add(addr)
        };

        let (room_id, room_ref, events, first) = self.registry.join_room(client_id, addr).await;
        {
            let mut connections = self.connections.write().await;
            connections.set_room(client_id, room_id);
        }

        deliver(&self.game_tx, events);
        if first {
            spawner::start(room_ref, self.game_tx.clone()).await;
        }
    }

    async fn handle_disconnect(&self, addr: SocketAddr) {
        let removed = {
            let mut connections = self.connections.write().await;
            connections
                .find_by_addr(addr)
                .and_then(|id| connections.remove(id))
        };
        if let Some(connection) = removed {
            self.cleanup_session(connection).await;
        }
    }

    /// Routes one inbound packet. In-room intents lock the owning room for
    /// the duration of the operation only; the resulting deliveries are sent
    /// after the lock is dropped.
    async fn handle_packet(&self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                self.handle_connect(addr, client_version).await;
            }

            Packet::Heartbeat { .. } => {
                let mut connections = self.connections.write().await;
                if let Some(client_id) = connections.find_by_addr(addr) {
                    connections.touch(client_id);
                }
            }

            Packet::Disconnect => {
                self.handle_disconnect(addr).await;
            }

            Packet::PlayerMove(update) => {
                if let Some((client_id, room_ref)) = self.session_room(addr).await {
                    let events = room_ref.lock().await.apply_move(client_id, update);
                    deliver(&self.game_tx, events);
                }
            }

            Packet::PlayerAttack {
                weapon,
                direction,
                bullet_id,
            } => {
                if let Some((client_id, room_ref)) = self.session_room(addr).await {
                    let events = room_ref
                        .lock()
                        .await
                        .attack(client_id, weapon, direction, bullet_id);
                    deliver(&self.game_tx, events);
                }
            }

            Packet::PlayerWeaponSwitch { weapon } => {
                if let Some((client_id, room_ref)) = self.session_room(addr).await {
                    let events = room_ref.lock().await.switch_weapon(client_id, weapon);
                    deliver(&self.game_tx, events);
                }
            }

            Packet::RequestHit {
                enemy_id, damage, ..
            } => {
                if let Some((_, room_ref)) = self.session_room(addr).await {
                    let events = room_ref.lock().await.resolve_hit(&enemy_id, damage);
                    deliver(&self.game_tx, events);
                }
            }

            Packet::RequestPickup { pickup_id } => {
                if let Some((client_id, room_ref)) = self.session_room(addr).await {
                    let events = room_ref.lock().await.claim_pickup(client_id, &pickup_id);
                    deliver(&self.game_tx, events);
                }
            }

            Packet::PlayerDamaged { damage } => {
                if let Some((client_id, room_ref)) = self.session_room(addr).await {
                    let events = room_ref.lock().await.report_damage(client_id, damage);
                    deliver(&self.game_tx, events);
                }
            }

            Packet::RequestEnterBuilding { building_id } => {
                if let Some((_, room_ref)) = self.session_room(addr).await {
                    let events = room_ref.lock().await.enter_building(building_id);
                    deliver(&self.game_tx, events);
                    spawner::schedule_building_spawn(room_ref, building_id, self.game_tx.clone());
                }
            }

            Packet::RequestExitBuilding => {
                if let Some((_, room_ref)) = self.session_room(addr).await {
                    let events = room_ref.lock().await.exit_building();
                    deliver(&self.game_tx, events);
                    spawner::start(room_ref, self.game_tx.clone()).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();
        ai::start(
            Arc::clone(&self.registry),
            self.game_tx.clone(),
            self.ai_tick,
        );

        info!("Server started successfully");

        loop {
            match self.server_rx.recv().await {
                Some(ServerMessage::PacketReceived { packet, addr }) => {
                    self.handle_packet(packet, addr).await;
                }
                Some(ServerMessage::ConnectionTimeout { connection }) => {
                    // Best-effort notice in case the client is still up
                    // behind a rebound address
                    let _ = self.game_tx.send(GameMessage::Deliver {
                        packet: Packet::Disconnected {
                            reason: "Connection timed out".to_string(),
                        },
                        addrs: vec![connection.addr],
                    });
                    self.cleanup_session(connection).await;
                }
                Some(ServerMessage::Shutdown) | None => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
