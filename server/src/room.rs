//! Authoritative state for one session of up to four players.
//!
//! Every public operation runs under the room's own lock (one `Room` lives
//! inside an `Arc<tokio::sync::Mutex<Room>>` owned by the registry) and
//! returns the outbound deliveries it produced. Callers send those after
//! releasing the lock, so a slow connection never stalls the room.

use log::{info, warn};
use rand::Rng;
use shared::{
    building_enemy_count, difficulty_level, distance, max_enemies, normalize, spawn_delay_ms,
    Enemy, MoveUpdate, Packet, Pickup, PickupKind, Player, Scene, Vec2, Weapon,
    BUILDING_SPAWN_X_MIN, BUILDING_SPAWN_X_RANGE, BUILDING_SPAWN_Y_MIN, BUILDING_SPAWN_Y_RANGE,
    ENEMY_AGGRO_RANGE, ENEMY_SPAWN_ANCHORS, ENEMY_SPAWN_JITTER, ENEMY_SPEED, INITIAL_PICKUPS,
    KILL_DROP_CHANCE, PICKUP_SPAWN_ANCHORS, PICKUP_SPAWN_JITTER, ROOM_CAPACITY, SCORE_PER_KILL,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;

/// One packet bound for a set of member addresses. Produced under the room
/// lock, transmitted after it is released.
#[derive(Debug, PartialEq)]
pub struct Outbound {
    pub packet: Packet,
    pub addrs: Vec<SocketAddr>,
}

/// Joining a room that already holds four players. The registry's capacity
/// check makes this unreachable in normal operation, so it is logged as an
/// invariant breach rather than surfaced to the client.
#[derive(Debug, PartialEq, Eq)]
pub struct RoomFull;

pub struct Room {
    pub id: String,
    pub players: HashMap<u32, Player>,
    addrs: HashMap<u32, SocketAddr>,
    pub enemies: HashMap<String, Enemy>,
    pub pickups: HashMap<String, Pickup>,
    pub score: u32,
    pub scene: Scene,
    pub building_id: Option<u32>,
    enemy_counter: u64,
    pickup_counter: u64,
    /// Handle of the self-rescheduling spawn task; present iff it is running.
    pub spawn_task: Option<JoinHandle<()>>,
    /// Cleared when the last player leaves. Timer callbacks check this before
    /// touching state so a torn-down room is never resurrected.
    pub alive: bool,
}

impl Room {
    pub fn new(id: String) -> Self {
        Self {
            id,
            players: HashMap::new(),
            addrs: HashMap::new(),
            enemies: HashMap::new(),
            pickups: HashMap::new(),
            score: 0,
            scene: Scene::City,
            building_id: None,
            enemy_counter: 0,
            pickup_counter: 0,
            spawn_task: None,
            alive: true,
        }
    }

    pub fn difficulty(&self) -> u32 {
        difficulty_level(self.score)
    }

    pub fn current_spawn_delay(&self) -> Duration {
        Duration::from_millis(spawn_delay_ms(self.difficulty()))
    }

    fn all_addrs(&self) -> Vec<SocketAddr> {
        self.addrs.values().copied().collect()
    }

    fn addrs_except(&self, client_id: u32) -> Vec<SocketAddr> {
        self.addrs
            .iter()
            .filter(|(id, _)| **id != client_id)
            .map(|(_, addr)| *addr)
            .collect()
    }

    fn addr_of(&self, client_id: u32) -> Vec<SocketAddr> {
        self.addrs.get(&client_id).copied().into_iter().collect()
    }

    fn broadcast(&self, packet: Packet) -> Outbound {
        Outbound {
            packet,
            addrs: self.all_addrs(),
        }
    }

    fn mint_enemy(&mut self, x: f32, y: f32) -> Enemy {
        let id = format!("enemy-{}", self.enemy_counter);
        self.enemy_counter += 1;
        let enemy = Enemy::new(id, x, y);
        self.enemies.insert(enemy.id.clone(), enemy.clone());
        enemy
    }

    fn mint_pickup(&mut self, kind: PickupKind, x: f32, y: f32) -> Pickup {
        let id = format!("pickup-{}", self.pickup_counter);
        self.pickup_counter += 1;
        let pickup = Pickup { id, kind, x, y };
        self.pickups.insert(pickup.id.clone(), pickup.clone());
        pickup
    }

    /// Adds a member at the fixed spawn point. Returns the deliveries plus
    /// whether this was the first player (the caller then starts the spawn
    /// scheduler for the room).
    pub fn join(
        &mut self,
        client_id: u32,
        addr: SocketAddr,
    ) -> Result<(Vec<Outbound>, bool), RoomFull> {
        if self.players.len() >= ROOM_CAPACITY {
            return Err(RoomFull);
        }

        let player = Player::new(client_id);
        self.players.insert(client_id, player.clone());
        self.addrs.insert(client_id, addr);
        info!("Player {} joined room {}", client_id, self.id);

        let mut out = Vec::new();
        out.push(Outbound {
            packet: Packet::GameState {
                player_id: client_id,
                room_id: self.id.clone(),
                players: self.players.values().cloned().collect(),
                enemies: self.enemies.values().cloned().collect(),
                pickups: self.pickups.values().cloned().collect(),
                score: self.score,
                scene: self.scene,
                building_id: self.building_id,
            },
            addrs: vec![addr],
        });
        out.push(Outbound {
            packet: Packet::PlayerJoined(player),
            addrs: self.addrs_except(client_id),
        });

        let first = self.players.len() == 1;
        if first {
            for _ in 0..INITIAL_PICKUPS {
                let event = self.spawn_pickup();
                out.push(event);
            }
        }

        Ok((out, first))
    }

    /// Removes a member. Idempotent: a second leave for the same id is a
    /// no-op with no broadcast. Returns whether the room is now empty, in
    /// which case the spawn task has been cancelled and the caller must
    /// release the room from the registry.
    pub fn leave(&mut self, client_id: u32) -> (Vec<Outbound>, bool) {
        if self.players.remove(&client_id).is_none() {
            return (Vec::new(), false);
        }
        self.addrs.remove(&client_id);
        info!("Player {} left room {}", client_id, self.id);

        let out = vec![self.broadcast(Packet::PlayerLeft { id: client_id })];

        let empty = self.players.is_empty();
        if empty {
            self.alive = false;
            if let Some(task) = self.spawn_task.take() {
                task.abort();
            }
        }
        (out, empty)
    }

    /// Overwrites the player fields present in the update. Position is
    /// client-authoritative here; stale or reordered updates only cause
    /// stale rendering on peers, never an invariant violation.
    pub fn apply_move(&mut self, client_id: u32, update: MoveUpdate) -> Vec<Outbound> {
        let Some(player) = self.players.get_mut(&client_id) else {
            return Vec::new();
        };

        if let Some(x) = update.x {
            player.x = x;
        }
        if let Some(y) = update.y {
            player.y = y;
        }
        if let Some(vx) = update.vx {
            player.vx = vx;
        }
        if let Some(vy) = update.vy {
            player.vy = vy;
        }
        if let Some(direction) = update.direction {
            player.direction = direction;
        }
        if let Some(health) = update.health {
            player.health = health;
        }
        if let Some(armor) = update.armor {
            player.armor = armor;
        }
        if let Some(weapon) = update.weapon {
            player.weapon = weapon;
        }

        vec![Outbound {
            packet: Packet::PlayerMoved {
                id: client_id,
                update,
            },
            addrs: self.addrs_except(client_id),
        }]
    }

    /// Pure relay; attacks are a visual cue, damage arrives via hit requests.
    pub fn attack(
        &self,
        client_id: u32,
        weapon: Weapon,
        direction: Vec2,
        bullet_id: Option<String>,
    ) -> Vec<Outbound> {
        vec![Outbound {
            packet: Packet::PlayerAttacked {
                id: client_id,
                weapon,
                direction,
                bullet_id,
            },
            addrs: self.addrs_except(client_id),
        }]
    }

    pub fn switch_weapon(&mut self, client_id: u32, weapon: Weapon) -> Vec<Outbound> {
        let Some(player) = self.players.get_mut(&client_id) else {
            return Vec::new();
        };
        player.weapon = weapon;

        vec![Outbound {
            packet: Packet::PlayerWeaponSwitched {
                id: client_id,
                weapon,
            },
            addrs: self.addrs_except(client_id),
        }]
    }

    /// Applies damage to an enemy. A stale id or an already-dead enemy is a
    /// silent no-op, which de-duplicates near-simultaneous hits on a dying
    /// enemy: whichever request the room lock admits first gets the kill.
    pub fn resolve_hit(&mut self, enemy_id: &str, damage: i32) -> Vec<Outbound> {
        let health_left = match self.enemies.get_mut(enemy_id) {
            Some(enemy) if enemy.health > 0 => {
                enemy.health -= damage;
                enemy.health
            }
            _ => return Vec::new(),
        };

        if health_left > 0 {
            return vec![self.broadcast(Packet::EnemyHit {
                enemy_id: enemy_id.to_string(),
                health: health_left,
            })];
        }

        let Some(enemy) = self.enemies.remove(enemy_id) else {
            return Vec::new();
        };
        self.score += SCORE_PER_KILL;
        info!(
            "Enemy {} died in room {}, score now {}",
            enemy.id, self.id, self.score
        );

        let mut out = vec![
            self.broadcast(Packet::EnemyDied {
                enemy_id: enemy.id.clone(),
            }),
            self.broadcast(Packet::ScoreUpdated { score: self.score }),
        ];

        let mut rng = rand::thread_rng();
        if rng.gen_bool(KILL_DROP_CHANCE) {
            let kind = if rng.gen_bool(0.7) {
                PickupKind::Ammo
            } else if rng.gen_bool(0.5) {
                PickupKind::Health
            } else {
                PickupKind::Armor
            };
            let pickup = self.mint_pickup(kind, enemy.x, enemy.y);
            out.push(self.broadcast(Packet::PickupSpawned(pickup)));
        }

        out
    }

    /// First claim wins: the pickup is removed before any reply is built, so
    /// a second request for the same id is a no-op.
    pub fn claim_pickup(&mut self, client_id: u32, pickup_id: &str) -> Vec<Outbound> {
        let Some(pickup) = self.pickups.remove(pickup_id) else {
            return Vec::new();
        };

        vec![
            Outbound {
                packet: Packet::PickupClaimed(pickup),
                addrs: self.addr_of(client_id),
            },
            self.broadcast(Packet::PickupRemoved {
                pickup_id: pickup_id.to_string(),
            }),
        ]
    }

    /// Armor absorbs first, excess spills to health; this mirrors the
    /// client-side order so both ends agree on the result.
    pub fn report_damage(&mut self, client_id: u32, damage: i32) -> Vec<Outbound> {
        let Some(player) = self.players.get_mut(&client_id) else {
            return Vec::new();
        };

        if player.armor > 0 {
            let absorbed = player.armor.min(damage);
            player.armor -= absorbed;
            player.health -= damage - absorbed;
        } else {
            player.health -= damage;
        }

        if player.health > 0 {
            return Vec::new();
        }

        info!("Player {} died in room {}", client_id, self.id);
        vec![
            Outbound {
                packet: Packet::PlayerDied,
                addrs: self.addr_of(client_id),
            },
            Outbound {
                packet: Packet::OtherPlayerDied { id: client_id },
                addrs: self.addrs_except(client_id),
            },
        ]
    }

    /// Scene transition; enemies are scene-scoped and cleared immediately.
    /// The interior enemy wave is spawned by a deferred task via
    /// [`spawn_building_enemies`](Self::spawn_building_enemies).
    pub fn enter_building(&mut self, building_id: u32) -> Vec<Outbound> {
        self.scene = Scene::Building;
        self.building_id = Some(building_id);
        self.enemies.clear();
        info!("Room {} entering building {}", self.id, building_id);

        vec![self.broadcast(Packet::SceneChange {
            scene: Scene::Building,
            building_id: Some(building_id),
        })]
    }

    /// The delayed interior wave: `min(2 + difficulty, 8)` enemies at
    /// randomized interior coordinates.
    pub fn spawn_building_enemies(&mut self) -> Vec<Outbound> {
        let count = building_enemy_count(self.difficulty());
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let (x, y) = {
                let mut rng = rand::thread_rng();
                (
                    BUILDING_SPAWN_X_MIN + rng.gen::<f32>() * BUILDING_SPAWN_X_RANGE,
                    BUILDING_SPAWN_Y_MIN + rng.gen::<f32>() * BUILDING_SPAWN_Y_RANGE,
                )
            };
            let enemy = self.mint_enemy(x, y);
            out.push(self.broadcast(Packet::EnemySpawned(enemy)));
        }
        out
    }

    pub fn exit_building(&mut self) -> Vec<Outbound> {
        self.scene = Scene::City;
        self.building_id = None;
        self.enemies.clear();
        info!("Room {} returning to city", self.id);

        vec![self.broadcast(Packet::SceneChange {
            scene: Scene::City,
            building_id: None,
        })]
    }

    /// One firing of the spawn scheduler: mint a single enemy at a random
    /// anchor if the room is below its difficulty-scaled population cap.
    pub fn spawn_enemy(&mut self) -> Vec<Outbound> {
        if self.enemies.len() >= max_enemies(self.difficulty()) {
            return Vec::new();
        }

        let (x, y) = {
            let mut rng = rand::thread_rng();
            let (ax, ay) = ENEMY_SPAWN_ANCHORS[rng.gen_range(0..ENEMY_SPAWN_ANCHORS.len())];
            (
                ax + rng.gen_range(-ENEMY_SPAWN_JITTER..ENEMY_SPAWN_JITTER),
                ay + rng.gen_range(-ENEMY_SPAWN_JITTER..ENEMY_SPAWN_JITTER),
            )
        };
        let enemy = self.mint_enemy(x, y);
        vec![self.broadcast(Packet::EnemySpawned(enemy))]
    }

    pub fn spawn_pickup(&mut self) -> Outbound {
        const KINDS: [PickupKind; 4] = [
            PickupKind::Ammo,
            PickupKind::Ammo,
            PickupKind::Health,
            PickupKind::Armor,
        ];

        let (kind, x, y) = {
            let mut rng = rand::thread_rng();
            let kind = KINDS[rng.gen_range(0..KINDS.len())];
            let (ax, ay) = PICKUP_SPAWN_ANCHORS[rng.gen_range(0..PICKUP_SPAWN_ANCHORS.len())];
            (
                kind,
                ax + rng.gen_range(-PICKUP_SPAWN_JITTER..PICKUP_SPAWN_JITTER),
                ay + rng.gen_range(-PICKUP_SPAWN_JITTER..PICKUP_SPAWN_JITTER),
            )
        };
        let pickup = self.mint_pickup(kind, x, y);
        self.broadcast(Packet::PickupSpawned(pickup))
    }

    /// One AI pass: each enemy targets the nearest player within aggro range
    /// and steps toward them; outside the range it drops its target and
    /// stands still. Emits a single full-list update for the room.
    pub fn ai_tick(&mut self) -> Vec<Outbound> {
        if self.players.is_empty() || self.enemies.is_empty() {
            return Vec::new();
        }

        let players = &self.players;
        for enemy in self.enemies.values_mut() {
            let mut closest: Option<(u32, f32, f32, f32)> = None;
            for player in players.values() {
                let dist = distance(enemy.x, enemy.y, player.x, player.y);
                if closest.map_or(true, |(_, best, _, _)| dist < best) {
                    closest = Some((player.id, dist, player.x, player.y));
                }
            }

            match closest {
                Some((player_id, dist, px, py)) if dist < ENEMY_AGGRO_RANGE => {
                    enemy.target_player_id = Some(player_id);
                    let (nx, ny) = normalize(px - enemy.x, py - enemy.y);
                    enemy.x += nx * ENEMY_SPEED;
                    enemy.y += ny * ENEMY_SPEED;
                }
                _ => enemy.target_player_id = None,
            }
        }

        vec![self.broadcast(Packet::EnemiesUpdated(
            self.enemies.values().cloned().collect(),
        ))]
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        if let Some(task) = self.spawn_task.take() {
            warn!("Room {} dropped with a live spawn task", self.id);
            task.abort();
        }
    }
}
