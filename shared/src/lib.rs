use serde::{Deserialize, Serialize};

pub const ROOM_CAPACITY: usize = 4;

pub const PLAYER_SPAWN_X: f32 = 580.0;
pub const PLAYER_SPAWN_Y: f32 = 300.0;
pub const PLAYER_MAX_HEALTH: i32 = 100;
pub const PLAYER_START_AMMO: i32 = 30;

pub const ENEMY_HEALTH: i32 = 30;
pub const ENEMY_SPEED: f32 = 1.5;
pub const ENEMY_AGGRO_RANGE: f32 = 300.0;

pub const SCORE_PER_KILL: u32 = 10;
pub const KILL_DROP_CHANCE: f64 = 0.3;

pub const AI_TICK_MS: u64 = 100;
pub const BUILDING_SPAWN_DELAY_MS: u64 = 500;
pub const INITIAL_PICKUPS: usize = 3;

/// City spawn anchors for enemies; actual map geometry lives on the client,
/// these sit on the road grid.
pub const ENEMY_SPAWN_ANCHORS: [(f32, f32); 6] = [
    (300.0, 200.0),
    (800.0, 300.0),
    (500.0, 500.0),
    (1000.0, 400.0),
    (200.0, 600.0),
    (700.0, 150.0),
];
pub const ENEMY_SPAWN_JITTER: f32 = 50.0;

pub const PICKUP_SPAWN_ANCHORS: [(f32, f32); 5] = [
    (400.0, 300.0),
    (600.0, 400.0),
    (800.0, 250.0),
    (300.0, 500.0),
    (900.0, 350.0),
];
pub const PICKUP_SPAWN_JITTER: f32 = 25.0;

/// Building-interior spawn area.
pub const BUILDING_SPAWN_X_MIN: f32 = 200.0;
pub const BUILDING_SPAWN_X_RANGE: f32 = 400.0;
pub const BUILDING_SPAWN_Y_MIN: f32 = 150.0;
pub const BUILDING_SPAWN_Y_RANGE: f32 = 250.0;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Weapon {
    Gun,
    Sword,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    City,
    Building,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PickupKind {
    Ammo,
    Health,
    Armor,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub health: i32,
    pub armor: i32,
    pub ammo: i32,
    pub weapon: Weapon,
    pub direction: Vec2,
}

impl Player {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            x: PLAYER_SPAWN_X,
            y: PLAYER_SPAWN_Y,
            vx: 0.0,
            vy: 0.0,
            health: PLAYER_MAX_HEALTH,
            armor: 0,
            ammo: PLAYER_START_AMMO,
            weapon: Weapon::Gun,
            direction: Vec2 { x: 1.0, y: 0.0 },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Enemy {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub health: i32,
    pub target_player_id: Option<u32>,
}

impl Enemy {
    pub fn new(id: String, x: f32, y: f32) -> Self {
        Self {
            id,
            x,
            y,
            health: ENEMY_HEALTH,
            target_player_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Pickup {
    pub id: String,
    pub kind: PickupKind,
    pub x: f32,
    pub y: f32,
}

/// Partial player update; absent fields leave the server-side player
/// untouched. Position is client-authoritative on this path.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct MoveUpdate {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub vx: Option<f32>,
    pub vy: Option<f32>,
    pub direction: Option<Vec2>,
    pub health: Option<i32>,
    pub armor: Option<i32>,
    pub weapon: Option<Weapon>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Session management (client -> server)
    Connect {
        client_version: u32,
    },
    Heartbeat {
        timestamp: u64,
    },
    Disconnect,

    // Intents (client -> server)
    PlayerMove(MoveUpdate),
    PlayerAttack {
        weapon: Weapon,
        direction: Vec2,
        bullet_id: Option<String>,
    },
    PlayerWeaponSwitch {
        weapon: Weapon,
    },
    RequestHit {
        enemy_id: String,
        damage: i32,
        weapon: Weapon,
    },
    RequestPickup {
        pickup_id: String,
    },
    PlayerDamaged {
        damage: i32,
    },
    RequestEnterBuilding {
        building_id: u32,
    },
    RequestExitBuilding,

    // Server -> client
    GameState {
        player_id: u32,
        room_id: String,
        players: Vec<Player>,
        enemies: Vec<Enemy>,
        pickups: Vec<Pickup>,
        score: u32,
        scene: Scene,
        building_id: Option<u32>,
    },
    PlayerJoined(Player),
    PlayerLeft {
        id: u32,
    },
    PlayerMoved {
        id: u32,
        update: MoveUpdate,
    },
    PlayerAttacked {
        id: u32,
        weapon: Weapon,
        direction: Vec2,
        bullet_id: Option<String>,
    },
    PlayerWeaponSwitched {
        id: u32,
        weapon: Weapon,
    },
    EnemySpawned(Enemy),
    EnemiesUpdated(Vec<Enemy>),
    EnemyHit {
        enemy_id: String,
        health: i32,
    },
    EnemyDied {
        enemy_id: String,
    },
    PickupSpawned(Pickup),
    PickupClaimed(Pickup),
    PickupRemoved {
        pickup_id: String,
    },
    ScoreUpdated {
        score: u32,
    },
    SceneChange {
        scene: Scene,
        building_id: Option<u32>,
    },
    PlayerDied,
    OtherPlayerDied {
        id: u32,
    },
    Disconnected {
        reason: String,
    },
}

pub fn distance(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    (dx * dx + dy * dy).sqrt()
}

pub fn normalize(x: f32, y: f32) -> (f32, f32) {
    let magnitude = (x * x + y * y).sqrt();
    if magnitude > 0.0 {
        (x / magnitude, y / magnitude)
    } else {
        (0.0, 0.0)
    }
}

/// Shared room score drives both spawn pressure and population caps.
pub fn difficulty_level(score: u32) -> u32 {
    score / 50
}

pub fn max_enemies(difficulty: u32) -> usize {
    (10 + 2 * difficulty).min(30) as usize
}

pub fn spawn_delay_ms(difficulty: u32) -> u64 {
    (5000i64 - 400 * difficulty as i64).max(1000) as u64
}

pub fn building_enemy_count(difficulty: u32) -> usize {
    (2 + difficulty).min(8) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_player_spawn_defaults() {
        let player = Player::new(7);
        assert_eq!(player.id, 7);
        assert_eq!(player.x, PLAYER_SPAWN_X);
        assert_eq!(player.y, PLAYER_SPAWN_Y);
        assert_eq!(player.health, PLAYER_MAX_HEALTH);
        assert_eq!(player.armor, 0);
        assert_eq!(player.ammo, PLAYER_START_AMMO);
        assert_eq!(player.weapon, Weapon::Gun);
        assert_approx_eq!(player.direction.x, 1.0);
        assert_approx_eq!(player.direction.y, 0.0);
    }

    #[test]
    fn test_enemy_spawn_defaults() {
        let enemy = Enemy::new("enemy-0".to_string(), 300.0, 200.0);
        assert_eq!(enemy.health, ENEMY_HEALTH);
        assert_eq!(enemy.target_player_id, None);
    }

    #[test]
    fn test_distance() {
        assert_approx_eq!(distance(0.0, 0.0, 3.0, 4.0), 5.0);
        assert_approx_eq!(distance(100.0, 100.0, 100.0, 100.0), 0.0);
    }

    #[test]
    fn test_normalize() {
        let (nx, ny) = normalize(3.0, 4.0);
        assert_approx_eq!(nx, 0.6);
        assert_approx_eq!(ny, 0.8);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let (nx, ny) = normalize(0.0, 0.0);
        assert_eq!(nx, 0.0);
        assert_eq!(ny, 0.0);
    }

    #[test]
    fn test_difficulty_curve() {
        assert_eq!(difficulty_level(0), 0);
        assert_eq!(difficulty_level(49), 0);
        assert_eq!(difficulty_level(50), 1);
        assert_eq!(difficulty_level(240), 4);
    }

    #[test]
    fn test_spawn_parameters_scale_with_difficulty() {
        // score 240 -> difficulty 4
        let difficulty = difficulty_level(240);
        assert_eq!(max_enemies(difficulty), 18);
        assert_eq!(spawn_delay_ms(difficulty), 3400);

        // caps
        assert_eq!(max_enemies(20), 30);
        assert_eq!(spawn_delay_ms(20), 1000);
    }

    #[test]
    fn test_building_enemy_count_caps_at_eight() {
        assert_eq!(building_enemy_count(0), 2);
        assert_eq!(building_enemy_count(2), 4);
        assert_eq!(building_enemy_count(10), 8);
    }

    #[test]
    fn test_packet_serialization_move() {
        let packet = Packet::PlayerMove(MoveUpdate {
            x: Some(12.5),
            y: Some(-3.0),
            direction: Some(Vec2 { x: 0.0, y: 1.0 }),
            ..Default::default()
        });

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::PlayerMove(update) => {
                assert_eq!(update.x, Some(12.5));
                assert_eq!(update.y, Some(-3.0));
                assert_eq!(update.health, None);
                assert_eq!(update.weapon, None);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_game_state() {
        let packet = Packet::GameState {
            player_id: 1,
            room_id: "room-1".to_string(),
            players: vec![Player::new(1)],
            enemies: vec![Enemy::new("enemy-0".to_string(), 300.0, 200.0)],
            pickups: vec![Pickup {
                id: "pickup-0".to_string(),
                kind: PickupKind::Ammo,
                x: 400.0,
                y: 300.0,
            }],
            score: 120,
            scene: Scene::Building,
            building_id: Some(2),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::GameState {
                player_id,
                room_id,
                players,
                enemies,
                pickups,
                score,
                scene,
                building_id,
            } => {
                assert_eq!(player_id, 1);
                assert_eq!(room_id, "room-1");
                assert_eq!(players.len(), 1);
                assert_eq!(enemies.len(), 1);
                assert_eq!(pickups.len(), 1);
                assert_eq!(score, 120);
                assert_eq!(scene, Scene::Building);
                assert_eq!(building_id, Some(2));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_hit_request() {
        let packet = Packet::RequestHit {
            enemy_id: "enemy-3".to_string(),
            damage: 10,
            weapon: Weapon::Sword,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::RequestHit {
                enemy_id,
                damage,
                weapon,
            } => {
                assert_eq!(enemy_id, "enemy-3");
                assert_eq!(damage, 10);
                assert_eq!(weapon, Weapon::Sword);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
