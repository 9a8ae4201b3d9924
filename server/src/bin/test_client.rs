use bincode::{deserialize, serialize};
use shared::{MoveUpdate, Packet, Vec2, PLAYER_SPAWN_X, PLAYER_SPAWN_Y};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::sleep;

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    // Server address
    let server_addr = "127.0.0.1:3001".parse::<SocketAddr>()?;

    // Join a room
    let connect_packet = Packet::Connect { client_version: 1 };
    println!("Sending connection request to {}", server_addr);
    socket
        .send_to(&serialize(&connect_packet)?, server_addr)
        .await?;

    // Buffer for receiving data
    let mut buf = [0u8; 2048];

    println!("Waiting for join snapshot...");
    let (len, _) = socket.recv_from(&mut buf).await?;

    let (player_id, room_id) = match deserialize::<Packet>(&buf[0..len])? {
        Packet::GameState {
            player_id,
            room_id,
            players,
            enemies,
            pickups,
            score,
            scene,
            ..
        } => {
            println!(
                "Joined {} as player {}: {} players, {} enemies, {} pickups, score {}, scene {:?}",
                room_id,
                player_id,
                players.len(),
                enemies.len(),
                pickups.len(),
                score,
                scene
            );
            (player_id, room_id)
        }
        other => {
            println!("Expected GameState but got: {:?}", other);
            return Ok(());
        }
    };

    // Walk in a circle around the spawn point for 10 seconds, draining
    // whatever the server pushes at us in between
    for i in 0..10u32 {
        let angle = i as f32 / 5.0 * std::f32::consts::PI;
        let update = MoveUpdate {
            x: Some(PLAYER_SPAWN_X + 40.0 * angle.cos()),
            y: Some(PLAYER_SPAWN_Y + 40.0 * angle.sin()),
            direction: Some(Vec2 {
                x: angle.cos(),
                y: angle.sin(),
            }),
            ..Default::default()
        };
        socket
            .send_to(&serialize(&Packet::PlayerMove(update))?, server_addr)
            .await?;
        socket
            .send_to(
                &serialize(&Packet::Heartbeat {
                    timestamp: get_timestamp(),
                })?,
                server_addr,
            )
            .await?;

        loop {
            match tokio::time::timeout(Duration::from_millis(200), socket.recv_from(&mut buf))
                .await
            {
                Ok(Ok((len, _))) => match deserialize::<Packet>(&buf[0..len]) {
                    Ok(Packet::EnemiesUpdated(enemies)) => {
                        println!("Enemy update: {} enemies", enemies.len());
                    }
                    Ok(Packet::EnemySpawned(enemy)) => {
                        println!("Enemy spawned: {} at ({:.0}, {:.0})", enemy.id, enemy.x, enemy.y);
                    }
                    Ok(other) => println!("Received: {:?}", other),
                    Err(e) => println!("Failed to deserialize packet: {}", e),
                },
                _ => break,
            }
        }

        sleep(Duration::from_secs(1)).await;
    }

    // Send disconnect when done
    println!("Player {} leaving {}", player_id, room_id);
    socket
        .send_to(&serialize(&Packet::Disconnect)?, server_addr)
        .await?;

    println!("Test client finished");
    Ok(())
}
