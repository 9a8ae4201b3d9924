//! Global enemy AI pass.
//!
//! A single task walks every room at a fixed rate. The registry lock is
//! held only long enough to snapshot the room handles; each room is then
//! locked individually for its own pass, so one slow room never blocks the
//! rest.

use crate::network::{deliver, GameMessage};
use crate::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub fn start(
    registry: Arc<Registry>,
    tx: mpsc::UnboundedSender<GameMessage>,
    tick: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            for room_ref in registry.snapshot().await {
                let events = {
                    let mut room = room_ref.lock().await;
                    room.ai_tick()
                };
                deliver(&tx, events);
            }
        }
    })
}
