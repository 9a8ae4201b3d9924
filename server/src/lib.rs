//! # Session Server Library
//!
//! Authoritative multiplayer session layer for the co-op city game. The
//! server owns per-room game state (players, enemies, pickups, shared
//! score), accepts fire-and-forget client intents over UDP, resolves them
//! deterministically and fans incremental updates back out to every room
//! member. Rendering, prediction and interpolation are client concerns;
//! this crate only guarantees the event contract they consume.
//!
//! ## Architecture
//!
//! - **Registry** (`registry`): process-wide room table. One short-held
//!   mutex serializes join/leave so rooms never exceed four players and a
//!   room being torn down can never accept a late join.
//! - **Room** (`room`): the single point of truth and contention for one
//!   session. Every operation runs under the room's own lock and returns
//!   the outbound deliveries it produced; transmission happens after the
//!   lock is released, so a stalled connection cannot stall the room.
//! - **Connections** (`connection`): transport sessions, liveness
//!   timestamps and the room back-reference. A connection id doubles as
//!   the player id inside its room.
//! - **Network** (`network`): UDP socket plumbing; receiver, sender and
//!   timeout tasks feeding one event loop.
//! - **AI** (`ai`): global fixed-rate pass giving every enemy
//!   nearest-player targeting and step movement.
//! - **Spawner** (`spawner`): per-room self-rescheduling enemy spawn task
//!   whose rate and population cap ramp with the room's score.
//!
//! Within one room all state-mutating operations apply in lock-admission
//! order; kills and pickup claims de-duplicate by operating on
//! no-op-if-absent entities, so duplicated or reordered intents are safe.

pub mod ai;
pub mod connection;
pub mod network;
pub mod registry;
pub mod room;
pub mod spawner;
