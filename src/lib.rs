//! Cabbage Bonk - rules engine for a bounce-and-merge arcade roguelike
//!
//! Core modules:
//! - `sim`: Deterministic round simulation (event bus, bonkables, merges, round state machine)
//! - `items`: Player items (triggers, effects, inventory slots, duplicate merge/upgrade)
//! - `tuning`: Data-driven game balance

pub mod items;
pub mod sim;
pub mod tuning;

pub use items::{ItemCatalog, ItemId, ItemManager, ItemTemplate, PlayerState, SlotId};
pub use sim::{Game, GameEvent, RoundPhase, TickInput};
pub use tuning::{ConfigError, Tuning};

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz is plenty for a turn-based bounce round)
    pub const SIM_DT: f32 = 1.0 / 60.0;

    /// Upper bound on settle passes (drain events, apply effect commands) per call
    pub const MAX_SETTLE_PASSES: usize = 64;
}

/// Midpoint between two world positions
#[inline]
pub fn midpoint(a: Vec2, b: Vec2) -> Vec2 {
    (a + b) * 0.5
}

/// True when two circles overlap (touching edges do not count)
#[inline]
pub fn circles_overlap(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> bool {
    let reach = radius_a + radius_b;
    a.distance_squared(b) < reach * reach
}
