//! Collaborator interfaces
//!
//! Rendering, audio, pooled spawning and the run/map layer live outside the
//! engine. The engine only talks to them through these traits.

use std::collections::BTreeSet;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::bonkable::{BallHandle, BonkableKind, EntityHandle};
use super::round::RoundSummary;

/// Sound effect cues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundCue {
    Launch,
    Bonk,
    Merge,
    Pop,
    Payout,
    RoundComplete,
}

/// Visual effect cues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualCue {
    Spawn,
    Merge,
    Pop,
    Fire,
}

/// A sound or visual the presentation layer keeps alive until released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PresentationHandle(pub u64);

/// Rendering, audio and pooled-object lifecycle
pub trait Presentation {
    /// Fire-and-forget unless a handle is returned
    fn play_sound(
        &mut self,
        cue: SoundCue,
        position: Option<Vec2>,
        volume: Option<f32>,
    ) -> Option<PresentationHandle>;

    fn spawn_visual_effect(
        &mut self,
        cue: VisualCue,
        position: Vec2,
        rotation: Option<f32>,
    ) -> Option<PresentationHandle>;

    /// Stop a held sound/visual
    fn release(&mut self, handle: PresentationHandle);

    fn spawn_entity(&mut self, kind: &BonkableKind, position: Vec2) -> EntityHandle;

    fn despawn_entity(&mut self, handle: EntityHandle);

    fn launch_ball(&mut self, origin: Vec2, direction: Vec2) -> BallHandle;

    fn despawn_ball(&mut self, ball: BallHandle);
}

/// Map progress parameters that drive the round goal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapProgress {
    pub goal_base: f64,
    pub goal_power: f64,
    pub first_goal: f64,
    pub layer_index: u32,
}

impl Default for MapProgress {
    fn default() -> Self {
        Self {
            goal_base: 20.0,
            goal_power: 1.5,
            first_goal: 20.0,
            layer_index: 0,
        }
    }
}

/// Consulted once per Populate
pub trait MapProgressSource {
    fn current_map_progress(&self) -> MapProgress;
}

/// The run/map layer that receives finished rounds
pub trait RunLayer {
    fn round_completed(&mut self, summary: &RoundSummary);
}

/// Map progress that never changes
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMap(pub MapProgress);

impl MapProgressSource for FixedMap {
    fn current_map_progress(&self) -> MapProgress {
        self.0
    }
}

/// Run layer that only logs
#[derive(Debug, Clone, Default)]
pub struct LoggingRunLayer {
    pub rounds_completed: u32,
}

impl RunLayer for LoggingRunLayer {
    fn round_completed(&mut self, summary: &RoundSummary) {
        self.rounds_completed += 1;
        log::info!(
            "Round {} complete: score {:.1}/{:.1}, +{} currency",
            self.rounds_completed,
            summary.final_score,
            summary.goal,
            summary.currency_awarded
        );
    }
}

/// Presentation with no output; hands out handles and tracks what is live
#[derive(Debug, Clone, Default)]
pub struct Headless {
    next_entity: u32,
    next_ball: u32,
    next_handle: u64,
    pub live_entities: BTreeSet<EntityHandle>,
    pub live_balls: BTreeSet<BallHandle>,
    /// Sounds/visuals not yet released
    pub held: BTreeSet<PresentationHandle>,
    pub sounds: Vec<SoundCue>,
    pub visuals: Vec<VisualCue>,
    /// Hold every sound instead of fire-and-forget
    pub hold_sounds: bool,
}

impl Headless {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_handle(&mut self) -> PresentationHandle {
        self.next_handle += 1;
        PresentationHandle(self.next_handle)
    }
}

impl Presentation for Headless {
    fn play_sound(
        &mut self,
        cue: SoundCue,
        _position: Option<Vec2>,
        _volume: Option<f32>,
    ) -> Option<PresentationHandle> {
        self.sounds.push(cue);
        if self.hold_sounds {
            let handle = self.next_handle();
            self.held.insert(handle);
            Some(handle)
        } else {
            None
        }
    }

    fn spawn_visual_effect(
        &mut self,
        cue: VisualCue,
        _position: Vec2,
        _rotation: Option<f32>,
    ) -> Option<PresentationHandle> {
        self.visuals.push(cue);
        None
    }

    fn release(&mut self, handle: PresentationHandle) {
        self.held.remove(&handle);
    }

    fn spawn_entity(&mut self, _kind: &BonkableKind, _position: Vec2) -> EntityHandle {
        self.next_entity += 1;
        let handle = EntityHandle(self.next_entity);
        self.live_entities.insert(handle);
        handle
    }

    fn despawn_entity(&mut self, handle: EntityHandle) {
        self.live_entities.remove(&handle);
    }

    fn launch_ball(&mut self, _origin: Vec2, _direction: Vec2) -> BallHandle {
        self.next_ball += 1;
        let ball = BallHandle(self.next_ball);
        self.live_balls.insert(ball);
        ball
    }

    fn despawn_ball(&mut self, ball: BallHandle) {
        self.live_balls.remove(&ball);
    }
}
