//! Round state machine
//!
//! Populate -> Aiming -> Bouncing -> (Aiming | Scoring). Every transition
//! publishes `StateExited(old)` then `StateEntered(new)`; peripheral systems
//! key off those rather than polling the phase.

use glam::Vec2;
use rand::Rng;
use rand::seq::SliceRandom;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::bonkable::{BallHandle, Bonkable, BonkableKind, CabbageVariant, EntityHandle, EntityStore};
use super::events::{EventBus, GameEvent};
use super::game::TickInput;
use super::merge::MergePlan;
use super::scheduler::{Scheduler, TimedAction};
use super::services::{MapProgress, MapProgressSource, Presentation, RunLayer, SoundCue, VisualCue};
use crate::items::{ItemManager, PlayerState};
use crate::tuning::{BonkTuning, MergeTuning, RoundTuning, Tuning};

/// Phase of one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundPhase {
    /// Spawning entities and computing the goal
    Populate,
    /// Waiting for the fire input
    Aiming,
    /// Balls in flight
    Bouncing,
    /// Popping entities and paying out; terminal for the round
    Scoring,
}

/// What the run layer learns about a finished round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub final_score: f64,
    pub goal: f64,
    pub goal_reached: bool,
    pub currency_awarded: i64,
    pub merges: u32,
    pub balls_fired: u32,
}

/// Round goal from map progress.
///
/// The first layer uses `first_goal`; deeper layers add
/// `goal_base * layer_index ^ goal_power`. Rounded, never below 1.
pub fn compute_round_goal(progress: &MapProgress) -> f64 {
    let goal = if progress.layer_index == 0 {
        progress.first_goal
    } else {
        progress.first_goal + progress.goal_base * (progress.layer_index as f64).powf(progress.goal_power)
    };
    goal.round().max(1.0)
}

/// `ceil(score / goal) * scaling`, nothing for an empty score
pub fn compute_payout(score: f64, goal: f64, scaling: i64) -> i64 {
    if score <= 0.0 || !score.is_finite() {
        return 0;
    }
    let ratio = if goal > 0.0 { score / goal } else { 1.0 };
    (ratio.ceil() as i64).saturating_mul(scaling)
}

/// Collaborators a round step may touch
pub struct RoundContext<'a> {
    pub bus: &'a mut EventBus,
    pub presentation: &'a mut dyn Presentation,
    pub items: &'a mut ItemManager,
    pub player: &'a mut PlayerState,
    pub map: &'a dyn MapProgressSource,
    pub run_layer: &'a mut dyn RunLayer,
    pub rng: &'a mut Pcg32,
}

pub struct RoundStateMachine {
    tuning: RoundTuning,
    bonk: BonkTuning,
    merge: MergeTuning,
    phase: RoundPhase,
    /// False until the first `enter`, so Populate has nothing to exit
    entered: bool,
    pub(crate) entities: EntityStore,
    active_balls: Vec<BallHandle>,
    pub(crate) balls_remaining: u32,
    round_goal: f64,
    published_score: f64,
    /// Sum of values popped during Scoring
    final_score: f64,
    spawn_plan: Vec<(Vec2, BonkableKind)>,
    scheduler: Scheduler,
    bounce_elapsed: f32,
    goal_reached: bool,
    completed: bool,
    merges: u32,
    balls_fired: u32,
    currency_awarded: i64,
}

impl RoundStateMachine {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            tuning: tuning.round.clone(),
            bonk: tuning.bonk.clone(),
            merge: tuning.merge.clone(),
            phase: RoundPhase::Populate,
            entered: false,
            entities: EntityStore::new(),
            active_balls: Vec::new(),
            balls_remaining: tuning.round.balls_per_round,
            round_goal: 0.0,
            published_score: 0.0,
            final_score: 0.0,
            spawn_plan: Vec::new(),
            scheduler: Scheduler::new(),
            bounce_elapsed: 0.0,
            goal_reached: false,
            completed: false,
            merges: 0,
            balls_fired: 0,
            currency_awarded: 0,
        }
    }

    // === Queries ===

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn balls_remaining(&self) -> u32 {
        self.balls_remaining
    }

    pub fn round_goal(&self) -> f64 {
        self.round_goal
    }

    /// Always the sum of value over live entities
    pub fn round_score(&self) -> f64 {
        self.entities.total_value()
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn active_entities(&self) -> Vec<&Bonkable> {
        self.entities.active().collect()
    }

    pub fn active_balls(&self) -> &[BallHandle] {
        &self.active_balls
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    pub fn summary(&self) -> RoundSummary {
        RoundSummary {
            final_score: self.final_score,
            goal: self.round_goal,
            goal_reached: self.final_score >= self.round_goal,
            currency_awarded: self.currency_awarded,
            merges: self.merges,
            balls_fired: self.balls_fired,
        }
    }

    // === Lifecycle ===

    /// Reset and enter Populate
    pub fn start(&mut self, ctx: &mut RoundContext<'_>) {
        self.scheduler.cancel_all(ctx.presentation);
        for ball in self.active_balls.drain(..) {
            ctx.presentation.despawn_ball(ball);
        }
        for handle in self.entities.active_handles() {
            ctx.presentation.despawn_entity(handle);
        }
        self.entities.clear();
        self.balls_remaining = self.tuning.balls_per_round;
        self.published_score = 0.0;
        self.final_score = 0.0;
        self.goal_reached = false;
        self.completed = false;
        self.merges = 0;
        self.balls_fired = 0;
        self.currency_awarded = 0;
        self.enter(RoundPhase::Populate, ctx);
    }

    /// Stop every pending timed step, releasing what they hold
    pub fn abort(&mut self, presentation: &mut dyn Presentation) {
        self.scheduler.cancel_all(presentation);
        for ball in self.active_balls.drain(..) {
            presentation.despawn_ball(ball);
        }
    }

    fn enter(&mut self, next: RoundPhase, ctx: &mut RoundContext<'_>) {
        if self.entered {
            ctx.bus.publish(GameEvent::StateExited(self.phase));
        }
        log::info!("Round phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        self.entered = true;

        match next {
            RoundPhase::Populate => self.enter_populate(ctx),
            RoundPhase::Aiming => ctx.items.on_enter_aiming(),
            RoundPhase::Bouncing => self.bounce_elapsed = 0.0,
            RoundPhase::Scoring => self.enter_scoring(),
        }
        ctx.bus.publish(GameEvent::StateEntered(next));
    }

    fn enter_populate(&mut self, ctx: &mut RoundContext<'_>) {
        let progress = ctx.map.current_map_progress();
        self.round_goal = compute_round_goal(&progress);
        log::info!(
            "Round goal {} (layer {})",
            self.round_goal,
            progress.layer_index
        );
        ctx.bus.publish(GameEvent::RoundGoalUpdated {
            goal: self.round_goal,
        });

        let grid = &self.tuning.grid;
        let cells = grid.cell_count();
        let wanted = self.tuning.entities_per_round as usize;
        if wanted > cells {
            log::warn!("{} entities requested but the grid has {} cells", wanted, cells);
        }
        let count = wanted.min(cells);

        let mut indices: Vec<usize> = (0..cells).collect();
        indices.shuffle(&mut *ctx.rng);
        self.spawn_plan = indices[..count]
            .iter()
            .map(|&cell| {
                let kind = self.roll_kind(ctx.rng);
                (self.tuning.grid.cell_center(cell), kind)
            })
            .collect();

        let stagger = self.tuning.spawn_stagger;
        for index in 0..count {
            self.scheduler
                .schedule(index as f32 * stagger, TimedAction::SpawnEntity { index });
        }
        self.scheduler
            .schedule(count as f32 * stagger, TimedAction::FinishPopulate);
    }

    fn roll_kind(&self, rng: &mut Pcg32) -> BonkableKind {
        let roll: f64 = rng.random();
        if roll < self.tuning.enemy_chance {
            return BonkableKind::Enemy {
                health: self.bonk.enemy_health,
            };
        }
        let rainbow: f64 = rng.random();
        let variant = if rainbow < self.tuning.rainbow_chance {
            CabbageVariant::Rainbow
        } else {
            CabbageVariant::Plain
        };
        BonkableKind::Cabbage { variant }
    }

    /// Pops are scheduled, not run: the transition events settle first, so
    /// values changed on the way into Scoring are what gets counted.
    fn enter_scoring(&mut self) {
        self.final_score = 0.0;
        log::info!(
            "Scoring: {:.1} on the board, goal {:.1}",
            self.round_score(),
            self.round_goal
        );

        let stagger = self.tuning.pop_stagger;
        let handles = self.entities.active_handles();
        for (i, &entity) in handles.iter().enumerate() {
            self.scheduler
                .schedule(i as f32 * stagger, TimedAction::PopEntity { entity });
        }
        self.scheduler
            .schedule(handles.len() as f32 * stagger, TimedAction::AwardPayout);
    }

    /// Advance one tick: run due timed steps, then the current phase
    pub fn tick(&mut self, dt: f32, input: &TickInput, ctx: &mut RoundContext<'_>) {
        for action in self.scheduler.advance(dt, ctx.presentation) {
            self.run_action(action, ctx);
        }

        match self.phase {
            RoundPhase::Populate | RoundPhase::Scoring => {}
            RoundPhase::Aiming => {
                if self.balls_remaining == 0 {
                    self.enter(RoundPhase::Scoring, ctx);
                } else if input.fire {
                    self.fire(input.pointer_world, ctx);
                }
            }
            RoundPhase::Bouncing => {
                self.bounce_elapsed += dt;
                if self.bounce_elapsed > self.tuning.max_bounce_seconds
                    && !self.active_balls.is_empty()
                {
                    log::warn!(
                        "Shot exceeded {}s, despawning {} balls",
                        self.tuning.max_bounce_seconds,
                        self.active_balls.len()
                    );
                    for ball in self.active_balls.drain(..) {
                        ctx.presentation.despawn_ball(ball);
                    }
                }
                if self.active_balls.is_empty() {
                    if self.balls_remaining > 0 {
                        self.enter(RoundPhase::Aiming, ctx);
                    } else {
                        self.enter(RoundPhase::Scoring, ctx);
                    }
                }
            }
        }
    }

    fn fire(&mut self, pointer: Vec2, ctx: &mut RoundContext<'_>) {
        let origin = self.tuning.launch_origin;
        let mut direction = (pointer - origin).normalize_or_zero();
        if direction == Vec2::ZERO {
            direction = Vec2::Y;
        }

        let ball = ctx.presentation.launch_ball(origin, direction);
        self.register_ball(ball);
        self.balls_remaining = self.balls_remaining.saturating_sub(1);
        self.balls_fired += 1;
        ctx.presentation.play_sound(SoundCue::Launch, Some(origin), None);
        log::debug!("Fired {:?}, {} balls left", ball, self.balls_remaining);

        ctx.bus.publish(GameEvent::BallFired {
            ball,
            balls_remaining: self.balls_remaining,
        });
        self.enter(RoundPhase::Bouncing, ctx);
    }

    fn run_action(&mut self, action: TimedAction, ctx: &mut RoundContext<'_>) {
        match action {
            TimedAction::SpawnEntity { index } => {
                let Some(&(position, kind)) = self.spawn_plan.get(index) else {
                    log::warn!("Spawn plan has no entry {}", index);
                    return;
                };
                let value = if kind.is_cabbage() {
                    self.tuning.start_value
                } else {
                    0.0
                };
                self.spawn_entity(kind, position, value, ctx.presentation, ctx.bus);
            }
            TimedAction::FinishPopulate => {
                if self.phase == RoundPhase::Populate {
                    self.enter(RoundPhase::Aiming, ctx);
                }
            }
            TimedAction::PopEntity { entity } => self.pop_entity(entity, ctx),
            TimedAction::AwardPayout => {
                let amount = compute_payout(
                    self.final_score,
                    self.round_goal,
                    self.tuning.payout_scaling,
                );
                self.currency_awarded = amount;
                if amount != 0 {
                    let total = ctx.player.add_currency(amount);
                    ctx.bus.publish(GameEvent::CurrencyChanged {
                        delta: amount,
                        total,
                    });
                }
                log::info!(
                    "Payout {} currency for {:.1} of goal {:.1}",
                    amount,
                    self.final_score,
                    self.round_goal
                );

                let jingle = ctx.presentation.play_sound(SoundCue::Payout, None, None);
                self.scheduler.schedule_holding(
                    self.tuning.completion_delay,
                    TimedAction::CompleteRound,
                    jingle.into_iter().collect(),
                );
            }
            TimedAction::CompleteRound => {
                self.completed = true;
                let summary = self.summary();
                ctx.presentation.play_sound(SoundCue::RoundComplete, None, None);
                ctx.run_layer.round_completed(&summary);
                ctx.bus.publish(GameEvent::RoundCompleted(summary));
            }
        }
    }

    // === Entity list (only mutated from here) ===

    /// Spawn and register an entity
    pub fn spawn_entity(
        &mut self,
        kind: BonkableKind,
        position: Vec2,
        value: f64,
        presentation: &mut dyn Presentation,
        bus: &mut EventBus,
    ) -> Option<EntityHandle> {
        let handle = presentation.spawn_entity(&kind, position);
        let entity = Bonkable::new(handle, kind, position, value)
            .with_radius(self.merge.base_radius, self.merge.radius_growth);
        self.register_entity(entity, presentation, bus)
    }

    fn register_entity(
        &mut self,
        entity: Bonkable,
        presentation: &mut dyn Presentation,
        bus: &mut EventBus,
    ) -> Option<EntityHandle> {
        let handle = entity.handle;
        let position = entity.position;
        if !self.entities.register(entity) {
            return None;
        }
        presentation.spawn_visual_effect(VisualCue::Spawn, position, None);
        bus.publish(GameEvent::EntitySpawned { entity: handle });
        Some(handle)
    }

    fn pop_entity(&mut self, handle: EntityHandle, ctx: &mut RoundContext<'_>) {
        let Some(entity) = self.entities.live_mut(handle) else {
            log::debug!("Pop skipped for stale {:?}", handle);
            return;
        };
        entity.popped = true;
        let value = entity.value;
        let position = entity.position;
        self.entities.remove(handle);
        self.final_score += value;

        ctx.presentation.despawn_entity(handle);
        ctx.presentation.play_sound(SoundCue::Pop, Some(position), None);
        ctx.presentation
            .spawn_visual_effect(VisualCue::Pop, position, None);
        ctx.bus.publish(GameEvent::EntityPopped {
            entity: handle,
            value,
        });
    }

    /// Remove an entity on request (enemy death, external kill)
    pub fn kill_entity(
        &mut self,
        handle: EntityHandle,
        presentation: &mut dyn Presentation,
        bus: &mut EventBus,
    ) -> bool {
        if self.entities.live(handle).is_none() {
            log::debug!("Kill skipped for stale {:?}", handle);
            return false;
        }
        self.entities.remove(handle);
        presentation.despawn_entity(handle);
        bus.publish(GameEvent::EntityKilled { entity: handle });
        true
    }

    /// First half of a merge: create the result, deactivate the inputs and
    /// publish `Merged` while the inputs still exist.
    pub fn begin_merge(
        &mut self,
        plan: &MergePlan,
        presentation: &mut dyn Presentation,
        bus: &mut EventBus,
    ) -> Option<EntityHandle> {
        let inputs_live = [plan.first, plan.second]
            .iter()
            .all(|&h| self.entities.live(h).is_some_and(|e| e.is_merging));
        if !inputs_live {
            log::debug!("Merge of {:?}/{:?} is stale", plan.first, plan.second);
            return None;
        }

        let kind = BonkableKind::Cabbage {
            variant: plan.variant,
        };
        let handle = presentation.spawn_entity(&kind, plan.position);
        let mut entity = Bonkable::new(handle, kind, plan.position, plan.value)
            .with_radius(self.merge.base_radius, self.merge.radius_growth)
            .with_tier(plan.tier, plan.color);
        entity.fire_stacks = plan.fire_stacks;
        let result = self.register_entity(entity, presentation, bus)?;

        for input in [plan.first, plan.second] {
            if let Some(e) = self.entities.get_mut(input) {
                e.active = false;
            }
        }
        presentation.play_sound(SoundCue::Merge, Some(plan.position), None);
        presentation.spawn_visual_effect(VisualCue::Merge, plan.position, None);
        log::info!(
            "Merged {:?} + {:?} -> {:?} (tier {})",
            plan.first,
            plan.second,
            result,
            plan.tier
        );
        bus.publish(GameEvent::Merged {
            first: plan.first,
            second: plan.second,
            result,
            tier: plan.tier,
        });
        Some(result)
    }

    /// Second half of a merge: tear the inputs down
    pub fn finish_merge(&mut self, plan: &MergePlan, presentation: &mut dyn Presentation) {
        for input in [plan.first, plan.second] {
            if self.entities.remove(input).is_some() {
                presentation.despawn_entity(input);
            }
        }
        self.merges += 1;
    }

    // === Balls ===

    /// Returns false if the ball was already tracked
    pub fn register_ball(&mut self, ball: BallHandle) -> bool {
        if self.active_balls.contains(&ball) {
            log::debug!("{:?} already active", ball);
            return false;
        }
        self.active_balls.push(ball);
        true
    }

    /// Returns false if the ball was not tracked
    pub fn unregister_ball(&mut self, ball: BallHandle) -> bool {
        let before = self.active_balls.len();
        self.active_balls.retain(|&b| b != ball);
        self.active_balls.len() != before
    }

    // === Score ===

    /// Publish score/goal events if anything changed; true if it published
    pub fn refresh_score(&mut self, bus: &mut EventBus) -> bool {
        let score = self.round_score();
        let mut published = false;

        if score != self.published_score {
            self.published_score = score;
            bus.publish(GameEvent::RoundScoreUpdated { score });
            published = true;
        }
        if !self.goal_reached
            && self.phase != RoundPhase::Scoring
            && self.round_goal > 0.0
            && score >= self.round_goal
        {
            self.goal_reached = true;
            log::info!("Round goal {} reached", self.round_goal);
            bus.publish(GameEvent::RoundGoalReached {
                score,
                goal: self.round_goal,
            });
            published = true;
        }
        published
    }

    /// Balls granted by item effects
    pub fn grant_balls(&mut self, count: u32) {
        self.balls_remaining = self.balls_remaining.saturating_add(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::items::ItemCatalog;
    use crate::sim::services::{FixedMap, Headless, LoggingRunLayer};
    use rand::SeedableRng;

    struct Rig {
        bus: EventBus,
        presentation: Headless,
        items: ItemManager,
        player: PlayerState,
        map: FixedMap,
        run_layer: LoggingRunLayer,
        rng: Pcg32,
    }

    impl Rig {
        fn new() -> Self {
            let tuning = Tuning::default();
            Self {
                bus: EventBus::default(),
                presentation: Headless::new(),
                items: ItemManager::new(ItemCatalog::default(), &tuning.items),
                player: PlayerState::default(),
                map: FixedMap(MapProgress::default()),
                run_layer: LoggingRunLayer::default(),
                rng: Pcg32::seed_from_u64(7),
            }
        }

        fn ctx(&mut self) -> RoundContext<'_> {
            RoundContext {
                bus: &mut self.bus,
                presentation: &mut self.presentation,
                items: &mut self.items,
                player: &mut self.player,
                map: &self.map,
                run_layer: &mut self.run_layer,
                rng: &mut self.rng,
            }
        }
    }

    fn fire() -> TickInput {
        TickInput {
            fire: true,
            pointer_world: Vec2::new(0.0, 100.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_round_goal_formula() {
        let mut progress = MapProgress {
            goal_base: 10.0,
            goal_power: 2.0,
            first_goal: 25.0,
            layer_index: 0,
        };
        assert_eq!(compute_round_goal(&progress), 25.0);
        progress.layer_index = 3;
        assert_eq!(compute_round_goal(&progress), 115.0);
    }

    #[test]
    fn test_payout_rounds_up_multiples() {
        assert_eq!(compute_payout(80.0, 100.0, 5), 5);
        assert_eq!(compute_payout(100.0, 100.0, 5), 5);
        assert_eq!(compute_payout(101.0, 100.0, 5), 10);
        assert_eq!(compute_payout(0.0, 100.0, 5), 0);
    }

    #[test]
    fn test_populate_spawns_then_aims() {
        let mut rig = Rig::new();
        let mut round = RoundStateMachine::new(&Tuning::default());
        round.start(&mut rig.ctx());
        assert_eq!(round.phase(), RoundPhase::Populate);
        assert_eq!(round.round_goal(), 20.0);

        let idle = TickInput::default();
        for _ in 0..120 {
            round.tick(SIM_DT, &idle, &mut rig.ctx());
        }
        assert_eq!(round.phase(), RoundPhase::Aiming);
        assert_eq!(round.entities().active_count(), 8);

        // Spawned on distinct grid cells
        let mut positions: Vec<_> = round
            .active_entities()
            .iter()
            .map(|e| (e.position.x as i32, e.position.y as i32))
            .collect();
        positions.sort();
        positions.dedup();
        assert_eq!(positions.len(), 8);
    }

    #[test]
    fn test_spawns_are_staggered() {
        let mut rig = Rig::new();
        let mut round = RoundStateMachine::new(&Tuning::default());
        round.start(&mut rig.ctx());

        round.tick(0.0, &TickInput::default(), &mut rig.ctx());
        assert_eq!(round.entities().active_count(), 1);
        round.tick(0.1, &TickInput::default(), &mut rig.ctx());
        assert_eq!(round.entities().active_count(), 2);
    }

    #[test]
    fn test_bounce_returns_to_aiming_until_balls_run_out() {
        let mut rig = Rig::new();
        let mut tuning = Tuning::default();
        tuning.round.balls_per_round = 2;
        tuning.round.spawn_stagger = 0.0;
        let mut round = RoundStateMachine::new(&tuning);
        round.start(&mut rig.ctx());
        round.tick(SIM_DT, &TickInput::default(), &mut rig.ctx());
        assert_eq!(round.phase(), RoundPhase::Aiming);

        round.tick(SIM_DT, &fire(), &mut rig.ctx());
        assert_eq!(round.phase(), RoundPhase::Bouncing);
        assert_eq!(round.balls_remaining(), 1);

        // Ball still active: stays in Bouncing
        round.tick(SIM_DT, &TickInput::default(), &mut rig.ctx());
        assert_eq!(round.phase(), RoundPhase::Bouncing);

        let ball = round.active_balls()[0];
        assert!(round.unregister_ball(ball));
        round.tick(SIM_DT, &TickInput::default(), &mut rig.ctx());
        assert_eq!(round.phase(), RoundPhase::Aiming);

        round.tick(SIM_DT, &fire(), &mut rig.ctx());
        let ball = round.active_balls()[0];
        round.unregister_ball(ball);
        round.tick(SIM_DT, &TickInput::default(), &mut rig.ctx());
        assert_eq!(round.phase(), RoundPhase::Scoring);
    }

    #[test]
    fn test_scoring_pops_pays_and_completes() {
        let mut rig = Rig::new();
        let mut tuning = Tuning::default();
        tuning.round.balls_per_round = 1;
        tuning.round.spawn_stagger = 0.0;
        tuning.round.enemy_chance = 0.0;
        tuning.round.start_value = 5.0;
        let mut round = RoundStateMachine::new(&tuning);
        round.start(&mut rig.ctx());
        round.tick(SIM_DT, &TickInput::default(), &mut rig.ctx());
        round.tick(SIM_DT, &fire(), &mut rig.ctx());
        let ball = round.active_balls()[0];
        round.unregister_ball(ball);
        round.tick(SIM_DT, &TickInput::default(), &mut rig.ctx());
        assert_eq!(round.phase(), RoundPhase::Scoring);
        assert_eq!(round.summary().final_score, 0.0);

        for _ in 0..200 {
            round.tick(SIM_DT, &TickInput::default(), &mut rig.ctx());
        }
        assert!(round.is_completed());
        assert_eq!(round.summary().final_score, 40.0);
        assert_eq!(round.entities().active_count(), 0);
        assert!(rig.presentation.live_entities.is_empty());
        // ceil(40 / 20) * 5
        assert_eq!(rig.player.currency(), 10);
        assert_eq!(rig.run_layer.rounds_completed, 1);
        assert_eq!(round.pending_tasks(), 0);
    }

    #[test]
    fn test_bounce_timeout_despawns_balls() {
        let mut rig = Rig::new();
        let mut tuning = Tuning::default();
        tuning.round.spawn_stagger = 0.0;
        tuning.round.max_bounce_seconds = 1.0;
        let mut round = RoundStateMachine::new(&tuning);
        round.start(&mut rig.ctx());
        round.tick(SIM_DT, &TickInput::default(), &mut rig.ctx());
        round.tick(SIM_DT, &fire(), &mut rig.ctx());
        assert_eq!(rig.presentation.live_balls.len(), 1);

        round.tick(1.5, &TickInput::default(), &mut rig.ctx());
        assert!(rig.presentation.live_balls.is_empty());
        assert_eq!(round.phase(), RoundPhase::Aiming);
    }

    #[test]
    fn test_transitions_publish_exit_then_enter() {
        use crate::sim::events::{EventKind, Listener, SystemListener};

        let mut rig = Rig::new();
        let mut tuning = Tuning::default();
        tuning.round.spawn_stagger = 0.0;
        let mut round = RoundStateMachine::new(&tuning);
        round.start(&mut rig.ctx());
        round.tick(SIM_DT, &TickInput::default(), &mut rig.ctx());
        rig.bus.drain(|_, _, _| Ok(()));

        for kind in [EventKind::StateExited, EventKind::StateEntered] {
            rig.bus
                .subscribe(kind, Listener::System(SystemListener::Markers));
        }
        round.tick(SIM_DT, &fire(), &mut rig.ctx());
        let mut lifecycle = Vec::new();
        rig.bus.drain(|_, event, _| {
            lifecycle.push(event.clone());
            Ok(())
        });
        assert_eq!(
            lifecycle,
            vec![
                GameEvent::StateExited(RoundPhase::Aiming),
                GameEvent::StateEntered(RoundPhase::Bouncing),
            ]
        );
    }

    #[test]
    fn test_begin_merge_keeps_inputs_until_finish() {
        let mut rig = Rig::new();
        let mut round = RoundStateMachine::new(&Tuning::default());
        let a = round
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 20.0, &mut rig.presentation, &mut rig.bus)
            .unwrap();
        let b = round
            .spawn_entity(BonkableKind::cabbage(), Vec2::new(5.0, 0.0), 20.0, &mut rig.presentation, &mut rig.bus)
            .unwrap();

        let plans = crate::sim::merge::MergeResolver::new().plan(&mut round.entities);
        let result = round
            .begin_merge(&plans[0], &mut rig.presentation, &mut rig.bus)
            .unwrap();
        // Inputs still exist but no longer count
        assert!(round.entities().get(a).is_some());
        assert!(round.entities().get(b).is_some());
        assert_eq!(round.round_score(), 40.0);
        assert_eq!(round.entities().active_count(), 1);

        round.finish_merge(&plans[0], &mut rig.presentation);
        assert!(round.entities().get(a).is_none());
        assert_eq!(round.entities().get(result).unwrap().tier, 1);
        assert_eq!(round.summary().merges, 1);
        assert_eq!(rig.presentation.live_entities.len(), 1);
    }
}
