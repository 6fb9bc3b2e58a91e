//! Game facade and per-tick driver
//!
//! Owns the bus, the round state machine, the items and the player, and
//! routes bus deliveries to them. One `tick` advances everything by a fixed
//! step in a fixed order:
//!
//! 1. Item frame reset (cooldowns, per-frame trigger flags and caps)
//! 2. Round state machine (timed steps, fire input, phase transitions)
//! 3. Bonks reported by the physics layer
//! 4. Merge resolution
//!
//! Every step ends with `settle`, which drains the bus, applies deferred
//! effect commands and republishes the score until nothing is pending.

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::bonkable::{BallHandle, BonkParams, Bonkable, BonkableKind, EntityHandle, EntityStore};
use super::events::{
    EventBus, EventKind, GameEvent, Listener, ListenerError, SubscriptionId, SystemListener,
};
use super::markers::MarkerBoard;
use super::merge::MergeResolver;
use super::round::{RoundContext, RoundPhase, RoundStateMachine, RoundSummary};
use super::services::{
    FixedMap, Headless, LoggingRunLayer, MapProgressSource, Presentation, RunLayer, SoundCue,
    VisualCue,
};
use crate::consts::MAX_SETTLE_PASSES;
use crate::items::{
    DropOutcome, DropTarget, EffectCommand, ItemCatalog, ItemEnv, ItemError, ItemId, ItemManager,
    PlayerState, SlotId,
};
use crate::tuning::{ConfigError, Tuning};

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Pointer position in world space, aims the next shot
    pub pointer_world: Vec2,
    /// Fire input edge (click/tap/space)
    pub fire: bool,
    /// Impacts reported by the physics layer this tick
    pub bonks: Vec<BonkParams>,
}

pub struct Game<P: Presentation = Headless> {
    tuning: Tuning,
    bus: EventBus,
    round: RoundStateMachine,
    items: ItemManager,
    player: PlayerState,
    markers: MarkerBoard,
    merge: MergeResolver,
    rng: Pcg32,
    /// Deferred effect work, applied by `settle`
    commands: Vec<EffectCommand>,
    presentation: P,
    map: Box<dyn MapProgressSource>,
    run_layer: Box<dyn RunLayer>,
    time_ticks: u64,
}

impl Game<Headless> {
    /// Game with no presentation, a fixed first-layer map and a logging run layer
    pub fn headless(tuning: Tuning, catalog: ItemCatalog, seed: u64) -> Result<Self, ConfigError> {
        Self::new(
            tuning,
            catalog,
            seed,
            Headless::new(),
            Box::new(FixedMap::default()),
            Box::new(LoggingRunLayer::default()),
        )
    }
}

impl<P: Presentation> Game<P> {
    pub fn new(
        tuning: Tuning,
        catalog: ItemCatalog,
        seed: u64,
        presentation: P,
        map: Box<dyn MapProgressSource>,
        run_layer: Box<dyn RunLayer>,
    ) -> Result<Self, ConfigError> {
        tuning.validate()?;
        catalog.validate()?;

        let mut bus = EventBus::new(tuning.items.max_events_per_drain);
        for kind in [EventKind::Merged, EventKind::EntityPopped, EventKind::EntityKilled] {
            bus.subscribe(kind, Listener::System(SystemListener::Markers));
        }
        bus.subscribe(
            EventKind::StateExited,
            Listener::System(SystemListener::FireStatus),
        );

        Ok(Self {
            round: RoundStateMachine::new(&tuning),
            items: ItemManager::new(catalog, &tuning.items),
            tuning,
            bus,
            player: PlayerState::default(),
            markers: MarkerBoard::new(),
            merge: MergeResolver::new(),
            rng: Pcg32::seed_from_u64(seed),
            commands: Vec::new(),
            presentation,
            map,
            run_layer,
            time_ticks: 0,
        })
    }

    // === Queries ===

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn phase(&self) -> RoundPhase {
        self.round.phase()
    }

    /// Sum of value over the active entities
    pub fn round_score(&self) -> f64 {
        self.round.round_score()
    }

    pub fn round_goal(&self) -> f64 {
        self.round.round_goal()
    }

    pub fn active_entities(&self) -> Vec<&Bonkable> {
        self.round.active_entities()
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<&Bonkable> {
        self.round.entities().live(handle)
    }

    pub fn active_balls(&self) -> &[BallHandle] {
        self.round.active_balls()
    }

    pub fn balls_remaining(&self) -> u32 {
        self.round.balls_remaining()
    }

    pub fn is_round_complete(&self) -> bool {
        self.round.is_completed()
    }

    pub fn summary(&self) -> RoundSummary {
        self.round.summary()
    }

    pub fn items(&self) -> &ItemManager {
        &self.items
    }

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut PlayerState {
        &mut self.player
    }

    pub fn markers(&self) -> &MarkerBoard {
        &self.markers
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }

    pub fn time_ticks(&self) -> u64 {
        self.time_ticks
    }

    // === Round lifecycle ===

    /// Begin a new round (enters Populate)
    pub fn start_round(&mut self) {
        self.markers.clear_all();
        let Game {
            round,
            bus,
            presentation,
            items,
            player,
            map,
            run_layer,
            rng,
            ..
        } = self;
        let mut ctx = RoundContext {
            bus,
            presentation,
            items,
            player,
            map: &**map,
            run_layer: &mut **run_layer,
            rng,
        };
        round.start(&mut ctx);
        self.settle();
    }

    /// Cancel pending timed steps and despawn balls in flight
    pub fn abort_round(&mut self) {
        self.round.abort(&mut self.presentation);
    }

    /// Advance the game by one fixed timestep
    pub fn tick(&mut self, input: &TickInput, dt: f32) {
        self.time_ticks += 1;
        self.items.begin_frame(dt);

        {
            let Game {
                round,
                bus,
                presentation,
                items,
                player,
                map,
                run_layer,
                rng,
                ..
            } = self;
            let mut ctx = RoundContext {
                bus,
                presentation,
                items,
                player,
                map: &**map,
                run_layer: &mut **run_layer,
                rng,
            };
            round.tick(dt, input, &mut ctx);
        }
        self.settle();

        for params in &input.bonks {
            self.resolve_bonk(*params);
        }
        self.settle();

        if self.round.phase() != RoundPhase::Scoring {
            self.resolve_merges();
        }
    }

    // === Physics-facing calls ===

    /// Deliver an impact outside of `tick`; false if the target is stale
    pub fn bonk(&mut self, params: BonkParams) -> bool {
        let hit = self.resolve_bonk(params);
        self.settle();
        hit
    }

    /// Remove an entity on request
    pub fn kill(&mut self, handle: EntityHandle) -> bool {
        let killed = self
            .round
            .kill_entity(handle, &mut self.presentation, &mut self.bus);
        self.settle();
        killed
    }

    pub fn notify_ball_enabled(&mut self, ball: BallHandle) {
        if !self.round.register_ball(ball) {
            log::debug!("Duplicate enable for {:?}", ball);
        }
    }

    pub fn notify_ball_disabled(&mut self, ball: BallHandle) {
        if !self.round.unregister_ball(ball) {
            log::debug!("Disable for unknown {:?}", ball);
        }
    }

    /// Spawn an entity outside Populate (tests, scripted encounters)
    pub fn spawn_entity(
        &mut self,
        kind: BonkableKind,
        position: Vec2,
        value: f64,
    ) -> Option<EntityHandle> {
        let handle =
            self.round
                .spawn_entity(kind, position, value, &mut self.presentation, &mut self.bus);
        self.settle();
        handle
    }

    /// Physics layer reports where an entity moved
    pub fn set_entity_position(&mut self, handle: EntityHandle, position: Vec2) -> bool {
        match self.round.entities.live_mut(handle) {
            Some(entity) => {
                entity.position = position;
                true
            }
            None => false,
        }
    }

    // === Event subscriptions ===

    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&GameEvent) -> Result<(), ListenerError> + 'static,
    {
        self.bus
            .subscribe(kind, Listener::Callback(std::rc::Rc::new(callback)))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // === Items ===

    pub fn give_item(&mut self, name: &str) -> Result<Option<ItemId>, ItemError> {
        let given = self.items.give_item(name, &mut self.bus, &mut self.player);
        self.settle();
        given
    }

    pub fn stock_shop(&mut self, names: &[&str]) -> Result<Vec<ItemId>, ItemError> {
        let stocked = self.items.stock_shop(names, &mut self.bus, &mut self.player);
        self.settle();
        stocked
    }

    pub fn remove_item(&mut self, item: ItemId) -> bool {
        let removed = self
            .items
            .remove_item(item, &mut self.bus, &mut self.player)
            .is_some();
        self.settle();
        removed
    }

    pub fn begin_drag(&mut self, item: ItemId) -> Result<(), ItemError> {
        self.items.begin_drag(item)
    }

    pub fn release_drag(&mut self, target: DropTarget) -> DropOutcome {
        let outcome = self.with_item_env(|items, env| items.release_drag(target, env));
        self.settle();
        outcome
    }

    pub fn set_slot_frozen(&mut self, slot: SlotId, frozen: bool) -> Result<(), ItemError> {
        self.items.set_slot_frozen(slot, frozen)
    }

    pub fn set_holofoil(&mut self, item: ItemId, holofoil: bool) -> Result<(), ItemError> {
        self.items.set_holofoil(item, holofoil, &mut self.player)
    }

    pub fn set_sell_disabled(&mut self, disabled: bool) {
        self.items.sell_disabled = disabled;
    }

    pub fn force_trigger(&mut self, item: ItemId) -> Result<bool, ItemError> {
        let fired = self.with_item_env(|items, env| items.force_trigger(item, env));
        self.settle();
        fired
    }

    fn with_item_env<R>(&mut self, f: impl FnOnce(&mut ItemManager, &mut ItemEnv<'_>) -> R) -> R {
        let Game {
            items,
            bus,
            player,
            round,
            markers,
            rng,
            commands,
            ..
        } = self;
        let mut env = ItemEnv {
            bus,
            player,
            entities: &mut round.entities,
            markers,
            rng,
            commands,
        };
        f(items, &mut env)
    }

    // === Internals ===

    /// Drain the bus, routing each delivery to its listener
    fn drain(&mut self) -> usize {
        let fire_value = self.tuning.fire.value_per_stack;
        let Game {
            bus,
            items,
            round,
            markers,
            player,
            rng,
            commands,
            presentation,
            ..
        } = self;

        bus.drain(|listener, event, bus| match listener {
            Listener::Trigger { item, index } => {
                let mut env = ItemEnv {
                    bus,
                    player: &mut *player,
                    entities: &mut round.entities,
                    markers: &mut *markers,
                    rng: &mut *rng,
                    commands: &mut *commands,
                };
                items.notify_trigger(*item, *index, event, &mut env)
            }
            Listener::System(SystemListener::Markers) => {
                markers.observe(event);
                Ok(())
            }
            Listener::System(SystemListener::FireStatus) => {
                if *event == GameEvent::StateExited(RoundPhase::Bouncing) {
                    burn(&mut round.entities, fire_value, &mut *presentation);
                }
                Ok(())
            }
            Listener::Callback(callback) => callback(event),
        })
    }

    /// Drain, apply deferred commands and refresh the score until quiet
    fn settle(&mut self) {
        for _ in 0..MAX_SETTLE_PASSES {
            self.drain();
            let republished = self.round.refresh_score(&mut self.bus);
            if self.commands.is_empty() && !republished && self.bus.pending_len() == 0 {
                return;
            }
            for command in std::mem::take(&mut self.commands) {
                self.apply(command);
            }
        }
        log::warn!(
            "Settle gave up after {} passes ({} commands, {} events left)",
            MAX_SETTLE_PASSES,
            self.commands.len(),
            self.bus.pending_len()
        );
        self.commands.clear();
    }

    fn apply(&mut self, command: EffectCommand) {
        match command {
            EffectCommand::Bonk(params) => {
                self.resolve_bonk(params);
            }
            EffectCommand::GrantBalls(count) => {
                self.round.grant_balls(count);
                log::debug!("Granted {} balls", count);
            }
            EffectCommand::BypassCooldowns { except } => self.items.bypass_cooldowns(except),
            EffectCommand::Expire(item) => {
                log::info!("Temporary item {:?} used up", item);
                self.items.remove_item(item, &mut self.bus, &mut self.player);
            }
        }
    }

    /// Apply an impact, let listeners react while the target still exists,
    /// then remove it if it died.
    fn resolve_bonk(&mut self, params: BonkParams) -> bool {
        let bonus = self.player.bonk_power_bonus;
        let value_per_power = self.tuning.bonk.value_per_power;
        let Some(entity) = self.round.entities.live_mut(params.target) else {
            log::debug!("Bonk on stale {:?}", params.target);
            return false;
        };
        let outcome = entity.bonk(params.power, bonus, value_per_power);

        self.presentation
            .play_sound(SoundCue::Bonk, Some(params.position), None);
        self.bus.publish(GameEvent::Bonked(params));
        self.drain();

        if outcome.killed {
            self.round
                .kill_entity(params.target, &mut self.presentation, &mut self.bus);
        }
        true
    }

    /// Plan this tick's merges and carry them out
    fn resolve_merges(&mut self) {
        let plans = self.merge.plan(&mut self.round.entities);
        for plan in &plans {
            match self
                .round
                .begin_merge(plan, &mut self.presentation, &mut self.bus)
            {
                Some(_) => {
                    // Listeners see Merged while both inputs still exist
                    self.drain();
                    self.round.finish_merge(plan, &mut self.presentation);
                }
                None => MergeResolver::abort(plan, &mut self.round.entities),
            }
        }
        self.settle();
    }
}

/// End of a shot: burning entities gain value and lose a stack
fn burn(entities: &mut EntityStore, value_per_stack: f64, presentation: &mut dyn Presentation) {
    for entity in entities.active_mut() {
        if entity.fire_stacks == 0 {
            continue;
        }
        entity.value += f64::from(entity.fire_stacks) * value_per_stack;
        entity.fire_stacks -= 1;
        presentation.spawn_visual_effect(VisualCue::Fire, entity.position, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::items::{EffectKind, EffectSpec, ItemTemplate, TargetFilter, TriggerKind};
    use crate::sim::round::compute_payout;
    use crate::sim::services::MapProgress;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn on_bonk() -> TriggerKind {
        TriggerKind::OnBonk {
            target: TargetFilter::Any,
            every: 0,
            balls_only: false,
        }
    }

    fn quiet_tuning() -> Tuning {
        let mut tuning = Tuning::default();
        tuning.round.entities_per_round = 0;
        tuning.round.spawn_stagger = 0.0;
        tuning
    }

    fn game_with(tuning: Tuning, templates: Vec<ItemTemplate>) -> Game {
        let catalog = ItemCatalog::from_templates(templates).unwrap();
        Game::headless(tuning, catalog, 42).unwrap()
    }

    fn fire() -> TickInput {
        TickInput {
            fire: true,
            pointer_world: Vec2::new(0.0, 100.0),
            ..Default::default()
        }
    }

    fn idle(game: &mut Game) {
        game.tick(&TickInput::default(), SIM_DT);
    }

    /// Fire, then report the ball gone
    fn shoot(game: &mut Game) {
        game.tick(&fire(), SIM_DT);
        let balls: Vec<BallHandle> = game.active_balls().to_vec();
        for ball in balls {
            game.notify_ball_disabled(ball);
        }
        idle(game);
    }

    #[test]
    fn test_spark_fires_at_compounded_rate() {
        let spark = ItemTemplate::new("Spark")
            .with_chance(0.5)
            .with_cooldown(2.0)
            .with_trigger(on_bonk())
            .with_effect_spec(EffectSpec::new(EffectKind::AddValue { amount: 1.0 }).with_chance(0.5));
        let mut game = game_with(quiet_tuning(), vec![spark]);
        let item = game.give_item("Spark").unwrap().unwrap();
        let target = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 0.0)
            .unwrap();

        for _ in 0..1000 {
            game.tick(&TickInput::default(), 2.5);
            assert!(game.bonk(BonkParams::new(target, 0.0)));
        }

        let item_fires = game.items().item(item).unwrap().times_triggered_total();
        let effect_fires = game.entity(target).unwrap().value;
        assert!((430..=570).contains(&item_fires), "item fired {item_fires} times");
        assert!(
            (195.0..=305.0).contains(&effect_fires),
            "effect fired {effect_fires} times"
        );
    }

    #[test]
    fn test_merge_scenario_and_ball_exhaustion() {
        let mut tuning = quiet_tuning();
        tuning.round.balls_per_round = 2;
        let catalog = ItemCatalog::new();
        let map = FixedMap(MapProgress {
            first_goal: 100.0,
            ..MapProgress::default()
        });
        let mut game = Game::new(
            tuning,
            catalog,
            1,
            Headless::new(),
            Box::new(map),
            Box::new(LoggingRunLayer::default()),
        )
        .unwrap();
        game.start_round();
        assert_eq!(game.round_goal(), 100.0);

        let cabbage = BonkableKind::cabbage();
        let e1 = game.spawn_entity(cabbage, Vec2::new(0.0, 0.0), 20.0).unwrap();
        let e2 = game.spawn_entity(cabbage, Vec2::new(10.0, 0.0), 20.0).unwrap();
        game.spawn_entity(cabbage, Vec2::new(200.0, 0.0), 20.0).unwrap();
        game.spawn_entity(cabbage, Vec2::new(400.0, 0.0), 20.0).unwrap();
        assert_eq!(game.round_score(), 80.0);

        idle(&mut game);
        assert_eq!(game.phase(), RoundPhase::Aiming);
        let active = game.active_entities();
        assert_eq!(active.len(), 3);
        assert!(game.entity(e1).is_none() && game.entity(e2).is_none());
        let merged = active.iter().find(|e| e.tier == 1).unwrap();
        assert_eq!(merged.position, Vec2::new(5.0, 0.0));
        assert_eq!(merged.value, 40.0);
        let sum: f64 = active.iter().map(|e| e.value).sum();
        assert_eq!(game.round_score(), sum);

        shoot(&mut game);
        assert_eq!(game.phase(), RoundPhase::Aiming);
        shoot(&mut game);
        assert_eq!(game.phase(), RoundPhase::Scoring);
        assert!(!game.summary().goal_reached);
    }

    #[test]
    fn test_full_round_completes_and_pays() {
        let mut tuning = Tuning::default();
        tuning.round.enemy_chance = 0.0;
        let mut game = game_with(tuning, Vec::new());
        game.start_round();

        let events = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&events);
        game.subscribe(EventKind::RoundCompleted, move |_| {
            *seen.borrow_mut() += 1;
            Ok(())
        });
        let popped = Rc::new(RefCell::new(0.0));
        let total = Rc::clone(&popped);
        game.subscribe(EventKind::EntityPopped, move |event| {
            if let GameEvent::EntityPopped { value, .. } = event {
                *total.borrow_mut() += *value;
            }
            Ok(())
        });

        for _ in 0..60 {
            idle(&mut game);
        }
        for _ in 0..3 {
            shoot(&mut game);
        }
        for _ in 0..240 {
            idle(&mut game);
        }
        assert!(game.is_round_complete());
        assert_eq!(*events.borrow(), 1);
        assert!(game.active_entities().is_empty());
        let popped = *popped.borrow();
        let summary = game.summary();
        assert_eq!(summary.final_score, popped);
        let expected = compute_payout(popped, summary.goal, game.tuning().round.payout_scaling);
        assert!(expected > 0);
        assert_eq!(game.player().currency(), expected);
    }

    /// One cabbage worth 10, a single ball that bonks it once, then the
    /// whole Scoring phase. Returns the values popped and the currency paid.
    fn score_single_shot(game: &mut Game) -> (Vec<f64>, i64) {
        let popped = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&popped);
        game.subscribe(EventKind::EntityPopped, move |event| {
            if let GameEvent::EntityPopped { value, .. } = event {
                seen.borrow_mut().push(*value);
            }
            Ok(())
        });

        game.start_round();
        let target = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 10.0)
            .unwrap();
        idle(game);
        let before = game.player().currency();

        game.tick(&fire(), SIM_DT);
        game.bonk(BonkParams::new(target, 0.0));
        let balls: Vec<BallHandle> = game.active_balls().to_vec();
        for ball in balls {
            game.notify_ball_disabled(ball);
        }
        for _ in 0..240 {
            idle(game);
        }
        assert!(game.is_round_complete());
        let values = popped.borrow().clone();
        (values, game.player().currency() - before)
    }

    #[test]
    fn test_payout_counts_burn_from_the_last_shot() {
        let mut tuning = quiet_tuning();
        tuning.round.balls_per_round = 1;
        let torch = ItemTemplate::new("Torch")
            .with_trigger(on_bonk())
            .with_effect(EffectKind::SetOnFire { stacks: 5 });
        let mut game = game_with(tuning.clone(), vec![torch]);
        game.give_item("Torch").unwrap();

        let (popped, paid) = score_single_shot(&mut game);
        assert_eq!(popped.len(), 1);
        assert!(popped[0] > 10.0, "burn on the last shot was lost: {popped:?}");

        let summary = game.summary();
        assert_eq!(summary.final_score, popped[0]);
        let expected = compute_payout(popped[0], summary.goal, tuning.round.payout_scaling);
        assert_eq!(summary.currency_awarded, expected);
        assert_eq!(paid, expected);
    }

    #[test]
    fn test_payout_counts_value_added_on_entering_scoring() {
        let mut tuning = quiet_tuning();
        tuning.round.balls_per_round = 1;
        let finale = ItemTemplate::new("Finale")
            .with_trigger(TriggerKind::OnStateEntered {
                state: RoundPhase::Scoring,
            })
            .with_effect(EffectKind::AddValue { amount: 100.0 });
        let mut game = game_with(tuning, vec![finale]);
        game.give_item("Finale").unwrap();

        let (popped, paid) = score_single_shot(&mut game);
        assert_eq!(popped, vec![110.0]);
        let summary = game.summary();
        assert_eq!(summary.final_score, 110.0);
        assert_eq!(summary.goal, 20.0);
        assert!(summary.goal_reached);
        // ceil(110 / 20) * 5
        assert_eq!(summary.currency_awarded, 30);
        assert_eq!(paid, 30);
    }

    #[test]
    fn test_markers_follow_merges() {
        let marker = ItemTemplate::new("Tagger")
            .with_trigger(on_bonk())
            .with_effect(EffectKind::MarkEntity);
        let mut game = game_with(quiet_tuning(), vec![marker]);
        game.give_item("Tagger").unwrap();
        let a = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 1.0)
            .unwrap();
        let b = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::new(500.0, 0.0), 1.0)
            .unwrap();

        game.bonk(BonkParams::new(a, 1.0));
        assert!(game.markers().is_marked(a));

        game.set_entity_position(b, Vec2::new(5.0, 0.0));
        idle(&mut game);
        let result = game.active_entities()[0].handle;
        assert_eq!(game.active_entities().len(), 1);
        assert!(game.markers().is_marked(result));
        assert!(!game.markers().is_marked(a));
    }

    #[test]
    fn test_fire_burns_when_a_shot_ends() {
        let torch = ItemTemplate::new("Torch")
            .with_trigger(on_bonk())
            .with_effect(EffectKind::SetOnFire { stacks: 2 });
        let mut game = game_with(quiet_tuning(), vec![torch]);
        game.give_item("Torch").unwrap();
        game.start_round();
        let target = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 10.0)
            .unwrap();
        idle(&mut game);

        game.tick(&fire(), SIM_DT);
        game.bonk(BonkParams::new(target, 0.0));
        assert_eq!(game.entity(target).unwrap().fire_stacks, 2);

        let balls: Vec<BallHandle> = game.active_balls().to_vec();
        for ball in balls {
            game.notify_ball_disabled(ball);
        }
        idle(&mut game);
        let entity = game.entity(target).unwrap();
        assert_eq!(entity.value, 12.0);
        assert_eq!(entity.fire_stacks, 1);
    }

    #[test]
    fn test_enemy_dies_after_listeners_saw_the_bonk() {
        let hunter = ItemTemplate::new("Hunter")
            .with_trigger(TriggerKind::OnBonk {
                target: TargetFilter::Enemy,
                every: 0,
                balls_only: false,
            })
            .with_effect(EffectKind::GainCurrency { amount: 3 });
        let mut game = game_with(quiet_tuning(), vec![hunter]);
        game.give_item("Hunter").unwrap();
        let enemy = game
            .spawn_entity(BonkableKind::Enemy { health: 2.0 }, Vec2::ZERO, 0.0)
            .unwrap();

        let killed = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&killed);
        game.subscribe(EventKind::EntityKilled, move |event| {
            log.borrow_mut().push(event.clone());
            Ok(())
        });

        assert!(game.bonk(BonkParams::new(enemy, 5.0)));
        assert_eq!(game.player().currency(), 3);
        assert!(game.entity(enemy).is_none());
        assert_eq!(
            *killed.borrow(),
            vec![GameEvent::EntityKilled { entity: enemy }]
        );
        assert!(!game.bonk(BonkParams::new(enemy, 5.0)));
    }

    #[test]
    fn test_item_chain_fires_each_item_once_per_tick() {
        let templates = vec![
            ItemTemplate::new("Source")
                .with_trigger(on_bonk())
                .with_effect(EffectKind::AddValue { amount: 1.0 }),
            ItemTemplate::new("Echo")
                .with_trigger(TriggerKind::OnItemTriggered {
                    weapons_only: false,
                })
                .with_effect(EffectKind::AddValue { amount: 1.0 }),
            ItemTemplate::new("Reverb")
                .with_trigger(TriggerKind::OnItemTriggered {
                    weapons_only: false,
                })
                .with_effect(EffectKind::AddValue { amount: 1.0 }),
        ];
        let mut game = game_with(quiet_tuning(), templates);
        let ids: Vec<ItemId> = ["Source", "Echo", "Reverb"]
            .iter()
            .map(|name| game.give_item(name).unwrap().unwrap())
            .collect();
        let target = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 0.0)
            .unwrap();

        game.bonk(BonkParams::new(target, 0.0));
        for id in &ids {
            assert_eq!(game.items().item(*id).unwrap().times_triggered_total(), 1);
        }
        assert_eq!(game.entity(target).unwrap().value, 3.0);
    }

    #[test]
    fn test_bonk_random_chains_into_other_items() {
        let templates = vec![
            ItemTemplate::new("Cannon")
                .with_trigger(TriggerKind::OnBallFired)
                .with_effect(EffectKind::BonkRandom { power: 2.0 }),
            ItemTemplate::new("Sprout")
                .with_trigger(on_bonk())
                .with_effect(EffectKind::ExtraBall { count: 1 }),
        ];
        let mut game = game_with(quiet_tuning(), templates);
        game.give_item("Cannon").unwrap();
        game.give_item("Sprout").unwrap();
        game.start_round();
        let target = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 0.0)
            .unwrap();
        idle(&mut game);
        assert_eq!(game.balls_remaining(), 3);

        game.tick(&fire(), SIM_DT);
        assert_eq!(game.entity(target).unwrap().value, 2.0);
        // One ball spent, one granted back
        assert_eq!(game.balls_remaining(), 3);
    }

    #[test]
    fn test_temporary_item_expires() {
        let template = ItemTemplate::new("Fuse")
            .temporary(2)
            .with_trigger(on_bonk())
            .with_effect(EffectKind::AddValue { amount: 1.0 });
        let mut game = game_with(quiet_tuning(), vec![template]);
        let fuse = game.give_item("Fuse").unwrap().unwrap();
        let target = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 0.0)
            .unwrap();

        game.bonk(BonkParams::new(target, 0.0));
        idle(&mut game);
        assert_eq!(game.items().item(fuse).unwrap().uses_left(), Some(1));
        game.bonk(BonkParams::new(target, 0.0));
        assert!(game.items().item(fuse).is_none());
        assert_eq!(game.entity(target).unwrap().value, 2.0);
    }

    #[test]
    fn test_per_shot_limit_resets_on_aim() {
        let template = ItemTemplate::new("Once")
            .with_per_shot_limit(1)
            .with_trigger(on_bonk())
            .with_effect(EffectKind::AddValue { amount: 1.0 });
        let mut game = game_with(quiet_tuning(), vec![template]);
        let once = game.give_item("Once").unwrap().unwrap();
        game.start_round();
        let target = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 0.0)
            .unwrap();
        idle(&mut game);

        game.tick(&fire(), SIM_DT);
        for _ in 0..3 {
            game.bonk(BonkParams::new(target, 0.0));
            idle(&mut game);
        }
        assert_eq!(game.items().item(once).unwrap().times_triggered_this_shot(), 1);

        let balls: Vec<BallHandle> = game.active_balls().to_vec();
        for ball in balls {
            game.notify_ball_disabled(ball);
        }
        idle(&mut game);
        assert_eq!(game.phase(), RoundPhase::Aiming);
        assert_eq!(game.items().item(once).unwrap().times_triggered_this_shot(), 0);
    }

    #[test]
    fn test_passive_bonus_feeds_bonks() {
        let template = ItemTemplate::new("Gloves").with_effect(EffectKind::BonkPower { amount: 2.0 });
        let mut game = game_with(quiet_tuning(), vec![template]);
        let gloves = game.give_item("Gloves").unwrap().unwrap();
        let target = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 0.0)
            .unwrap();

        game.bonk(BonkParams::new(target, 1.0));
        assert_eq!(game.entity(target).unwrap().value, 3.0);

        game.remove_item(gloves);
        game.bonk(BonkParams::new(target, 1.0));
        assert_eq!(game.entity(target).unwrap().value, 4.0);
    }

    #[test]
    fn test_goal_reached_is_published_once() {
        let mut game = game_with(quiet_tuning(), Vec::new());
        game.start_round();
        let reached = Rc::new(RefCell::new(0));
        let count = Rc::clone(&reached);
        game.subscribe(EventKind::RoundGoalReached, move |_| {
            *count.borrow_mut() += 1;
            Ok(())
        });

        let target = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 0.0)
            .unwrap();
        game.bonk(BonkParams::new(target, 25.0));
        game.bonk(BonkParams::new(target, 25.0));
        assert_eq!(*reached.borrow(), 1);
        // Reaching the goal does not end the round
        assert_ne!(game.phase(), RoundPhase::Scoring);
    }

    #[test]
    fn test_failing_callback_does_not_stall_the_game() {
        let mut game = game_with(quiet_tuning(), Vec::new());
        game.subscribe(EventKind::Bonked, |_| Err(ListenerError::Failed("ui gone".into())));
        let scores = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&scores);
        game.subscribe(EventKind::RoundScoreUpdated, move |event| {
            if let GameEvent::RoundScoreUpdated { score } = event {
                log.borrow_mut().push(*score);
            }
            Ok(())
        });

        let target = game
            .spawn_entity(BonkableKind::cabbage(), Vec2::ZERO, 1.0)
            .unwrap();
        game.bonk(BonkParams::new(target, 2.0));
        assert_eq!(*scores.borrow(), vec![1.0, 3.0]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_round_score_matches_active_entities(
            seed in any::<u64>(),
            bonk_every in 1usize..7,
            power in 0.0f64..5.0,
        ) {
            let catalog = ItemCatalog::from_templates([
                ItemTemplate::new("Spark")
                    .with_chance(0.5)
                    .with_trigger(on_bonk())
                    .with_effect(EffectKind::MultiplyValue { factor: 1.5 }),
            ])
            .unwrap();
            let mut game = Game::headless(Tuning::default(), catalog, seed).unwrap();
            game.give_item("Spark").unwrap();
            game.start_round();

            for step in 0..900usize {
                let mut input = TickInput {
                    fire: step % 120 == 60,
                    ..Default::default()
                };
                if step % bonk_every == 0 {
                    let handles: Vec<EntityHandle> =
                        game.active_entities().iter().map(|e| e.handle).collect();
                    if let Some(&target) = handles.get(step % handles.len().max(1)) {
                        input.bonks.push(BonkParams::new(target, power));
                    }
                }
                if step % 120 == 100 {
                    let balls: Vec<BallHandle> = game.active_balls().to_vec();
                    for ball in balls {
                        game.notify_ball_disabled(ball);
                    }
                }
                game.tick(&input, SIM_DT);

                let sum: f64 = game.active_entities().iter().map(|e| e.value).sum();
                prop_assert_eq!(game.round_score(), sum);
            }
        }
    }
}
