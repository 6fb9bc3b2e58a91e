//! Cabbage Bonk headless driver
//!
//! Plays one seeded round against a scripted stand-in for the physics layer
//! and logs what the rules engine does.
//!
//! Usage: `cabbage-bonk [seed] [tuning.json]`

#[cfg(not(target_arch = "wasm32"))]
use std::collections::BTreeMap;

#[cfg(not(target_arch = "wasm32"))]
use cabbage_bonk::consts::SIM_DT;
#[cfg(not(target_arch = "wasm32"))]
use cabbage_bonk::items::DropTarget;
#[cfg(not(target_arch = "wasm32"))]
use cabbage_bonk::sim::{BallHandle, BonkParams, EventKind, GameEvent};
#[cfg(not(target_arch = "wasm32"))]
use cabbage_bonk::{Game, ItemCatalog, RoundPhase, SlotId, TickInput, Tuning};
#[cfg(not(target_arch = "wasm32"))]
use rand::{Rng, SeedableRng};
#[cfg(not(target_arch = "wasm32"))]
use rand_pcg::Pcg32;

#[cfg(not(target_arch = "wasm32"))]
const ITEMS_JSON: &str = include_str!("../assets/items.json");

/// Give up on a round that has not finished after this many ticks
#[cfg(not(target_arch = "wasm32"))]
const MAX_TICKS: u64 = 60 * 120;

/// Bounces each scripted ball makes before leaving play
#[cfg(not(target_arch = "wasm32"))]
const BOUNCES_PER_BALL: u32 = 5;

/// Ticks between scripted bounces
#[cfg(not(target_arch = "wasm32"))]
const TICKS_PER_BOUNCE: u32 = 20;

/// Stand-in for the physics layer: every ball bounces a few times off
/// random entities, then drains.
#[cfg(not(target_arch = "wasm32"))]
struct ScriptedPhysics {
    rng: Pcg32,
    /// Bounces left and ticks until the next one, per ball in flight
    flights: BTreeMap<BallHandle, (u32, u32)>,
}

#[cfg(not(target_arch = "wasm32"))]
impl ScriptedPhysics {
    fn new(seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed ^ 0x5eed),
            flights: BTreeMap::new(),
        }
    }

    /// Advance every flight; returns this tick's impacts
    fn step(&mut self, game: &mut Game) -> Vec<BonkParams> {
        for &ball in game.active_balls() {
            self.flights
                .entry(ball)
                .or_insert((BOUNCES_PER_BALL, TICKS_PER_BOUNCE));
        }

        let targets: Vec<_> = game
            .active_entities()
            .iter()
            .map(|e| (e.handle, e.position))
            .collect();
        let mut bonks = Vec::new();
        let mut landed = Vec::new();

        for (&ball, (bounces, wait)) in self.flights.iter_mut() {
            *wait = wait.saturating_sub(1);
            if *wait > 0 {
                continue;
            }
            *wait = TICKS_PER_BOUNCE;
            if *bounces == 0 || targets.is_empty() {
                landed.push(ball);
                continue;
            }
            *bounces -= 1;
            let (target, position) = targets[self.rng.random_range(0..targets.len())];
            let power = self.rng.random_range(1.0..3.0);
            bonks.push(BonkParams::from_ball(target, ball, power, position));
        }

        for ball in landed {
            self.flights.remove(&ball);
            game.notify_ball_disabled(ball);
        }
        bonks
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn run(seed: u64, tuning: Tuning) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = ItemCatalog::from_json(ITEMS_JSON)?;
    let mut game = Game::headless(tuning, catalog, seed)?;
    let mut physics = ScriptedPhysics::new(seed);

    game.subscribe(EventKind::ItemTriggered, |event| {
        if let GameEvent::ItemTriggered { item } = event {
            log::debug!("{:?} triggered", item);
        }
        Ok(())
    });
    game.subscribe(EventKind::RoundGoalReached, |event| {
        if let GameEvent::RoundGoalReached { score, goal } = event {
            println!("Goal reached: {score:.1} / {goal:.1}");
        }
        Ok(())
    });

    // Starting loadout, then a shop visit
    for name in ["Spark", "Spark", "Torch", "Tagger", "Bounty Board", "Heavy Gloves"] {
        game.give_item(name)?;
    }
    game.player_mut().add_currency(10);
    let stocked = game.stock_shop(&["Slingshot", "Piggy Bank", "Hourglass"])?;
    if let Some(&slingshot) = stocked.first() {
        game.begin_drag(slingshot)?;
        let outcome = game.release_drag(DropTarget::Slot(SlotId(5)));
        log::info!("Bought Slingshot: {:?}", outcome);
    }

    // Drop one Spark onto the other to upgrade it
    let sparks: Vec<_> = game
        .items()
        .normal_items()
        .into_iter()
        .filter(|&id| game.items().item(id).is_some_and(|item| item.name() == "Spark"))
        .collect();
    if let [first, second] = sparks[..] {
        if let Some(target) = game.items().item(second).and_then(|item| item.slot()) {
            game.begin_drag(first)?;
            let outcome = game.release_drag(DropTarget::Slot(target));
            log::info!("Spark merge: {:?}", outcome);
        }
    }

    game.start_round();
    println!("Round goal: {:.1}", game.round_goal());

    let mut aim_rng = Pcg32::seed_from_u64(seed.wrapping_add(1));
    while !game.is_round_complete() && game.time_ticks() < MAX_TICKS {
        let mut input = TickInput::default();
        if game.phase() == RoundPhase::Aiming {
            input.fire = true;
            input.pointer_world = glam::Vec2::new(aim_rng.random_range(-200.0..200.0), 200.0);
        }
        if game.phase() == RoundPhase::Bouncing {
            input.bonks = physics.step(&mut game);
        }
        game.tick(&input, SIM_DT);
    }

    let summary = game.summary();
    if !game.is_round_complete() {
        log::warn!("Round did not finish within {} ticks", MAX_TICKS);
    }
    println!(
        "Score {:.1} / {:.1} ({}), {} merges, {} balls, +{} currency (wallet {})",
        summary.final_score,
        summary.goal,
        if summary.goal_reached { "cleared" } else { "missed" },
        summary.merges,
        summary.balls_fired,
        summary.currency_awarded,
        game.player().currency(),
    );
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Cabbage Bonk (headless) starting...");

    let mut args = std::env::args().skip(1);
    let seed = match args.next().map(|s| s.parse::<u64>()) {
        Some(Ok(seed)) => seed,
        Some(Err(err)) => {
            eprintln!("Invalid seed: {err}");
            std::process::exit(2);
        }
        None => 7,
    };
    let tuning = match args.next() {
        Some(path) => Tuning::load(&path),
        None => Ok(Tuning::default()),
    };
    let tuning = match tuning {
        Ok(tuning) => tuning,
        Err(err) => {
            eprintln!("Failed to load tuning: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(seed, tuning) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The engine is embedded by a host on the web; nothing to drive here
}
