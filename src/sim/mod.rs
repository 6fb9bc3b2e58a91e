//! Deterministic round simulation
//!
//! All gameplay rules live here. This module must stay deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity handle / item id)
//! - Rendering, audio and physics are reached only through `services`

pub mod bonkable;
pub mod events;
pub mod game;
pub mod markers;
pub mod merge;
pub mod round;
pub mod scheduler;
pub mod services;

pub use bonkable::{
    BallHandle, BonkOutcome, BonkParams, Bonkable, BonkableKind, CabbageVariant, EntityStore,
    EntityHandle,
};
pub use events::{
    Callback, EventBus, EventKind, GameEvent, Listener, ListenerError, SubscriptionId,
    SystemListener,
};
pub use game::{Game, TickInput};
pub use markers::MarkerBoard;
pub use merge::{MergePlan, MergeResolver};
pub use round::{RoundContext, RoundPhase, RoundStateMachine, RoundSummary, compute_payout, compute_round_goal};
pub use scheduler::{Scheduler, TaskId, TimedAction};
pub use services::{
    FixedMap, Headless, LoggingRunLayer, MapProgress, MapProgressSource, Presentation,
    PresentationHandle, RunLayer, SoundCue, VisualCue,
};
