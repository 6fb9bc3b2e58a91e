//! Item triggers
//!
//! A trigger is a predicate over gameplay events, bound to one item. It
//! subscribes on `attach` and unsubscribes on `detach`; the bus routes each
//! matching event back to `observe`, which decides whether the owning item
//! should attempt to fire. A trigger passes at most once per tick.

use serde::{Deserialize, Serialize};

use crate::items::ItemId;
use crate::sim::bonkable::{EntityHandle, EntityStore};
use crate::sim::events::{EventBus, EventKind, GameEvent, Listener, SubscriptionId};
use crate::sim::markers::MarkerBoard;
use crate::sim::round::RoundPhase;

/// Which bonked entities an on-bonk trigger accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFilter {
    #[default]
    Any,
    Cabbage,
    Enemy,
    /// Entities carrying at least one marker
    Marked,
}

impl TargetFilter {
    fn accepts(self, entity: EntityHandle, view: &TriggerView<'_>) -> bool {
        match self {
            TargetFilter::Any => true,
            TargetFilter::Cabbage => view
                .entities
                .get(entity)
                .is_some_and(|e| e.kind.is_cabbage()),
            TargetFilter::Enemy => view
                .entities
                .get(entity)
                .is_some_and(|e| e.kind.is_enemy()),
            TargetFilter::Marked => view.markers.is_marked(entity),
        }
    }
}

/// Trigger variants, as written in item templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    OnBonk {
        #[serde(default)]
        target: TargetFilter,
        /// Pass on every Nth accepted bonk; 0 and 1 both mean every bonk
        #[serde(default)]
        every: u32,
        /// Ignore bonks not caused by a ball
        #[serde(default)]
        balls_only: bool,
    },
    OnBallFired,
    OnMerge {
        #[serde(default)]
        min_tier: u32,
    },
    OnStateEntered {
        state: RoundPhase,
    },
    OnStateExited {
        state: RoundPhase,
    },
    /// Another item fired
    OnItemTriggered {
        #[serde(default)]
        weapons_only: bool,
    },
    OnSetOnFire,
    OnGoalReached,
}

impl TriggerKind {
    /// Event kind this trigger subscribes to
    pub fn interest(&self) -> EventKind {
        match self {
            TriggerKind::OnBonk { .. } => EventKind::Bonked,
            TriggerKind::OnBallFired => EventKind::BallFired,
            TriggerKind::OnMerge { .. } => EventKind::Merged,
            TriggerKind::OnStateEntered { .. } => EventKind::StateEntered,
            TriggerKind::OnStateExited { .. } => EventKind::StateExited,
            TriggerKind::OnItemTriggered { weapons_only: true } => EventKind::WeaponTriggered,
            TriggerKind::OnItemTriggered { weapons_only: false } => EventKind::ItemTriggered,
            TriggerKind::OnSetOnFire => EventKind::SetOnFire,
            TriggerKind::OnGoalReached => EventKind::RoundGoalReached,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TriggerKind::OnBonk {
                target,
                every,
                balls_only,
            } => {
                let what = match target {
                    TargetFilter::Any => "anything",
                    TargetFilter::Cabbage => "a cabbage",
                    TargetFilter::Enemy => "an enemy",
                    TargetFilter::Marked => "a marked target",
                };
                let by = if *balls_only { " with a ball" } else { "" };
                if *every > 1 {
                    format!("Every {every} times you bonk {what}{by}")
                } else {
                    format!("When you bonk {what}{by}")
                }
            }
            TriggerKind::OnBallFired => "When you fire a ball".into(),
            TriggerKind::OnMerge { min_tier } if *min_tier > 1 => {
                format!("When cabbages merge into tier {min_tier} or higher")
            }
            TriggerKind::OnMerge { .. } => "When cabbages merge".into(),
            TriggerKind::OnStateEntered { state } => format!("On entering {state:?}"),
            TriggerKind::OnStateExited { state } => format!("On leaving {state:?}"),
            TriggerKind::OnItemTriggered { weapons_only: true } => {
                "When a weapon triggers".into()
            }
            TriggerKind::OnItemTriggered { weapons_only: false } => {
                "When another item triggers".into()
            }
            TriggerKind::OnSetOnFire => "When something is set on fire".into(),
            TriggerKind::OnGoalReached => "When the round goal is reached".into(),
        }
    }
}

/// Read-only world state a trigger may consult
pub struct TriggerView<'a> {
    pub entities: &'a EntityStore,
    pub markers: &'a MarkerBoard,
}

/// Runtime trigger bound to one item
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    kind: TriggerKind,
    /// Accepted events so far, for every-Nth counting
    counter: u32,
    fired_this_frame: bool,
    subscription: Option<SubscriptionId>,
}

impl Trigger {
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            counter: 0,
            fired_this_frame: false,
            subscription: None,
        }
    }

    pub fn kind(&self) -> &TriggerKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut TriggerKind {
        &mut self.kind
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe as trigger `index` of `item`
    pub fn attach(&mut self, bus: &mut EventBus, item: ItemId, index: usize) {
        if self.subscription.is_some() {
            return;
        }
        let id = bus.subscribe(self.kind.interest(), Listener::Trigger { item, index });
        self.subscription = Some(id);
    }

    pub fn detach(&mut self, bus: &mut EventBus) {
        if let Some(id) = self.subscription.take() {
            bus.unsubscribe(id);
        }
    }

    pub fn begin_frame(&mut self) {
        self.fired_this_frame = false;
    }

    /// True if `event` should make `owner` attempt to fire
    pub fn observe(&mut self, owner: ItemId, event: &GameEvent, view: &TriggerView<'_>) -> bool {
        if self.fired_this_frame {
            return false;
        }

        let passed = match (&self.kind, event) {
            (
                TriggerKind::OnBonk {
                    target,
                    every,
                    balls_only,
                },
                GameEvent::Bonked(params),
            ) => {
                if (*balls_only && !params.is_ball_bonk()) || !target.accepts(params.target, view) {
                    false
                } else {
                    self.counter += 1;
                    *every <= 1 || self.counter % *every == 0
                }
            }
            (TriggerKind::OnBallFired, GameEvent::BallFired { .. }) => true,
            (TriggerKind::OnMerge { min_tier }, GameEvent::Merged { tier, .. }) => {
                tier >= min_tier
            }
            (TriggerKind::OnStateEntered { state }, GameEvent::StateEntered(phase))
            | (TriggerKind::OnStateExited { state }, GameEvent::StateExited(phase)) => {
                phase == state
            }
            (TriggerKind::OnItemTriggered { weapons_only }, GameEvent::ItemTriggered { item }) => {
                !*weapons_only && *item != owner
            }
            (TriggerKind::OnItemTriggered { .. }, GameEvent::WeaponTriggered { item }) => {
                *item != owner
            }
            (TriggerKind::OnSetOnFire, GameEvent::SetOnFire { item, .. }) => *item != Some(owner),
            (TriggerKind::OnGoalReached, GameEvent::RoundGoalReached { .. }) => true,
            _ => false,
        };

        if passed {
            self.fired_this_frame = true;
        }
        passed
    }

    /// Independent copy carrying the same configuration and counting state,
    /// not yet subscribed to anything
    pub fn deep_copy(&self) -> Trigger {
        Trigger {
            kind: self.kind.clone(),
            counter: self.counter,
            fired_this_frame: false,
            subscription: None,
        }
    }

    /// Same configuration and counting state, ignoring subscriptions
    pub fn same_structure(&self, other: &Trigger) -> bool {
        self.kind == other.kind && self.counter == other.counter
    }
}
