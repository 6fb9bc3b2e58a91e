//! Gameplay event bus
//!
//! Publishing only queues an event; `drain` delivers queued events in FIFO
//! order, each to a snapshot of the listeners subscribed to its kind when
//! delivery starts. Listeners may publish while being notified: the new
//! events land at the back of the queue, so every listener of one event runs
//! before anything that event caused.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use super::bonkable::{BallHandle, BonkParams, EntityHandle};
use super::round::{RoundPhase, RoundSummary};
use crate::items::{ItemId, SlotId};

/// Failure reported by a single listener; logged, never propagated
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("{0}")]
    Failed(String),
    #[error("item {0:?} produced a non-finite value")]
    NonFinite(ItemId),
}

/// Everything that happens during a round
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    StateEntered(RoundPhase),
    StateExited(RoundPhase),
    BallFired {
        ball: BallHandle,
        balls_remaining: u32,
    },
    Bonked(BonkParams),
    /// Published while both inputs still exist, before they are torn down
    Merged {
        first: EntityHandle,
        second: EntityHandle,
        result: EntityHandle,
        tier: u32,
    },
    EntitySpawned {
        entity: EntityHandle,
    },
    EntityPopped {
        entity: EntityHandle,
        value: f64,
    },
    EntityKilled {
        entity: EntityHandle,
    },
    SetOnFire {
        entity: EntityHandle,
        stacks: u32,
        item: Option<ItemId>,
    },
    ItemTriggered {
        item: ItemId,
    },
    WeaponTriggered {
        item: ItemId,
    },
    ItemPlaced {
        item: ItemId,
        slot: SlotId,
    },
    ItemRemoved {
        item: ItemId,
    },
    /// The two operands of a duplicate merge
    ItemsMerged {
        dragged: ItemId,
        target: ItemId,
    },
    /// The upgraded item a duplicate merge produced
    ItemMergeResult {
        item: ItemId,
    },
    ItemPurchased {
        item: ItemId,
        price: u32,
    },
    ItemSold {
        item: ItemId,
        value: u32,
    },
    ItemConsumed {
        item: ItemId,
    },
    CurrencyChanged {
        delta: i64,
        total: i64,
    },
    RoundGoalUpdated {
        goal: f64,
    },
    RoundScoreUpdated {
        score: f64,
    },
    RoundGoalReached {
        score: f64,
        goal: f64,
    },
    RoundCompleted(RoundSummary),
}

/// Discriminant of `GameEvent`, used as the subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateEntered,
    StateExited,
    BallFired,
    Bonked,
    Merged,
    EntitySpawned,
    EntityPopped,
    EntityKilled,
    SetOnFire,
    ItemTriggered,
    WeaponTriggered,
    ItemPlaced,
    ItemRemoved,
    ItemsMerged,
    ItemMergeResult,
    ItemPurchased,
    ItemSold,
    ItemConsumed,
    CurrencyChanged,
    RoundGoalUpdated,
    RoundScoreUpdated,
    RoundGoalReached,
    RoundCompleted,
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::StateEntered(_) => EventKind::StateEntered,
            GameEvent::StateExited(_) => EventKind::StateExited,
            GameEvent::BallFired { .. } => EventKind::BallFired,
            GameEvent::Bonked(_) => EventKind::Bonked,
            GameEvent::Merged { .. } => EventKind::Merged,
            GameEvent::EntitySpawned { .. } => EventKind::EntitySpawned,
            GameEvent::EntityPopped { .. } => EventKind::EntityPopped,
            GameEvent::EntityKilled { .. } => EventKind::EntityKilled,
            GameEvent::SetOnFire { .. } => EventKind::SetOnFire,
            GameEvent::ItemTriggered { .. } => EventKind::ItemTriggered,
            GameEvent::WeaponTriggered { .. } => EventKind::WeaponTriggered,
            GameEvent::ItemPlaced { .. } => EventKind::ItemPlaced,
            GameEvent::ItemRemoved { .. } => EventKind::ItemRemoved,
            GameEvent::ItemsMerged { .. } => EventKind::ItemsMerged,
            GameEvent::ItemMergeResult { .. } => EventKind::ItemMergeResult,
            GameEvent::ItemPurchased { .. } => EventKind::ItemPurchased,
            GameEvent::ItemSold { .. } => EventKind::ItemSold,
            GameEvent::ItemConsumed { .. } => EventKind::ItemConsumed,
            GameEvent::CurrencyChanged { .. } => EventKind::CurrencyChanged,
            GameEvent::RoundGoalUpdated { .. } => EventKind::RoundGoalUpdated,
            GameEvent::RoundScoreUpdated { .. } => EventKind::RoundScoreUpdated,
            GameEvent::RoundGoalReached { .. } => EventKind::RoundGoalReached,
            GameEvent::RoundCompleted(_) => EventKind::RoundCompleted,
        }
    }

    /// The entity this event is about, if any
    pub fn entity(&self) -> Option<EntityHandle> {
        match self {
            GameEvent::Bonked(params) => Some(params.target),
            GameEvent::Merged { result, .. } => Some(*result),
            GameEvent::EntitySpawned { entity }
            | GameEvent::EntityPopped { entity, .. }
            | GameEvent::EntityKilled { entity }
            | GameEvent::SetOnFire { entity, .. } => Some(*entity),
            _ => None,
        }
    }
}

/// Callback listener for systems outside the engine (UI, score display, tests)
pub type Callback = Rc<dyn Fn(&GameEvent) -> Result<(), ListenerError>>;

/// Engine-owned listeners routed by the game facade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemListener {
    /// Moves markers onto merge results, drops them on pop/kill
    Markers,
    /// Burns and decays fire stacks at the end of each shot
    FireStatus,
}

/// Who gets notified for a subscription
#[derive(Clone)]
pub enum Listener {
    /// Trigger `index` of item `item`
    Trigger { item: ItemId, index: usize },
    System(SystemListener),
    Callback(Callback),
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Trigger { item, index } => write!(f, "Trigger({item:?}#{index})"),
            Listener::System(system) => write!(f, "System({system:?})"),
            Listener::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Listeners of one event kind, in subscription order
#[derive(Default)]
struct ListenerTable {
    entries: Vec<Option<(SubscriptionId, Listener)>>,
    positions: HashMap<SubscriptionId, usize>,
    tombstones: usize,
}

impl ListenerTable {
    fn push(&mut self, id: SubscriptionId, listener: Listener) {
        self.positions.insert(id, self.entries.len());
        self.entries.push(Some((id, listener)));
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(position) = self.positions.remove(&id) else {
            return false;
        };
        self.entries[position] = None;
        self.tombstones += 1;
        // Compact once holes dominate; keeps unsubscribe amortized O(1)
        if self.tombstones > 16 && self.tombstones * 2 > self.entries.len() {
            self.entries.retain(Option::is_some);
            self.positions.clear();
            for (position, entry) in self.entries.iter().enumerate() {
                if let Some((id, _)) = entry {
                    self.positions.insert(*id, position);
                }
            }
            self.tombstones = 0;
        }
        true
    }

    fn snapshot(&self) -> Vec<Listener> {
        self.entries
            .iter()
            .flatten()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}

/// Typed publish/subscribe channel for round and gameplay events
pub struct EventBus {
    tables: HashMap<EventKind, ListenerTable>,
    kinds: HashMap<SubscriptionId, EventKind>,
    pending: VecDeque<GameEvent>,
    draining: bool,
    max_events_per_drain: usize,
    next_id: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl EventBus {
    pub fn new(max_events_per_drain: usize) -> Self {
        Self {
            tables: HashMap::new(),
            kinds: HashMap::new(),
            pending: VecDeque::new(),
            draining: false,
            max_events_per_drain: max_events_per_drain.max(1),
            next_id: 1,
        }
    }

    pub fn subscribe(&mut self, kind: EventKind, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.tables.entry(kind).or_default().push(id, listener);
        self.kinds.insert(id, kind);
        id
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(kind) = self.kinds.remove(&id) else {
            return false;
        };
        self.tables
            .get_mut(&kind)
            .map(|table| table.remove(id))
            .unwrap_or(false)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.tables.get(&kind).map(ListenerTable::len).unwrap_or(0)
    }

    /// Queue an event for the next (or current) drain
    pub fn publish(&mut self, event: GameEvent) {
        self.pending.push_back(event);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Deliver every queued event, including those published during delivery.
    ///
    /// `route` is called once per (listener, event); an `Err` is logged and the
    /// remaining listeners still run. A nested call while draining returns 0
    /// and leaves the queue to the outer drain. Returns the number of events
    /// delivered.
    pub fn drain<F>(&mut self, mut route: F) -> usize
    where
        F: FnMut(&Listener, &GameEvent, &mut EventBus) -> Result<(), ListenerError>,
    {
        if self.draining {
            return 0;
        }
        self.draining = true;

        let mut delivered = 0;
        while let Some(event) = self.pending.pop_front() {
            if delivered >= self.max_events_per_drain {
                log::warn!(
                    "Event storm: dropping {} queued events after {} deliveries",
                    self.pending.len() + 1,
                    delivered
                );
                self.pending.clear();
                break;
            }
            delivered += 1;

            let listeners = self
                .tables
                .get(&event.kind())
                .map(ListenerTable::snapshot)
                .unwrap_or_default();
            for listener in &listeners {
                if let Err(err) = route(listener, &event, self) {
                    log::warn!("Listener {:?} failed on {:?}: {}", listener, event.kind(), err);
                }
            }
        }

        self.draining = false;
        delivered
    }

    /// Drain delivering only to callback listeners
    pub fn drain_callbacks(&mut self) -> usize {
        self.drain(|listener, event, _| match listener {
            Listener::Callback(callback) => callback(event),
            _ => Ok(()),
        })
    }
}
