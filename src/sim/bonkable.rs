//! Bonkable entities (cabbages, enemies) and the active entity store

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::items::ItemId;

/// Opaque handle of a spawned entity (issued by the presentation layer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle(pub u32);

/// Opaque handle of a launched ball
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BallHandle(pub u32);

/// Cabbage variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CabbageVariant {
    #[default]
    Plain,
    Rainbow,
}

/// What kind of bonkable an entity is
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BonkableKind {
    /// Merge-capable collectible
    Cabbage { variant: CabbageVariant },
    /// Simple target, killed when health runs out; never merges
    Enemy { health: f64 },
}

impl BonkableKind {
    pub fn cabbage() -> Self {
        BonkableKind::Cabbage {
            variant: CabbageVariant::Plain,
        }
    }

    pub fn is_cabbage(&self) -> bool {
        matches!(self, BonkableKind::Cabbage { .. })
    }

    pub fn is_enemy(&self) -> bool {
        matches!(self, BonkableKind::Enemy { .. })
    }

    /// Entities merge only with entities of the same kind
    pub fn merges_with(&self, other: &BonkableKind) -> bool {
        self.is_cabbage() && other.is_cabbage()
    }
}

/// An impact delivered to a bonkable entity
///
/// Passed by value; listeners get their own copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonkParams {
    pub target: EntityHandle,
    pub power: f64,
    /// World position of the impact
    pub position: Vec2,
    /// Surface normal at the impact
    pub normal: Vec2,
    /// Ball that caused the bonk, if any
    pub ball: Option<BallHandle>,
    /// Count as a ball bonk even without a ball (e.g. item-made projectiles)
    pub treat_as_ball: bool,
    /// Item whose effect caused the bonk, if any
    pub causing_item: Option<ItemId>,
}

impl BonkParams {
    pub fn new(target: EntityHandle, power: f64) -> Self {
        Self {
            target,
            power,
            position: Vec2::ZERO,
            normal: Vec2::Y,
            ball: None,
            treat_as_ball: false,
            causing_item: None,
        }
    }

    pub fn from_ball(target: EntityHandle, ball: BallHandle, power: f64, position: Vec2) -> Self {
        Self {
            ball: Some(ball),
            position,
            ..Self::new(target, power)
        }
    }

    pub fn is_ball_bonk(&self) -> bool {
        self.ball.is_some() || self.treat_as_ball
    }
}

/// Result of applying a bonk to an entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonkOutcome {
    pub value_gained: f64,
    pub killed: bool,
}

/// A bonkable entity in the round
#[derive(Debug, Clone, PartialEq)]
pub struct Bonkable {
    pub handle: EntityHandle,
    pub kind: BonkableKind,
    /// Points this entity contributes to the round score
    pub value: f64,
    /// Merge generation
    pub tier: u32,
    /// Visual tier, advanced alongside `tier`
    pub color: u32,
    pub position: Vec2,
    pub base_radius: f32,
    /// Fractional radius growth per tier
    pub radius_growth: f32,
    /// Set while a merge involving this entity is in flight
    pub is_merging: bool,
    pub active: bool,
    pub popped: bool,
    pub fire_stacks: u32,
    pub times_bonked: u32,
}

impl Bonkable {
    pub fn new(handle: EntityHandle, kind: BonkableKind, position: Vec2, value: f64) -> Self {
        Self {
            handle,
            kind,
            value,
            tier: 0,
            color: 0,
            position,
            base_radius: 20.0,
            radius_growth: 0.25,
            is_merging: false,
            active: true,
            popped: false,
            fire_stacks: 0,
            times_bonked: 0,
        }
    }

    pub fn with_radius(mut self, base_radius: f32, radius_growth: f32) -> Self {
        self.base_radius = base_radius;
        self.radius_growth = radius_growth;
        self
    }

    pub fn with_tier(mut self, tier: u32, color: u32) -> Self {
        self.tier = tier;
        self.color = color;
        self
    }

    /// Footprint radius scaled by tier
    pub fn radius(&self) -> f32 {
        self.base_radius * (1.0 + self.radius_growth * self.tier as f32)
    }

    /// Alive and counted: not popped, not torn down
    pub fn is_live(&self) -> bool {
        self.active && !self.popped
    }

    pub fn is_merge_eligible(&self) -> bool {
        self.is_live() && !self.is_merging && self.kind.is_cabbage()
    }

    pub fn overlaps(&self, other: &Bonkable) -> bool {
        crate::circles_overlap(self.position, self.radius(), other.position, other.radius())
    }

    pub fn variant(&self) -> Option<CabbageVariant> {
        match self.kind {
            BonkableKind::Cabbage { variant } => Some(variant),
            BonkableKind::Enemy { .. } => None,
        }
    }

    /// Apply an impact.
    ///
    /// Cabbages gain `(power + bonus) * value_per_power`; enemies lose `power`
    /// health and report `killed` once it runs out.
    pub fn bonk(&mut self, power: f64, bonus: f64, value_per_power: f64) -> BonkOutcome {
        self.times_bonked += 1;
        match &mut self.kind {
            BonkableKind::Cabbage { .. } => {
                let gained = ((power + bonus) * value_per_power).max(0.0);
                self.value += gained;
                BonkOutcome {
                    value_gained: gained,
                    killed: false,
                }
            }
            BonkableKind::Enemy { health } => {
                *health -= power.max(0.0);
                BonkOutcome {
                    value_gained: 0.0,
                    killed: *health <= 0.0,
                }
            }
        }
    }
}

/// Active bonkable entities, iterated in handle order
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: BTreeMap<EntityHandle, Bonkable>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and keeps the existing entity) on a duplicate handle
    pub fn register(&mut self, entity: Bonkable) -> bool {
        if self.entities.contains_key(&entity.handle) {
            log::error!("Duplicate entity handle {:?}", entity.handle);
            return false;
        }
        self.entities.insert(entity.handle, entity);
        true
    }

    pub fn remove(&mut self, handle: EntityHandle) -> Option<Bonkable> {
        self.entities.remove(&handle)
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&Bonkable> {
        self.entities.get(&handle)
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Bonkable> {
        self.entities.get_mut(&handle)
    }

    /// Live entity for `handle`, ignoring popped or torn-down ones
    pub fn live(&self, handle: EntityHandle) -> Option<&Bonkable> {
        self.entities.get(&handle).filter(|e| e.is_live())
    }

    pub fn live_mut(&mut self, handle: EntityHandle) -> Option<&mut Bonkable> {
        self.entities.get_mut(&handle).filter(|e| e.is_live())
    }

    pub fn active(&self) -> impl Iterator<Item = &Bonkable> {
        self.entities.values().filter(|e| e.is_live())
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut Bonkable> {
        self.entities.values_mut().filter(|e| e.is_live())
    }

    pub fn active_handles(&self) -> Vec<EntityHandle> {
        self.active().map(|e| e.handle).collect()
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Sum of value over live entities
    pub fn total_value(&self) -> f64 {
        self.active().map(|e| e.value).sum()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cabbage(id: u32, x: f32, value: f64) -> Bonkable {
        Bonkable::new(EntityHandle(id), BonkableKind::cabbage(), Vec2::new(x, 0.0), value)
    }

    #[test]
    fn test_cabbage_bonk_adds_value() {
        let mut entity = cabbage(1, 0.0, 2.0);
        let outcome = entity.bonk(3.0, 1.0, 2.0);
        assert_eq!(outcome.value_gained, 8.0);
        assert!(!outcome.killed);
        assert_eq!(entity.value, 10.0);
        assert_eq!(entity.times_bonked, 1);
    }

    #[test]
    fn test_enemy_dies_when_health_runs_out() {
        let mut enemy = Bonkable::new(
            EntityHandle(7),
            BonkableKind::Enemy { health: 2.0 },
            Vec2::ZERO,
            0.0,
        );
        assert!(!enemy.bonk(1.0, 0.0, 1.0).killed);
        assert!(enemy.bonk(1.5, 0.0, 1.0).killed);
        assert_eq!(enemy.value, 0.0);
    }

    #[test]
    fn test_radius_grows_with_tier() {
        let entity = cabbage(1, 0.0, 1.0).with_radius(10.0, 0.5).with_tier(2, 2);
        assert_eq!(entity.radius(), 20.0);
    }

    #[test]
    fn test_store_total_ignores_popped() {
        let mut store = EntityStore::new();
        store.register(cabbage(1, 0.0, 20.0));
        store.register(cabbage(2, 100.0, 5.0));
        assert_eq!(store.total_value(), 25.0);

        store.get_mut(EntityHandle(2)).unwrap().popped = true;
        assert_eq!(store.total_value(), 20.0);
        assert_eq!(store.active_handles(), vec![EntityHandle(1)]);
        assert!(store.live(EntityHandle(2)).is_none());
    }

    #[test]
    fn test_store_rejects_duplicate_handles() {
        let mut store = EntityStore::new();
        assert!(store.register(cabbage(1, 0.0, 1.0)));
        assert!(!store.register(cabbage(1, 50.0, 9.0)));
        assert_eq!(store.get(EntityHandle(1)).unwrap().value, 1.0);
    }

    #[test]
    fn test_enemies_are_not_merge_eligible() {
        let enemy = Bonkable::new(
            EntityHandle(1),
            BonkableKind::Enemy { health: 1.0 },
            Vec2::ZERO,
            0.0,
        );
        assert!(!enemy.is_merge_eligible());
        assert!(cabbage(2, 0.0, 1.0).is_merge_eligible());
    }
}
