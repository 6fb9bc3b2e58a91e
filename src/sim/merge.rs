//! Merge resolver
//!
//! Once per tick, overlapping cabbages combine pairwise into one entity a
//! tier higher. Planning flags both inputs `is_merging`, so neither can be
//! picked again by any other entity in the same pass.

use glam::Vec2;

use super::bonkable::{CabbageVariant, EntityHandle, EntityStore};

/// One pending merge: two inputs and what they become
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub first: EntityHandle,
    pub second: EntityHandle,
    /// Midpoint of the two inputs
    pub position: Vec2,
    /// `max(first.tier, second.tier) + 1`
    pub tier: u32,
    /// `max(first.color, second.color) + 1`
    pub color: u32,
    /// Combined value of both inputs
    pub value: f64,
    /// Rainbow if either input was
    pub variant: CabbageVariant,
    /// Fire stacks carried over from both inputs
    pub fire_stacks: u32,
}

/// Detects overlapping same-kind entities and plans their merges
#[derive(Debug, Clone, Default)]
pub struct MergeResolver {
    merges_planned: u32,
}

impl MergeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges planned since construction
    pub fn merges_planned(&self) -> u32 {
        self.merges_planned
    }

    /// Scan live entities in handle order and plan every merge for this pass.
    ///
    /// Entities created by executing these plans are not in the snapshot, so
    /// a result can never merge again in the pass that made it.
    pub fn plan(&mut self, store: &mut EntityStore) -> Vec<MergePlan> {
        let handles = store.active_handles();
        let mut plans = Vec::new();

        for (i, &handle) in handles.iter().enumerate() {
            let Some(entity) = store.get(handle) else {
                continue;
            };
            if !entity.is_merge_eligible() {
                continue;
            }
            let entity = entity.clone();

            let partner = handles.iter().skip(i + 1).copied().find(|&other| {
                store.get(other).is_some_and(|candidate| {
                    candidate.handle != entity.handle
                        && candidate.is_merge_eligible()
                        && entity.kind.merges_with(&candidate.kind)
                        && entity.overlaps(candidate)
                })
            });
            let Some(partner) = partner else {
                continue;
            };
            let Some(candidate) = store.get(partner).cloned() else {
                continue;
            };

            if let Some(e) = store.get_mut(handle) {
                e.is_merging = true;
            }
            if let Some(c) = store.get_mut(partner) {
                c.is_merging = true;
            }

            let rainbow = entity.variant() == Some(CabbageVariant::Rainbow)
                || candidate.variant() == Some(CabbageVariant::Rainbow);
            plans.push(MergePlan {
                first: entity.handle,
                second: candidate.handle,
                position: crate::midpoint(entity.position, candidate.position),
                tier: entity.tier.max(candidate.tier) + 1,
                color: entity.color.max(candidate.color) + 1,
                value: entity.value + candidate.value,
                variant: if rainbow {
                    CabbageVariant::Rainbow
                } else {
                    CabbageVariant::Plain
                },
                fire_stacks: entity.fire_stacks + candidate.fire_stacks,
            });
            self.merges_planned += 1;
        }

        plans
    }

    /// Release the guard flags of a merge that could not be completed
    pub fn abort(plan: &MergePlan, store: &mut EntityStore) {
        for handle in [plan.first, plan.second] {
            if let Some(entity) = store.get_mut(handle) {
                entity.is_merging = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::bonkable::{Bonkable, BonkableKind};
    use proptest::prelude::*;

    fn cabbage(id: u32, x: f32, value: f64) -> Bonkable {
        Bonkable::new(EntityHandle(id), BonkableKind::cabbage(), Vec2::new(x, 0.0), value)
    }

    #[test]
    fn test_overlapping_pair_merges() {
        let mut store = EntityStore::new();
        store.register(cabbage(1, 0.0, 20.0));
        store.register(cabbage(2, 10.0, 20.0));
        store.register(cabbage(3, 500.0, 20.0));

        let plans = MergeResolver::new().plan(&mut store);
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!((plan.first, plan.second), (EntityHandle(1), EntityHandle(2)));
        assert_eq!(plan.tier, 1);
        assert_eq!(plan.color, 1);
        assert_eq!(plan.position, Vec2::new(5.0, 0.0));
        assert_eq!(plan.value, 40.0);
        assert!(store.get(EntityHandle(1)).unwrap().is_merging);
        assert!(!store.get(EntityHandle(3)).unwrap().is_merging);
    }

    #[test]
    fn test_three_way_overlap_merges_only_once() {
        let mut store = EntityStore::new();
        store.register(cabbage(1, 0.0, 1.0));
        store.register(cabbage(2, 5.0, 1.0));
        store.register(cabbage(3, 10.0, 1.0));

        let plans = MergeResolver::new().plan(&mut store);
        assert_eq!(plans.len(), 1);
        // The leftover entity was never flagged
        assert!(!store.get(EntityHandle(3)).unwrap().is_merging);
    }

    #[test]
    fn test_merging_entities_are_skipped() {
        let mut store = EntityStore::new();
        store.register(cabbage(1, 0.0, 1.0));
        store.register(cabbage(2, 5.0, 1.0));
        store.get_mut(EntityHandle(2)).unwrap().is_merging = true;

        assert!(MergeResolver::new().plan(&mut store).is_empty());
    }

    #[test]
    fn test_enemies_never_merge() {
        let mut store = EntityStore::new();
        store.register(Bonkable::new(
            EntityHandle(1),
            BonkableKind::Enemy { health: 1.0 },
            Vec2::ZERO,
            0.0,
        ));
        store.register(cabbage(2, 1.0, 1.0));
        assert!(MergeResolver::new().plan(&mut store).is_empty());
    }

    #[test]
    fn test_rainbow_propagates() {
        let mut store = EntityStore::new();
        store.register(cabbage(1, 0.0, 1.0));
        store.register(Bonkable::new(
            EntityHandle(2),
            BonkableKind::Cabbage {
                variant: CabbageVariant::Rainbow,
            },
            Vec2::new(3.0, 0.0),
            1.0,
        ));
        let plans = MergeResolver::new().plan(&mut store);
        assert_eq!(plans[0].variant, CabbageVariant::Rainbow);
    }

    #[test]
    fn test_abort_clears_guards() {
        let mut store = EntityStore::new();
        store.register(cabbage(1, 0.0, 1.0));
        store.register(cabbage(2, 5.0, 1.0));
        let plans = MergeResolver::new().plan(&mut store);
        MergeResolver::abort(&plans[0], &mut store);
        assert!(store.active().all(|e| !e.is_merging));
    }

    proptest! {
        #[test]
        fn prop_merge_tier_law(a in 0u32..50, b in 0u32..50) {
            let mut store = EntityStore::new();
            store.register(cabbage(1, 0.0, 1.0).with_tier(a, a));
            store.register(cabbage(2, 1.0, 1.0).with_tier(b, b));
            let plans = MergeResolver::new().plan(&mut store);
            prop_assert_eq!(plans.len(), 1);
            prop_assert_eq!(plans[0].tier, a.max(b) + 1);
        }

        #[test]
        fn prop_no_entity_in_two_plans(xs in proptest::collection::vec(0.0f32..200.0, 2..24)) {
            let mut store = EntityStore::new();
            for (i, x) in xs.iter().enumerate() {
                store.register(cabbage(i as u32 + 1, *x, 1.0));
            }
            let plans = MergeResolver::new().plan(&mut store);
            let mut seen = std::collections::BTreeSet::new();
            for plan in &plans {
                prop_assert!(seen.insert(plan.first));
                prop_assert!(seen.insert(plan.second));
            }
        }
    }
}
