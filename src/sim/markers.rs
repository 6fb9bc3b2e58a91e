//! Entity markers
//!
//! Markers follow an entity through merges and vanish with it on pop/kill.

use std::collections::BTreeMap;

use super::bonkable::EntityHandle;
use super::events::GameEvent;

#[derive(Debug, Clone, Default)]
pub struct MarkerBoard {
    marks: BTreeMap<EntityHandle, u32>,
}

impl MarkerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, entity: EntityHandle) {
        *self.marks.entry(entity).or_insert(0) += 1;
    }

    pub fn marks_on(&self, entity: EntityHandle) -> u32 {
        self.marks.get(&entity).copied().unwrap_or(0)
    }

    pub fn is_marked(&self, entity: EntityHandle) -> bool {
        self.marks_on(entity) > 0
    }

    /// Move every marker from `from` onto `to`
    pub fn transfer(&mut self, from: EntityHandle, to: EntityHandle) {
        if let Some(count) = self.marks.remove(&from) {
            *self.marks.entry(to).or_insert(0) += count;
        }
    }

    pub fn clear(&mut self, entity: EntityHandle) {
        self.marks.remove(&entity);
    }

    pub fn clear_all(&mut self) {
        self.marks.clear();
    }

    pub fn total(&self) -> u32 {
        self.marks.values().sum()
    }

    /// Bus hook: react to merges and removals
    pub fn observe(&mut self, event: &GameEvent) {
        match event {
            GameEvent::Merged {
                first,
                second,
                result,
                ..
            } => {
                self.transfer(*first, *result);
                self.transfer(*second, *result);
            }
            GameEvent::EntityPopped { entity, .. } | GameEvent::EntityKilled { entity } => {
                self.clear(*entity);
            }
            _ => {}
        }
    }
}
