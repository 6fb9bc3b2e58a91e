//! Player items
//!
//! An item bundles triggers (when to act) with effects (what happens).
//! Templates come from the catalog; the manager owns every live instance,
//! the inventory/shop slots and the drag-and-drop rules between them.

pub mod catalog;
pub mod effect;
pub mod item;
pub mod manager;
pub mod player;
pub mod trigger;

pub use catalog::{EffectSpec, ItemCatalog, ItemTemplate};
pub use effect::{EffectCommand, EffectKind, ItemEffect};
pub use item::{GateRejection, Item};
pub use manager::{
    DropOutcome, DropTarget, ItemEnv, ItemManager, ItemSlot, RevertReason, SlotArea,
};
pub use player::PlayerState;
pub use trigger::{TargetFilter, Trigger, TriggerKind, TriggerView};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a live item instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u32);

/// Identity of an inventory or shop slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Normal,
    /// Lives in the perk area, never in a slot
    Perk,
    /// At most one in the inventory
    Weapon,
    Pet,
    Consumable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Legendary,
}

/// Errors from item operations addressed by name or id
#[derive(Debug, Error, PartialEq)]
pub enum ItemError {
    #[error("no item template named `{0}`")]
    UnknownTemplate(String),
    #[error("no live item {0:?}")]
    UnknownItem(ItemId),
    #[error("no slot {0:?}")]
    UnknownSlot(SlotId),
    #[error("item {0:?} cannot be force-triggered")]
    NotForceTriggerable(ItemId),
    #[error("already dragging {0:?}")]
    AlreadyDragging(ItemId),
}
