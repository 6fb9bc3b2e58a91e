//! Item manager
//!
//! Owns every live item, the inventory and shop slots, the perk area and
//! the drag-and-drop rules between them. Slotted items and perks are two
//! disjoint sets; inventory queries union them where noted.

use std::collections::{BTreeMap, HashMap};

use rand_pcg::Pcg32;

use crate::items::catalog::ItemCatalog;
use crate::items::effect::EffectCommand;
use crate::items::item::Item;
use crate::items::player::PlayerState;
use crate::items::trigger::{Trigger, TriggerView};
use crate::items::{ItemError, ItemId, ItemKind, SlotId};
use crate::sim::bonkable::EntityStore;
use crate::sim::events::{EventBus, GameEvent, ListenerError};
use crate::sim::markers::MarkerBoard;
use crate::tuning::ItemTuning;

/// Everything an item may touch while firing
pub struct ItemEnv<'a> {
    pub bus: &'a mut EventBus,
    pub player: &'a mut PlayerState,
    pub entities: &'a mut EntityStore,
    pub markers: &'a mut MarkerBoard,
    pub rng: &'a mut Pcg32,
    pub commands: &'a mut Vec<EffectCommand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotArea {
    Inventory,
    Shop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemSlot {
    pub id: SlotId,
    pub area: SlotArea,
    pub frozen: bool,
    pub item: Option<ItemId>,
}

/// Where a dragged item is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Slot(SlotId),
    Sell,
    Nowhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertReason {
    NotDragging,
    NoTarget,
    UnknownSlot,
    ShopSlot,
    Occupied,
    WeaponSlotTaken,
    CannotAfford,
    SellDisabled,
    NotOwned,
    MergeFailed,
}

/// How a drag resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Placed,
    Swapped { other: ItemId },
    Merged { result: ItemId },
    Purchased,
    Sold { value: u32 },
    Consumed,
    /// Back where it came from, nothing else changed
    Reverted(RevertReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Slot(SlotId),
    Perks,
    Nowhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Drag {
    item: ItemId,
    origin: Origin,
}

pub struct ItemManager {
    catalog: ItemCatalog,
    tuning: ItemTuning,
    items: BTreeMap<ItemId, Item>,
    slots: Vec<ItemSlot>,
    perks: Vec<ItemId>,
    dragging: Option<Drag>,
    /// Fires this tick, per item name (shared by every copy)
    frame_fires: HashMap<String, u32>,
    next_id: u32,
    pub sell_disabled: bool,
}

impl ItemManager {
    pub fn new(catalog: ItemCatalog, tuning: &ItemTuning) -> Self {
        let mut slots = Vec::with_capacity(tuning.inventory_slots + tuning.shop_slots);
        for i in 0..tuning.inventory_slots + tuning.shop_slots {
            slots.push(ItemSlot {
                id: SlotId(i as u32),
                area: if i < tuning.inventory_slots {
                    SlotArea::Inventory
                } else {
                    SlotArea::Shop
                },
                frozen: false,
                item: None,
            });
        }
        Self {
            catalog,
            tuning: tuning.clone(),
            items: BTreeMap::new(),
            slots,
            perks: Vec::new(),
            dragging: None,
            frame_fires: HashMap::new(),
            next_id: 0,
            sell_disabled: false,
        }
    }

    // === Queries ===

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn slots(&self) -> &[ItemSlot] {
        &self.slots
    }

    pub fn slot(&self, id: SlotId) -> Option<&ItemSlot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    fn slot_mut(&mut self, id: SlotId) -> Option<&mut ItemSlot> {
        self.slots.iter_mut().find(|slot| slot.id == id)
    }

    pub fn dragging(&self) -> Option<ItemId> {
        self.dragging.map(|drag| drag.item)
    }

    /// Fires recorded this tick for items named `name`
    pub fn frame_fires(&self, name: &str) -> u32 {
        self.frame_fires.get(name).copied().unwrap_or(0)
    }

    fn occupants(&self, area: SlotArea) -> impl Iterator<Item = ItemId> + '_ {
        self.slots
            .iter()
            .filter(move |slot| slot.area == area)
            .filter_map(|slot| slot.item)
    }

    fn inventory_of_kind(&self, kind: ItemKind) -> Vec<ItemId> {
        self.occupants(SlotArea::Inventory)
            .filter(|id| self.items.get(id).is_some_and(|item| item.kind() == kind))
            .collect()
    }

    /// Slotted inventory items plus perks
    pub fn items_in_inventory(&self) -> Vec<ItemId> {
        self.occupants(SlotArea::Inventory)
            .chain(self.perks.iter().copied())
            .collect()
    }

    pub fn normal_items(&self) -> Vec<ItemId> {
        self.inventory_of_kind(ItemKind::Normal)
    }

    pub fn weapons(&self) -> Vec<ItemId> {
        self.inventory_of_kind(ItemKind::Weapon)
    }

    pub fn pets(&self) -> Vec<ItemId> {
        self.inventory_of_kind(ItemKind::Pet)
    }

    pub fn consumables(&self) -> Vec<ItemId> {
        self.inventory_of_kind(ItemKind::Consumable)
    }

    pub fn perks(&self) -> Vec<ItemId> {
        self.perks.clone()
    }

    pub fn shop_items(&self) -> Vec<ItemId> {
        self.occupants(SlotArea::Shop).collect()
    }

    /// Inventory slots holding a weapon, ignoring `except`
    fn weapon_slot_taken(&self, except: Option<SlotId>) -> bool {
        self.slots.iter().any(|slot| {
            slot.area == SlotArea::Inventory
                && Some(slot.id) != except
                && slot
                    .item
                    .and_then(|id| self.items.get(&id))
                    .is_some_and(|item| item.kind() == ItemKind::Weapon)
        })
    }

    fn first_free(&self, area: SlotArea) -> Option<SlotId> {
        self.slots
            .iter()
            .find(|slot| slot.area == area && slot.item.is_none())
            .map(|slot| slot.id)
    }

    // === Creation and placement ===

    /// Instantiate a template; active (subscribed, effects initialized) when owned
    fn create(
        &mut self,
        name: &str,
        owned: bool,
        bus: &mut EventBus,
        player: &mut PlayerState,
    ) -> Result<ItemId, ItemError> {
        let template = self
            .catalog
            .get(name)
            .ok_or_else(|| ItemError::UnknownTemplate(name.to_string()))?;
        self.next_id += 1;
        let id = ItemId(self.next_id);
        let mut item = Item::new(id, template);
        item.purchased = owned;
        if owned {
            item.activate(bus, player);
        }
        self.items.insert(id, item);
        Ok(id)
    }

    /// Put `item` into `slot`, setting both references and the frozen gate.
    ///
    /// Never fails; the caller checks occupancy first. Unknown ids are logged
    /// and ignored.
    pub fn add_item_to_slot(&mut self, item: ItemId, slot: SlotId, bus: &mut EventBus) {
        if self.place(item, slot) {
            bus.publish(GameEvent::ItemPlaced { item, slot });
        }
    }

    fn place(&mut self, id: ItemId, slot_id: SlotId) -> bool {
        let Some(frozen) = self.slot(slot_id).map(|slot| slot.frozen) else {
            log::error!("Placing {:?} into unknown {:?}", id, slot_id);
            return false;
        };
        let Some(item) = self.items.get_mut(&id) else {
            log::error!("Placing unknown {:?} into {:?}", id, slot_id);
            return false;
        };
        let previous = item.slot.replace(slot_id);
        item.frozen = frozen;
        self.perks.retain(|&perk| perk != id);

        if let Some(previous) = previous.filter(|&p| p != slot_id) {
            if let Some(old) = self.slot_mut(previous) {
                if old.item == Some(id) {
                    old.item = None;
                }
            }
        }
        if let Some(slot) = self.slot_mut(slot_id) {
            slot.item = Some(id);
        }
        true
    }

    fn place_perk(&mut self, id: ItemId) {
        if let Some(item) = self.items.get_mut(&id) {
            item.slot = None;
            item.frozen = false;
        }
        if !self.perks.contains(&id) {
            self.perks.push(id);
        }
    }

    /// Give the player an owned item. Perks go to the perk area, everything
    /// else to the first free inventory slot.
    ///
    /// `Ok(None)` when there is no room (or a weapon is already slotted);
    /// nothing is created in that case.
    pub fn give_item(
        &mut self,
        name: &str,
        bus: &mut EventBus,
        player: &mut PlayerState,
    ) -> Result<Option<ItemId>, ItemError> {
        let template = self
            .catalog
            .get(name)
            .ok_or_else(|| ItemError::UnknownTemplate(name.to_string()))?;

        if template.kind == ItemKind::Perk {
            let id = self.create(name, true, bus, player)?;
            self.place_perk(id);
            return Ok(Some(id));
        }
        if template.kind == ItemKind::Weapon && self.weapon_slot_taken(None) {
            log::debug!("No room for weapon `{}`", name);
            return Ok(None);
        }
        let Some(slot) = self.first_free(SlotArea::Inventory) else {
            log::debug!("No free inventory slot for `{}`", name);
            return Ok(None);
        };
        let id = self.create(name, true, bus, player)?;
        self.add_item_to_slot(id, slot, bus);
        Ok(Some(id))
    }

    /// Fill empty shop slots with unpurchased items, in order
    pub fn stock_shop(
        &mut self,
        names: &[&str],
        bus: &mut EventBus,
        player: &mut PlayerState,
    ) -> Result<Vec<ItemId>, ItemError> {
        let mut stocked = Vec::new();
        for name in names {
            let Some(slot) = self.first_free(SlotArea::Shop) else {
                break;
            };
            let id = self.create(name, false, bus, player)?;
            self.place(id, slot);
            stocked.push(id);
        }
        Ok(stocked)
    }

    /// Destroy an item: unsubscribe, destroy effects, vacate its slot
    pub fn remove_item(
        &mut self,
        id: ItemId,
        bus: &mut EventBus,
        player: &mut PlayerState,
    ) -> Option<Item> {
        let mut item = self.items.remove(&id)?;
        item.deactivate(bus, player);
        if let Some(slot) = item.slot.take().and_then(|s| self.slot_mut(s)) {
            if slot.item == Some(id) {
                slot.item = None;
            }
        }
        self.perks.retain(|&perk| perk != id);
        if self.dragging.is_some_and(|drag| drag.item == id) {
            self.dragging = None;
        }
        bus.publish(GameEvent::ItemRemoved { item: id });
        Some(item)
    }

    pub fn set_slot_frozen(&mut self, slot: SlotId, frozen: bool) -> Result<(), ItemError> {
        let occupant = {
            let slot = self.slot_mut(slot).ok_or(ItemError::UnknownSlot(slot))?;
            slot.frozen = frozen;
            slot.item
        };
        if let Some(item) = occupant.and_then(|id| self.items.get_mut(&id)) {
            item.frozen = frozen;
        }
        Ok(())
    }

    pub fn set_holofoil(
        &mut self,
        id: ItemId,
        holofoil: bool,
        player: &mut PlayerState,
    ) -> Result<(), ItemError> {
        let item = self.items.get_mut(&id).ok_or(ItemError::UnknownItem(id))?;
        item.set_holofoil(holofoil, player);
        Ok(())
    }

    // === Drag and drop ===

    /// Lift an item out of its slot or the perk area
    pub fn begin_drag(&mut self, id: ItemId) -> Result<(), ItemError> {
        if let Some(drag) = self.dragging {
            return Err(ItemError::AlreadyDragging(drag.item));
        }
        let item = self.items.get_mut(&id).ok_or(ItemError::UnknownItem(id))?;
        let origin = match item.slot.take() {
            Some(slot) => Origin::Slot(slot),
            None if self.perks.contains(&id) => Origin::Perks,
            None => Origin::Nowhere,
        };
        match origin {
            Origin::Slot(slot) => {
                if let Some(slot) = self.slot_mut(slot) {
                    slot.item = None;
                }
            }
            Origin::Perks => self.perks.retain(|&perk| perk != id),
            Origin::Nowhere => {}
        }
        self.dragging = Some(Drag { item: id, origin });
        Ok(())
    }

    /// Put the dragged item back without publishing anything
    fn revert(&mut self, drag: Drag, reason: RevertReason) -> DropOutcome {
        log::debug!("Drag of {:?} reverted: {:?}", drag.item, reason);
        match drag.origin {
            Origin::Slot(slot) => {
                self.place(drag.item, slot);
            }
            Origin::Perks => self.place_perk(drag.item),
            Origin::Nowhere => {}
        }
        DropOutcome::Reverted(reason)
    }

    /// Resolve the current drag against `target`
    pub fn release_drag(&mut self, target: DropTarget, env: &mut ItemEnv<'_>) -> DropOutcome {
        let Some(drag) = self.dragging.take() else {
            return DropOutcome::Reverted(RevertReason::NotDragging);
        };
        if !self.items.contains_key(&drag.item) {
            return DropOutcome::Reverted(RevertReason::NotDragging);
        }
        match target {
            DropTarget::Nowhere => self.revert(drag, RevertReason::NoTarget),
            DropTarget::Sell => self.drop_on_sell(drag, env),
            DropTarget::Slot(slot) => self.drop_on_slot(drag, slot, env),
        }
    }

    fn drop_on_slot(&mut self, drag: Drag, slot_id: SlotId, env: &mut ItemEnv<'_>) -> DropOutcome {
        let Some(slot) = self.slot(slot_id).cloned() else {
            return self.revert(drag, RevertReason::UnknownSlot);
        };
        if slot.area == SlotArea::Shop {
            return self.revert(drag, RevertReason::ShopSlot);
        }
        let Some((kind, purchased, price)) = self
            .items
            .get(&drag.item)
            .map(|item| (item.kind(), item.is_purchased(), item.template().price))
        else {
            return DropOutcome::Reverted(RevertReason::NotDragging);
        };

        if let Some(other) = slot.item {
            if let Some(result) = self.try_merge_drop(drag, other, env) {
                return result;
            }
            // Swap needs an inventory origin to receive the occupant
            return match drag.origin {
                Origin::Slot(origin) if purchased => {
                    let origin_is_inventory = self
                        .slot(origin)
                        .is_some_and(|s| s.area == SlotArea::Inventory);
                    if !origin_is_inventory {
                        return self.revert(drag, RevertReason::Occupied);
                    }
                    self.place(drag.item, slot_id);
                    self.place(other, origin);
                    env.bus.publish(GameEvent::ItemPlaced {
                        item: drag.item,
                        slot: slot_id,
                    });
                    env.bus.publish(GameEvent::ItemPlaced {
                        item: other,
                        slot: origin,
                    });
                    DropOutcome::Swapped { other }
                }
                _ => self.revert(drag, RevertReason::Occupied),
            };
        }

        if kind == ItemKind::Weapon && self.weapon_slot_taken(None) {
            return self.revert(drag, RevertReason::WeaponSlotTaken);
        }

        if !purchased {
            if !env.player.spend(price) {
                return self.revert(drag, RevertReason::CannotAfford);
            }
            self.settle_purchase(drag.item, price, env);
            self.place_owned(drag.item, kind, slot_id, env.bus);
            return DropOutcome::Purchased;
        }

        self.place_owned(drag.item, kind, slot_id, env.bus);
        DropOutcome::Placed
    }

    /// Perks land in the perk area whatever slot they were dropped on
    fn place_owned(&mut self, id: ItemId, kind: ItemKind, slot: SlotId, bus: &mut EventBus) {
        if kind == ItemKind::Perk {
            self.place_perk(id);
        } else {
            self.add_item_to_slot(id, slot, bus);
        }
    }

    /// Mark bought (already debited), activate and announce it
    fn settle_purchase(&mut self, id: ItemId, price: u32, env: &mut ItemEnv<'_>) {
        if let Some(item) = self.items.get_mut(&id) {
            item.purchased = true;
            item.activate(env.bus, env.player);
        }
        log::info!("Purchased {:?} for {}", id, price);
        env.bus.publish(GameEvent::ItemPurchased { item: id, price });
        env.bus.publish(GameEvent::CurrencyChanged {
            delta: -i64::from(price),
            total: env.player.currency(),
        });
    }

    /// Duplicate-merge when names match and an upgrade exists. `None` means
    /// this is not a merge and the caller falls through to swapping.
    fn try_merge_drop(
        &mut self,
        drag: Drag,
        target: ItemId,
        env: &mut ItemEnv<'_>,
    ) -> Option<DropOutcome> {
        let dragged = self.items.get(&drag.item)?;
        let other = self.items.get(&target)?;
        if dragged.name() != other.name() {
            return None;
        }
        dragged.template().upgraded_item.as_ref()?;

        if !dragged.is_purchased() && !env.player.can_afford(dragged.template().price) {
            return Some(self.revert(drag, RevertReason::CannotAfford));
        }
        Some(match self.check_for_duplicate_merge(drag.item, target, env) {
            Some(result) => DropOutcome::Merged { result },
            None => self.revert(drag, RevertReason::MergeFailed),
        })
    }

    /// Merge `dragged` into the same-named `target`, replacing both with one
    /// item built from the upgrade template in `target`'s slot.
    ///
    /// Triggers of a side flagged keep-on-upgrade are deep-copied onto the
    /// result; holofoil and the keep flag carry forward. An unpurchased
    /// dragged item is paid for here; the target must already be owned.
    pub(crate) fn check_for_duplicate_merge(
        &mut self,
        dragged: ItemId,
        target: ItemId,
        env: &mut ItemEnv<'_>,
    ) -> Option<ItemId> {
        let a = self.items.get(&dragged)?;
        let b = self.items.get(&target)?;
        if dragged == target || a.name() != b.name() {
            return None;
        }
        if !b.is_purchased() {
            log::debug!("Merge target {:?} is still in the shop", target);
            return None;
        }
        let upgrade = a.template().upgraded_item.clone()?;
        let Some(template) = self.catalog.get(&upgrade) else {
            log::warn!("`{}` upgrades into missing template `{}`", a.name(), upgrade);
            return None;
        };
        let slot = b.slot;
        if template.kind == ItemKind::Weapon && self.weapon_slot_taken(slot) {
            return None;
        }

        let keep = a.keeps_triggers_on_upgrade() || b.keeps_triggers_on_upgrade();
        let source = if a.keeps_triggers_on_upgrade() { a } else { b };
        let kept: Option<Vec<Trigger>> = if keep {
            let copies: Vec<Trigger> = source.triggers().iter().map(Trigger::deep_copy).collect();
            let intact = copies.len() == source.triggers().len()
                && copies
                    .iter()
                    .zip(source.triggers())
                    .all(|(copy, original)| copy.same_structure(original));
            if intact {
                Some(copies)
            } else {
                log::error!("Trigger copy of `{}` differs from its source", source.name());
                None
            }
        } else {
            None
        };
        let holofoil = a.is_holofoil() || b.is_holofoil();
        let unpaid = (!a.is_purchased()).then(|| a.template().price);

        if let Some(price) = unpaid {
            if !env.player.spend(price) {
                return None;
            }
            env.bus.publish(GameEvent::ItemPurchased {
                item: dragged,
                price,
            });
            env.bus.publish(GameEvent::CurrencyChanged {
                delta: -i64::from(price),
                total: env.player.currency(),
            });
        }

        self.remove_item(dragged, env.bus, env.player);
        self.remove_item(target, env.bus, env.player);

        self.next_id += 1;
        let id = ItemId(self.next_id);
        let mut item = Item::new(id, template);
        if let Some(triggers) = kept {
            item.replace_triggers(triggers);
        }
        item.keep_triggers_on_upgrade |= keep;
        item.set_holofoil(holofoil, env.player);
        item.activate(env.bus, env.player);
        let kind = item.kind();
        self.items.insert(id, item);

        match slot {
            Some(slot) => self.place_owned(id, kind, slot, env.bus),
            None => self.place_perk(id),
        }
        log::info!("Merged {:?} + {:?} into `{}` {:?}", dragged, target, upgrade, id);
        env.bus.publish(GameEvent::ItemsMerged { dragged, target });
        env.bus.publish(GameEvent::ItemMergeResult { item: id });
        Some(id)
    }

    fn drop_on_sell(&mut self, drag: Drag, env: &mut ItemEnv<'_>) -> DropOutcome {
        if self.sell_disabled {
            return self.revert(drag, RevertReason::SellDisabled);
        }
        let Some((kind, purchased, price)) = self
            .items
            .get(&drag.item)
            .map(|item| (item.kind(), item.is_purchased(), item.template().price))
        else {
            return DropOutcome::Reverted(RevertReason::NotDragging);
        };

        if !purchased {
            if kind != ItemKind::Consumable {
                return self.revert(drag, RevertReason::NotOwned);
            }
            if !env.player.spend(price) {
                return self.revert(drag, RevertReason::CannotAfford);
            }
            self.settle_purchase(drag.item, price, env);
            self.consume(drag.item, env);
            return DropOutcome::Consumed;
        }

        let value = self
            .items
            .get(&drag.item)
            .map(|item| item.sell_value(self.tuning.sell_fraction))
            .unwrap_or(0);
        let total = env.player.add_currency(i64::from(value));
        self.remove_item(drag.item, env.bus, env.player);
        log::info!("Sold {:?} for {}", drag.item, value);
        env.bus.publish(GameEvent::ItemSold {
            item: drag.item,
            value,
        });
        env.bus.publish(GameEvent::CurrencyChanged {
            delta: i64::from(value),
            total,
        });
        DropOutcome::Sold { value }
    }

    /// Fire once, ignoring triggers and gates, then destroy
    fn consume(&mut self, id: ItemId, env: &mut ItemEnv<'_>) {
        if let Some(item) = self.items.get_mut(&id) {
            item.fire(None, env);
        }
        self.remove_item(id, env.bus, env.player);
        env.bus.publish(GameEvent::ItemConsumed { item: id });
    }

    // === Firing ===

    pub fn begin_frame(&mut self, dt: f32) {
        self.frame_fires.clear();
        for item in self.items.values_mut() {
            item.begin_frame(dt);
        }
    }

    /// Entering Aiming: per-shot counters and cooldown bypass reset
    pub fn on_enter_aiming(&mut self) {
        for item in self.items.values_mut() {
            item.reset_shot();
        }
    }

    /// Bus route for `Listener::Trigger`
    pub fn notify_trigger(
        &mut self,
        id: ItemId,
        index: usize,
        event: &GameEvent,
        env: &mut ItemEnv<'_>,
    ) -> Result<(), ListenerError> {
        let Some(item) = self.items.get_mut(&id) else {
            log::debug!("Event for removed {:?}", id);
            return Ok(());
        };
        if !item.is_active() {
            return Ok(());
        }
        let view = TriggerView {
            entities: &*env.entities,
            markers: &*env.markers,
        };
        let passed = item
            .triggers
            .get_mut(index)
            .is_some_and(|trigger| trigger.observe(id, event, &view));
        if passed {
            self.try_fire(id, Some(event), env);
        }
        Ok(())
    }

    /// Run the gate chain and fire on success; true if it fired
    pub fn try_fire(&mut self, id: ItemId, event: Option<&GameEvent>, env: &mut ItemEnv<'_>) -> bool {
        let cap = self.tuning.frame_trigger_cap;
        let Some(item) = self.items.get_mut(&id) else {
            return false;
        };
        let fired = self.frame_fires.get(item.name()).copied().unwrap_or(0);
        if let Err(reason) = item.check_gate(fired, cap, env.rng) {
            log::debug!("`{}` did not fire: {:?}", item.name(), reason);
            return false;
        }
        *self.frame_fires.entry(item.name().to_string()).or_insert(0) += 1;
        item.fire(event, env);
        true
    }

    /// Fire an item directly, skipping triggers and gates
    pub fn force_trigger(&mut self, id: ItemId, env: &mut ItemEnv<'_>) -> Result<bool, ItemError> {
        let item = self.items.get_mut(&id).ok_or(ItemError::UnknownItem(id))?;
        if !item.template().can_be_force_triggered {
            return Err(ItemError::NotForceTriggerable(id));
        }
        if item.is_inert() || !item.is_purchased() {
            return Ok(false);
        }
        item.fire(None, env);
        Ok(true)
    }

    /// Every item except `except` ignores its cooldown until the next aim
    pub fn bypass_cooldowns(&mut self, except: ItemId) {
        for item in self.items.values_mut().filter(|item| item.id != except) {
            item.bypass_cooldown();
        }
    }
}
