//! Runtime item
//!
//! Gate order for an automatic fire: frozen/inert, per-frame cap, cooldown,
//! trigger chance, per-shot limit. A passing item runs every effect in its
//! active list (each rolling its own chance), resets its cooldown, counts
//! the fire and publishes `ItemTriggered` (plus `WeaponTriggered` for
//! weapons).

use std::rc::Rc;

use rand::Rng;
use rand_pcg::Pcg32;

use crate::items::catalog::ItemTemplate;
use crate::items::effect::{EffectCommand, ItemEffect};
use crate::items::manager::ItemEnv;
use crate::items::player::PlayerState;
use crate::items::trigger::Trigger;
use crate::items::{ItemId, ItemKind, SlotId};
use crate::sim::events::{EventBus, GameEvent};

/// Why an item did not fire; expected control flow, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    Frozen,
    Inert,
    FrameCap,
    Cooldown,
    Chance,
    ShotLimit,
}

#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    template: Rc<ItemTemplate>,
    pub(crate) triggers: Vec<Trigger>,
    effects: Vec<ItemEffect>,
    holofoil_effects: Vec<ItemEffect>,
    holofoil: bool,
    /// Suppressed by a frozen slot
    pub(crate) frozen: bool,
    /// No effects at all; never fires
    inert: bool,
    cooldown_remaining: f32,
    /// Cooldowns ignored for the rest of the shot
    bypass_cooldown: bool,
    times_triggered_this_shot: u32,
    times_triggered_total: u32,
    uses_left: Option<u32>,
    pub(crate) slot: Option<SlotId>,
    /// False while it sits unbought in the shop
    pub(crate) purchased: bool,
    pub(crate) keep_triggers_on_upgrade: bool,
    active: bool,
}

impl Item {
    pub fn new(id: ItemId, template: Rc<ItemTemplate>) -> Self {
        let triggers = template.triggers.iter().cloned().map(Trigger::new).collect();
        let effects = template.effects.iter().map(|s| s.instantiate()).collect();
        let holofoil_effects = template
            .holofoil_effects
            .iter()
            .map(|s| s.instantiate())
            .collect();
        let inert = template.effects.is_empty() && template.holofoil_effects.is_empty();
        if inert {
            log::warn!("Item `{}` has no effects and will never trigger", template.name);
        }

        Self {
            id,
            triggers,
            effects,
            holofoil_effects,
            holofoil: false,
            frozen: false,
            inert,
            cooldown_remaining: 0.0,
            bypass_cooldown: false,
            times_triggered_this_shot: 0,
            times_triggered_total: 0,
            uses_left: template.temporary_uses,
            slot: None,
            purchased: true,
            keep_triggers_on_upgrade: template.keep_triggers_on_upgrade,
            active: false,
            template,
        }
    }

    // === Queries ===

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn kind(&self) -> ItemKind {
        self.template.kind
    }

    pub fn template(&self) -> &ItemTemplate {
        &self.template
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn is_holofoil(&self) -> bool {
        self.holofoil
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_inert(&self) -> bool {
        self.inert
    }

    pub fn is_purchased(&self) -> bool {
        self.purchased
    }

    /// Subscribed and effects initialized
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn slot(&self) -> Option<SlotId> {
        self.slot
    }

    pub fn cooldown_remaining(&self) -> f32 {
        self.cooldown_remaining
    }

    pub fn times_triggered_this_shot(&self) -> u32 {
        self.times_triggered_this_shot
    }

    pub fn times_triggered_total(&self) -> u32 {
        self.times_triggered_total
    }

    pub fn uses_left(&self) -> Option<u32> {
        self.uses_left
    }

    pub fn keeps_triggers_on_upgrade(&self) -> bool {
        self.keep_triggers_on_upgrade
    }

    /// The list `fire` runs: holofoil effects when holofoil and present
    pub fn active_effects(&self) -> &[ItemEffect] {
        if self.holofoil && !self.holofoil_effects.is_empty() {
            &self.holofoil_effects
        } else {
            &self.effects
        }
    }

    fn active_effects_mut(&mut self) -> &mut Vec<ItemEffect> {
        if self.holofoil && !self.holofoil_effects.is_empty() {
            &mut self.holofoil_effects
        } else {
            &mut self.effects
        }
    }

    /// Player-facing text; mysterious items hide theirs
    pub fn description(&self) -> String {
        if self.template.mysterious {
            return "???".into();
        }
        let when: Vec<String> = self.triggers.iter().map(|t| t.kind().describe()).collect();
        let what: Vec<String> = self.active_effects().iter().map(ItemEffect::describe).collect();
        match (when.is_empty(), what.is_empty()) {
            (_, true) => "Does nothing".into(),
            (true, false) => capitalize(&what.join(", ")),
            (false, false) => format!("{}: {}", when.join(" or "), what.join(", ")),
        }
    }

    /// `price * fraction`, floored, at least 1
    pub fn sell_value(&self, fraction: f64) -> u32 {
        ((f64::from(self.template.price) * fraction).floor() as u32).max(1)
    }

    // === Lifecycle ===

    /// Subscribe triggers and initialize the active effect list
    pub fn activate(&mut self, bus: &mut EventBus, player: &mut PlayerState) {
        if self.active {
            return;
        }
        let id = self.id;
        for (index, trigger) in self.triggers.iter_mut().enumerate() {
            trigger.attach(bus, id, index);
        }
        for effect in self.active_effects_mut() {
            effect.initialize(player);
        }
        self.active = true;
    }

    /// Unsubscribe triggers and destroy every effect
    pub fn deactivate(&mut self, bus: &mut EventBus, player: &mut PlayerState) {
        for trigger in &mut self.triggers {
            trigger.detach(bus);
        }
        for effect in self.effects.iter_mut().chain(self.holofoil_effects.iter_mut()) {
            effect.destroy(player);
        }
        self.active = false;
    }

    /// Swap the trigger list; the item must be inactive
    pub(crate) fn replace_triggers(&mut self, triggers: Vec<Trigger>) {
        debug_assert!(!self.active);
        self.triggers = triggers;
    }

    /// Switch effect lists, destroying the old and initializing the new
    pub fn set_holofoil(&mut self, holofoil: bool, player: &mut PlayerState) {
        if self.holofoil == holofoil {
            return;
        }
        let active = self.active;
        if active {
            for effect in self.active_effects_mut() {
                effect.destroy(player);
            }
        }
        self.holofoil = holofoil;
        if active {
            for effect in self.active_effects_mut() {
                effect.initialize(player);
            }
        }
    }

    pub fn begin_frame(&mut self, dt: f32) {
        if self.cooldown_remaining > 0.0 {
            self.cooldown_remaining = (self.cooldown_remaining - dt).max(0.0);
        }
        for trigger in &mut self.triggers {
            trigger.begin_frame();
        }
    }

    /// Called on entering Aiming
    pub fn reset_shot(&mut self) {
        self.times_triggered_this_shot = 0;
        self.bypass_cooldown = false;
    }

    pub fn bypass_cooldown(&mut self) {
        self.bypass_cooldown = true;
    }

    /// Run the gate chain; consumes one chance roll once the cheaper gates pass
    pub fn check_gate(
        &self,
        fired_this_frame: u32,
        frame_cap: u32,
        rng: &mut Pcg32,
    ) -> Result<(), GateRejection> {
        if self.frozen {
            return Err(GateRejection::Frozen);
        }
        if self.inert {
            return Err(GateRejection::Inert);
        }
        if fired_this_frame >= frame_cap {
            return Err(GateRejection::FrameCap);
        }
        if self.cooldown_remaining > 0.0 && !self.bypass_cooldown {
            return Err(GateRejection::Cooldown);
        }
        let roll: f64 = rng.random();
        if roll > self.template.trigger_chance {
            return Err(GateRejection::Chance);
        }
        if let Some(limit) = self.template.per_shot_limit {
            if self.times_triggered_this_shot >= limit {
                return Err(GateRejection::ShotLimit);
            }
        }
        Ok(())
    }

    /// Run the active effects and record the fire.
    ///
    /// A failing effect is logged and skipped; the rest still run.
    pub fn fire(&mut self, event: Option<&GameEvent>, env: &mut ItemEnv<'_>) {
        let id = self.id;
        for effect in self.active_effects() {
            if let Err(err) = effect.try_fire(id, event, env) {
                log::warn!("Effect of `{}` failed: {}", self.name(), err);
            }
        }

        self.cooldown_remaining = self.template.cooldown;
        self.times_triggered_this_shot += 1;
        self.times_triggered_total += 1;
        log::debug!(
            "`{}` fired ({} this shot)",
            self.name(),
            self.times_triggered_this_shot
        );

        env.bus.publish(GameEvent::ItemTriggered { item: id });
        if self.kind() == ItemKind::Weapon {
            env.bus.publish(GameEvent::WeaponTriggered { item: id });
        }

        if let Some(uses) = self.uses_left.as_mut() {
            *uses = uses.saturating_sub(1);
            if *uses == 0 {
                env.commands.push(EffectCommand::Expire(id));
            }
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
