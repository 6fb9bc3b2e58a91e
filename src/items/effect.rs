//! Item effects
//!
//! What an item does when it fires. Each effect rolls its own chance on top
//! of the item's trigger chance. Effects that reach beyond the entity list
//! and the wallet (bonking, granting balls, refreshing other items) are
//! returned as `EffectCommand`s and applied by the game after the current
//! event drain.

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::items::ItemId;
use crate::items::manager::ItemEnv;
use crate::items::player::PlayerState;
use crate::sim::bonkable::{BonkParams, EntityHandle};
use crate::sim::events::{GameEvent, ListenerError};

/// Effect variants, as written in item templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectKind {
    /// Add value to the event's entity (or a random one)
    AddValue { amount: f64 },
    /// Scale the value of the event's entity (or a random one)
    MultiplyValue { factor: f64 },
    GainCurrency { amount: i64 },
    ExtraBall { count: u32 },
    SetOnFire { stacks: u32 },
    /// Passive: adds to every bonk while the effect is initialized
    BonkPower { amount: f64 },
    MarkEntity,
    /// Bonk a random live entity
    BonkRandom { power: f64 },
    /// Let every other item skip its cooldown for the rest of the shot
    RefreshCooldowns,
}

impl EffectKind {
    pub fn describe(&self, power: f64) -> String {
        match self {
            EffectKind::AddValue { amount } => format!("add {} value", amount * power),
            EffectKind::MultiplyValue { factor } => {
                format!("multiply value by {}", scaled_factor(*factor, power))
            }
            EffectKind::GainCurrency { amount } => {
                format!("gain {} currency", scaled_currency(*amount, power))
            }
            EffectKind::ExtraBall { count } => format!("gain {count} extra ball(s)"),
            EffectKind::SetOnFire { stacks } => format!("set the target on fire ({stacks})"),
            EffectKind::BonkPower { amount } => format!("+{} bonk power", amount * power),
            EffectKind::MarkEntity => "mark the target".into(),
            EffectKind::BonkRandom { power: bonk } => {
                format!("bonk a random target for {}", bonk * power)
            }
            EffectKind::RefreshCooldowns => "refresh the cooldowns of your other items".into(),
        }
    }
}

fn scaled_factor(factor: f64, power: f64) -> f64 {
    1.0 + (factor - 1.0) * power
}

fn scaled_currency(amount: i64, power: f64) -> i64 {
    (amount as f64 * power).round() as i64
}

/// Deferred work produced by an effect
#[derive(Debug, Clone, PartialEq)]
pub enum EffectCommand {
    Bonk(BonkParams),
    GrantBalls(u32),
    BypassCooldowns { except: ItemId },
    /// A temporary item ran out of uses
    Expire(ItemId),
}

/// Runtime effect owned by one item
#[derive(Debug, Clone, PartialEq)]
pub struct ItemEffect {
    kind: EffectKind,
    /// Independent fire chance in [0, 1]
    pub chance: f64,
    pub power_add: f64,
    pub power_mult: f64,
    initialized: bool,
    /// Passive bonus currently applied to the player
    applied_bonus: f64,
}

impl ItemEffect {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            chance: 1.0,
            power_add: 0.0,
            power_mult: 1.0,
            initialized: false,
            applied_bonus: 0.0,
        }
    }

    pub fn kind(&self) -> &EffectKind {
        &self.kind
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Combined power adjustment
    pub fn power(&self) -> f64 {
        (1.0 + self.power_add) * self.power_mult
    }

    pub fn describe(&self) -> String {
        self.kind.describe(self.power())
    }

    /// Becoming the active list; safe to call repeatedly
    pub fn initialize(&mut self, player: &mut PlayerState) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        if let EffectKind::BonkPower { amount } = self.kind {
            self.applied_bonus = amount * self.power();
            player.bonk_power_bonus += self.applied_bonus;
        }
    }

    /// Leaving the active list; safe to call repeatedly
    pub fn destroy(&mut self, player: &mut PlayerState) {
        if !self.initialized {
            return;
        }
        self.initialized = false;
        player.bonk_power_bonus -= self.applied_bonus;
        self.applied_bonus = 0.0;
    }

    /// Roll this effect's chance and apply it. Ok(true) if it fired.
    pub fn try_fire(
        &self,
        owner: ItemId,
        event: Option<&GameEvent>,
        env: &mut ItemEnv<'_>,
    ) -> Result<bool, ListenerError> {
        let roll: f64 = env.rng.random();
        if roll > self.chance {
            return Ok(false);
        }
        self.apply(owner, event, env)?;
        Ok(true)
    }

    fn apply(
        &self,
        owner: ItemId,
        event: Option<&GameEvent>,
        env: &mut ItemEnv<'_>,
    ) -> Result<(), ListenerError> {
        let power = self.power();
        match &self.kind {
            EffectKind::AddValue { amount } => {
                let Some(target) = self.target(event, env) else {
                    return Ok(());
                };
                let gain = amount * power;
                if !gain.is_finite() {
                    return Err(ListenerError::NonFinite(owner));
                }
                if let Some(entity) = env.entities.live_mut(target) {
                    entity.value += gain;
                }
            }
            EffectKind::MultiplyValue { factor } => {
                let Some(target) = self.target(event, env) else {
                    return Ok(());
                };
                if let Some(entity) = env.entities.live_mut(target) {
                    let value = entity.value * scaled_factor(*factor, power);
                    if !value.is_finite() {
                        return Err(ListenerError::NonFinite(owner));
                    }
                    entity.value = value;
                }
            }
            EffectKind::GainCurrency { amount } => {
                let delta = scaled_currency(*amount, power);
                if delta != 0 {
                    let total = env.player.add_currency(delta);
                    env.bus.publish(GameEvent::CurrencyChanged { delta, total });
                }
            }
            EffectKind::ExtraBall { count } => {
                env.commands.push(EffectCommand::GrantBalls(*count));
            }
            EffectKind::SetOnFire { stacks } => {
                let Some(target) = self.target(event, env) else {
                    return Ok(());
                };
                if let Some(entity) = env.entities.live_mut(target) {
                    entity.fire_stacks += stacks;
                    env.bus.publish(GameEvent::SetOnFire {
                        entity: target,
                        stacks: *stacks,
                        item: Some(owner),
                    });
                }
            }
            // Passive: applied in initialize/destroy
            EffectKind::BonkPower { .. } => {}
            EffectKind::MarkEntity => {
                if let Some(target) = self.target(event, env) {
                    env.markers.mark(target);
                }
            }
            EffectKind::BonkRandom { power: bonk } => {
                let Some(target) = random_live(env) else {
                    return Ok(());
                };
                let mut params = BonkParams::new(target, bonk * power);
                params.causing_item = Some(owner);
                if let Some(entity) = env.entities.get(target) {
                    params.position = entity.position;
                }
                env.commands.push(EffectCommand::Bonk(params));
            }
            EffectKind::RefreshCooldowns => {
                env.commands
                    .push(EffectCommand::BypassCooldowns { except: owner });
            }
        }
        Ok(())
    }

    /// The event's live entity, else a random live one
    fn target(&self, event: Option<&GameEvent>, env: &mut ItemEnv<'_>) -> Option<EntityHandle> {
        event
            .and_then(GameEvent::entity)
            .filter(|&handle| env.entities.live(handle).is_some())
            .or_else(|| random_live(env))
    }
}

fn random_live(env: &mut ItemEnv<'_>) -> Option<EntityHandle> {
    let handles = env.entities.active_handles();
    handles.choose(&mut *env.rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passive_bonus_is_idempotent() {
        let mut player = PlayerState::default();
        let mut effect = ItemEffect::new(EffectKind::BonkPower { amount: 2.0 });
        effect.power_add = 0.5;

        effect.initialize(&mut player);
        effect.initialize(&mut player);
        assert_eq!(player.bonk_power_bonus, 3.0);

        effect.destroy(&mut player);
        effect.destroy(&mut player);
        assert_eq!(player.bonk_power_bonus, 0.0);

        effect.initialize(&mut player);
        assert_eq!(player.bonk_power_bonus, 3.0);
    }

    #[test]
    fn test_power_combines_add_and_mult() {
        let mut effect = ItemEffect::new(EffectKind::AddValue { amount: 4.0 });
        effect.power_add = 1.0;
        effect.power_mult = 1.5;
        assert_eq!(effect.power(), 3.0);
        assert_eq!(effect.describe(), "add 12 value");
    }

    #[test]
    fn test_parses_tagged_json() {
        let kind: EffectKind =
            serde_json::from_str(r#"{ "type": "gain_currency", "amount": 3 }"#).unwrap();
        assert_eq!(kind, EffectKind::GainCurrency { amount: 3 });
        let kind: EffectKind = serde_json::from_str(r#"{ "type": "mark_entity" }"#).unwrap();
        assert_eq!(kind, EffectKind::MarkEntity);
    }
}
