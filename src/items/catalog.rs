//! Item templates and the catalog they are loaded into

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::items::effect::{EffectKind, ItemEffect};
use crate::items::trigger::TriggerKind;
use crate::items::{ItemKind, Rarity};
use crate::tuning::ConfigError;

fn one() -> f64 {
    1.0
}

/// An effect entry in a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    pub effect: EffectKind,
    #[serde(default = "one")]
    pub chance: f64,
    #[serde(default)]
    pub power_add: f64,
    #[serde(default = "one")]
    pub power_mult: f64,
}

impl EffectSpec {
    pub fn new(effect: EffectKind) -> Self {
        Self {
            effect,
            chance: 1.0,
            power_add: 0.0,
            power_mult: 1.0,
        }
    }

    pub fn with_chance(mut self, chance: f64) -> Self {
        self.chance = chance;
        self
    }

    pub fn instantiate(&self) -> ItemEffect {
        let mut effect = ItemEffect::new(self.effect.clone());
        effect.chance = self.chance;
        effect.power_add = self.power_add;
        effect.power_mult = self.power_mult;
        effect
    }
}

/// Immutable description of an item; instances share it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemTemplate {
    /// Also the duplicate-merge key
    pub name: String,
    pub kind: ItemKind,
    pub rarity: Rarity,
    pub price: u32,
    pub trigger_chance: f64,
    /// Seconds after firing before the item may fire again
    pub cooldown: f32,
    /// Fires allowed per shot
    pub per_shot_limit: Option<u32>,
    /// Uses before the item removes itself
    pub temporary_uses: Option<u32>,
    pub can_be_force_triggered: bool,
    pub keep_triggers_on_upgrade: bool,
    /// Hide the description
    pub mysterious: bool,
    pub triggers: Vec<TriggerKind>,
    pub effects: Vec<EffectSpec>,
    pub holofoil_effects: Vec<EffectSpec>,
    /// Template a duplicate merge produces
    pub upgraded_item: Option<String>,
}

impl Default for ItemTemplate {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ItemKind::Normal,
            rarity: Rarity::Common,
            price: 3,
            trigger_chance: 1.0,
            cooldown: 0.0,
            per_shot_limit: None,
            temporary_uses: None,
            can_be_force_triggered: false,
            keep_triggers_on_upgrade: false,
            mysterious: false,
            triggers: Vec::new(),
            effects: Vec::new(),
            holofoil_effects: Vec::new(),
            upgraded_item: None,
        }
    }
}

impl ItemTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_price(mut self, price: u32) -> Self {
        self.price = price;
        self
    }

    pub fn with_chance(mut self, chance: f64) -> Self {
        self.trigger_chance = chance;
        self
    }

    pub fn with_cooldown(mut self, seconds: f32) -> Self {
        self.cooldown = seconds;
        self
    }

    pub fn with_per_shot_limit(mut self, limit: u32) -> Self {
        self.per_shot_limit = Some(limit);
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerKind) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_effect(self, effect: EffectKind) -> Self {
        self.with_effect_spec(EffectSpec::new(effect))
    }

    pub fn with_effect_spec(mut self, spec: EffectSpec) -> Self {
        self.effects.push(spec);
        self
    }

    pub fn with_holofoil_effect(mut self, effect: EffectKind) -> Self {
        self.holofoil_effects.push(EffectSpec::new(effect));
        self
    }

    pub fn upgrades_into(mut self, name: impl Into<String>) -> Self {
        self.upgraded_item = Some(name.into());
        self
    }

    pub fn keeping_triggers(mut self) -> Self {
        self.keep_triggers_on_upgrade = true;
        self
    }

    pub fn temporary(mut self, uses: u32) -> Self {
        self.temporary_uses = Some(uses);
        self
    }

    pub fn force_triggerable(mut self) -> Self {
        self.can_be_force_triggered = true;
        self
    }

    pub fn mysterious(mut self) -> Self {
        self.mysterious = true;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("item template without a name".into()));
        }
        let chances = std::iter::once(self.trigger_chance).chain(
            self.effects
                .iter()
                .chain(&self.holofoil_effects)
                .map(|spec| spec.chance),
        );
        for chance in chances {
            if !(0.0..=1.0).contains(&chance) {
                return Err(ConfigError::ChanceOutOfRange {
                    item: self.name.clone(),
                    chance,
                });
            }
        }
        if self.cooldown < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "item `{}` has a negative cooldown",
                self.name
            )));
        }
        Ok(())
    }
}

/// Every known item template, by name
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    templates: BTreeMap<String, Rc<ItemTemplate>>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a catalog
    pub fn from_templates(
        templates: impl IntoIterator<Item = ItemTemplate>,
    ) -> Result<Self, ConfigError> {
        let mut catalog = Self::new();
        for template in templates {
            catalog.insert(template)?;
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a JSON array of templates
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let templates: Vec<ItemTemplate> = serde_json::from_str(json)?;
        let catalog = Self::from_templates(templates)?;
        log::info!("Loaded {} item templates", catalog.len());
        Ok(catalog)
    }

    pub fn insert(&mut self, template: ItemTemplate) -> Result<(), ConfigError> {
        template.validate()?;
        if self.templates.contains_key(&template.name) {
            return Err(ConfigError::DuplicateTemplate(template.name));
        }
        self.templates
            .insert(template.name.clone(), Rc::new(template));
        Ok(())
    }

    /// Every upgrade must name a known template
    pub fn validate(&self) -> Result<(), ConfigError> {
        for template in self.templates.values() {
            let Some(upgrade) = &template.upgraded_item else {
                continue;
            };
            if !self.templates.contains_key(upgrade) {
                return Err(ConfigError::UnknownUpgrade {
                    item: template.name.clone(),
                    upgrade: upgrade.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Rc<ItemTemplate>> {
        self.templates.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
