//! Game balance tuning
//!
//! Loaded from JSON; every field falls back to its default when omitted.

use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid tuning: {0}")]
    Invalid(String),
    #[error("duplicate item template `{0}`")]
    DuplicateTemplate(String),
    #[error("item `{item}` upgrades into unknown item `{upgrade}`")]
    UnknownUpgrade { item: String, upgrade: String },
    #[error("item `{item}` has chance {chance} outside [0, 1]")]
    ChanceOutOfRange { item: String, chance: f64 },
}

/// Grid used to place entities during Populate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnGrid {
    pub columns: u32,
    pub rows: u32,
    /// World size of one cell; entities sit at cell centers
    pub cell_size: f32,
    /// World position of the grid's bottom-left corner
    pub origin: Vec2,
}

impl Default for SpawnGrid {
    fn default() -> Self {
        Self {
            columns: 6,
            rows: 4,
            cell_size: 64.0,
            origin: Vec2::new(-192.0, -64.0),
        }
    }
}

impl SpawnGrid {
    pub fn cell_count(&self) -> usize {
        (self.columns * self.rows) as usize
    }

    /// Center of the cell at `index` (row-major)
    pub fn cell_center(&self, index: usize) -> Vec2 {
        let columns = self.columns.max(1) as usize;
        let col = (index % columns) as f32;
        let row = (index / columns) as f32;
        self.origin + Vec2::new(col + 0.5, row + 0.5) * self.cell_size
    }
}

/// Round lifecycle tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundTuning {
    /// Balls the player may fire per round
    pub balls_per_round: u32,
    /// Entities spawned during Populate (clamped to the grid size)
    pub entities_per_round: u32,
    /// Seconds between consecutive spawns during Populate
    pub spawn_stagger: f32,
    /// Seconds between consecutive pops during Scoring
    pub pop_stagger: f32,
    /// Seconds between the payout and signalling round completion
    pub completion_delay: f32,
    /// Currency per whole multiple of the round goal
    pub payout_scaling: i64,
    pub grid: SpawnGrid,
    /// Chance a spawned cabbage is a rainbow cabbage
    pub rainbow_chance: f64,
    /// Chance a spawn is an enemy instead of a cabbage
    pub enemy_chance: f64,
    /// Value a fresh cabbage starts with
    pub start_value: f64,
    /// Where balls are launched from
    pub launch_origin: Vec2,
    /// A shot running longer than this has its balls despawned
    pub max_bounce_seconds: f32,
}

impl Default for RoundTuning {
    fn default() -> Self {
        Self {
            balls_per_round: 3,
            entities_per_round: 8,
            spawn_stagger: 0.08,
            pop_stagger: 0.12,
            completion_delay: 0.75,
            payout_scaling: 5,
            grid: SpawnGrid::default(),
            rainbow_chance: 0.05,
            enemy_chance: 0.1,
            start_value: 1.0,
            launch_origin: Vec2::new(0.0, -300.0),
            max_bounce_seconds: 30.0,
        }
    }
}

/// Bonk resolution tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BonkTuning {
    /// Value gained per point of bonk power
    pub value_per_power: f64,
    /// Health of a freshly spawned enemy
    pub enemy_health: f64,
}

impl Default for BonkTuning {
    fn default() -> Self {
        Self {
            value_per_power: 1.0,
            enemy_health: 3.0,
        }
    }
}

/// Merge footprint tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeTuning {
    /// Radius of a tier 0 cabbage
    pub base_radius: f32,
    /// Fractional radius growth per tier
    pub radius_growth: f32,
}

impl Default for MergeTuning {
    fn default() -> Self {
        Self {
            base_radius: 20.0,
            radius_growth: 0.25,
        }
    }
}

/// Item engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemTuning {
    /// Fires allowed per item name per tick, shared by every copy of that item
    pub frame_trigger_cap: u32,
    /// Fraction of the price refunded when selling
    pub sell_fraction: f64,
    pub inventory_slots: usize,
    pub shop_slots: usize,
    /// Events processed by one bus drain before the rest are dropped
    pub max_events_per_drain: usize,
}

impl Default for ItemTuning {
    fn default() -> Self {
        Self {
            frame_trigger_cap: 10,
            sell_fraction: 0.5,
            inventory_slots: 6,
            shop_slots: 3,
            max_events_per_drain: 4096,
        }
    }
}

/// Fire status tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireTuning {
    /// Value a burning entity gains per stack at the end of each shot
    pub value_per_stack: f64,
}

impl Default for FireTuning {
    fn default() -> Self {
        Self {
            value_per_stack: 1.0,
        }
    }
}

/// Complete balance configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub round: RoundTuning,
    pub bonk: BonkTuning,
    pub merge: MergeTuning,
    pub items: ItemTuning,
    pub fire: FireTuning,
}

impl Tuning {
    /// Parse and validate tuning from JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let tuning: Tuning = serde_json::from_str(json)?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Load tuning from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let tuning = Self::from_json(&json)?;
        log::info!("Loaded tuning from {}", path.display());
        Ok(tuning)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let round = &self.round;
        if round.grid.cell_count() == 0 {
            return Err(ConfigError::Invalid("spawn grid has no cells".into()));
        }
        if round.grid.cell_size <= 0.0 {
            return Err(ConfigError::Invalid("spawn grid cell size must be positive".into()));
        }
        if round.spawn_stagger < 0.0 || round.pop_stagger < 0.0 || round.completion_delay < 0.0 {
            return Err(ConfigError::Invalid("delays must not be negative".into()));
        }
        if round.max_bounce_seconds <= 0.0 {
            return Err(ConfigError::Invalid("max bounce time must be positive".into()));
        }
        for (name, chance) in [
            ("rainbow_chance", round.rainbow_chance),
            ("enemy_chance", round.enemy_chance),
            ("sell_fraction", self.items.sell_fraction),
        ] {
            if !(0.0..=1.0).contains(&chance) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1]")));
            }
        }
        if self.merge.base_radius <= 0.0 {
            return Err(ConfigError::Invalid("base radius must be positive".into()));
        }
        if self.items.max_events_per_drain == 0 {
            return Err(ConfigError::Invalid("max events per drain must be positive".into()));
        }
        Ok(())
    }
}
