//! Player-wide state touched by items: the wallet and passive bonuses

/// Currency and passive modifiers for the current run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerState {
    currency: i64,
    /// Extra power added to every bonk; maintained by passive effects
    pub bonk_power_bonus: f64,
}

impl PlayerState {
    pub fn with_currency(currency: i64) -> Self {
        Self {
            currency,
            ..Self::default()
        }
    }

    pub fn currency(&self) -> i64 {
        self.currency
    }

    /// Add (or remove, if negative) currency; returns the new total
    pub fn add_currency(&mut self, amount: i64) -> i64 {
        self.currency = self.currency.saturating_add(amount);
        self.currency
    }

    /// Purchases never take the wallet negative
    pub fn spend(&mut self, amount: u32) -> bool {
        if self.can_afford(amount) {
            self.currency -= i64::from(amount);
            true
        } else {
            false
        }
    }

    pub fn can_afford(&self, amount: u32) -> bool {
        self.currency >= i64::from(amount)
    }
}
