//! Player progress: upgrade panels, currency exchange, combat record and
//! the passive-income debuff.
//!
//! The whole blob is persisted under [`PROGRESS_KEY`] after every change.
//! Balances themselves live in the [`CurrencyLedger`]; the progress blob
//! carries a copy of them taken at the last save.

use crate::clock::SharedClock;
use crate::currency::{Currency, CurrencyData, CurrencyLedger};
use crate::storage::{load_json, save_json, SharedStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Storage key of the progress blob.
pub const PROGRESS_KEY: &str = "player_progress";

/// How long a lost fight halves passive income.
pub const DEBUFF_DURATION: Duration = Duration::from_secs(60);

/// Passive income factor while the debuff is active.
pub const DEBUFF_FACTOR: f64 = 0.5;

/// Share of every exchange kept by the trading post.
pub const TRADE_FEE: f64 = 0.05;

/// Errors from purchases and trades.
#[derive(Debug, Error, PartialEq)]
pub enum ProgressError {
    #[error("No upgrade {index} in the {panel} panel")]
    UnknownUpgrade { panel: Panel, index: usize },

    #[error("Not enough {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: Currency,
        needed: f64,
        available: f64,
    },

    #[error("Invalid trade amount: {0}")]
    InvalidAmount(f64),

    #[error("Cannot exchange {0} for itself")]
    SameCurrency(Currency),
}

// ============================================================================
// Upgrades
// ============================================================================

/// Which panel an upgrade belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    Mining,
    Spaceship,
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Panel::Mining => f.write_str("mining"),
            Panel::Spaceship => f.write_str("spaceship"),
        }
    }
}

/// What buying a level does to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "currency", rename_all = "camelCase")]
pub enum UpgradeEffect {
    /// `bonus` more per tap.
    PerClick(Currency),
    /// `bonus` added to the tap multiplier.
    Multiplier(Currency),
    /// `bonus` more per second, passively.
    Passive(Currency),
}

/// One purchasable upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upgrade {
    pub name: String,
    pub level: u32,
    /// Price of the next level.
    pub cost: f64,
    /// Factor applied to `cost` after each purchase.
    pub cost_growth: f64,
    /// Size of the effect per level.
    pub bonus: f64,
    /// Currency the upgrade is paid in.
    pub currency: Currency,
    pub effect: UpgradeEffect,
}

impl Upgrade {
    pub fn new(name: impl Into<String>, cost: f64, currency: Currency, effect: UpgradeEffect) -> Self {
        Self {
            name: name.into(),
            level: 0,
            cost,
            cost_growth: 1.15,
            bonus: 1.0,
            currency,
            effect,
        }
    }

    pub fn with_growth(mut self, cost_growth: f64) -> Self {
        self.cost_growth = cost_growth;
        self
    }

    pub fn with_bonus(mut self, bonus: f64) -> Self {
        self.bonus = bonus;
        self
    }

    fn apply(&self, ledger: &mut CurrencyLedger) {
        match self.effect {
            UpgradeEffect::PerClick(currency) => ledger.add_per_click(currency, self.bonus),
            UpgradeEffect::Multiplier(currency) => {
                let multiplier = ledger.multiplier(currency) + self.bonus;
                ledger.set_multiplier(currency, multiplier);
            }
            UpgradeEffect::Passive(currency) => ledger.add_passive_rate(currency, self.bonus),
        }
    }
}

lazy_static::lazy_static! {
    /// Mining panel catalog at level zero.
    pub static ref MINING_UPGRADES: Vec<Upgrade> = vec![
        Upgrade::new("Laser Drill", 10.0, Currency::Dilithium, UpgradeEffect::PerClick(Currency::Dilithium)),
        Upgrade::new("Plasma Cutter", 100.0, Currency::Dilithium, UpgradeEffect::PerClick(Currency::Dilithium))
            .with_bonus(5.0),
        Upgrade::new("Resonance Amplifier", 500.0, Currency::Dilithium, UpgradeEffect::Multiplier(Currency::Dilithium))
            .with_growth(1.5)
            .with_bonus(0.5),
        Upgrade::new("Lunar Siphon", 50.0, Currency::Lunar, UpgradeEffect::PerClick(Currency::Lunar))
            .with_bonus(0.5),
    ];

    /// Spaceship panel catalog at level zero.
    pub static ref SHIP_UPGRADES: Vec<Upgrade> = vec![
        Upgrade::new("Mining Drone", 25.0, Currency::Dilithium, UpgradeEffect::Passive(Currency::Dilithium)),
        Upgrade::new("Cargo Hauler", 250.0, Currency::Dilithium, UpgradeEffect::Passive(Currency::Dilithium))
            .with_bonus(8.0),
        Upgrade::new("Lunar Refinery", 100.0, Currency::Lunar, UpgradeEffect::Passive(Currency::Lunar))
            .with_bonus(0.5),
        Upgrade::new("Xeno Scanner", 20.0, Currency::Xenobit, UpgradeEffect::Passive(Currency::Xenobit))
            .with_growth(1.3)
            .with_bonus(0.2),
    ];
}

// ============================================================================
// Trading
// ============================================================================

/// Worth of one unit in dilithium.
pub fn exchange_value(currency: Currency) -> f64 {
    match currency {
        Currency::Dilithium => 1.0,
        Currency::Lunar => 10.0,
        Currency::Xenobit => 100.0,
        Currency::Quark => 1000.0,
    }
}

/// Amount of `to` received for `amount` of `from`, after the fee.
pub fn quote(from: Currency, to: Currency, amount: f64) -> f64 {
    amount * exchange_value(from) / exchange_value(to) * (1.0 - TRADE_FEE)
}

// ============================================================================
// Progress blob
// ============================================================================

/// Everything about the player that outlives a session, apart from dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerProgress {
    pub resources: CurrencyData,
    pub mining_upgrades: Vec<Upgrade>,
    pub ship_upgrades: Vec<Upgrade>,
    pub combat_wins: u32,
    pub combat_losses: u32,
    /// Unix millis at which the passive debuff ends.
    pub debuff_end_time: Option<u64>,
}

impl Default for PlayerProgress {
    fn default() -> Self {
        Self {
            resources: CurrencyData::default(),
            mining_upgrades: MINING_UPGRADES.clone(),
            ship_upgrades: SHIP_UPGRADES.clone(),
            combat_wins: 0,
            combat_losses: 0,
            debuff_end_time: None,
        }
    }
}

impl PlayerProgress {
    /// Total levels bought on the spaceship panel.
    pub fn ship_power(&self) -> u32 {
        self.ship_upgrades.iter().map(|u| u.level).sum()
    }
}

/// Owns and persists the [`PlayerProgress`] blob.
pub struct ProgressTracker {
    store: SharedStore,
    clock: SharedClock,
    progress: PlayerProgress,
}

impl ProgressTracker {
    /// Load saved progress, starting fresh if there is none or it is unreadable.
    ///
    /// Catalog entries missing from an older save are appended at level zero.
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        let mut progress: PlayerProgress =
            load_json(store.as_ref(), PROGRESS_KEY).unwrap_or_default();
        fill_catalog(&mut progress.mining_upgrades, &MINING_UPGRADES);
        fill_catalog(&mut progress.ship_upgrades, &SHIP_UPGRADES);

        Self {
            store,
            clock,
            progress,
        }
    }

    pub fn progress(&self) -> &PlayerProgress {
        &self.progress
    }

    pub fn upgrades(&self, panel: Panel) -> &[Upgrade] {
        match panel {
            Panel::Mining => &self.progress.mining_upgrades,
            Panel::Spaceship => &self.progress.ship_upgrades,
        }
    }

    /// Buy one level of upgrade `index` on `panel`.
    ///
    /// Spends the cost, raises the level, grows the cost and applies the
    /// effect. Returns the upgrade as it is after the purchase.
    pub fn purchase(
        &mut self,
        panel: Panel,
        index: usize,
        ledger: &mut CurrencyLedger,
    ) -> Result<Upgrade, ProgressError> {
        let upgrade = match panel {
            Panel::Mining => self.progress.mining_upgrades.get_mut(index),
            Panel::Spaceship => self.progress.ship_upgrades.get_mut(index),
        }
        .ok_or(ProgressError::UnknownUpgrade { panel, index })?;

        if !ledger.spend(upgrade.currency, upgrade.cost) {
            return Err(ProgressError::InsufficientFunds {
                currency: upgrade.currency,
                needed: upgrade.cost,
                available: ledger.get(upgrade.currency),
            });
        }

        upgrade.level += 1;
        upgrade.cost *= upgrade.cost_growth;
        upgrade.apply(ledger);
        let bought = upgrade.clone();

        tracing::debug!("Bought {} level {}", bought.name, bought.level);
        self.save(ledger);
        Ok(bought)
    }

    /// Exchange `amount` of `from` for `to` at the fixed rates minus the fee.
    /// Returns the amount received.
    pub fn trade(
        &mut self,
        from: Currency,
        to: Currency,
        amount: f64,
        ledger: &mut CurrencyLedger,
    ) -> Result<f64, ProgressError> {
        if from == to {
            return Err(ProgressError::SameCurrency(from));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ProgressError::InvalidAmount(amount));
        }
        if !ledger.spend(from, amount) {
            return Err(ProgressError::InsufficientFunds {
                currency: from,
                needed: amount,
                available: ledger.get(from),
            });
        }

        let received = quote(from, to, amount);
        ledger.add(to, received);
        self.save(ledger);
        Ok(received)
    }

    // ------------------------------------------------------------------
    // Combat record and debuff
    // ------------------------------------------------------------------

    pub fn record_victory(&mut self) {
        self.progress.combat_wins += 1;
        self.persist();
    }

    /// Count a loss and (re)start the passive debuff.
    pub fn record_defeat(&mut self) {
        self.progress.combat_losses += 1;
        let end = self.clock.now_millis() + DEBUFF_DURATION.as_millis() as u64;
        self.progress.debuff_end_time = Some(end);
        tracing::debug!("Passive debuff active until {}", end);
        self.persist();
    }

    /// Time left on the debuff, if it is active.
    pub fn debuff_remaining(&self) -> Option<Duration> {
        let end = self.progress.debuff_end_time?;
        let now = self.clock.now_millis();
        (end > now).then(|| Duration::from_millis(end - now))
    }

    pub fn is_debuffed(&self) -> bool {
        self.debuff_remaining().is_some()
    }

    /// Factor to apply to passive income right now.
    pub fn passive_factor(&self) -> f64 {
        if self.is_debuffed() {
            DEBUFF_FACTOR
        } else {
            1.0
        }
    }

    /// Accrue passive income for `dt` and drop an expired debuff.
    pub fn tick(&mut self, dt: Duration, ledger: &mut CurrencyLedger) {
        ledger.update(dt, self.passive_factor());
        if self.progress.debuff_end_time.is_some() && !self.is_debuffed() {
            self.progress.debuff_end_time = None;
            self.persist();
        }
    }

    /// Copy the ledger's balances into the blob and write it.
    pub fn save(&mut self, ledger: &CurrencyLedger) -> bool {
        self.progress.resources = ledger.snapshot();
        self.persist()
    }

    /// Start over with fresh catalogs and no record.
    pub fn reset(&mut self) {
        self.progress = PlayerProgress::default();
        self.persist();
    }

    fn persist(&self) -> bool {
        save_json(self.store.as_ref(), PROGRESS_KEY, &self.progress)
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("progress", &self.progress)
            .finish()
    }
}

fn fill_catalog(saved: &mut Vec<Upgrade>, catalog: &[Upgrade]) {
    for entry in catalog {
        if !saved.iter().any(|u| u.name == entry.name) {
            saved.push(entry.clone());
        }
    }
}
