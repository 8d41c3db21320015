//! Currency ledger.
//!
//! Four currencies, each with a balance, a click multiplier, a per-click
//! yield and a passive per-second rate. The ledger persists itself after
//! every mutation and emits a [`GameEvent::CurrencyChanged`] keyed by the
//! currency name.

use crate::events::{EventBus, GameEvent};
use crate::format::format_number;
use crate::storage::{load_json, save_json, SharedStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Storage key of the currency blob.
pub const CURRENCY_KEY: &str = "currency_data";

/// The game's currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// Primary currency, mined by tapping the planet.
    Dilithium,
    Lunar,
    Xenobit,
    /// Rare currency earned from combat.
    Quark,
}

impl Currency {
    pub const ALL: [Currency; 4] = [
        Currency::Dilithium,
        Currency::Lunar,
        Currency::Xenobit,
        Currency::Quark,
    ];

    /// Lowercase name used for event topics and save keys.
    pub fn key(&self) -> &'static str {
        match self {
            Currency::Dilithium => "dilithium",
            Currency::Lunar => "lunar",
            Currency::Xenobit => "xenobit",
            Currency::Quark => "quark",
        }
    }

    fn index(self) -> usize {
        match self {
            Currency::Dilithium => 0,
            Currency::Lunar => 1,
            Currency::Xenobit => 2,
            Currency::Quark => 3,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Currency::Dilithium => "Dilithium",
            Currency::Lunar => "Lunar",
            Currency::Xenobit => "Xenobit",
            Currency::Quark => "Quark",
        };
        f.write_str(name)
    }
}

/// Persisted currency blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CurrencyData {
    pub dilithium: f64,
    pub lunar: f64,
    pub xenobit: f64,
    pub quark: f64,

    pub dilithium_multiplier: f64,
    pub lunar_multiplier: f64,
    pub xenobit_multiplier: f64,
    pub quark_multiplier: f64,

    pub dilithium_per_click: f64,
    pub lunar_per_click: f64,
    pub xenobit_per_click: f64,
    pub quark_per_click: f64,

    pub passive_dilithium: f64,
    pub passive_lunar: f64,
    pub passive_xenobit: f64,
    pub passive_quark: f64,
}

impl Default for CurrencyData {
    fn default() -> Self {
        Self {
            dilithium: 0.0,
            lunar: 0.0,
            xenobit: 0.0,
            quark: 0.0,
            dilithium_multiplier: 1.0,
            lunar_multiplier: 1.0,
            xenobit_multiplier: 1.0,
            quark_multiplier: 1.0,
            dilithium_per_click: 1.0,
            lunar_per_click: 0.0,
            xenobit_per_click: 0.0,
            quark_per_click: 0.0,
            passive_dilithium: 0.0,
            passive_lunar: 0.0,
            passive_xenobit: 0.0,
            passive_quark: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Wallet {
    balance: f64,
    multiplier: f64,
    per_click: f64,
    passive: f64,
}

impl CurrencyData {
    fn wallets(&self) -> [Wallet; 4] {
        [
            Wallet {
                balance: self.dilithium,
                multiplier: self.dilithium_multiplier,
                per_click: self.dilithium_per_click,
                passive: self.passive_dilithium,
            },
            Wallet {
                balance: self.lunar,
                multiplier: self.lunar_multiplier,
                per_click: self.lunar_per_click,
                passive: self.passive_lunar,
            },
            Wallet {
                balance: self.xenobit,
                multiplier: self.xenobit_multiplier,
                per_click: self.xenobit_per_click,
                passive: self.passive_xenobit,
            },
            Wallet {
                balance: self.quark,
                multiplier: self.quark_multiplier,
                per_click: self.quark_per_click,
                passive: self.passive_quark,
            },
        ]
    }

    fn from_wallets(w: &[Wallet; 4]) -> Self {
        Self {
            dilithium: w[0].balance,
            lunar: w[1].balance,
            xenobit: w[2].balance,
            quark: w[3].balance,
            dilithium_multiplier: w[0].multiplier,
            lunar_multiplier: w[1].multiplier,
            xenobit_multiplier: w[2].multiplier,
            quark_multiplier: w[3].multiplier,
            dilithium_per_click: w[0].per_click,
            lunar_per_click: w[1].per_click,
            xenobit_per_click: w[2].per_click,
            quark_per_click: w[3].per_click,
            passive_dilithium: w[0].passive,
            passive_lunar: w[1].passive,
            passive_xenobit: w[2].passive,
            passive_quark: w[3].passive,
        }
    }

    /// Balance of one currency.
    pub fn balance(&self, currency: Currency) -> f64 {
        self.wallets()[currency.index()].balance
    }
}

/// Holds balances and rates for every currency.
pub struct CurrencyLedger {
    wallets: [Wallet; 4],
    store: SharedStore,
    events: EventBus,
}

impl CurrencyLedger {
    /// Create a ledger, restoring any saved state from `store`.
    pub fn new(store: SharedStore) -> Self {
        let data: CurrencyData = load_json(store.as_ref(), CURRENCY_KEY).unwrap_or_default();
        Self {
            wallets: data.wallets(),
            store,
            events: EventBus::new(),
        }
    }

    /// Current balance.
    pub fn get(&self, currency: Currency) -> f64 {
        self.wallet(currency).balance
    }

    /// Balance formatted for display.
    pub fn formatted(&self, currency: Currency) -> String {
        format_number(self.get(currency))
    }

    /// Credit `amount`. Negative or non-finite amounts are ignored.
    pub fn add(&mut self, currency: Currency, amount: f64) {
        if !amount.is_finite() || amount < 0.0 {
            tracing::warn!("Ignoring invalid {} credit: {}", currency, amount);
            return;
        }
        self.wallet_mut(currency).balance += amount;
        self.commit(currency);
    }

    /// Debit `amount` if the balance covers it.
    ///
    /// Returns false and leaves the balance untouched otherwise; there are
    /// no partial spends.
    pub fn spend(&mut self, currency: Currency, amount: f64) -> bool {
        if !amount.is_finite() || amount < 0.0 {
            tracing::warn!("Ignoring invalid {} debit: {}", currency, amount);
            return false;
        }
        if self.wallet(currency).balance < amount {
            return false;
        }
        self.wallet_mut(currency).balance -= amount;
        self.commit(currency);
        true
    }

    /// Whether `amount` could be spent right now.
    pub fn can_afford(&self, currency: Currency, amount: f64) -> bool {
        self.get(currency) >= amount
    }

    pub fn passive_rate(&self, currency: Currency) -> f64 {
        self.wallet(currency).passive
    }

    /// Set the passive income rate in units per second.
    pub fn set_passive_rate(&mut self, currency: Currency, per_second: f64) {
        self.wallet_mut(currency).passive = per_second.max(0.0);
        self.commit(currency);
    }

    pub fn add_passive_rate(&mut self, currency: Currency, delta: f64) {
        let rate = self.passive_rate(currency) + delta;
        self.set_passive_rate(currency, rate);
    }

    pub fn multiplier(&self, currency: Currency) -> f64 {
        self.wallet(currency).multiplier
    }

    pub fn set_multiplier(&mut self, currency: Currency, multiplier: f64) {
        self.wallet_mut(currency).multiplier = multiplier.max(0.0);
        self.commit(currency);
    }

    pub fn per_click(&self, currency: Currency) -> f64 {
        self.wallet(currency).per_click
    }

    pub fn add_per_click(&mut self, currency: Currency, delta: f64) {
        let wallet = self.wallet_mut(currency);
        wallet.per_click = (wallet.per_click + delta).max(0.0);
        self.commit(currency);
    }

    /// Handle a tap on the planet. Returns the dilithium earned.
    pub fn click(&mut self) -> f64 {
        let mut earned = 0.0;
        for currency in Currency::ALL {
            let wallet = self.wallet(currency);
            let amount = wallet.per_click * wallet.multiplier;
            if amount > 0.0 {
                self.add(currency, amount);
                if currency == Currency::Dilithium {
                    earned = amount;
                }
            }
        }
        earned
    }

    /// Accrue passive income for `dt`, scaled by `factor` (1.0 normally,
    /// lower while a debuff is active).
    pub fn update(&mut self, dt: Duration, factor: f64) {
        let seconds = dt.as_secs_f64();
        for currency in Currency::ALL {
            let amount = self.passive_rate(currency) * seconds * factor;
            if amount > 0.0 {
                self.add(currency, amount);
            }
        }
    }

    /// Copy of the persisted representation.
    pub fn snapshot(&self) -> CurrencyData {
        CurrencyData::from_wallets(&self.wallets)
    }

    /// Replace every balance and rate, then persist and notify.
    pub fn restore(&mut self, data: &CurrencyData) {
        self.wallets = data.wallets();
        for currency in Currency::ALL {
            self.commit(currency);
        }
    }

    /// Reset to a fresh game.
    pub fn reset(&mut self) {
        self.restore(&CurrencyData::default());
    }

    /// Write the current state to storage.
    pub fn save(&self) -> bool {
        save_json(self.store.as_ref(), CURRENCY_KEY, &self.snapshot())
    }

    /// Listeners for balance changes.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    fn wallet(&self, currency: Currency) -> &Wallet {
        &self.wallets[currency.index()]
    }

    fn wallet_mut(&mut self, currency: Currency) -> &mut Wallet {
        &mut self.wallets[currency.index()]
    }

    fn commit(&mut self, currency: Currency) {
        self.save();
        let balance = self.get(currency);
        self.events
            .emit(&GameEvent::CurrencyChanged { currency, balance });
    }
}

impl fmt::Debug for CurrencyLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrencyLedger")
            .field("data", &self.snapshot())
            .finish()
    }
}
