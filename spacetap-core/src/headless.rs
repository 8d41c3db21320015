//! Headless game interface for programmatic use.
//!
//! [`HeadlessGame`] composes every service (storage, clock, ledger, progress,
//! localization and the dialog manager) without any rendering. Dialog lines
//! are collected into a transcript instead of drawn. It is meant for:
//! - Automated end-to-end tests
//! - Scripted balance simulations
//! - Hosts that bring their own UI and only need the game state
//!
//! # Example
//!
//! ```ignore
//! use spacetap_core::{GameConfig, HeadlessGame, Panel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GameConfig::new().with_save_path("save.json").with_language("es");
//!     let mut game = HeadlessGame::new(config).await?;
//!
//!     for _ in 0..20 {
//!         game.tap();
//!     }
//!     game.buy(Panel::Mining, 0)?;
//!     game.skip_dialogs();
//!
//!     for line in game.transcript() {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```

use crate::clock::{SharedClock, SystemClock};
use crate::combat::{CombatEncounter, CombatOutcome};
use crate::currency::{Currency, CurrencyLedger};
use crate::dialog::{Avatar, DialogEntry, DialogManager, DialogView};
use crate::format::format_number;
use crate::localization::{
    BuiltinLanguageSource, FileLanguageSource, LanguageSource, Localization, DEFAULT_LANGUAGE,
};
use crate::progress::{Panel, ProgressError, ProgressTracker, Upgrade, DEBUFF_DURATION};
use crate::storage::{FileStore, MemoryStore, SharedStore, StorageError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on advances used to flush pending dialogs.
const MAX_SKIP_STEPS: usize = 10_000;

/// Errors surfaced by [`HeadlessGame`].
#[derive(Debug, Error)]
pub enum GameError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a headless game.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// JSON file to persist into; in-memory when unset.
    pub save_path: Option<PathBuf>,
    /// Directory holding `<code>.json` language tables; built-in tables
    /// when unset.
    pub language_dir: Option<PathBuf>,
    /// Language to switch to after loading.
    pub language: String,
    /// Seed for combat rolls; entropy when unset.
    pub seed: Option<u64>,
    /// Overrides the persisted typewriter setting.
    pub typewriter: Option<bool>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            save_path: None,
            language_dir: None,
            language: DEFAULT_LANGUAGE.to_string(),
            seed: None,
            typewriter: None,
        }
    }
}

impl GameConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    pub fn with_language_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.language_dir = Some(dir.into());
        self
    }

    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.language = code.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_typewriter(mut self, enabled: bool) -> Self {
        self.typewriter = Some(enabled);
        self
    }
}

// ============================================================================
// Transcript view
// ============================================================================

/// A dialog view that writes each shown line as `Speaker: text`.
#[derive(Debug, Clone, Default)]
pub struct TranscriptView {
    lines: Rc<RefCell<Vec<String>>>,
}

impl TranscriptView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl DialogView for TranscriptView {
    fn show_entry(&mut self, entry: &DialogEntry, _avatar: Option<Avatar>) {
        let line = if entry.speaker.is_empty() {
            entry.text.clone()
        } else {
            format!("{}: {}", entry.speaker, entry.text)
        };
        self.lines.borrow_mut().push(line);
    }

    fn set_visible_text(&mut self, _text: &str) {}

    fn hide(&mut self) {}
}

// ============================================================================
// Game
// ============================================================================

/// A complete game without a UI.
pub struct HeadlessGame {
    config: GameConfig,
    store: SharedStore,
    ledger: CurrencyLedger,
    progress: ProgressTracker,
    dialogs: DialogManager,
    transcript: TranscriptView,
    rng: StdRng,
    difficulty: u32,
}

impl HeadlessGame {
    /// Build a game on the system clock.
    pub async fn new(config: GameConfig) -> Result<Self, GameError> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Build a game on a caller-supplied clock.
    pub async fn with_clock(config: GameConfig, clock: SharedClock) -> Result<Self, GameError> {
        let store: SharedStore = match &config.save_path {
            Some(path) => Arc::new(FileStore::open(path)),
            None => MemoryStore::shared(),
        };

        let source: Arc<dyn LanguageSource> = match &config.language_dir {
            Some(dir) => Arc::new(FileLanguageSource::new(dir.clone())),
            None => Arc::new(BuiltinLanguageSource),
        };
        let mut localization = Localization::new(source);
        // A table that fails to load is replaced by built-in strings, so
        // the language is always selectable afterwards.
        localization.load_language(&config.language).await;
        localization.set_language(&config.language);

        let transcript = TranscriptView::new();
        let mut dialogs = DialogManager::new(store.clone(), clock.clone(), localization)
            .with_view(Box::new(transcript.clone()));
        let language = config.language.clone();
        let typewriter = config.typewriter;
        dialogs.update_settings(move |settings| {
            settings.language = language;
            if let Some(enabled) = typewriter {
                settings.enable_typewriter = enabled;
            }
        });

        let ledger = CurrencyLedger::new(store.clone());
        let progress = ProgressTracker::new(store.clone(), clock);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tracing::info!(
            "Headless game ready (language: {}, persistent: {})",
            config.language,
            config.save_path.is_some()
        );

        Ok(Self {
            config,
            store,
            ledger,
            progress,
            dialogs,
            transcript,
            rng,
            difficulty: 1,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn ledger(&self) -> &CurrencyLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut CurrencyLedger {
        &mut self.ledger
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn dialogs(&self) -> &DialogManager {
        &self.dialogs
    }

    pub fn dialogs_mut(&mut self) -> &mut DialogManager {
        &mut self.dialogs
    }

    /// Every dialog line shown so far, as `Speaker: text`.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lines()
    }

    pub fn balance(&self, currency: Currency) -> f64 {
        self.ledger.get(currency)
    }

    /// Balance in display form, e.g. `1.5M`.
    pub fn formatted_balance(&self, currency: Currency) -> String {
        format_number(self.ledger.get(currency))
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Tap the planet. Returns the dilithium earned.
    pub fn tap(&mut self) -> f64 {
        self.ledger.click()
    }

    /// Advance time: passive income, debuff expiry and dialog timers.
    pub fn tick(&mut self, dt: Duration) {
        self.progress.tick(dt, &mut self.ledger);
        self.dialogs.update(dt);
    }

    /// Buy one level of an upgrade and announce it.
    pub fn buy(&mut self, panel: Panel, index: usize) -> Result<Upgrade, GameError> {
        let upgrade = self.progress.purchase(panel, index, &mut self.ledger)?;
        self.dialogs.show_purchase(&upgrade.name, upgrade.level);
        Ok(upgrade)
    }

    /// Exchange currencies at the trading post. Returns the amount received.
    pub fn trade(&mut self, from: Currency, to: Currency, amount: f64) -> Result<f64, GameError> {
        let received = self.progress.trade(from, to, amount, &mut self.ledger)?;

        let spent = format_number(amount);
        let got = format_number(received);
        let from_name = from.to_string();
        let to_name = to.to_string();
        let text = self.dialogs.localization().get_string(
            "trade.success",
            &[
                ("spent", &spent),
                ("from", &from_name),
                ("received", &got),
                ("to", &to_name),
            ],
        );
        self.dialogs
            .queue_message("speaker.trader", text, Avatar::Trader);
        Ok(received)
    }

    /// Fight a pirate at the current difficulty.
    ///
    /// A win pays the reward and raises the difficulty; a loss halves
    /// passive income for a minute. The outcome is narrated.
    pub fn fight(&mut self) -> CombatOutcome {
        let mut encounter =
            CombatEncounter::pirate(self.difficulty, self.progress.progress().ship_power());
        let outcome = encounter.resolve(&mut self.rng);

        match outcome {
            CombatOutcome::Victory { reward, currency } => {
                self.ledger.add(currency, reward);
                self.progress.record_victory();
                self.progress.save(&self.ledger);
                self.difficulty += 1;
                self.dialogs.show_combat_result(true, reward, currency, 0);
            }
            CombatOutcome::Defeat => {
                self.progress.record_defeat();
                self.dialogs.show_combat_result(
                    false,
                    0.0,
                    Currency::Quark,
                    DEBUFF_DURATION.as_secs(),
                );
            }
        }
        outcome
    }

    /// Announce a discovery.
    pub fn discover(&mut self, name: &str) {
        self.dialogs.show_discovery(name);
    }

    /// Press "next" on the active dialog.
    pub fn advance_dialog(&mut self) {
        self.dialogs.advance();
    }

    /// Play every active and queued dialog to the end.
    pub fn skip_dialogs(&mut self) {
        for _ in 0..MAX_SKIP_STEPS {
            if self.dialogs.is_dialog_active() {
                self.dialogs.advance();
            } else if self.dialogs.queue_len() > 0 {
                self.dialogs.update(crate::dialog::QUEUE_RETRY_INTERVAL);
            } else {
                return;
            }
        }
        tracing::warn!("Dialogs still pending after {} steps", MAX_SKIP_STEPS);
    }

    /// Persist the ledger and progress blobs.
    pub fn save(&mut self) -> bool {
        let ledger_saved = self.ledger.save();
        let progress_saved = self.progress.save(&self.ledger);
        ledger_saved && progress_saved
    }

    /// Every key currently persisted.
    pub fn saved_keys(&self) -> Result<Vec<String>, GameError> {
        let mut keys = self.store.keys()?;
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for HeadlessGame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessGame")
            .field("config", &self.config)
            .field("difficulty", &self.difficulty)
            .field("dialogs", &self.dialogs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    async fn game(config: GameConfig) -> HeadlessGame {
        HeadlessGame::with_clock(config.with_seed(5), Arc::new(ManualClock::new(0)))
            .await
            .expect("game")
    }

    #[test]
    fn test_config_builder() {
        let config = GameConfig::new()
            .with_language("es")
            .with_seed(9)
            .with_typewriter(false);
        assert_eq!(config.language, "es");
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.typewriter, Some(false));
        assert!(config.save_path.is_none());
    }

    #[tokio::test]
    async fn test_tap_and_buy() {
        let mut game = game(GameConfig::new().with_typewriter(false)).await;
        for _ in 0..10 {
            game.tap();
        }
        assert_eq!(game.balance(Currency::Dilithium), 10.0);

        let upgrade = game.buy(Panel::Mining, 0).expect("affordable");
        assert_eq!(upgrade.level, 1);
        assert_eq!(game.tap(), 2.0);

        game.skip_dialogs();
        assert_eq!(
            game.transcript(),
            vec!["Trader: Laser Drill upgraded to level 1.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_buy_without_funds_fails() {
        let mut game = game(GameConfig::new()).await;
        let err = game.buy(Panel::Spaceship, 1).unwrap_err();
        assert!(matches!(
            err,
            GameError::Progress(ProgressError::InsufficientFunds { .. })
        ));
        assert!(!game.dialogs().is_dialog_active());
    }

    #[tokio::test]
    async fn test_unknown_language_falls_back_to_english() {
        let mut game = game(GameConfig::new().with_language("tlh").with_typewriter(false)).await;
        assert_eq!(game.dialogs().localization().current_language(), "tlh");

        game.discover("Vulcan");
        game.skip_dialogs();
        assert_eq!(
            game.transcript(),
            vec!["Science Officer: Sensors picked up something new: Vulcan.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_spanish_narration() {
        let mut game = game(GameConfig::new().with_language("es").with_typewriter(false)).await;
        game.discover("Kepler");
        game.skip_dialogs();
        assert_eq!(
            game.transcript(),
            vec!["Oficial científico: Los sensores detectaron algo nuevo: Kepler.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fight_is_narrated() {
        let mut game = game(GameConfig::new().with_typewriter(false)).await;
        let outcome = game.fight();
        game.skip_dialogs();

        let transcript = game.transcript();
        assert_eq!(transcript.len(), 1);
        assert!(transcript[0].starts_with("Ship Computer: "));
        let record = game.progress().progress();
        assert_eq!(record.combat_wins + record.combat_losses, 1);
        assert_eq!(outcome.is_victory(), record.combat_wins == 1);
    }
}
