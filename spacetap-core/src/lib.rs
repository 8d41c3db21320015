//! Game logic for a tap/idle space game.
//!
//! This crate provides:
//! - A four-currency ledger with tap, multiplier and passive income
//! - Upgrade panels, a trading post and a turn-based combat mini-game
//! - Persisted, resumable, localized dialog sequences with branching choices
//! - A headless composition of all of the above
//!
//! Everything runs on one thread and is driven by explicit `update(dt)`
//! ticks from the host loop. Rendering is delegated to [`DialogView`] and
//! [`ChoiceView`] implementations supplied by the host.
//!
//! # Quick Start
//!
//! ```ignore
//! use spacetap_core::{DialogEntry, GameConfig, HeadlessGame, ShowOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut game = HeadlessGame::new(GameConfig::new().with_save_path("save.json")).await?;
//!
//!     game.dialogs_mut().show(
//!         vec![DialogEntry::new("speaker.commander", "Welcome aboard.", 0)],
//!         ShowOptions::new().with_id("intro"),
//!     );
//!     game.tap();
//!     game.skip_dialogs();
//!     game.save();
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod combat;
pub mod currency;
pub mod dialog;
pub mod events;
pub mod format;
pub mod headless;
pub mod localization;
pub mod progress;
pub mod storage;
pub mod testing;

// Primary public API
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use combat::{CombatEncounter, CombatOutcome, Combatant};
pub use currency::{Currency, CurrencyData, CurrencyLedger};
pub use dialog::{
    Avatar, Choice, ChoiceView, DialogEntry, DialogManager, DialogSaveRecord, DialogSaveSystem,
    DialogSettings, DialogView, ShowOptions,
};
pub use events::{EventBus, GameEvent};
pub use format::{format_number, NumberFormatter};
pub use headless::{GameConfig, GameError, HeadlessGame};
pub use localization::{format_string, LanguageData, LanguageSource, Localization};
pub use progress::{Panel, PlayerProgress, ProgressError, ProgressTracker, Upgrade};
pub use storage::{FileStore, KeyValueStore, MemoryStore, SharedStore, StorageError};
