//! Dialog playback, branching choices and dialog persistence.
//!
//! - [`DialogSequencer`] plays one list of lines with the typewriter reveal
//! - [`ChoiceOverlay`] offers guarded choices and reports the original index
//! - [`DialogSaveSystem`] keeps per-dialog progress, settings and relations
//! - [`DialogManager`] ties them together and queues dialog requests

pub mod choice;
pub mod entry;
pub mod manager;
pub mod save;
pub mod sequencer;

pub use choice::{
    Choice, ChoiceError, ChoiceOverlay, ChoiceView, PresentedChoice, Selection,
};
pub use entry::{Avatar, DialogEntry};
pub use manager::{DialogManager, ShowOptions, QUEUE_RETRY_INTERVAL};
pub use save::{
    DialogSaveRecord, DialogSaveSystem, DialogSettings, RELATION_MAX, RELATION_MIN,
};
pub use sequencer::{
    Advance, DialogSequencer, DialogView, SequencerSettings, SequencerState, LINE_CLIP,
};
