//! Plays an ordered list of dialog lines.
//!
//! ```text
//! Idle -> Typing(i) -> Displayed(i) -> Typing(i+1) -> ... -> Completed
//! ```
//!
//! Lines reveal character by character while the typewriter is enabled. The
//! first `advance` during a reveal finishes the current line; the next one
//! moves on. Timers are plain durations stepped by [`DialogSequencer::update`],
//! so cancelling them is just dropping the state.

use super::entry::{Avatar, DialogEntry};
use super::save::DialogSettings;
use std::time::Duration;

/// Clip played when a line appears.
pub const LINE_CLIP: &str = "dialog_line";

/// Rendering surface for the dialog panel.
pub trait DialogView {
    /// A new line became current.
    fn show_entry(&mut self, entry: &DialogEntry, avatar: Option<Avatar>);

    /// The visible portion of the current line changed.
    fn set_visible_text(&mut self, text: &str);

    /// The panel should close.
    fn hide(&mut self);

    /// Play a sound clip. Hosts without audio can ignore it.
    fn play_clip(&mut self, _clip: &str) {}
}

/// Where the sequencer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    /// Line `i` is still being revealed.
    Typing(usize),
    /// Line `i` is fully shown.
    Displayed(usize),
    Completed,
}

/// What an `advance` (or a timer) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Nothing was playing or nothing happened.
    Ignored,
    /// The reveal of line `i` was cut short; the index did not move.
    Revealed(usize),
    /// Line `i` became current.
    Moved(usize),
    /// The last line was dismissed.
    Completed,
}

/// Playback knobs, usually derived from [`DialogSettings`].
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerSettings {
    pub typewriter: bool,
    pub chars_per_second: f32,
    pub auto_advance: Option<Duration>,
    pub sounds: bool,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self::from(&DialogSettings::default())
    }
}

impl From<&DialogSettings> for SequencerSettings {
    fn from(settings: &DialogSettings) -> Self {
        Self {
            typewriter: settings.enable_typewriter,
            chars_per_second: settings.typewriter_speed,
            auto_advance: settings.auto_advance(),
            sounds: settings.enable_sounds,
        }
    }
}

impl SequencerSettings {
    /// Settings with the typewriter and auto-advance off.
    pub fn instant() -> Self {
        Self {
            typewriter: false,
            chars_per_second: 0.0,
            auto_advance: None,
            sounds: false,
        }
    }

    fn reveals(&self) -> bool {
        self.typewriter && self.chars_per_second.is_finite() && self.chars_per_second > 0.0
    }
}

/// In-progress character reveal.
#[derive(Debug, Clone, Default)]
struct Reveal {
    elapsed: Duration,
    shown: usize,
    total: usize,
}

/// A sequence parked while another one plays.
pub struct SuspendedSequence {
    entries: Vec<DialogEntry>,
    index: usize,
    on_complete: Option<Box<dyn FnOnce()>>,
}

impl SuspendedSequence {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Shows dialog lines one at a time.
pub struct DialogSequencer {
    entries: Vec<DialogEntry>,
    state: SequencerState,
    reveal: Option<Reveal>,
    displayed_for: Duration,
    visible_text: String,
    on_complete: Option<Box<dyn FnOnce()>>,
    settings: SequencerSettings,
    view: Option<Box<dyn DialogView>>,
}

impl DialogSequencer {
    pub fn new(settings: SequencerSettings) -> Self {
        Self {
            entries: Vec::new(),
            state: SequencerState::Idle,
            reveal: None,
            displayed_for: Duration::ZERO,
            visible_text: String::new(),
            on_complete: None,
            settings,
            view: None,
        }
    }

    /// Attach the rendering surface.
    pub fn with_view(mut self, view: Box<dyn DialogView>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn set_view(&mut self, view: Option<Box<dyn DialogView>>) {
        self.view = view;
    }

    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }

    pub fn settings(&self) -> &SequencerSettings {
        &self.settings
    }

    /// Replace the settings. A reveal in progress keeps going at the new speed.
    pub fn set_settings(&mut self, settings: SequencerSettings) {
        self.settings = settings;
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// True while a line is on screen.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            SequencerState::Typing(_) | SequencerState::Displayed(_)
        )
    }

    /// Index of the current line, while active.
    pub fn current_index(&self) -> Option<usize> {
        match self.state {
            SequencerState::Typing(i) | SequencerState::Displayed(i) => Some(i),
            _ => None,
        }
    }

    pub fn current_entry(&self) -> Option<&DialogEntry> {
        self.current_index().and_then(|i| self.entries.get(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text currently visible for the current line.
    pub fn visible_text(&self) -> &str {
        &self.visible_text
    }

    /// Start a sequence from the first line.
    pub fn init(&mut self, entries: Vec<DialogEntry>, on_complete: Option<Box<dyn FnOnce()>>) {
        self.start_at(entries, 0, on_complete);
    }

    /// Start a sequence with line `index` (clamped to the last line) as the
    /// first one rendered. Earlier lines are skipped without rendering.
    ///
    /// An empty sequence completes immediately and renders nothing.
    pub fn start_at(
        &mut self,
        entries: Vec<DialogEntry>,
        index: usize,
        on_complete: Option<Box<dyn FnOnce()>>,
    ) {
        self.cancel_timers();
        self.entries = entries;
        self.on_complete = on_complete;

        if self.entries.is_empty() {
            self.state = SequencerState::Completed;
            if let Some(callback) = self.on_complete.take() {
                callback();
            }
            return;
        }

        let index = index.min(self.entries.len() - 1);
        self.show(index);
    }

    /// Handle a "next" input.
    pub fn advance(&mut self) -> Advance {
        match self.state {
            SequencerState::Typing(index) => {
                self.finish_reveal(index);
                Advance::Revealed(index)
            }
            SequencerState::Displayed(index) => {
                let next = index + 1;
                if next < self.entries.len() {
                    self.show(next);
                    Advance::Moved(next)
                } else {
                    self.complete();
                    Advance::Completed
                }
            }
            SequencerState::Idle | SequencerState::Completed => Advance::Ignored,
        }
    }

    /// Step the reveal and auto-advance timers.
    pub fn update(&mut self, dt: Duration) -> Advance {
        match self.state {
            SequencerState::Typing(index) => {
                self.step_reveal(index, dt);
                Advance::Ignored
            }
            SequencerState::Displayed(_) => {
                let Some(delay) = self.settings.auto_advance else {
                    return Advance::Ignored;
                };
                self.displayed_for += dt;
                if self.displayed_for >= delay {
                    self.advance()
                } else {
                    Advance::Ignored
                }
            }
            SequencerState::Idle | SequencerState::Completed => Advance::Ignored,
        }
    }

    /// Stop playback without firing the completion callback.
    pub fn teardown(&mut self) {
        self.cancel_timers();
        self.on_complete = None;
        self.entries.clear();
        self.visible_text.clear();
        if self.is_active() {
            if let Some(view) = self.view.as_mut() {
                view.hide();
            }
        }
        self.state = SequencerState::Idle;
    }

    /// Park the current sequence. The sequencer is left idle.
    pub fn suspend(&mut self) -> Option<SuspendedSequence> {
        let index = self.current_index()?;
        self.cancel_timers();
        let suspended = SuspendedSequence {
            entries: std::mem::take(&mut self.entries),
            index,
            on_complete: self.on_complete.take(),
        };
        self.state = SequencerState::Idle;
        Some(suspended)
    }

    /// Bring a parked sequence back, showing its current line in full.
    pub fn resume(&mut self, suspended: SuspendedSequence) {
        self.cancel_timers();
        self.entries = suspended.entries;
        self.on_complete = suspended.on_complete;

        let index = suspended.index;
        self.render_entry(index);
        self.finish_reveal(index);
    }

    // ------------------------------------------------------------------

    fn show(&mut self, index: usize) {
        self.render_entry(index);

        let total = self.entries[index].text.chars().count();
        if self.settings.reveals() && total > 0 {
            self.state = SequencerState::Typing(index);
            self.reveal = Some(Reveal {
                total,
                ..Reveal::default()
            });
            self.set_visible(String::new());
        } else {
            self.finish_reveal(index);
        }
    }

    fn render_entry(&mut self, index: usize) {
        let entry = &self.entries[index];
        match self.view.as_mut() {
            Some(view) => {
                view.show_entry(entry, entry.avatar());
                if self.settings.sounds {
                    view.play_clip(LINE_CLIP);
                }
            }
            None => tracing::warn!("No dialog view attached; line {} not rendered", index),
        }
    }

    fn step_reveal(&mut self, index: usize, dt: Duration) {
        let Some(reveal) = self.reveal.as_mut() else {
            return;
        };

        reveal.elapsed += dt;
        let target = (reveal.elapsed.as_secs_f32() * self.settings.chars_per_second) as usize;
        let target = target.min(reveal.total);
        if target == reveal.shown {
            return;
        }
        reveal.shown = target;

        if target >= reveal.total {
            self.finish_reveal(index);
        } else {
            let partial: String = self.entries[index].text.chars().take(target).collect();
            self.set_visible(partial);
        }
    }

    fn finish_reveal(&mut self, index: usize) {
        self.reveal = None;
        self.displayed_for = Duration::ZERO;
        self.state = SequencerState::Displayed(index);
        let full = self.entries[index].text.clone();
        self.set_visible(full);
    }

    fn set_visible(&mut self, text: String) {
        if let Some(view) = self.view.as_mut() {
            view.set_visible_text(&text);
        }
        self.visible_text = text;
    }

    fn complete(&mut self) {
        self.cancel_timers();
        self.state = SequencerState::Completed;
        self.visible_text.clear();
        if let Some(view) = self.view.as_mut() {
            view.hide();
        }
        if let Some(callback) = self.on_complete.take() {
            callback();
        }
    }

    fn cancel_timers(&mut self) {
        self.reveal = None;
        self.displayed_for = Duration::ZERO;
    }
}

impl Default for DialogSequencer {
    fn default() -> Self {
        Self::new(SequencerSettings::default())
    }
}

impl std::fmt::Debug for DialogSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogSequencer")
            .field("state", &self.state)
            .field("entries", &self.entries.len())
            .field("settings", &self.settings)
            .field("has_view", &self.view.is_some())
            .finish()
    }
}
