//! Testing utilities for the dialog and economy layers.
//!
//! This module provides tools for integration testing:
//! - `RecordingView` that captures everything the dialog panel was told
//! - `MemoryLanguageSource` for language loads without touching disk
//! - `TestHarness` wiring a `DialogManager` over in-memory storage and a
//!   manual clock
//! - Assertion helpers for verifying dialog state

use crate::clock::ManualClock;
use crate::dialog::{
    Avatar, ChoiceView, DialogEntry, DialogManager, DialogView, PresentedChoice,
};
use crate::localization::{LanguageData, LanguageSource, Localization, LocalizationError};
use crate::storage::{MemoryStore, SharedStore};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Recording view
// ============================================================================

/// Something a view was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Shown {
        speaker: String,
        text: String,
        avatar: Option<Avatar>,
    },
    Text(String),
    Hidden,
    Clip(String),
    /// Original indices of the choices shown.
    ChoicesShown(Vec<usize>),
    ChoicesHidden,
}

/// A dialog and choice view that records every call.
///
/// Clones share the same log, so a test can keep one handle and give the
/// other to the code under test.
#[derive(Debug, Clone, Default)]
pub struct RecordingView {
    events: Rc<RefCell<Vec<ViewEvent>>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.borrow().clone()
    }

    /// Full text of every line shown, in order.
    pub fn shown_texts(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Shown { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Speakers of every line shown, in order.
    pub fn shown_speakers(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Shown { speaker, .. } => Some(speaker.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    fn push(&self, event: ViewEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl DialogView for RecordingView {
    fn show_entry(&mut self, entry: &DialogEntry, avatar: Option<Avatar>) {
        self.push(ViewEvent::Shown {
            speaker: entry.speaker.clone(),
            text: entry.text.clone(),
            avatar,
        });
    }

    fn set_visible_text(&mut self, text: &str) {
        self.push(ViewEvent::Text(text.to_string()));
    }

    fn hide(&mut self) {
        self.push(ViewEvent::Hidden);
    }

    fn play_clip(&mut self, clip: &str) {
        self.push(ViewEvent::Clip(clip.to_string()));
    }
}

impl ChoiceView for RecordingView {
    fn show_choices(&mut self, choices: &[PresentedChoice]) {
        self.push(ViewEvent::ChoicesShown(
            choices.iter().map(|c| c.index).collect(),
        ));
    }

    fn hide_choices(&mut self) {
        self.push(ViewEvent::ChoicesHidden);
    }
}

// ============================================================================
// In-memory language source
// ============================================================================

/// Serves language tables from memory and counts loads.
#[derive(Debug, Default)]
pub struct MemoryLanguageSource {
    tables: HashMap<String, LanguageData>,
    loads: AtomicUsize,
}

impl MemoryLanguageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, data: LanguageData) -> Self {
        self.tables.insert(data.code.clone(), data);
        self
    }

    /// How many times `load` was called.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl LanguageSource for MemoryLanguageSource {
    fn load(&self, code: &str) -> BoxFuture<'static, Result<LanguageData, LocalizationError>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let result = self
            .tables
            .get(code)
            .cloned()
            .ok_or_else(|| LocalizationError::NotFound(code.to_string()));
        futures::future::ready(result).boxed()
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A dialog manager over in-memory storage, a manual clock and a
/// recording view.
///
/// The typewriter is off unless [`TestHarness::with_typewriter`] is used.
pub struct TestHarness {
    pub manager: DialogManager,
    pub view: RecordingView,
    pub store: SharedStore,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    /// Create a harness with instant line display.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::shared())
    }

    /// Create a harness over an existing store, e.g. to simulate a restart.
    pub fn with_store(store: SharedStore) -> Self {
        let mut harness = Self::build(store);
        harness
            .manager
            .update_settings(|s| s.enable_typewriter = false);
        harness
    }

    /// Create a harness that reveals `chars_per_second` characters per second.
    pub fn with_typewriter(chars_per_second: f32) -> Self {
        let mut harness = Self::build(MemoryStore::shared());
        harness.manager.update_settings(|s| {
            s.enable_typewriter = true;
            s.typewriter_speed = chars_per_second;
        });
        harness
    }

    fn build(store: SharedStore) -> Self {
        let view = RecordingView::new();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let manager = DialogManager::new(store.clone(), clock.clone(), Localization::builtin())
            .with_view(Box::new(view.clone()))
            .with_choice_view(Box::new(view.clone()));

        Self {
            manager,
            view,
            store,
            clock,
        }
    }

    /// Step the manager and the clock together.
    pub fn tick(&mut self, dt: Duration) -> &mut Self {
        self.clock.advance(dt);
        self.manager.update(dt);
        self
    }

    /// Press "next" `times` times.
    pub fn press(&mut self, times: usize) -> &mut Self {
        for _ in 0..times {
            self.manager.advance();
        }
        self
    }

    /// Text of the line on screen, if any.
    pub fn current_text(&self) -> Option<String> {
        self.manager
            .sequencer()
            .current_entry()
            .map(|e| e.text.clone())
    }

    /// Saved line index for `dialog_id`.
    pub fn saved_index(&self, dialog_id: &str) -> Option<usize> {
        self.manager
            .save()
            .peek_dialog_state(dialog_id)
            .map(|r| r.current_index)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Lines `"<prefix> 0"`, `"<prefix> 1"`, ... spoken by the commander.
pub fn numbered_lines(prefix: &str, count: usize) -> Vec<DialogEntry> {
    (0..count)
        .map(|i| DialogEntry::spoken("Commander", format!("{prefix} {i}"), Avatar::Commander))
        .collect()
}

// ============================================================================
// Assertion helpers
// ============================================================================

/// Assert that the line on screen has the given text.
pub fn assert_showing(harness: &TestHarness, text: &str) {
    assert_eq!(
        harness.current_text().as_deref(),
        Some(text),
        "Expected '{}' on screen",
        text
    );
}

/// Assert that no dialog is playing.
pub fn assert_idle(harness: &TestHarness) {
    assert!(
        !harness.manager.is_dialog_active(),
        "Expected no active dialog, found '{}'",
        harness.manager.active_dialog_id().unwrap_or_default()
    );
}

/// Assert that `dialog_id` has a completed save record.
pub fn assert_completed(harness: &TestHarness, dialog_id: &str) {
    assert!(
        harness.manager.save().is_dialog_completed(dialog_id),
        "Expected dialog '{}' to be completed",
        dialog_id
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::ShowOptions;

    #[test]
    fn test_recording_view_shares_log() {
        let view = RecordingView::new();
        let mut handle = view.clone();
        DialogView::hide(&mut handle);
        handle.show_choices(&[PresentedChoice {
            index: 3,
            text: "Go".to_string(),
        }]);

        assert_eq!(
            view.events(),
            vec![ViewEvent::Hidden, ViewEvent::ChoicesShown(vec![3])]
        );
    }

    #[test]
    fn test_harness_runs_dialog() {
        let mut harness = TestHarness::new();
        harness
            .manager
            .show(numbered_lines("line", 2), ShowOptions::new().with_id("intro"));

        assert_showing(&harness, "line 0");
        harness.press(1);
        assert_eq!(harness.saved_index("intro"), Some(1));
        harness.press(1);
        assert_idle(&harness);
        assert_completed(&harness, "intro");
    }

    #[tokio::test]
    async fn test_memory_source_counts_loads() {
        let source = Arc::new(
            MemoryLanguageSource::new()
                .with_language(LanguageData::new("de", "Deutsch").with_string("hi", "Hallo")),
        );
        let mut localization = Localization::new(source.clone());

        let data = localization.load_language("de").await;
        assert_eq!(data.get("hi"), Some("Hallo"));
        assert_eq!(source.load_count(), 1);

        // Unknown codes fall back to an empty table
        let missing = localization.load_language("xx").await;
        assert!(missing.strings.is_empty());
    }
}
