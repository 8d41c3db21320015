//! Dialog orchestration.
//!
//! [`DialogManager`] owns the sequencer, the choice overlay and the save
//! system. It localizes lines, resumes unfinished dialogs from their saved
//! index, writes a save record after every step and serializes dialog
//! requests through a FIFO queue so only one sequence plays at a time.

use super::choice::{Choice, ChoiceError, ChoiceOverlay, ChoiceView, SelectionCallback};
use super::entry::{Avatar, DialogEntry};
use super::save::{DialogSaveSystem, DialogSettings};
use super::sequencer::{
    Advance, DialogSequencer, DialogView, SequencerSettings, SuspendedSequence,
};
use crate::clock::SharedClock;
use crate::currency::Currency;
use crate::events::{EventBus, GameEvent};
use crate::format::format_number;
use crate::localization::Localization;
use crate::storage::SharedStore;
use std::collections::VecDeque;
use std::time::Duration;

/// How often a blocked queue tries again.
pub const QUEUE_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// A deferred dialog request.
pub type DialogRequest = Box<dyn FnOnce(&mut DialogManager)>;

/// Called when a dialog finishes.
pub type CompletionCallback = Box<dyn FnOnce()>;

/// Options for [`DialogManager::show`].
pub struct ShowOptions {
    dialog_id: Option<String>,
    auto_save: bool,
    on_complete: Option<CompletionCallback>,
}

impl Default for ShowOptions {
    fn default() -> Self {
        Self {
            dialog_id: None,
            auto_save: true,
            on_complete: None,
        }
    }
}

impl ShowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable id; progress is saved and resumed under it.
    pub fn with_id(mut self, dialog_id: impl Into<String>) -> Self {
        self.dialog_id = Some(dialog_id.into());
        self
    }

    /// Run `callback` after the last line is dismissed.
    pub fn on_complete(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Neither resume from nor write save records.
    pub fn without_autosave(mut self) -> Self {
        self.auto_save = false;
        self
    }
}

struct ActiveDialog {
    id: String,
    len: usize,
    auto_save: bool,
    on_complete: Option<CompletionCallback>,
}

/// A choice consequence playing over a parked parent sequence.
struct Consequence {
    parent: Option<SuspendedSequence>,
    index: usize,
    on_selected: Option<SelectionCallback>,
}

/// Sequences dialogs and keeps their progress saved.
pub struct DialogManager {
    sequencer: DialogSequencer,
    overlay: ChoiceOverlay,
    save: DialogSaveSystem,
    localization: Localization,
    localization_enabled: bool,
    clock: SharedClock,
    events: EventBus,
    active: Option<ActiveDialog>,
    consequence: Option<Consequence>,
    queue: VecDeque<DialogRequest>,
    retry_in: Option<Duration>,
    id_counter: u64,
}

impl DialogManager {
    /// Create a manager with no views attached.
    ///
    /// Settings are read from `store`; their language is selected if loaded.
    pub fn new(store: SharedStore, clock: SharedClock, localization: Localization) -> Self {
        let save = DialogSaveSystem::new(store, clock.clone());
        let mut manager = Self {
            sequencer: DialogSequencer::new(SequencerSettings::from(save.settings())),
            overlay: ChoiceOverlay::new(),
            save,
            localization,
            localization_enabled: true,
            clock,
            events: EventBus::new(),
            active: None,
            consequence: None,
            queue: VecDeque::new(),
            retry_in: None,
            id_counter: 0,
        };
        manager.apply_settings();
        manager
    }

    /// Attach the dialog panel.
    pub fn with_view(mut self, view: Box<dyn DialogView>) -> Self {
        self.sequencer.set_view(Some(view));
        self
    }

    /// Attach the choice list.
    pub fn with_choice_view(mut self, view: Box<dyn ChoiceView>) -> Self {
        self.overlay.set_view(Some(view));
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn save(&self) -> &DialogSaveSystem {
        &self.save
    }

    pub fn save_mut(&mut self) -> &mut DialogSaveSystem {
        &mut self.save
    }

    pub fn sequencer(&self) -> &DialogSequencer {
        &self.sequencer
    }

    pub fn overlay(&self) -> &ChoiceOverlay {
        &self.overlay
    }

    pub fn localization(&self) -> &Localization {
        &self.localization
    }

    pub fn localization_mut(&mut self) -> &mut Localization {
        &mut self.localization
    }

    pub fn set_localization_enabled(&mut self, enabled: bool) {
        self.localization_enabled = enabled;
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// True from `show` until the completion callback has run, and while a
    /// choice consequence is playing.
    pub fn is_dialog_active(&self) -> bool {
        self.active.is_some() || self.consequence.is_some()
    }

    pub fn active_dialog_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.id.as_str())
    }

    /// Requests waiting behind the active dialog.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Edit, persist and apply the dialog settings.
    pub fn update_settings(&mut self, edit: impl FnOnce(&mut DialogSettings)) {
        self.save.update_settings(edit);
        self.apply_settings();
    }

    fn apply_settings(&mut self) {
        let settings = self.save.settings().clone();
        self.sequencer
            .set_settings(SequencerSettings::from(&settings));
        if self.localization.current_language() != settings.language {
            self.localization.set_language(&settings.language);
        }
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    /// Start a dialog. Returns its id, or `None` if it could not start.
    ///
    /// With autosave on, an unfinished save record for the id makes playback
    /// start at the saved line instead of the first one.
    pub fn show(&mut self, entries: Vec<DialogEntry>, options: ShowOptions) -> Option<String> {
        if !self.sequencer.has_view() {
            tracing::error!("No dialog view attached; dialog dropped");
            return None;
        }
        if self.is_dialog_active() {
            tracing::warn!(
                "Dialog '{}' is still playing; queue the new dialog instead",
                self.active_dialog_id().unwrap_or("choice consequence")
            );
            return None;
        }

        let dialog_id = options
            .dialog_id
            .unwrap_or_else(|| self.next_dialog_id());
        let entries = self.localize(entries);
        let len = entries.len();

        let start = if options.auto_save && len > 0 {
            match self.save.load_dialog_state(&dialog_id) {
                Some(record) if !record.is_completed => record.current_index.min(len - 1),
                _ => 0,
            }
        } else {
            0
        };

        tracing::debug!("Starting dialog '{}' at line {} of {}", dialog_id, start, len);

        self.active = Some(ActiveDialog {
            id: dialog_id.clone(),
            len,
            auto_save: options.auto_save,
            on_complete: options.on_complete,
        });
        self.events.emit(&GameEvent::DialogStarted {
            dialog_id: dialog_id.clone(),
        });

        if entries.is_empty() {
            self.sequencer.init(entries, None);
            self.finish_active();
            return Some(dialog_id);
        }

        self.sequencer.start_at(entries, start, None);
        if options.auto_save {
            self.save.save_dialog_state(&dialog_id, start, false, None);
        }
        Some(dialog_id)
    }

    /// Handle a "next" input for the active dialog.
    ///
    /// Ignored while choices are on screen.
    pub fn advance(&mut self) -> Advance {
        if self.overlay.is_visible() {
            return Advance::Ignored;
        }
        let step = self.sequencer.advance();
        self.after_step(step);
        step
    }

    /// Step timers: typewriter, auto-advance and the queue retry.
    pub fn update(&mut self, dt: Duration) {
        if !self.overlay.is_visible() {
            let step = self.sequencer.update(dt);
            self.after_step(step);
        }

        if let Some(remaining) = self.retry_in {
            if dt >= remaining {
                self.retry_in = None;
                self.drain_queue();
            } else {
                self.retry_in = Some(remaining - dt);
            }
        }
    }

    /// Stop the active dialog without completing it. Saved progress stays,
    /// so the dialog resumes next time it is shown.
    pub fn cancel(&mut self) {
        self.overlay.hide();
        self.sequencer.teardown();
        self.consequence = None;
        self.active = None;
    }

    fn after_step(&mut self, step: Advance) {
        if self.consequence.is_some() {
            if step == Advance::Completed {
                self.finish_consequence();
            }
            return;
        }

        match step {
            Advance::Moved(index) => {
                if let Some(active) = &self.active {
                    if active.auto_save {
                        let id = active.id.clone();
                        self.save.save_dialog_state(&id, index, false, None);
                    }
                }
            }
            Advance::Completed => self.finish_active(),
            Advance::Revealed(_) | Advance::Ignored => {}
        }
    }

    fn finish_active(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        if active.auto_save {
            self.save
                .save_dialog_state(&active.id, active.len, true, None);
        }
        tracing::debug!("Dialog '{}' completed", active.id);
        self.events.emit(&GameEvent::DialogCompleted {
            dialog_id: active.id.clone(),
        });

        if let Some(callback) = active.on_complete.take() {
            callback();
        }
    }

    fn next_dialog_id(&mut self) -> String {
        self.id_counter += 1;
        format!("dialog_{}_{}", self.id_counter, self.clock.now_millis())
    }

    fn localize(&self, entries: Vec<DialogEntry>) -> Vec<DialogEntry> {
        if !self.localization_enabled {
            return entries;
        }
        entries
            .into_iter()
            .map(|entry| DialogEntry {
                speaker: self.localize_literal(entry.speaker),
                text: self.localize_literal(entry.text),
                avatar_index: entry.avatar_index,
            })
            .collect()
    }

    fn localize_literal(&self, literal: String) -> String {
        if literal.is_empty() {
            return literal;
        }
        match self.localization.lookup(&literal) {
            Some(localized) => localized.to_string(),
            None => literal,
        }
    }

    // ------------------------------------------------------------------
    // Choices
    // ------------------------------------------------------------------

    /// Offer choices over the current line. Returns how many are shown.
    pub fn present_choices(
        &mut self,
        choices: Vec<Choice>,
        on_selected: impl FnOnce(usize) + 'static,
    ) -> usize {
        let choices = if self.localization_enabled {
            choices
                .into_iter()
                .map(|mut choice| {
                    choice.text = self.localize_literal(std::mem::take(&mut choice.text));
                    choice.consequence = self.localize(std::mem::take(&mut choice.consequence));
                    choice
                })
                .collect()
        } else {
            choices
        };
        self.overlay
            .present(choices, &self.save, Box::new(on_selected))
    }

    /// Pick a presented choice by its original index.
    ///
    /// The pick is recorded in the active dialog's save record. A consequence
    /// plays over the parked parent; the selection callback runs once it
    /// finishes and the parent line is back on screen.
    pub fn select_choice(&mut self, index: usize) -> Result<(), ChoiceError> {
        let selection = self.overlay.select(index)?;

        if let Some(active) = &self.active {
            if active.auto_save {
                let id = active.id.clone();
                self.save.record_choice(&id, index);
            }
        }

        let (index, consequence, on_selected) = selection.into_parts();
        if consequence.is_empty() {
            if let Some(callback) = on_selected {
                callback(index);
            }
            return Ok(());
        }

        let parent = self.sequencer.suspend();
        self.consequence = Some(Consequence {
            parent,
            index,
            on_selected,
        });
        self.sequencer.init(consequence, None);
        Ok(())
    }

    fn finish_consequence(&mut self) {
        let Some(consequence) = self.consequence.take() else {
            return;
        };

        match consequence.parent {
            Some(parent) => self.sequencer.resume(parent),
            None => self.finish_active(),
        }

        if let Some(callback) = consequence.on_selected {
            callback(consequence.index);
        }
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// Shift a relationship score and notify listeners. Returns the new score.
    pub fn update_character_relation(&mut self, character: &str, delta: i32) -> i32 {
        let score = self.save.update_character_relation(character, delta);
        self.events.emit(&GameEvent::RelationChanged {
            character: character.to_string(),
            score,
        });
        score
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Append a request and try to run it.
    ///
    /// Requests run in FIFO order, each only once no dialog is active. A
    /// request that fails to start a dialog still counts as run.
    pub fn queue_dialog(&mut self, request: impl FnOnce(&mut DialogManager) + 'static) {
        self.queue.push_back(Box::new(request));
        self.drain_queue();
    }

    /// Queue a plain `show`.
    pub fn queue_show(&mut self, entries: Vec<DialogEntry>, options: ShowOptions) {
        self.queue_dialog(move |manager| {
            manager.show(entries, options);
        });
    }

    /// Drop every waiting request.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.retry_in = None;
    }

    fn drain_queue(&mut self) {
        while !self.is_dialog_active() {
            let Some(request) = self.queue.pop_front() else {
                self.retry_in = None;
                return;
            };
            request(self);
        }

        if !self.queue.is_empty() && self.retry_in.is_none() {
            self.retry_in = Some(QUEUE_RETRY_INTERVAL);
        }
    }

    // ------------------------------------------------------------------
    // Common message shapes
    // ------------------------------------------------------------------

    /// Show a single line.
    pub fn show_message(
        &mut self,
        speaker: impl Into<String>,
        text: impl Into<String>,
        avatar: Avatar,
    ) -> Option<String> {
        self.show(
            vec![DialogEntry::spoken(speaker, text, avatar)],
            ShowOptions::new().without_autosave(),
        )
    }

    /// Show a saved, resumable conversation.
    pub fn show_conversation(
        &mut self,
        dialog_id: &str,
        entries: Vec<DialogEntry>,
        on_complete: impl FnOnce() + 'static,
    ) -> Option<String> {
        self.show(
            entries,
            ShowOptions::new()
                .with_id(dialog_id)
                .on_complete(on_complete),
        )
    }

    /// Queue a single line.
    pub fn queue_message(
        &mut self,
        speaker: impl Into<String>,
        text: impl Into<String>,
        avatar: Avatar,
    ) {
        self.queue_show(
            vec![DialogEntry::spoken(speaker, text, avatar)],
            ShowOptions::new().without_autosave(),
        );
    }

    /// Narrate a combat outcome once the current dialog is done.
    pub fn show_combat_result(
        &mut self,
        victory: bool,
        reward: f64,
        currency: Currency,
        debuff_seconds: u64,
    ) {
        let text = if victory {
            let reward = format_number(reward);
            let currency = currency.to_string();
            self.localization.get_string(
                "combat.victory",
                &[("reward", &reward), ("currency", &currency)],
            )
        } else {
            let seconds = debuff_seconds.to_string();
            self.localization
                .get_string("combat.defeat", &[("seconds", &seconds)])
        };
        self.queue_message("speaker.computer", text, Avatar::Computer);
    }

    /// Confirm an upgrade purchase once the current dialog is done.
    pub fn show_purchase(&mut self, item: &str, level: u32) {
        let level = level.to_string();
        let text = self
            .localization
            .get_string("purchase.success", &[("item", item), ("level", &level)]);
        self.queue_message("speaker.trader", text, Avatar::Trader);
    }

    /// Announce a discovery once the current dialog is done.
    pub fn show_discovery(&mut self, name: &str) {
        let text = self
            .localization
            .get_string("discovery.found", &[("name", name)]);
        self.queue_message("speaker.scientist", text, Avatar::Scientist);
    }
}

impl std::fmt::Debug for DialogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogManager")
            .field("active", &self.active_dialog_id())
            .field("queue", &self.queue.len())
            .field("sequencer", &self.sequencer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::testing::RecordingView;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn manager(view: &RecordingView) -> DialogManager {
        let mut manager = DialogManager::new(
            MemoryStore::shared(),
            Arc::new(ManualClock::new(1_000)),
            Localization::builtin(),
        )
        .with_view(Box::new(view.clone()))
        .with_choice_view(Box::new(view.clone()));
        manager.update_settings(|s| s.enable_typewriter = false);
        manager
    }

    fn lines(prefix: &str, n: usize) -> Vec<DialogEntry> {
        (0..n)
            .map(|i| DialogEntry::new("Commander", format!("{prefix} {i}"), 0))
            .collect()
    }

    #[test]
    fn test_synthesized_ids_are_unique() {
        let view = RecordingView::new();
        let mut manager = manager(&view);

        let first = manager.show(lines("a", 1), ShowOptions::new()).expect("started");
        manager.advance();
        let second = manager.show(lines("b", 1), ShowOptions::new()).expect("started");

        assert_ne!(first, second);
        assert!(first.starts_with("dialog_1_"));
    }

    #[test]
    fn test_speaker_keys_are_localized() {
        let view = RecordingView::new();
        let mut manager = manager(&view);
        manager.show(
            vec![DialogEntry::new("speaker.trader", "Plain text", 1)],
            ShowOptions::new(),
        );

        let entry = manager.sequencer().current_entry().expect("showing");
        assert_eq!(entry.speaker, "Trader");
        assert_eq!(entry.text, "Plain text");
    }

    #[test]
    fn test_show_while_active_is_rejected() {
        let view = RecordingView::new();
        let mut manager = manager(&view);
        manager.show(lines("a", 2), ShowOptions::new().with_id("a"));
        assert!(manager.show(lines("b", 2), ShowOptions::new()).is_none());
        assert_eq!(manager.active_dialog_id(), Some("a"));
    }

    #[test]
    fn test_missing_view_aborts_show() {
        let mut manager = DialogManager::new(
            MemoryStore::shared(),
            Arc::new(ManualClock::new(0)),
            Localization::builtin(),
        );
        let done = Rc::new(RefCell::new(false));
        let flag = done.clone();

        manager.queue_show(
            lines("a", 1),
            ShowOptions::new().on_complete(move || *flag.borrow_mut() = true),
        );
        manager.queue_show(lines("b", 1), ShowOptions::new());

        assert!(!manager.is_dialog_active());
        assert_eq!(manager.queue_len(), 0);
        assert!(!*done.borrow());
    }

    #[test]
    fn test_choices_without_consequence() {
        let view = RecordingView::new();
        let mut manager = manager(&view);
        manager.show(lines("a", 2), ShowOptions::new().with_id("talk"));

        let picked = Rc::new(RefCell::new(None));
        let sink = picked.clone();
        manager.present_choices(
            vec![Choice::new("Yes"), Choice::new("No")],
            move |i| *sink.borrow_mut() = Some(i),
        );

        // Advancing is blocked while choices are up
        assert_eq!(manager.advance(), Advance::Ignored);

        manager.select_choice(1).expect("presented");
        assert_eq!(*picked.borrow(), Some(1));
        assert!(manager.save().has_chosen("talk", 1));
        assert_eq!(manager.advance(), Advance::Moved(1));
    }

    #[test]
    fn test_consequence_plays_then_parent_resumes() {
        let view = RecordingView::new();
        let mut manager = manager(&view);
        manager.show(lines("main", 2), ShowOptions::new().with_id("branch"));

        let picked = Rc::new(RefCell::new(None));
        let sink = picked.clone();
        manager.present_choices(
            vec![Choice::new("Ask").with_consequence(lines("aside", 2))],
            move |i| *sink.borrow_mut() = Some(i),
        );
        manager.select_choice(0).expect("presented");

        assert_eq!(manager.sequencer().visible_text(), "aside 0");
        assert_eq!(manager.advance(), Advance::Moved(1));
        assert!(picked.borrow().is_none());

        // Finishing the consequence resumes the parent on its current line
        assert_eq!(manager.advance(), Advance::Completed);
        assert_eq!(*picked.borrow(), Some(0));
        assert_eq!(manager.sequencer().visible_text(), "main 0");
        assert_eq!(manager.active_dialog_id(), Some("branch"));

        // Consequence steps do not touch the parent's record
        let record = manager.save_mut().load_dialog_state("branch").expect("record");
        assert_eq!(record.current_index, 0);

        assert_eq!(manager.advance(), Advance::Moved(1));
        assert_eq!(manager.advance(), Advance::Completed);
        assert!(!manager.is_dialog_active());
    }

    #[test]
    fn test_standalone_consequence_holds_the_queue() {
        let view = RecordingView::new();
        let mut manager = manager(&view);
        manager.present_choices(
            vec![Choice::new("Listen").with_consequence(lines("aside", 1))],
            |_| {},
        );
        manager.select_choice(0).expect("presented");
        assert!(manager.is_dialog_active());

        manager.queue_show(lines("queued", 2), ShowOptions::new().with_id("q"));
        assert!(manager.show(lines("direct", 1), ShowOptions::new()).is_none());
        assert_eq!(view.shown_texts(), vec!["aside 0"]);
        assert_eq!(manager.queue_len(), 1);

        assert_eq!(manager.advance(), Advance::Completed);
        assert!(!manager.is_dialog_active());
        manager.update(QUEUE_RETRY_INTERVAL);
        assert_eq!(manager.sequencer().visible_text(), "queued 0");

        manager.advance();
        assert_eq!(
            manager.save().peek_dialog_state("q").map(|r| r.current_index),
            Some(1)
        );
    }

    #[test]
    fn test_relation_update_emits_event() {
        let view = RecordingView::new();
        let mut manager = manager(&view);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        manager
            .events_mut()
            .subscribe_topic("relation", move |e| sink.borrow_mut().push(e.clone()));

        assert_eq!(manager.update_character_relation("vex", 250), 100);
        assert_eq!(
            *seen.borrow(),
            vec![GameEvent::RelationChanged {
                character: "vex".to_string(),
                score: 100
            }]
        );
    }

    #[test]
    fn test_combat_result_message() {
        let view = RecordingView::new();
        let mut manager = manager(&view);
        manager.show_combat_result(true, 1500.0, Currency::Quark, 0);

        let entry = manager.sequencer().current_entry().expect("showing");
        assert_eq!(entry.speaker, "Ship Computer");
        assert_eq!(entry.text, "Victory! We salvaged 1.5K Quark.");
    }

    #[test]
    fn test_language_setting_applies() {
        let view = RecordingView::new();
        let mut manager = manager(&view);
        manager.update_settings(|s| s.language = "es".to_string());
        assert_eq!(manager.localization().current_language(), "es");

        manager.show_discovery("Kepler-22b");
        let entry = manager.sequencer().current_entry().expect("showing");
        assert_eq!(entry.speaker, "Oficial científico");
        assert_eq!(
            entry.text,
            "Los sensores detectaron algo nuevo: Kepler-22b."
        );
    }
}
