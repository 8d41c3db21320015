//! Persisted dialog state.
//!
//! Three kinds of blob live in the key-value store:
//! - one [`DialogSaveRecord`] per dialog id under `dialog_save_<id>`
//! - the [`DialogSettings`] blob
//! - the character relation map
//!
//! Records are cached in memory and written through on every change.

use crate::clock::SharedClock;
use crate::localization::DEFAULT_LANGUAGE;
use crate::storage::{load_json, save_json, SharedStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Key prefix for per-dialog records.
pub const DIALOG_SAVE_PREFIX: &str = "dialog_save_";

/// Key of the settings blob.
pub const DIALOG_SETTINGS_KEY: &str = "dialog_settings";

/// Key of the character relation map.
pub const CHARACTER_RELATIONS_KEY: &str = "dialog_character_relations";

/// Lowest relationship score.
pub const RELATION_MIN: i32 = -100;

/// Highest relationship score.
pub const RELATION_MAX: i32 = 100;

/// Playback position of one dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogSaveRecord {
    pub dialog_id: String,
    pub current_index: usize,
    pub is_completed: bool,
    /// Original indices of the choices picked during this dialog, in order.
    #[serde(default)]
    pub chosen_options: Vec<usize>,
    /// Unix millis of the last write.
    pub timestamp: u64,
    /// Relationship scores at the time of the last write.
    #[serde(default)]
    pub character_relations: HashMap<String, i32>,
}

/// Player-facing dialog settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogSettings {
    pub enable_typewriter: bool,
    /// Characters revealed per second.
    pub typewriter_speed: f32,
    pub enable_sounds: bool,
    pub enable_animations: bool,
    /// Seconds a fully shown line stays up before advancing by itself.
    /// Zero disables auto-advance.
    pub auto_advance_time: f32,
    pub language: String,
}

impl Default for DialogSettings {
    fn default() -> Self {
        Self {
            enable_typewriter: true,
            typewriter_speed: 30.0,
            enable_sounds: true,
            enable_animations: true,
            auto_advance_time: 0.0,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl DialogSettings {
    /// Auto-advance delay, if enabled and representable.
    pub fn auto_advance(&self) -> Option<Duration> {
        if self.auto_advance_time > 0.0 {
            Duration::try_from_secs_f32(self.auto_advance_time).ok()
        } else {
            None
        }
    }
}

/// Storage key for a dialog record.
pub fn dialog_key(dialog_id: &str) -> String {
    format!("{DIALOG_SAVE_PREFIX}{dialog_id}")
}

/// Dialog records, settings and relationships.
pub struct DialogSaveSystem {
    store: SharedStore,
    clock: SharedClock,
    records: HashMap<String, DialogSaveRecord>,
    relations: HashMap<String, i32>,
    settings: DialogSettings,
}

impl DialogSaveSystem {
    /// Create the save system, restoring settings and relations.
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        let settings = load_json(store.as_ref(), DIALOG_SETTINGS_KEY).unwrap_or_default();
        let relations = load_json(store.as_ref(), CHARACTER_RELATIONS_KEY).unwrap_or_default();

        Self {
            store,
            clock,
            records: HashMap::new(),
            relations,
            settings,
        }
    }

    // ------------------------------------------------------------------
    // Dialog records
    // ------------------------------------------------------------------

    /// Upsert the record for `dialog_id` and write it through.
    ///
    /// `choices` replaces the chosen options when given; `None` keeps them.
    pub fn save_dialog_state(
        &mut self,
        dialog_id: &str,
        current_index: usize,
        is_completed: bool,
        choices: Option<&[usize]>,
    ) -> &DialogSaveRecord {
        let mut record = self
            .load_dialog_state(dialog_id)
            .unwrap_or_else(|| DialogSaveRecord {
                dialog_id: dialog_id.to_string(),
                current_index: 0,
                is_completed: false,
                chosen_options: Vec::new(),
                timestamp: 0,
                character_relations: HashMap::new(),
            });

        record.current_index = current_index;
        record.is_completed = is_completed;
        if let Some(choices) = choices {
            record.chosen_options = choices.to_vec();
        }
        self.write_record(record)
    }

    /// Append a chosen option to the record, creating it if needed.
    pub fn record_choice(&mut self, dialog_id: &str, choice_index: usize) -> &DialogSaveRecord {
        let mut record = self
            .load_dialog_state(dialog_id)
            .unwrap_or_else(|| DialogSaveRecord {
                dialog_id: dialog_id.to_string(),
                current_index: 0,
                is_completed: false,
                chosen_options: Vec::new(),
                timestamp: 0,
                character_relations: HashMap::new(),
            });
        record.chosen_options.push(choice_index);
        self.write_record(record)
    }

    /// Record for `dialog_id`: memory first, then storage.
    ///
    /// Unreadable records count as missing.
    pub fn load_dialog_state(&mut self, dialog_id: &str) -> Option<DialogSaveRecord> {
        if let Some(record) = self.records.get(dialog_id) {
            return Some(record.clone());
        }

        let record: DialogSaveRecord = load_json(self.store.as_ref(), &dialog_key(dialog_id))?;
        self.records.insert(dialog_id.to_string(), record.clone());
        Some(record)
    }

    /// Like [`load_dialog_state`](Self::load_dialog_state) but without
    /// touching the cache.
    pub fn peek_dialog_state(&self, dialog_id: &str) -> Option<DialogSaveRecord> {
        self.records
            .get(dialog_id)
            .cloned()
            .or_else(|| load_json(self.store.as_ref(), &dialog_key(dialog_id)))
    }

    pub fn is_dialog_completed(&self, dialog_id: &str) -> bool {
        self.peek_dialog_state(dialog_id)
            .map_or(false, |r| r.is_completed)
    }

    /// Whether `choice_index` was picked during `dialog_id`.
    pub fn has_chosen(&self, dialog_id: &str, choice_index: usize) -> bool {
        self.peek_dialog_state(dialog_id)
            .map_or(false, |r| r.chosen_options.contains(&choice_index))
    }

    /// Forget one dialog's progress.
    pub fn clear_dialog_state(&mut self, dialog_id: &str) {
        self.records.remove(dialog_id);
        if let Err(e) = self.store.remove(&dialog_key(dialog_id)) {
            tracing::error!("Failed to clear dialog '{}': {}", dialog_id, e);
        }
    }

    /// Forget every dialog's progress. Settings and relations are kept.
    pub fn clear_all_dialogs(&mut self) {
        self.records.clear();
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!("Failed to list dialog saves: {}", e);
                return;
            }
        };
        for key in keys.iter().filter(|k| k.starts_with(DIALOG_SAVE_PREFIX)) {
            if let Err(e) = self.store.remove(key) {
                tracing::error!("Failed to remove '{}': {}", key, e);
            }
        }
    }

    fn write_record(&mut self, mut record: DialogSaveRecord) -> &DialogSaveRecord {
        record.timestamp = self.clock.now_millis();
        record.character_relations = self.relations.clone();

        save_json(self.store.as_ref(), &dialog_key(&record.dialog_id), &record);

        let id = record.dialog_id.clone();
        self.records.insert(id.clone(), record);
        &self.records[&id]
    }

    // ------------------------------------------------------------------
    // Character relations
    // ------------------------------------------------------------------

    /// Relationship score for `character`; zero if never changed.
    pub fn character_relation(&self, character: &str) -> i32 {
        self.relations.get(character).copied().unwrap_or(0)
    }

    pub fn character_relations(&self) -> &HashMap<String, i32> {
        &self.relations
    }

    /// Shift a relationship score, clamped to `[-100, 100]`. Returns the new score.
    pub fn update_character_relation(&mut self, character: &str, delta: i32) -> i32 {
        let score = self
            .character_relation(character)
            .saturating_add(delta)
            .clamp(RELATION_MIN, RELATION_MAX);
        self.relations.insert(character.to_string(), score);
        save_json(self.store.as_ref(), CHARACTER_RELATIONS_KEY, &self.relations);
        score
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &DialogSettings {
        &self.settings
    }

    /// Edit and persist the settings.
    pub fn update_settings(&mut self, edit: impl FnOnce(&mut DialogSettings)) {
        edit(&mut self.settings);
        save_json(self.store.as_ref(), DIALOG_SETTINGS_KEY, &self.settings);
    }

    pub fn reset_settings(&mut self) {
        self.update_settings(|s| *s = DialogSettings::default());
    }
}

impl std::fmt::Debug for DialogSaveSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogSaveSystem")
            .field("records", &self.records.len())
            .field("relations", &self.relations)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    fn save_system() -> (DialogSaveSystem, SharedStore) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(5_000));
        (DialogSaveSystem::new(store.clone(), clock), store)
    }

    #[test]
    fn test_save_and_load_record() {
        let (mut saves, store) = save_system();
        saves.save_dialog_state("intro", 2, false, Some(&[1]));

        let raw = store.get("dialog_save_intro").unwrap().expect("record written");
        assert!(raw.contains("\"currentIndex\":2"));
        assert!(raw.contains("\"isCompleted\":false"));

        let record = saves.load_dialog_state("intro").expect("record");
        assert_eq!(record.current_index, 2);
        assert_eq!(record.chosen_options, vec![1]);
        assert_eq!(record.timestamp, 5_000);
    }

    #[test]
    fn test_load_falls_back_to_storage() {
        let (mut saves, store) = save_system();
        saves.save_dialog_state("intro", 1, false, None);

        let clock = Arc::new(ManualClock::new(0));
        let mut fresh = DialogSaveSystem::new(store, clock);
        assert_eq!(fresh.load_dialog_state("intro").map(|r| r.current_index), Some(1));
        assert!(fresh.load_dialog_state("unknown").is_none());
    }

    #[test]
    fn test_corrupt_record_reads_as_missing() {
        let (mut saves, store) = save_system();
        store.set("dialog_save_broken", "{\"dialogId\":").unwrap();
        assert!(saves.load_dialog_state("broken").is_none());
    }

    #[test]
    fn test_choices_kept_when_not_given() {
        let (mut saves, _) = save_system();
        saves.record_choice("trade", 2);
        saves.save_dialog_state("trade", 3, true, None);

        assert!(saves.has_chosen("trade", 2));
        assert!(saves.is_dialog_completed("trade"));
    }

    #[test]
    fn test_relation_clamping() {
        let (mut saves, _) = save_system();
        for _ in 0..3 {
            saves.update_character_relation("vex", 1000);
        }
        assert_eq!(saves.character_relation("vex"), 100);

        for _ in 0..3 {
            saves.update_character_relation("vex", -1000);
        }
        assert_eq!(saves.character_relation("vex"), -100);

        assert_eq!(saves.update_character_relation("vex", 30), -70);
        assert_eq!(saves.character_relation("nobody"), 0);
    }

    #[test]
    fn test_relations_persist() {
        let (mut saves, store) = save_system();
        saves.update_character_relation("zorg", -15);

        let fresh = DialogSaveSystem::new(store, Arc::new(ManualClock::new(0)));
        assert_eq!(fresh.character_relation("zorg"), -15);
    }

    #[test]
    fn test_settings_defaults_on_garbage() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store.set(DIALOG_SETTINGS_KEY, "nope").unwrap();

        let saves = DialogSaveSystem::new(store, Arc::new(ManualClock::new(0)));
        assert_eq!(saves.settings(), &DialogSettings::default());
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store
            .set(DIALOG_SETTINGS_KEY, r#"{"typewriterSpeed": 60.0}"#)
            .unwrap();

        let saves = DialogSaveSystem::new(store, Arc::new(ManualClock::new(0)));
        assert_eq!(saves.settings().typewriter_speed, 60.0);
        assert!(saves.settings().enable_typewriter);
        assert_eq!(saves.settings().language, "en");
    }

    #[test]
    fn test_oversized_auto_advance_is_disabled() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store
            .set(DIALOG_SETTINGS_KEY, r#"{"autoAdvanceTime": 1e30}"#)
            .unwrap();

        let saves = DialogSaveSystem::new(store, Arc::new(ManualClock::new(0)));
        assert_eq!(saves.settings().auto_advance(), None);

        let nan = DialogSettings {
            auto_advance_time: f32::NAN,
            ..DialogSettings::default()
        };
        assert_eq!(nan.auto_advance(), None);
    }

    #[test]
    fn test_clear_all_dialogs_keeps_settings() {
        let (mut saves, store) = save_system();
        saves.save_dialog_state("a", 1, false, None);
        saves.save_dialog_state("b", 2, true, None);
        saves.update_settings(|s| s.enable_sounds = false);

        saves.clear_all_dialogs();
        assert!(saves.load_dialog_state("a").is_none());
        assert!(saves.load_dialog_state("b").is_none());
        assert!(store.get(DIALOG_SETTINGS_KEY).unwrap().is_some());
    }
}
