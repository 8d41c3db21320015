//! Localized string tables.
//!
//! One [`LanguageData`] table per language. Lookups read the current
//! language, then the default language, then give up and return the raw key.
//! Templates use literal `{name}` placeholders; there is no escaping, so a
//! literal brace followed by a known parameter name is always substituted.

use futures::future::{BoxFuture, FutureExt, Shared};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Language used when a key is missing from the current table.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Errors from loading a language table.
#[derive(Debug, Error)]
pub enum LocalizationError {
    #[error("Language not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Strings for one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageData {
    #[serde(default)]
    pub code: String,
    pub display_name: String,
    #[serde(default)]
    pub strings: HashMap<String, String>,
}

impl LanguageData {
    pub fn new(code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
            strings: HashMap::new(),
        }
    }

    /// Add a string.
    pub fn with_string(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.strings.insert(key.into(), template.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }
}

// ============================================================================
// Built-in strings
// ============================================================================

struct BuiltinLanguage {
    display_name: &'static str,
    strings: &'static [(&'static str, &'static str)],
}

lazy_static! {
    static ref BUILTIN_LANGUAGES: HashMap<&'static str, BuiltinLanguage> = {
        let mut languages = HashMap::new();
        languages.insert(
            "en",
            BuiltinLanguage {
                display_name: "English",
                strings: &[
                    ("dialog.continue", "Tap to continue"),
                    ("speaker.commander", "Commander"),
                    ("speaker.computer", "Ship Computer"),
                    ("speaker.trader", "Trader"),
                    ("speaker.scientist", "Science Officer"),
                    ("combat.victory", "Victory! We salvaged {reward} {currency}."),
                    (
                        "combat.defeat",
                        "The hull is breached. Mining output is halved for {seconds} seconds.",
                    ),
                    ("purchase.success", "{item} upgraded to level {level}."),
                    ("purchase.failed", "Not enough {currency} for {item}."),
                    ("discovery.found", "Sensors picked up something new: {name}."),
                    ("trade.success", "Exchanged {spent} {from} for {received} {to}."),
                ],
            },
        );
        languages.insert(
            "es",
            BuiltinLanguage {
                display_name: "Español",
                strings: &[
                    ("dialog.continue", "Toca para continuar"),
                    ("speaker.commander", "Comandante"),
                    ("speaker.computer", "Computadora de la nave"),
                    ("speaker.trader", "Comerciante"),
                    ("speaker.scientist", "Oficial científico"),
                    ("combat.victory", "¡Victoria! Recuperamos {reward} {currency}."),
                    (
                        "combat.defeat",
                        "El casco está dañado. La minería se reduce a la mitad durante {seconds} segundos.",
                    ),
                    ("purchase.success", "{item} mejorado al nivel {level}."),
                    ("discovery.found", "Los sensores detectaron algo nuevo: {name}."),
                ],
            },
        );
        languages
    };
}

/// Built-in table for `code`, or an empty table if none is shipped.
pub fn builtin_language(code: &str) -> LanguageData {
    match BUILTIN_LANGUAGES.get(code) {
        Some(builtin) => LanguageData {
            code: code.to_string(),
            display_name: builtin.display_name.to_string(),
            strings: builtin
                .strings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        },
        None => LanguageData::new(code, code),
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Where language tables come from.
pub trait LanguageSource: Send + Sync {
    fn load(&self, code: &str) -> BoxFuture<'static, Result<LanguageData, LocalizationError>>;
}

/// Reads `<dir>/<code>.json`.
#[derive(Debug, Clone)]
pub struct FileLanguageSource {
    dir: PathBuf,
}

impl FileLanguageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LanguageSource for FileLanguageSource {
    fn load(&self, code: &str) -> BoxFuture<'static, Result<LanguageData, LocalizationError>> {
        let path = self.dir.join(format!("{code}.json"));
        let code = code.to_string();
        async move {
            let content = tokio::fs::read_to_string(&path).await?;
            let mut data: LanguageData = serde_json::from_str(&content)?;
            if data.code.is_empty() {
                data.code = code;
            }
            Ok(data)
        }
        .boxed()
    }
}

/// Serves only the built-in tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLanguageSource;

impl LanguageSource for BuiltinLanguageSource {
    fn load(&self, code: &str) -> BoxFuture<'static, Result<LanguageData, LocalizationError>> {
        let result = if BUILTIN_LANGUAGES.contains_key(code) {
            Ok(builtin_language(code))
        } else {
            Err(LocalizationError::NotFound(code.to_string()))
        };
        futures::future::ready(result).boxed()
    }
}

// ============================================================================
// Loader
// ============================================================================

type PendingLoad = Shared<BoxFuture<'static, Arc<LanguageData>>>;

/// Loads language tables, sharing one in-flight load per code.
///
/// A load never fails from the caller's point of view: source errors are
/// logged and replaced with the built-in table for that code.
pub struct LanguageLoader {
    source: Arc<dyn LanguageSource>,
    in_flight: Mutex<HashMap<String, PendingLoad>>,
}

impl LanguageLoader {
    pub fn new(source: Arc<dyn LanguageSource>) -> Self {
        Self {
            source,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or join) the load for `code`.
    pub fn load(&self, code: &str) -> PendingLoad {
        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(pending) = in_flight.get(code) {
            return pending.clone();
        }

        let request = self.source.load(code);
        let fallback_code = code.to_string();
        let pending = async move {
            match request.await {
                Ok(data) => Arc::new(data),
                Err(e) => {
                    tracing::warn!(
                        "Failed to load language '{}', using built-in strings: {}",
                        fallback_code,
                        e
                    );
                    Arc::new(builtin_language(&fallback_code))
                }
            }
        }
        .boxed()
        .shared();

        in_flight.insert(code.to_string(), pending.clone());
        pending
    }

    /// Drop the shared handle for a finished load so the next call reloads.
    pub fn forget(&self, code: &str) {
        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        in_flight.remove(code);
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

// ============================================================================
// Localization
// ============================================================================

/// The set of loaded tables plus the current-language pointer.
pub struct Localization {
    tables: HashMap<String, Arc<LanguageData>>,
    current: String,
    default_language: String,
    loader: Arc<LanguageLoader>,
}

impl Localization {
    /// Create with the built-in default-language table already installed.
    pub fn new(source: Arc<dyn LanguageSource>) -> Self {
        let mut tables = HashMap::new();
        tables.insert(
            DEFAULT_LANGUAGE.to_string(),
            Arc::new(builtin_language(DEFAULT_LANGUAGE)),
        );

        Self {
            tables,
            current: DEFAULT_LANGUAGE.to_string(),
            default_language: DEFAULT_LANGUAGE.to_string(),
            loader: Arc::new(LanguageLoader::new(source)),
        }
    }

    /// Localization over the built-in tables only, all installed up front.
    pub fn builtin() -> Self {
        let mut localization = Self::new(Arc::new(BuiltinLanguageSource));
        for code in BUILTIN_LANGUAGES.keys() {
            localization.install(builtin_language(code));
        }
        localization
    }

    /// The shared loader, for callers that start loads themselves.
    pub fn loader(&self) -> Arc<LanguageLoader> {
        self.loader.clone()
    }

    /// Load (or reload) a language and install it.
    pub async fn load_language(&mut self, code: &str) -> Arc<LanguageData> {
        let data = self.loader.load(code).await;
        self.loader.forget(code);
        self.tables.insert(code.to_string(), data.clone());
        data
    }

    /// Load several languages concurrently.
    pub async fn load_languages(&mut self, codes: &[&str]) {
        let pending: Vec<_> = codes.iter().map(|code| self.loader.load(code)).collect();
        let loaded = futures::future::join_all(pending).await;

        for (code, data) in codes.iter().zip(loaded) {
            self.loader.forget(code);
            self.tables.insert(code.to_string(), data);
        }
    }

    /// Install a table directly.
    pub fn install(&mut self, mut data: LanguageData) {
        if data.code.is_empty() {
            data.code = self.default_language.clone();
        }
        self.tables.insert(data.code.clone(), Arc::new(data));
    }

    /// Switch the current language. Unknown codes leave it unchanged.
    pub fn set_language(&mut self, code: &str) -> bool {
        if self.tables.contains_key(code) {
            self.current = code.to_string();
            true
        } else {
            tracing::warn!("Language '{}' is not loaded", code);
            false
        }
    }

    pub fn current_language(&self) -> &str {
        &self.current
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Loaded languages as `(code, display name)`, sorted by code.
    pub fn available_languages(&self) -> Vec<(String, String)> {
        let mut languages: Vec<_> = self
            .tables
            .values()
            .map(|t| (t.code.clone(), t.display_name.clone()))
            .collect();
        languages.sort();
        languages
    }

    /// Look up a template without logging on a miss.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.tables
            .get(&self.current)
            .and_then(|t| t.get(key))
            .or_else(|| {
                self.tables
                    .get(&self.default_language)
                    .and_then(|t| t.get(key))
            })
    }

    /// Resolve `key` and substitute `params`.
    ///
    /// Falls back to the default language, then to the raw key.
    pub fn get_string(&self, key: &str, params: &[(&str, &str)]) -> String {
        match self.lookup(key) {
            Some(template) => format_string(template, params),
            None => {
                tracing::warn!(
                    "Missing localization key '{}' for language '{}'",
                    key,
                    self.current
                );
                key.to_string()
            }
        }
    }
}

impl std::fmt::Debug for Localization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Localization")
            .field("current", &self.current)
            .field("default_language", &self.default_language)
            .field("languages", &self.tables.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Replace `{name}` tokens with their values. Unknown tokens stay as written.
pub fn format_string(template: &str, params: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            params
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            // Not a known token; keep the brace and rescan from the next char
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl LanguageSource for CountingSource {
        fn load(&self, code: &str) -> BoxFuture<'static, Result<LanguageData, LocalizationError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let data = LanguageData::new(code, "Test").with_string("greeting", "Hallo");
            async move {
                tokio::task::yield_now().await;
                Ok(data)
            }
            .boxed()
        }
    }

    #[test]
    fn test_format_string() {
        assert_eq!(
            format_string("Hello {name}, you have {n} quarks", &[("name", "Ava"), ("n", "3")]),
            "Hello Ava, you have 3 quarks"
        );
        assert_eq!(format_string("{missing} stays", &[]), "{missing} stays");
        assert_eq!(format_string("open { brace", &[("x", "y")]), "open { brace");
        assert_eq!(format_string("{a}{a}", &[("a", "b")]), "bb");
        assert_eq!(format_string("a { {name}", &[("name", "Ava")]), "a { Ava");
        assert_eq!(format_string("{{name}}", &[("name", "Ava")]), "{Ava}");
        assert_eq!(format_string("{x{name}", &[("name", "Ava")]), "{xAva");
    }

    #[test]
    fn test_fallback_chain() {
        let mut localization = Localization::new(Arc::new(BuiltinLanguageSource));
        localization.install(
            LanguageData::new("de", "Deutsch").with_string("speaker.commander", "Kommandant"),
        );
        assert!(localization.set_language("de"));

        // Present in current language
        assert_eq!(localization.get_string("speaker.commander", &[]), "Kommandant");
        // Missing in current, present in default
        assert_eq!(localization.get_string("speaker.trader", &[]), "Trader");
        // Missing everywhere
        assert_eq!(localization.get_string("no.such.key", &[]), "no.such.key");
        assert_eq!(localization.lookup("no.such.key"), None);
    }

    #[test]
    fn test_set_unknown_language() {
        let mut localization = Localization::builtin();
        assert!(!localization.set_language("xx"));
        assert_eq!(localization.current_language(), "en");
        assert!(localization.set_language("es"));
        assert_eq!(localization.get_string("speaker.trader", &[]), "Comerciante");
    }

    #[test]
    fn test_available_languages_sorted() {
        let localization = Localization::builtin();
        let codes: Vec<_> = localization
            .available_languages()
            .into_iter()
            .map(|(code, _)| code)
            .collect();
        assert_eq!(codes, vec!["en".to_string(), "es".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_loads_are_deduplicated() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let loader = LanguageLoader::new(source.clone());

        let (a, b) = futures::join!(loader.load("de"), loader.load("de"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.in_flight_count(), 1);

        loader.forget("de");
        let _ = loader.load("de").await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_languages_installs_tables() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let mut localization = Localization::new(source.clone());

        localization.load_languages(&["de", "de", "fr"]).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(localization.set_language("fr"));
        assert_eq!(localization.get_string("greeting", &[]), "Hallo");
        assert_eq!(localization.loader().in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_language_uses_builtin_defaults() {
        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let mut localization = Localization::new(Arc::new(FileLanguageSource::new(dir.path())));

        let data = localization.load_language("es").await;
        assert_eq!(data.display_name, "Español");

        let unknown = localization.load_language("zz").await;
        assert!(unknown.strings.is_empty());
    }

    #[tokio::test]
    async fn test_file_source_reads_json() {
        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        std::fs::write(
            dir.path().join("fr.json"),
            r#"{"displayName": "Français", "strings": {"speaker.trader": "Marchand"}}"#,
        )
        .unwrap();

        let mut localization = Localization::new(Arc::new(FileLanguageSource::new(dir.path())));
        let data = localization.load_language("fr").await;
        assert_eq!(data.code, "fr");

        localization.set_language("fr");
        assert_eq!(localization.get_string("speaker.trader", &[]), "Marchand");
    }
}
