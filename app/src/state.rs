//! Application state management

use crate::cache::RenderCache;
use crate::config::Config;
use crate::debounce::Debouncer;
use crate::entries::{Entry, EntryId, EntryStore};
use crate::error::GlossaError;
use crate::filter::FilterState;
use crate::index::build_references;
use crate::render::{render_meaning, Fragment};
use crate::search::jump_to_headword;
use crate::storage::{SqliteStore, Tier};
use crate::tokens::{is_locked, special_headwords};
use crate::tooltip::{
    ClickOrigin, PointerTarget, PopupContent, Rect, TextMetrics, TooltipStack, Viewport,
};
use crate::translations::{from_legacy_value, to_legacy_value, SaveOutcome, TranslationStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// One table row as the viewer shows it.
#[derive(Debug, Clone, Serialize)]
pub struct EntryRow {
    pub id: EntryId,
    pub headword: String,
    pub meaning: String,
    pub locked: bool,
    pub translation: Option<String>,
    pub referenced_by: Vec<String>,
    pub visible: bool,
}

/// Everything the viewer works on. Owned in one place; a dataset reload
/// replaces the entries, index and derived data wholesale.
pub struct AppState {
    store: EntryStore,
    translations: TranslationStore,
    /// Current value of each editable translation field, including edits
    /// not yet committed to storage.
    live: HashMap<EntryId, String>,
    special: HashSet<String>,
    tooltips: TooltipStack,
    metrics: TextMetrics,
    filter: FilterState,
    visibility: Vec<bool>,
    text_input: Debouncer<String>,
    cache: RenderCache,
    dataset_path: Option<PathBuf>,
}

impl AppState {
    /// Opens the settings database and loads the dataset file.
    pub fn new(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", config.data_dir))?;
        let primary = SqliteStore::open(&config.settings_db_path, Tier::Primary)
            .with_context(|| format!("Failed to open {:?}", config.settings_db_path))?;
        let legacy = SqliteStore::open(&config.settings_db_path, Tier::Legacy)
            .with_context(|| format!("Failed to open {:?}", config.settings_db_path))?;
        let translations = TranslationStore::new(Box::new(primary), Box::new(legacy));

        let text = std::fs::read_to_string(&config.dataset_path)
            .with_context(|| format!("Failed to read dataset {:?}", config.dataset_path))?;

        let mut state = Self::with_store(translations, config.cache_capacity);
        state.dataset_path = Some(config.dataset_path.clone());
        state.load_dataset(&text);
        Ok(state)
    }

    /// State with no entries yet, backed by the given translation store.
    pub fn with_store(translations: TranslationStore, cache_capacity: usize) -> Self {
        Self {
            store: EntryStore::default(),
            translations,
            live: HashMap::new(),
            special: special_headwords(),
            tooltips: TooltipStack::default(),
            metrics: TextMetrics::default(),
            filter: FilterState::default(),
            visibility: Vec::new(),
            text_input: Debouncer::default(),
            cache: RenderCache::new(cache_capacity),
            dataset_path: None,
        }
    }

    /// Replaces the dataset: parses, reindexes, reloads live translations
    /// and resets everything derived from the previous entries.
    pub fn load_dataset(&mut self, text: &str) {
        let mut store = EntryStore::parse(text);
        let stats = build_references(&mut store, &self.special);
        self.store = store;
        self.tooltips.close_from(0);
        self.refresh_live();
        info!(
            "Loaded {} entries ({} references)",
            self.store.len(),
            stats.references
        );
    }

    /// Re-reads the dataset file given at startup.
    pub fn reload(&mut self) -> Result<usize, GlossaError> {
        let path = self
            .dataset_path
            .clone()
            .ok_or_else(|| GlossaError::Dataset("No dataset file configured".to_string()))?;
        let text = std::fs::read_to_string(&path)
            .map_err(|e| GlossaError::Dataset(format!("Failed to read {:?}: {}", path, e)))?;
        self.load_dataset(&text);
        Ok(self.store.len())
    }

    fn refresh_live(&mut self) {
        let persisted = self.translations.load();
        self.live = self
            .store
            .entries()
            .iter()
            .filter(|e| !is_locked(&e.headword))
            .map(|e| {
                let value = persisted.get(&e.id).cloned().unwrap_or_default();
                (e.id.clone(), value)
            })
            .collect();
        self.cache.clear();
        self.apply_filter();
    }

    pub fn entries(&self) -> &[Entry] {
        self.store.entries()
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn translation(&self, id: &str) -> Option<&str> {
        self.live.get(id).map(String::as_str)
    }

    pub fn rows(&self) -> Vec<EntryRow> {
        self.store
            .entries()
            .iter()
            .zip(self.visibility.iter().copied().chain(std::iter::repeat(true)))
            .map(|(e, visible)| EntryRow {
                id: e.id.clone(),
                headword: e.headword.clone(),
                meaning: e.meaning.clone(),
                locked: is_locked(&e.headword),
                translation: self.live.get(&e.id).cloned(),
                referenced_by: e.referenced_by.clone(),
                visible,
            })
            .collect()
    }

    fn editable(&self, id: &str) -> Result<EntryId, GlossaError> {
        let entry = self
            .store
            .get(id)
            .ok_or_else(|| GlossaError::NotFound(format!("Entry {}", id)))?;
        if is_locked(&entry.headword) {
            return Err(GlossaError::Other(format!(
                "Entry {} ({}) is locked",
                id, entry.headword
            )));
        }
        Ok(entry.id.clone())
    }

    /// Updates the live value of a translation field without persisting it.
    pub fn set_draft(&mut self, id: &str, value: &str) -> Result<(), GlossaError> {
        let id = self.editable(id)?;
        self.live.insert(id, value.to_string());
        self.cache.clear();
        self.apply_filter();
        Ok(())
    }

    /// Commits a translation: live value plus a single-record store update.
    pub fn commit_translation(&mut self, id: &str, value: &str) -> Result<SaveOutcome, GlossaError> {
        let id = self.editable(id)?;
        let outcome = self.translations.update(&id, value);
        self.live.insert(id, value.to_string());
        self.cache.clear();
        self.apply_filter();
        Ok(outcome)
    }

    /// Pretty-printed export of the persisted mapping in legacy JSON shape.
    pub fn export_json(&self) -> String {
        let value = to_legacy_value(&self.translations.load());
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }

    /// Replaces the persisted mapping with an imported JSON object and
    /// refreshes live values. Nothing changes when the payload is invalid.
    pub fn import_json(&mut self, text: &str) -> Result<usize, GlossaError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| GlossaError::Import(format!("Failed to load JSON: {}", e)))?;
        let data = from_legacy_value(&value)
            .ok_or_else(|| GlossaError::Import("Invalid file: expected a JSON object".to_string()))?;

        let count = data.len();
        self.translations.replace_all(&data);
        self.refresh_live();
        info!("Imported {} translations", count);
        Ok(count)
    }

    /// Live translations keyed by headword, as the renderer reads them.
    pub fn headword_translations(&self) -> HashMap<String, String> {
        self.store
            .entries()
            .iter()
            .filter_map(|e| {
                self.live
                    .get(&e.id)
                    .map(|t| (e.headword.clone(), t.clone()))
            })
            .collect()
    }

    fn render_headword(&self, headword: &str) -> Option<Arc<Vec<Fragment>>> {
        let entry = self.store.lookup(headword)?;
        Some(self.cache.get_or_render(headword, || {
            render_meaning(&self.store, &entry.meaning, &self.headword_translations())
        }))
    }

    pub fn render_entry(&self, id: &str) -> Option<Arc<Vec<Fragment>>> {
        let entry = self.store.get(id)?;
        // Rendering by headword would pick a later duplicate's meaning.
        if self.store.lookup(&entry.headword).map(|e| &e.id) != Some(&entry.id) {
            return Some(Arc::new(render_meaning(
                &self.store,
                &entry.meaning,
                &self.headword_translations(),
            )));
        }
        self.render_headword(&entry.headword)
    }

    fn popup_content(&self, headword: &str) -> Option<PopupContent> {
        let entry = self.store.lookup(headword)?;
        let body = self.render_headword(headword)?;
        let translation = self
            .live
            .get(&entry.id)
            .filter(|t| !t.is_empty())
            .cloned();
        Some(PopupContent {
            headword: entry.headword.clone(),
            translation,
            body: (*body).clone(),
        })
    }

    pub fn tooltips(&self) -> &TooltipStack {
        &self.tooltips
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.tooltips.set_viewport(viewport);
    }

    /// Click on an annotated word or backlink chip.
    pub fn click(&mut self, origin: ClickOrigin, anchor: Rect, headword: &str) -> Option<usize> {
        let content = self.popup_contents_for(origin, headword);
        let metrics = self.metrics;
        self.tooltips
            .click(origin, anchor, headword, |_| content, &metrics)
    }

    fn popup_contents_for(&self, origin: ClickOrigin, headword: &str) -> Option<PopupContent> {
        if origin.target_level() >= crate::tooltip::MAX_LEVELS {
            return None;
        }
        self.popup_content(headword)
    }

    pub fn pointer(&mut self, target: PointerTarget) {
        self.tooltips.pointer(target);
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn visibility(&self) -> &[bool] {
        &self.visibility
    }

    pub fn set_filter(&mut self, filter: FilterState) -> &[bool] {
        self.filter = filter;
        self.text_input.cancel();
        self.apply_filter();
        &self.visibility
    }

    fn apply_filter(&mut self) {
        self.visibility = self.filter.apply(self.store.entries(), &self.live);
    }

    /// Records a keystroke in the text filter; it takes effect once input
    /// has been quiet for the debounce period.
    pub fn push_text_filter(&mut self, text: String, now: Instant) -> Instant {
        self.text_input.push(text, now);
        now + self.text_input.quiet()
    }

    /// Applies the pending text filter if it is due. Returns whether the
    /// visibility was recomputed.
    pub fn poll_text_filter(&mut self, now: Instant) -> bool {
        match self.text_input.poll(now) {
            Some(text) => {
                self.filter.text = text;
                self.apply_filter();
                true
            }
            None => false,
        }
    }

    /// Applies any pending text filter immediately.
    pub fn flush_text_filter(&mut self) {
        if let Some(text) = self.text_input.flush() {
            self.filter.text = text;
        }
        self.apply_filter();
    }

    pub fn jump(&self, query: &str) -> Option<&Entry> {
        jump_to_headword(&self.store, query)
    }

    pub fn cache_stats(&self) -> (usize, usize) {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TranslationMode;
    use crate::storage::MemoryStore;
    use crate::translations::{KeyValueStore, STORAGE_KEY};
    use std::time::Duration;

    const DATASET: &str = "headword,meaning\n\
        heron,a rare bird that wades\n\
        bird,an animal with wings\n\
        wing,what a bird uses to fly\n\
        NATO,a. alliance; not a bird\n\
        nothing,no match here\n";

    fn state() -> (AppState, Arc<MemoryStore>, Arc<MemoryStore>) {
        let primary = Arc::new(MemoryStore::new());
        let legacy = Arc::new(MemoryStore::new());
        let store = TranslationStore::new(Box::new(primary.clone()), Box::new(legacy.clone()));
        let mut state = AppState::with_store(store, 16);
        state.load_dataset(DATASET);
        (state, primary, legacy)
    }

    fn anchor() -> Rect {
        Rect::new(10.0, 10.0, 30.0, 16.0)
    }

    #[test]
    fn test_load_builds_rows() {
        let (state, _, _) = state();
        let rows = state.rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[1].referenced_by, vec!["heron", "wing", "NATO"]);
        assert!(rows[3].locked);
        assert_eq!(rows[3].translation, None);
        assert_eq!(rows[0].translation.as_deref(), Some(""));
        assert!(rows.iter().all(|r| r.visible));
    }

    #[test]
    fn test_locked_entries_cannot_be_edited() {
        let (mut state, _, _) = state();
        assert!(matches!(state.commit_translation("e3", "OTAN"), Err(GlossaError::Other(_))));
        assert!(matches!(state.set_draft("e99", "x"), Err(GlossaError::NotFound(_))));
    }

    #[test]
    fn test_commit_persists_and_updates_render() {
        let (mut state, primary, _) = state();
        assert_eq!(state.commit_translation("e1", "oiseau").unwrap(), SaveOutcome::Primary);
        assert_eq!(primary.get(STORAGE_KEY).unwrap().as_deref(), Some("1:oiseau"));

        let fragments = state.render_entry("e0").unwrap();
        assert!(fragments.iter().any(|f| matches!(
            f,
            Fragment::Annotated { headword, translation, empty: false, .. }
                if headword == "bird" && translation == "oiseau"
        )));
    }

    #[test]
    fn test_draft_affects_filter_but_not_storage() {
        let (mut state, primary, _) = state();
        state.set_filter(FilterState {
            tokens: ["a".to_string()].into_iter().collect(),
            mode: TranslationMode::Empty,
            text: String::new(),
        });
        assert_eq!(state.visibility(), &[true, false, true, true, false]);

        state.set_draft("e0", "héron").unwrap();
        assert_eq!(state.visibility(), &[false, false, true, true, false]);
        assert_eq!(primary.get(STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn test_import_replaces_and_export_round_trips() {
        let (mut state, _, _) = state();
        state.commit_translation("e2", "aile").unwrap();

        assert_eq!(
            state.import_json(r#"{"e0":{"translation":"héron"}}"#).unwrap(),
            1
        );
        assert_eq!(state.translation("e0"), Some("héron"));
        assert_eq!(state.translation("e2"), Some(""));

        let exported: serde_json::Value = serde_json::from_str(&state.export_json()).unwrap();
        assert_eq!(exported, serde_json::json!({"e0": {"translation": "héron"}}));
    }

    #[test]
    fn test_invalid_import_changes_nothing() {
        let (mut state, primary, _) = state();
        state.commit_translation("e2", "aile").unwrap();
        assert!(matches!(state.import_json("[1,2]"), Err(GlossaError::Import(_))));
        assert!(matches!(state.import_json("{oops"), Err(GlossaError::Import(_))));
        assert_eq!(state.translation("e2"), Some("aile"));
        assert_eq!(primary.get(STORAGE_KEY).unwrap().as_deref(), Some("2:aile"));
    }

    #[test]
    fn test_startup_migrates_legacy_translations() {
        let primary = Arc::new(MemoryStore::new());
        let legacy = Arc::new(MemoryStore::new());
        legacy
            .set(STORAGE_KEY, r#"{"e1":{"translation":"oiseau"}}"#)
            .unwrap();
        let store = TranslationStore::new(Box::new(primary.clone()), Box::new(legacy.clone()));
        let mut state = AppState::with_store(store, 16);
        state.load_dataset(DATASET);

        assert_eq!(state.translation("e1"), Some("oiseau"));
        assert_eq!(primary.get(STORAGE_KEY).unwrap().as_deref(), Some("1:oiseau"));
        assert_eq!(legacy.get(STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn test_tooltip_drill_down() {
        let (mut state, _, _) = state();
        state.commit_translation("e1", "oiseau").unwrap();

        assert_eq!(state.click(ClickOrigin::Table, anchor(), "bird"), Some(0));
        assert_eq!(state.click(ClickOrigin::Layer(0), anchor(), "wing"), Some(1));
        assert_eq!(state.click(ClickOrigin::Layer(1), anchor(), "bird"), Some(2));
        assert_eq!(state.click(ClickOrigin::Layer(2), anchor(), "wing"), None);
        assert_eq!(state.tooltips().depth(), 3);

        let top = state.tooltips().layer(0).unwrap();
        assert_eq!(top.content.translation.as_deref(), Some("oiseau"));

        assert_eq!(state.click(ClickOrigin::Layer(0), anchor(), "nowhere"), None);
        assert_eq!(state.tooltips().depth(), 1);

        state.click(ClickOrigin::Layer(0), anchor(), "wing");
        state.pointer(PointerTarget::Popup(1));
        assert_eq!(state.tooltips().depth(), 2);
        state.pointer(PointerTarget::Elsewhere);
        assert_eq!(state.tooltips().depth(), 0);
    }

    #[test]
    fn test_debounced_text_filter() {
        let (mut state, _, _) = state();
        let start = Instant::now();
        state.push_text_filter("wad".to_string(), start);
        let due = state.push_text_filter("wing".to_string(), start + Duration::from_millis(50));

        assert!(!state.poll_text_filter(start + Duration::from_millis(210)));
        assert!(state.visibility().iter().all(|v| *v));
        assert!(state.poll_text_filter(due));
        assert_eq!(state.filter().text, "wing");
        assert_eq!(state.visibility(), &[false, true, false, false, false]);
    }

    #[test]
    fn test_reload_resets_derived_state() {
        let (mut state, _, _) = state();
        state.click(ClickOrigin::Table, anchor(), "bird");
        state.render_entry("e0");
        assert_eq!(state.cache_stats().0, 2);

        state.load_dataset("h,m\nfly,move like a bird\nbird,animal\n");
        assert_eq!(state.tooltips().depth(), 0);
        assert_eq!(state.cache_stats().0, 0);
        assert!(state.store().lookup("heron").is_none());
        assert_eq!(state.rows()[1].referenced_by, vec!["fly"]);
        assert!(matches!(state.reload(), Err(GlossaError::Dataset(_))));
    }

    #[test]
    fn test_jump() {
        let (state, _, _) = state();
        assert_eq!(state.jump("WIN").map(|e| e.id.as_str()), Some("e2"));
    }
}
