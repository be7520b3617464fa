//! Persistent translation store
//!
//! Translations live under one fixed key in a two-tier key-value setup. The
//! primary tier holds the compact encoding; the legacy tier is an older,
//! size-limited location that may hold either the compact encoding or the
//! legacy JSON object. Reading from the legacy tier migrates its content to
//! the primary tier once.
//!
//! Compact encoding: `key:value|key:value`, values percent-encoded the way
//! browsers encode URI components. Canonical ids `e<N>` are written as the
//! bare number `N`.
//!
//! Legacy JSON: `{"e3": {"translation": "bar"}}`.

use crate::entries::EntryId;
use crate::error::GlossaError;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Fixed storage key shared by both tiers.
pub const STORAGE_KEY: &str = "learning_dict_data";

/// Characters left unescaped by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub type Translations = BTreeMap<EntryId, String>;

/// A string key-value layer. Errors mean the layer is unavailable or
/// rejected the write.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, GlossaError>;
    fn set(&self, key: &str, value: &str) -> Result<(), GlossaError>;
    fn remove(&self, key: &str) -> Result<(), GlossaError>;
}

/// Which tier accepted a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveOutcome {
    Primary,
    Legacy,
    Dropped,
}

/// Lets tests keep a handle on a tier after handing it to a store.
#[cfg(test)]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, GlossaError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), GlossaError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), GlossaError> {
        (**self).remove(key)
    }
}

// ============ Codec ============

pub fn encode_compact(data: &Translations) -> String {
    data.iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(id, value)| {
            let key = id.index_digits().unwrap_or(id.as_str());
            format!("{}:{}", key, utf8_percent_encode(value, URI_COMPONENT))
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn has_malformed_escape(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return true;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    false
}

fn decode_component(value: &str) -> Option<String> {
    if has_malformed_escape(value) {
        return None;
    }
    percent_decode_str(value)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Parses the compact encoding. Records without a colon or with a broken
/// percent escape are skipped.
pub fn decode_compact(raw: &str) -> Translations {
    let mut data = Translations::new();
    for record in raw.split('|') {
        let Some((key, value)) = record.split_once(':') else {
            continue;
        };
        let Some(decoded) = decode_component(value) else {
            continue;
        };
        let id = if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
            EntryId::new(format!("e{}", key))
        } else {
            EntryId::new(key)
        };
        data.insert(id, decoded);
    }
    data
}

/// Reads a legacy JSON value. Returns `None` unless the value is an object;
/// records whose `translation` is not a string are skipped.
pub fn from_legacy_value(value: &Value) -> Option<Translations> {
    let object = value.as_object()?;
    Some(
        object
            .iter()
            .filter_map(|(id, record)| {
                let translation = record.get("translation")?.as_str()?;
                Some((EntryId::new(id.as_str()), translation.to_string()))
            })
            .collect(),
    )
}

pub fn to_legacy_value(data: &Translations) -> Value {
    let object: Map<String, Value> = data
        .iter()
        .map(|(id, translation)| (id.to_string(), json!({ "translation": translation })))
        .collect();
    Value::Object(object)
}

/// Decodes a stored payload of either format. Never fails: JSON-looking
/// payloads that do not parse are retried as compact records, and a valid
/// JSON payload that is not an object decodes to nothing.
pub fn decode(raw: &str) -> Translations {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Translations::new();
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return from_legacy_value(&value).unwrap_or_default();
        }
    }
    decode_compact(raw)
}

// ============ Store ============

pub struct TranslationStore {
    primary: Box<dyn KeyValueStore>,
    legacy: Box<dyn KeyValueStore>,
    key: String,
}

impl TranslationStore {
    pub fn new(primary: Box<dyn KeyValueStore>, legacy: Box<dyn KeyValueStore>) -> Self {
        Self::with_key(primary, legacy, STORAGE_KEY)
    }

    pub fn with_key(
        primary: Box<dyn KeyValueStore>,
        legacy: Box<dyn KeyValueStore>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            primary,
            legacy,
            key: key.into(),
        }
    }

    fn read_primary(&self) -> Option<String> {
        match self.primary.get(&self.key) {
            Ok(Some(raw)) if !raw.is_empty() => Some(raw),
            Ok(_) => None,
            Err(e) => {
                warn!("Primary translation storage unavailable: {}", e);
                None
            }
        }
    }

    fn read_legacy(&self) -> Option<String> {
        match self.legacy.get(&self.key) {
            Ok(Some(raw)) if !raw.is_empty() => Some(raw),
            Ok(_) => None,
            Err(e) => {
                warn!("Legacy translation storage unavailable: {}", e);
                None
            }
        }
    }

    /// Loads the mapping: primary tier first, then the legacy tier (which is
    /// migrated as a side effect), then nothing.
    pub fn load(&self) -> Translations {
        if let Some(raw) = self.read_primary() {
            return decode(&raw);
        }
        match self.read_legacy() {
            Some(raw) => {
                let data = decode(&raw);
                self.migrate(&data);
                data
            }
            None => Translations::new(),
        }
    }

    /// Moves legacy-tier data to the primary tier if the primary tier is
    /// empty. Returns true when the legacy entry was moved and deleted.
    pub fn migrate_once(&self) -> bool {
        if self.read_primary().is_some() {
            return false;
        }
        match self.read_legacy() {
            Some(raw) => self.migrate(&decode(&raw)),
            None => false,
        }
    }

    fn migrate(&self, data: &Translations) -> bool {
        if let Err(e) = self.primary.set(&self.key, &encode_compact(data)) {
            warn!("Migration to primary storage failed, keeping legacy copy: {}", e);
            return false;
        }
        if let Err(e) = self.legacy.remove(&self.key) {
            warn!("Failed to delete migrated legacy entry: {}", e);
            return false;
        }
        info!("Migrated {} translations from legacy storage", data.len());
        true
    }

    /// Saves the mapping in compact form. When the primary tier refuses the
    /// write, the legacy JSON form goes to the legacy tier instead; when that
    /// fails too the write is dropped.
    pub fn save(&self, data: &Translations) -> SaveOutcome {
        let compact = encode_compact(data);
        let primary_err = match self.primary.set(&self.key, &compact) {
            Ok(()) => return SaveOutcome::Primary,
            Err(e) => e,
        };

        let legacy_json = to_legacy_value(data).to_string();
        match self.legacy.set(&self.key, &legacy_json) {
            Ok(()) => {
                warn!("Primary storage rejected save ({}), wrote legacy copy", primary_err);
                SaveOutcome::Legacy
            }
            Err(e) => {
                warn!(
                    "Dropping translation save: primary failed ({}), legacy failed ({})",
                    primary_err, e
                );
                SaveOutcome::Dropped
            }
        }
    }

    /// Single-record update against the current persisted mapping.
    pub fn update(&self, id: &EntryId, translation: &str) -> SaveOutcome {
        let mut data = self.load();
        data.insert(id.clone(), translation.to_string());
        self.save(&data)
    }

    /// Replaces the whole persisted mapping.
    pub fn replace_all(&self, data: &Translations) -> SaveOutcome {
        self.save(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn map(pairs: &[(&str, &str)]) -> Translations {
        pairs
            .iter()
            .map(|(k, v)| (EntryId::new(*k), v.to_string()))
            .collect()
    }

    fn store() -> (TranslationStore, Arc<MemoryStore>, Arc<MemoryStore>) {
        let primary = Arc::new(MemoryStore::new());
        let legacy = Arc::new(MemoryStore::new());
        let store = TranslationStore::new(Box::new(primary.clone()), Box::new(legacy.clone()));
        (store, primary, legacy)
    }

    #[test]
    fn test_round_trip_drops_empty() {
        let data = map(&[("e0", "foo"), ("e1", "")]);
        assert_eq!(decode(&encode_compact(&data)), map(&[("e0", "foo")]));
    }

    #[test]
    fn test_encode_keys_and_escaping() {
        let data = map(&[("e3", "a|b:c d"), ("custom", "ü!'()*"), ("e7x", "v")]);
        let encoded = encode_compact(&data);
        assert_eq!(encoded, "custom:%C3%BC!'()*|3:a%7Cb%3Ac%20d|e7x:v");
        assert_eq!(decode(&encoded), data);
    }

    #[test]
    fn test_decode_legacy_json() {
        let decoded = decode(r#"{"e3":{"translation":"bar"}}"#);
        assert_eq!(decoded, map(&[("e3", "bar")]));
    }

    #[test]
    fn test_decode_legacy_json_skips_bad_records() {
        let decoded = decode(r#" {"e1":{"translation":5},"e2":{},"e4":{"translation":"ok"}}"#);
        assert_eq!(decoded, map(&[("e4", "ok")]));
        assert!(decode("[1, 2]").is_empty());
    }

    #[test]
    fn test_decode_compact() {
        assert_eq!(decode("3:bar|7:baz"), map(&[("e3", "bar"), ("e7", "baz")]));
        assert_eq!(decode("x1:qux"), map(&[("x1", "qux")]));
    }

    #[test]
    fn test_decode_skips_malformed_records() {
        let decoded = decode("3:bar||nocolon|5:%E0%A4%A|6:%zz|8:%E3%81%82|9:");
        assert_eq!(decoded, map(&[("e3", "bar"), ("e8", "あ"), ("e9", "")]));
    }

    #[test]
    fn test_broken_json_falls_back_to_compact() {
        assert!(decode("{not json").is_empty());
        assert_eq!(decode("{x:1"), map(&[("{x", "1")]));
    }

    #[test]
    fn test_load_prefers_primary() {
        let (store, primary, legacy) = store();
        primary.set(STORAGE_KEY, "1:one").unwrap();
        legacy.set(STORAGE_KEY, "2:two").unwrap();
        assert_eq!(store.load(), map(&[("e1", "one")]));
        assert!(legacy.get(STORAGE_KEY).unwrap().is_some());
    }

    #[test]
    fn test_load_migrates_legacy() {
        let (store, primary, legacy) = store();
        legacy
            .set(STORAGE_KEY, r#"{"e0":{"translation":"oiseau"},"e2":{"translation":""}}"#)
            .unwrap();

        let loaded = store.load();
        assert_eq!(loaded, map(&[("e0", "oiseau"), ("e2", "")]));
        assert_eq!(primary.get(STORAGE_KEY).unwrap().as_deref(), Some("0:oiseau"));
        assert!(legacy.get(STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_failed_migration_keeps_legacy() {
        let (store, primary, legacy) = store();
        legacy.set(STORAGE_KEY, "4:vol").unwrap();
        primary.set_available(false);

        assert_eq!(store.load(), map(&[("e4", "vol")]));
        assert!(!store.migrate_once());
        assert_eq!(legacy.get(STORAGE_KEY).unwrap().as_deref(), Some("4:vol"));

        primary.set_available(true);
        assert!(store.migrate_once());
        assert!(legacy.get(STORAGE_KEY).unwrap().is_none());
        assert!(!store.migrate_once());
    }

    #[test]
    fn test_load_empty() {
        let (store, _, _) = store();
        assert!(store.load().is_empty());
        assert!(!store.migrate_once());
    }

    #[test]
    fn test_save_fallbacks() {
        let (store, primary, legacy) = store();
        let data = map(&[("e0", "foo"), ("e1", "")]);

        assert_eq!(store.save(&data), SaveOutcome::Primary);
        assert_eq!(primary.get(STORAGE_KEY).unwrap().as_deref(), Some("0:foo"));

        primary.set_available(false);
        assert_eq!(store.save(&data), SaveOutcome::Legacy);
        let raw = legacy.get(STORAGE_KEY).unwrap().unwrap();
        assert!(raw.starts_with('{'));
        assert_eq!(decode(&raw), data);

        legacy.set_available(false);
        assert_eq!(store.save(&data), SaveOutcome::Dropped);
    }

    #[test]
    fn test_update_single_record() {
        let (store, primary, _) = store();
        primary.set(STORAGE_KEY, "0:foo|custom:bar").unwrap();
        assert_eq!(store.update(&EntryId::from_index(2), "baz"), SaveOutcome::Primary);
        assert_eq!(
            store.load(),
            map(&[("e0", "foo"), ("custom", "bar"), ("e2", "baz")])
        );
        store.update(&EntryId::from_index(0), "");
        assert_eq!(store.load(), map(&[("custom", "bar"), ("e2", "baz")]));
    }

    #[test]
    fn test_legacy_round_trip_value() {
        let data = map(&[("e1", "x")]);
        let value = to_legacy_value(&data);
        assert_eq!(value, json!({"e1": {"translation": "x"}}));
        assert_eq!(from_legacy_value(&value), Some(data));
        assert_eq!(from_legacy_value(&json!("text")), None);
    }
}
