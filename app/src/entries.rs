//! Dictionary entries, the headword index and dataset parsing

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

fn canonical_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^e(\d+)$").expect("canonical id pattern"))
}

/// Stable entry identity. Parsed entries get `e<N>` where N is the
/// zero-based source position; ids read back from storage may be opaque.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_index(index: usize) -> Self {
        Self(format!("e{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric suffix of a canonical `e<N>` id.
    pub fn index_digits(&self) -> Option<&str> {
        canonical_id_pattern()
            .captures(&self.0)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntryId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub id: EntryId,
    pub headword: String,
    pub meaning: String,
    /// Headwords of other entries whose meaning mentions this headword,
    /// in first-discovery order.
    pub referenced_by: Vec<String>,
    /// Lowercased tokens of the meaning, for filtering only.
    #[serde(skip)]
    pub token_set: HashSet<String>,
}

/// All entries of one dataset load plus the headword index over them.
/// A reload builds a new store; nothing is patched in place.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: Vec<Entry>,
    by_headword: HashMap<String, usize>,
    by_id: HashMap<EntryId, usize>,
}

impl EntryStore {
    /// Builds a store from `(headword, meaning)` records in source order.
    /// A repeated headword replaces the earlier one in the index; both
    /// entries stay in the list.
    pub fn from_records(records: Vec<(String, String)>) -> Self {
        let entries: Vec<Entry> = records
            .into_iter()
            .enumerate()
            .map(|(i, (headword, meaning))| Entry {
                id: EntryId::from_index(i),
                headword,
                meaning,
                referenced_by: Vec::new(),
                token_set: HashSet::new(),
            })
            .collect();

        let mut by_headword = HashMap::with_capacity(entries.len());
        let mut by_id = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            by_headword.insert(entry.headword.clone(), i);
            by_id.insert(entry.id.clone(), i);
        }

        Self {
            entries,
            by_headword,
            by_id,
        }
    }

    pub fn parse(text: &str) -> Self {
        Self::from_records(parse_dataset(text))
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.by_id.get(id).map(|&i| &self.entries[i])
    }

    /// Exact, case-sensitive headword lookup.
    pub fn lookup(&self, headword: &str) -> Option<&Entry> {
        self.position(headword).map(|i| &self.entries[i])
    }

    pub(crate) fn position(&self, headword: &str) -> Option<usize> {
        self.by_headword.get(headword).copied()
    }
}

fn unquote(field: &str) -> String {
    let s = field.trim();
    if s.starts_with('"') && s.ends_with('"') {
        // A lone quote is both the opening and the closing one.
        s.get(1..s.len() - 1)
            .unwrap_or("")
            .replace("\"\"", "\"")
    } else {
        s.to_string()
    }
}

/// Parses the `headword,meaning` dataset. The first line is a header. Each
/// line splits at its first comma; a record with an empty headword continues
/// the previous record's meaning.
pub fn parse_dataset(text: &str) -> Vec<(String, String)> {
    let mut records: Vec<(String, String)> = Vec::new();

    for line in text.split('\n').skip(1) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        let Some((word_raw, meaning_raw)) = line.split_once(',') else {
            continue;
        };
        let word = unquote(word_raw);
        let meaning = unquote(meaning_raw);

        if !word.is_empty() {
            records.push((word, meaning));
        } else if !meaning.is_empty() {
            if let Some((_, current)) = records.last_mut() {
                current.push(' ');
                current.push_str(&meaning);
            }
        }
    }

    records
}
