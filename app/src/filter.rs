//! Row visibility filtering

use crate::entries::{Entry, EntryId};
use crate::tokens::{is_locked, ABBREVIATIONS};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
    #[default]
    All,
    Filled,
    Empty,
}

/// Current filter inputs. `tokens` is OR-ed; the three criteria are AND-ed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub tokens: HashSet<String>,
    #[serde(default)]
    pub mode: TranslationMode,
    #[serde(default)]
    pub text: String,
}

/// A selectable token filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterWord {
    pub id: String,
    pub label: String,
}

pub fn filter_words() -> Vec<FilterWord> {
    ABBREVIATIONS
        .iter()
        .map(|w| FilterWord {
            id: w.to_lowercase(),
            label: format!("{}.", w),
        })
        .collect()
}

/// Visibility of each entry, in entry order. `live` holds the current,
/// possibly unsaved, translation of each entry; locked entries never count
/// as translated.
pub fn apply(
    entries: &[Entry],
    tokens: &HashSet<String>,
    mode: TranslationMode,
    text: &str,
    live: &HashMap<EntryId, String>,
) -> Vec<bool> {
    let tokens: HashSet<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    let needle = text.trim().to_lowercase();

    entries
        .iter()
        .map(|entry| {
            let pass_tokens =
                tokens.is_empty() || tokens.iter().any(|t| entry.token_set.contains(t));
            let pass_text = needle.is_empty() || entry.meaning.to_lowercase().contains(&needle);
            let pass_mode = match mode {
                TranslationMode::All => true,
                TranslationMode::Filled | TranslationMode::Empty => {
                    let filled = !is_locked(&entry.headword)
                        && live
                            .get(&entry.id)
                            .map(|t| !t.trim().is_empty())
                            .unwrap_or(false);
                    filled == (mode == TranslationMode::Filled)
                }
            };
            pass_tokens && pass_text && pass_mode
        })
        .collect()
}

impl FilterState {
    pub fn apply(&self, entries: &[Entry], live: &HashMap<EntryId, String>) -> Vec<bool> {
        apply(entries, &self.tokens, self.mode, &self.text, live)
    }
}
