//! Backlink indexer: token sets and the referenced-by graph

use crate::entries::EntryStore;
use crate::tokens::{core_tokens, is_locked};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub tokens: usize,
    pub references: usize,
}

/// Recomputes `token_set` and `referenced_by` for every entry.
///
/// A token of entry A references entry B when it equals B's headword
/// exactly, B is another entry with a different headword, and B's headword
/// is neither locked nor in `special`. Each referencing headword is recorded
/// once per target, in discovery order. Safe to call repeatedly.
pub fn build_references(store: &mut EntryStore, special: &HashSet<String>) -> IndexStats {
    let mut stats = IndexStats::default();
    let mut links: Vec<(usize, String)> = Vec::new();
    let mut token_sets: Vec<HashSet<String>> = Vec::with_capacity(store.len());

    for (a, entry) in store.entries().iter().enumerate() {
        let mut token_set = HashSet::new();
        for token in core_tokens(&entry.meaning) {
            stats.tokens += 1;
            token_set.insert(token.to_lowercase());

            let Some(b) = store.position(token) else {
                continue;
            };
            let target = &store.entries()[b];
            if b == a || target.headword == entry.headword {
                continue;
            }
            if is_locked(&target.headword) || special.contains(&target.headword) {
                continue;
            }
            links.push((b, entry.headword.clone()));
        }
        token_sets.push(token_set);
    }

    let entries = store.entries_mut();
    for (entry, token_set) in entries.iter_mut().zip(token_sets) {
        entry.token_set = token_set;
        entry.referenced_by.clear();
    }
    for (b, source) in links {
        let refs = &mut entries[b].referenced_by;
        if !refs.contains(&source) {
            refs.push(source);
            stats.references += 1;
        }
    }

    debug!(
        "Indexed {} entries: {} tokens, {} references",
        entries.len(),
        stats.tokens,
        stats.references
    );
    stats
}
