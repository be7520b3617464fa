//! Jump-to-headword lookup

use crate::entries::{Entry, EntryStore};

/// Finds the entry a user most likely means by `query`: the first exact
/// case-insensitive headword match, else the first headword starting with
/// it, else the first containing it. Source order breaks ties.
pub fn jump_to_headword<'a>(store: &'a EntryStore, query: &str) -> Option<&'a Entry> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return None;
    }

    let lowered: Vec<(String, &Entry)> = store
        .entries()
        .iter()
        .map(|e| (e.headword.trim().to_lowercase(), e))
        .collect();

    lowered
        .iter()
        .find(|(hw, _)| *hw == q)
        .or_else(|| lowered.iter().find(|(hw, _)| hw.starts_with(&q)))
        .or_else(|| lowered.iter().find(|(hw, _)| hw.contains(&q)))
        .map(|(_, e)| *e)
}
