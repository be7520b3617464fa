//! Tokenization of meaning text and headword classification

use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Part-of-speech abbreviations used throughout the dataset. They are valid
/// headwords but are never cross-referenced, and they double as the
/// selectable token filters.
pub const ABBREVIATIONS: [&str; 12] = [
    "a", "bu", "cj", "e", "hh", "i", "k", "p", "q", "r", "sj", "y",
];

fn locked_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9]+$").expect("locked headword pattern"))
}

/// Headwords made only of uppercase ASCII letters and digits (acronyms,
/// numbers) are locked: no translation, no annotation, no backlinks.
pub fn is_locked(headword: &str) -> bool {
    locked_pattern().is_match(headword)
}

pub fn special_headwords() -> HashSet<String> {
    ABBREVIATIONS.iter().map(|s| s.to_string()).collect()
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Strips leading and trailing non-word characters. Word characters are
/// ASCII letters, digits and underscore, so accented letters at the edges
/// are stripped too.
pub fn core_token(raw: &str) -> &str {
    raw.trim_matches(|c: char| !is_word_char(c))
}

/// A run of either whitespace or non-whitespace characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub is_whitespace: bool,
}

/// Splits text into alternating whitespace and non-whitespace runs.
/// Concatenating every segment reproduces the input exactly.
pub fn segments(text: &str) -> Segments<'_> {
    Segments { rest: text }
}

pub struct Segments<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        let first = self.rest.chars().next()?;
        let is_whitespace = first.is_whitespace();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_whitespace() != is_whitespace)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (text, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(Segment { text, is_whitespace })
    }
}

/// Non-empty core tokens of a meaning, original case preserved.
pub fn core_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace().map(core_token).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_headwords() {
        assert!(is_locked("NATO"));
        assert!(is_locked("G7"));
        assert!(is_locked("2024"));
        assert!(!is_locked("Nato"));
        assert!(!is_locked("nato"));
        assert!(!is_locked(""));
        assert!(!is_locked("NATO-2"));
    }

    #[test]
    fn test_core_token_strips_edges_only() {
        assert_eq!(core_token("(bird),"), "bird");
        assert_eq!(core_token("don't"), "don't");
        assert_eq!(core_token("--"), "");
        assert_eq!(core_token("a."), "a");
        assert_eq!(core_token("_x_"), "_x_");
        assert_eq!(core_token("«mot»"), "mot");
    }

    #[test]
    fn test_segments_round_trip_spacing() {
        let text = "  a rare\t\tbird \n";
        let parts: Vec<Segment> = segments(text).collect();
        assert_eq!(parts.len(), 7);
        assert!(parts[0].is_whitespace);
        assert_eq!(parts[1].text, "a");
        assert_eq!(parts[4].text, "\t\t");
        let joined: String = parts.iter().map(|s| s.text).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_segments_empty() {
        assert_eq!(segments("").count(), 0);
    }

    #[test]
    fn test_core_tokens() {
        let tokens: Vec<&str> = core_tokens("Bird, (see: Fly) ... !").collect();
        assert_eq!(tokens, vec!["Bird", "see", "Fly"]);
    }
}
