//! Meaning renderer: turns definition text into typed, escaped fragments

use crate::entries::EntryStore;
use crate::tokens::{core_token, is_locked, segments};
use serde::Serialize;
use std::collections::HashMap;

/// One unit of rendered meaning. Display text is already escaped;
/// `headword` is the raw lookup key of the referenced entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fragment {
    Text {
        html: String,
    },
    Whitespace {
        html: String,
    },
    Annotated {
        headword: String,
        surface: String,
        translation: String,
        empty: bool,
    },
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders `text`, annotating every segment whose punctuation-stripped core
/// is an unlocked headword. `translations` is keyed by headword.
pub fn render_meaning(
    store: &EntryStore,
    text: &str,
    translations: &HashMap<String, String>,
) -> Vec<Fragment> {
    segments(text)
        .map(|segment| {
            if segment.is_whitespace {
                return Fragment::Whitespace {
                    html: escape_html(segment.text),
                };
            }

            let core = core_token(segment.text);
            let entry = match store.lookup(core) {
                Some(entry) if !core.is_empty() && !is_locked(&entry.headword) => entry,
                _ => {
                    return Fragment::Text {
                        html: escape_html(segment.text),
                    }
                }
            };

            let translation = translations
                .get(&entry.headword)
                .map(String::as_str)
                .unwrap_or("");
            Fragment::Annotated {
                headword: entry.headword.clone(),
                surface: escape_html(segment.text),
                translation: escape_html(translation),
                empty: translation.is_empty(),
            }
        })
        .collect()
}

/// Markup for the viewer: annotated units become ruby spans carrying their
/// headword for click handling.
pub fn to_html(fragments: &[Fragment]) -> String {
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            Fragment::Text { html } | Fragment::Whitespace { html } => out.push_str(html),
            Fragment::Annotated {
                headword,
                surface,
                translation,
                empty,
            } => {
                let rt_class = if *empty { " ruby-empty" } else { "" };
                out.push_str(&format!(
                    "<span class=\"dict-word\" data-headword=\"{}\"><ruby><span class=\"base-word\">{}</span><rt class=\"ruby-editable{}\">{}</rt></ruby></span>",
                    escape_html(headword),
                    surface,
                    rt_class,
                    translation
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EntryStore {
        EntryStore::from_records(vec![
            ("bird".into(), "an animal".into()),
            ("fly".into(), "to move through air".into()),
            ("NATO".into(), "an alliance".into()),
            ("<b>".into(), "tag".into()),
        ])
    }

    fn plain(fragments: &[Fragment]) -> String {
        fragments
            .iter()
            .map(|f| match f {
                Fragment::Text { html } | Fragment::Whitespace { html } => html.clone(),
                Fragment::Annotated { surface, .. } => surface.clone(),
            })
            .collect()
    }

    #[test]
    fn test_plain_text_is_escaped_and_spacing_kept() {
        let text = "  x < y &\t\"z\"  \n'q'";
        let fragments = render_meaning(&store(), text, &HashMap::new());
        assert!(fragments
            .iter()
            .all(|f| !matches!(f, Fragment::Annotated { .. })));
        assert_eq!(plain(&fragments), escape_html(text));
        assert_eq!(to_html(&fragments), "  x &lt; y &amp;\t&quot;z&quot;  \n&#039;q&#039;");
    }

    #[test]
    fn test_annotates_headword_with_punctuation() {
        let mut translations = HashMap::new();
        translations.insert("bird".to_string(), "oiseau".to_string());

        let fragments = render_meaning(&store(), "a (bird), fly!", &translations);
        assert_eq!(
            fragments[2],
            Fragment::Annotated {
                headword: "bird".into(),
                surface: "(bird),".into(),
                translation: "oiseau".into(),
                empty: false,
            }
        );
        assert_eq!(
            fragments[4],
            Fragment::Annotated {
                headword: "fly".into(),
                surface: "fly!".into(),
                translation: String::new(),
                empty: true,
            }
        );
    }

    #[test]
    fn test_locked_and_case_mismatch_not_annotated() {
        let fragments = render_meaning(&store(), "NATO Bird birds", &HashMap::new());
        assert!(fragments
            .iter()
            .all(|f| !matches!(f, Fragment::Annotated { .. })));
    }

    #[test]
    fn test_translation_is_escaped() {
        let mut translations = HashMap::new();
        translations.insert("fly".to_string(), "<script>".to_string());
        let html = to_html(&render_meaning(&store(), "fly", &translations));
        assert_eq!(
            html,
            "<span class=\"dict-word\" data-headword=\"fly\"><ruby><span class=\"base-word\">fly</span><rt class=\"ruby-editable\">&lt;script&gt;</rt></ruby></span>"
        );
    }

    #[test]
    fn test_empty_text() {
        assert!(render_meaning(&store(), "", &HashMap::new()).is_empty());
    }
}
