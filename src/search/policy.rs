//! Title matching.
//!
//! Matching is lexical only: case-folded, trimmed substring containment.
//! There is no word-boundary requirement in any mode, so `"cat"` matches
//! `"Concatenate"` in default and phrase mode.

use super::types::{FilterMode, Item};

/// Returns true if `title` satisfies `query` under `mode`.
///
/// Both sides are trimmed and lowercased before comparison. Never panics.
pub fn matches(title: &str, query: &str, mode: FilterMode) -> bool {
    let title = normalize(title);
    let query = normalize(query);

    match mode {
        FilterMode::Exact => title == query,
        FilterMode::Phrase => title.contains(query.as_str()),
        FilterMode::Default => query.split_whitespace().all(|word| title.contains(word)),
    }
}

/// Keeps the items whose titles match, preserving page order.
pub fn filter_items(items: Vec<Item>, query: &str, mode: FilterMode) -> Vec<Item> {
    items
        .into_iter()
        .filter(|item| matches(&item.title, query, mode))
        .collect()
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MODES: [FilterMode; 3] = [FilterMode::Default, FilterMode::Phrase, FilterMode::Exact];

    #[test]
    fn test_exact_ignores_case_and_padding() {
        assert!(matches(" Foo ", "foo", FilterMode::Exact));
        assert!(matches("Fox", "fox", FilterMode::Exact));
        assert!(!matches("Big Fox", "fox", FilterMode::Exact));
    }

    #[test]
    fn test_default_is_conjunctive_and_unordered() {
        assert!(matches("big red fox", "red fox", FilterMode::Default));
        assert!(matches("big red fox", "fox red", FilterMode::Default));
        assert!(!matches("big red fox", "red cat", FilterMode::Default));
    }

    #[test]
    fn test_default_collapses_whitespace_runs() {
        assert!(matches("big red fox", "  red \t\n fox  ", FilterMode::Default));
    }

    #[test]
    fn test_default_has_no_word_boundaries() {
        assert!(matches("Concatenate strings", "cat", FilterMode::Default));
    }

    #[test]
    fn test_phrase_requires_contiguous_order() {
        assert!(matches("the big red fox", "big red", FilterMode::Phrase));
        assert!(!matches("the big red fox", "red big", FilterMode::Phrase));
        assert!(!matches("the big, red fox", "big red", FilterMode::Phrase));
    }

    #[test]
    fn test_unicode_case_folding() {
        assert!(matches("ÜBER Tutorial", "über", FilterMode::Phrase));
    }

    #[test]
    fn test_filter_items_keeps_order() {
        let item = |id: &str, title: &str| Item {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            published_at: None,
            thumbnail_url: None,
        };
        let items = vec![
            item("a", "Red Fox Documentary"),
            item("b", "Blue Whale"),
            item("c", "fox, red and quick"),
        ];

        let kept = filter_items(items, "red fox", FilterMode::Default);
        let ids: Vec<&str> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    proptest! {
        #[test]
        fn prop_case_insensitive(title in "[a-zA-Z ]{0,24}", query in "[a-zA-Z ]{1,12}") {
            for mode in MODES {
                prop_assert_eq!(
                    matches(&title, &query, mode),
                    matches(&title.to_uppercase(), &query.to_lowercase(), mode)
                );
            }
        }

        #[test]
        fn prop_padding_insensitive(title in "[a-z ]{0,24}", query in "[a-z ]{1,12}", pad in " {0,4}") {
            for mode in MODES {
                let padded_title = format!("{pad}{title}{pad}");
                let padded_query = format!("{pad}{query}{pad}");
                prop_assert_eq!(
                    matches(&title, &query, mode),
                    matches(&padded_title, &padded_query, mode)
                );
            }
        }

        #[test]
        fn prop_deterministic(title in ".{0,32}", query in ".{0,16}") {
            for mode in MODES {
                prop_assert_eq!(matches(&title, &query, mode), matches(&title, &query, mode));
            }
        }

        #[test]
        fn prop_modes_nest(title in "[a-z ]{0,24}", query in "[a-z ]{1,12}") {
            // exact implies phrase implies default
            if matches(&title, &query, FilterMode::Exact) {
                prop_assert!(matches(&title, &query, FilterMode::Phrase));
            }
            if matches(&title, &query, FilterMode::Phrase) {
                prop_assert!(matches(&title, &query, FilterMode::Default));
            }
        }
    }
}
