//! Property-based invariant tests for the entry index and query engine.
//!
//! 1. Rebuilding twice over an unchanged document yields identical entries.
//! 2. Ordinals are exactly `1..=N`; identities are unique.
//! 3. One entry per distinct non-empty normalized text.
//! 4. Identities survive a full re-render of every node.
//! 5. Subsequence matching agrees with a naive reference.
//! 6. Label truncation never exceeds the limit and keeps a prefix.
//! 7. Rendering without a query is plain escaping.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use qtoc_core::fuzzy::{escape_markup, matches, render};
use qtoc_core::headless::{HeadlessDocument, NodeId};
use qtoc_core::text::{dedup_key, shorten};
use qtoc_core::{CompiledSelectors, EntryIndex, TocConfig};
use unicode_segmentation::UnicodeSegmentation;

// ── Strategy helpers ──────────────────────────────────────────────────

/// Short texts from a tiny alphabet so duplicates and blanks are common.
fn arb_questions() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[AaBb ?]{0,5}", 0..14)
}

fn selectors() -> CompiledSelectors {
    TocConfig::default().compile().expect("default config compiles")
}

fn transcript(questions: &[String]) -> (HeadlessDocument, NodeId, Vec<NodeId>) {
    let (mut doc, main) = HeadlessDocument::with_scroller(600.0);
    let turns = questions
        .iter()
        .enumerate()
        .map(|(i, q)| doc.append_turn(main, "user", q, i as f64 * 80.0, 80.0))
        .collect();
    (doc, main, turns)
}

fn reference_matches(text: &str, query: &str) -> bool {
    let query: Vec<char> = query.chars().flat_map(char::to_lowercase).collect();
    let mut next = 0;
    for c in text.chars().flat_map(char::to_lowercase) {
        if next < query.len() && query[next] == c {
            next += 1;
        }
    }
    next == query.len()
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Rebuild structure
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn rebuild_is_idempotent(questions in arb_questions()) {
        let sel = selectors();
        let (doc, _, _) = transcript(&questions);
        let mut index = EntryIndex::new();
        let first = index.rebuild_from(&doc, &sel).to_vec();
        let second = index.rebuild_from(&doc, &sel).to_vec();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn ordinals_dense_and_identities_unique(questions in arb_questions()) {
        let sel = selectors();
        let (doc, _, _) = transcript(&questions);
        let mut index = EntryIndex::new();
        let entries = index.rebuild_from(&doc, &sel);

        let ordinals: Vec<usize> = entries.iter().map(|e| e.ordinal).collect();
        let expected: Vec<usize> = (1..=entries.len()).collect();
        prop_assert_eq!(ordinals, expected);

        let ids: HashSet<&str> = entries.iter().map(|e| e.identity.as_str()).collect();
        prop_assert_eq!(ids.len(), entries.len());
        prop_assert!(entries.iter().all(|e| !e.full_text.is_empty()));
    }

    #[test]
    fn one_entry_per_distinct_text(questions in arb_questions()) {
        let sel = selectors();
        let (doc, _, _) = transcript(&questions);
        let mut index = EntryIndex::new();
        index.rebuild_from(&doc, &sel);

        let distinct: HashSet<String> = questions
            .iter()
            .map(|q| dedup_key(q))
            .filter(|k| !k.is_empty())
            .collect();
        prop_assert_eq!(index.len(), distinct.len());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Identity stability across re-render
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn identity_stable_across_rerender(questions in arb_questions()) {
        let sel = selectors();
        let (mut doc, main, turns) = transcript(&questions);
        let mut index = EntryIndex::new();
        index.rebuild_from(&doc, &sel);
        let before: HashMap<String, String> = index
            .entries()
            .iter()
            .map(|e| (e.key().to_owned(), e.identity.clone()))
            .collect();

        for (i, (old, q)) in turns.iter().zip(&questions).enumerate() {
            let fresh = doc.append_turn(main, "user", q, i as f64 * 80.0, 80.0);
            doc.replace(*old, fresh);
        }
        index.rebuild_from(&doc, &sel);
        let after: HashMap<String, String> = index
            .entries()
            .iter()
            .map(|e| (e.key().to_owned(), e.identity.clone()))
            .collect();
        prop_assert_eq!(before, after);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5-7. Query engine and labels
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn subsequence_agrees_with_reference(
        text in "[a-zA-Z0-9 éÉ]{0,24}",
        query in "[a-zA-Z éÉ]{0,4}",
    ) {
        prop_assert_eq!(matches(&text, &query), reference_matches(&text, &query));
    }

    #[test]
    fn every_text_matches_its_own_subsequences(
        text in "[a-zA-Z0-9 ]{0,24}",
        mask in prop::collection::vec(any::<bool>(), 24),
    ) {
        let query: String = text
            .chars()
            .zip(mask.iter())
            .filter_map(|(c, keep)| keep.then_some(c))
            .collect();
        prop_assert!(matches(&text, &query));
    }

    #[test]
    fn shorten_respects_limit(
        text in "(e\u{0301}|[a-zA-Z0-9 ?.!é🎉]){0,160}",
        max in 1usize..140,
    ) {
        let out = shorten(&text, max);
        let len = text.graphemes(true).count();
        let out_len = out.graphemes(true).count();
        if len <= max {
            prop_assert_eq!(out.as_ref(), text.as_str());
        } else {
            prop_assert_eq!(out_len, max);
            prop_assert!(out.ends_with('…'));
            let prefix = &out[..out.len() - '…'.len_utf8()];
            prop_assert!(text.starts_with(prefix));
        }
    }

    #[test]
    fn render_without_query_is_escaping(text in ".{0,40}") {
        prop_assert_eq!(render(&text, ""), escape_markup(&text).into_owned());
    }

    #[test]
    fn render_never_leaks_raw_markup(text in "[a-z<>&\"' ]{0,30}", query in "[a-z<>]{0,3}") {
        let out = render(&text, &query);
        let stripped = out
            .replace(r#"<span class="qtoc__mark">"#, "")
            .replace("</span>", "");
        prop_assert!(!stripped.contains('<'));
        prop_assert!(!stripped.contains('"'));
    }
}
