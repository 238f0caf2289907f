#![forbid(unsafe_code)]

//! Text normalization and entry extraction.
//!
//! - [`normalize`]: rendered text of a subtree with excluded elements pruned,
//!   whitespace collapsed. Read-only: the live document is never touched.
//! - [`extract`]: picks the richest text container inside an entry and
//!   derives both the full text (fuzzy corpus) and a two-sentence label.
//! - [`shorten`]: grapheme-aware label truncation with an ellipsis.
//!
//! The sentence splitter is a heuristic: a boundary is `.`, `?` or `!`
//! followed by whitespace and then an ASCII capital, `(`, or a quote. It
//! will mis-split some abbreviations and never splits scripts without
//! capitals; that is accepted.

use std::borrow::Cow;

use tracing::trace;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::CompiledSelectors;
use crate::dom::{Content, Document};

/// Marker appended to truncated labels.
pub const ELLIPSIS: char = '…';

/// Number of sentence-like segments kept for a label.
pub const LABEL_SENTENCES: usize = 2;

/// Elements whose boundaries break words in rendered text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "ol", "p", "section", "summary", "table", "td", "th", "tr", "ul",
];

/// Text extracted from one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Full normalized text, uncapped.
    pub full_text: String,
    /// First sentences of `full_text`, used for the label.
    pub display_text: String,
}

/// Rendered text of `node` without the subtrees of `exclude_tags`,
/// whitespace-collapsed and trimmed. `None` yields an empty string.
pub fn normalize<D, S>(doc: &D, node: Option<&D::Node>, exclude_tags: &[S]) -> String
where
    D: Document + ?Sized,
    S: AsRef<str>,
{
    let Some(node) = node else {
        return String::new();
    };
    let mut raw = String::new();
    collect_text(doc, node, exclude_tags, &mut raw);
    collapse_whitespace(&raw)
}

fn collect_text<D, S>(doc: &D, node: &D::Node, exclude_tags: &[S], out: &mut String)
where
    D: Document + ?Sized,
    S: AsRef<str>,
{
    for child in doc.children(node) {
        match child {
            Content::Text(text) => out.push_str(&text),
            Content::Element(el) => {
                let tag = doc.tag_name(&el);
                if exclude_tags
                    .iter()
                    .any(|ex| ex.as_ref().eq_ignore_ascii_case(&tag))
                {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&tag.as_str());
                if block {
                    out.push(' ');
                }
                collect_text(doc, &el, exclude_tags, out);
                if block {
                    out.push(' ');
                }
            }
        }
    }
}

/// Collapse every whitespace run to one space and trim both ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Deduplication key: lowercase, whitespace-collapsed.
#[must_use]
pub fn dedup_key(text: &str) -> String {
    collapse_whitespace(&text.to_lowercase())
}

/// Extract the full and display text of an entry rooted at `root`.
///
/// Candidate patterns are tried in order; the candidate with the strictly
/// longest normalized text wins, so earlier patterns win ties. Candidates
/// must sit inside a user-entry container. Falls back to the whole root.
/// Returns `None` when nothing usable remains.
pub fn extract<D>(doc: &D, root: &D::Node, selectors: &CompiledSelectors) -> Option<Extraction>
where
    D: Document + ?Sized,
{
    let mut best = String::new();
    let mut best_len = 0usize;
    for pattern in &selectors.text_candidates {
        for candidate in doc.query_all(Some(root), pattern) {
            if doc.closest(&candidate, &selectors.entry).is_none() {
                continue;
            }
            let text = normalize(doc, Some(&candidate), &selectors.exclude_tags);
            let len = text.chars().count();
            if len > best_len {
                best = text;
                best_len = len;
            }
        }
    }
    if best.is_empty() {
        best = normalize(doc, Some(root), &selectors.exclude_tags);
    }
    if best.is_empty() {
        trace!(?root, "entry has no extractable text");
        return None;
    }
    let display = first_sentences(&best, LABEL_SENTENCES);
    Some(Extraction {
        display_text: if display.is_empty() {
            best.clone()
        } else {
            display
        },
        full_text: best,
    })
}

/// Label text of the entry at `root`, or `""` when nothing is extractable.
pub fn extract_text<D>(doc: &D, root: &D::Node, selectors: &CompiledSelectors) -> String
where
    D: Document + ?Sized,
{
    extract(doc, root, selectors)
        .map(|e| e.display_text)
        .unwrap_or_default()
}

fn is_sentence_start(c: char) -> bool {
    c.is_ascii_uppercase() || matches!(c, '(' | '“' | '"' | '\'')
}

/// Keep at most `limit` sentence-like segments, joined by single spaces.
#[must_use]
pub fn first_sentences(text: &str, limit: usize) -> String {
    let limit = limit.max(1);
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut segments: Vec<&str> = Vec::with_capacity(limit);
    let mut start = 0usize;
    let mut i = 0usize;
    while i < chars.len() && segments.len() < limit {
        let (pos, c) = chars[i];
        if matches!(c, '.' | '?' | '!') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if j > i + 1 && j < chars.len() && is_sentence_start(chars[j].1) {
                segments.push(&text[start..pos + c.len_utf8()]);
                start = chars[j].0;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    if segments.len() < limit && start < text.len() {
        segments.push(&text[start..]);
    }
    segments.join(" ").trim().to_owned()
}

/// Truncate to at most `max` grapheme clusters.
///
/// Text at or under the limit is returned unchanged. Longer text keeps
/// `max - 1` clusters and ends with [`ELLIPSIS`], so the result is exactly
/// `max` clusters long.
#[must_use]
pub fn shorten(text: &str, max: usize) -> Cow<'_, str> {
    if max == 0 {
        return if text.is_empty() {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(String::new())
        };
    }
    let mut graphemes = text.grapheme_indices(true);
    let Some((cut, _)) = graphemes.nth(max - 1) else {
        return Cow::Borrowed(text);
    };
    if graphemes.next().is_none() {
        // Exactly `max` clusters.
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(cut + ELLIPSIS.len_utf8());
    out.push_str(&text[..cut]);
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
