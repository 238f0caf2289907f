#![forbid(unsafe_code)]

//! Permissive query matching and highlight markup.
//!
//! - [`matches`] is the row filter: query characters must appear in the text
//!   in order, not necessarily contiguously. Greedy left-to-right, no
//!   backtracking, case-insensitive.
//! - [`render`] produces label markup: every character of the text escaped,
//!   each case-insensitive literal occurrence of the query wrapped in a
//!   highlight span.
//!
//! The two deliberately disagree: a row can be visible (subsequence match)
//! with nothing highlighted (no literal occurrence).
//!
//! # Escaping
//!
//! [`escape_markup`] follows the same fast-path shape as the terminal
//! sanitizer: a `memchr` scan decides whether any byte needs work, and clean
//! input is returned borrowed.

use std::borrow::Cow;

use memchr::{memchr2, memchr3};

/// Default class of highlight spans.
pub const DEFAULT_MARK_CLASS: &str = "qtoc__mark";

/// Subsequence test on lowercased text. An empty query matches everything.
#[must_use]
pub fn matches(text: &str, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let mut hay = text.chars().flat_map(char::to_lowercase);
    query
        .chars()
        .flat_map(char::to_lowercase)
        .all(|q| hay.any(|h| h == q))
}

/// Escape `& < > " '` for inclusion in HTML text or attribute values.
#[must_use]
pub fn escape_markup(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    if memchr3(b'&', b'<', b'>', bytes).is_none() && memchr2(b'"', b'\'', bytes).is_none() {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    push_escaped(&mut out, text);
    Cow::Owned(out)
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

/// [`render_with_class`] with [`DEFAULT_MARK_CLASS`].
#[must_use]
pub fn render(text: &str, query: &str) -> String {
    render_with_class(text, query, DEFAULT_MARK_CLASS)
}

/// Escaped `text` with literal query occurrences wrapped in
/// `<span class="{class}">`. Never fails: if the query cannot be applied as
/// a case-folded literal, the escaped text is returned unmarked.
#[must_use]
pub fn render_with_class(text: &str, query: &str, class: &str) -> String {
    let spans = literal_spans(text, query).unwrap_or_default();
    if spans.is_empty() {
        return escape_markup(text).into_owned();
    }
    let class = escape_markup(class);
    let mut out = String::with_capacity(text.len() + spans.len() * (class.len() + 24));
    let mut cursor = 0usize;
    for (start, end) in spans {
        push_escaped(&mut out, &text[cursor..start]);
        out.push_str("<span class=\"");
        out.push_str(&class);
        out.push_str("\">");
        push_escaped(&mut out, &text[start..end]);
        out.push_str("</span>");
        cursor = end;
    }
    push_escaped(&mut out, &text[cursor..]);
    out
}

/// Lowercase `c` if that yields exactly one character.
fn fold(c: char) -> Option<char> {
    let mut lower = c.to_lowercase();
    let first = lower.next()?;
    lower.next().is_none().then_some(first)
}

/// Byte ranges of non-overlapping, case-insensitive occurrences of `query`.
///
/// `None` when the query is empty or either side has a character whose case
/// folding is not one-to-one.
fn literal_spans(text: &str, query: &str) -> Option<Vec<(usize, usize)>> {
    let needle: Vec<char> = query.chars().map(fold).collect::<Option<_>>()?;
    if needle.is_empty() {
        return None;
    }
    let hay: Vec<(usize, char)> = text
        .char_indices()
        .map(|(i, c)| fold(c).map(|f| (i, f)))
        .collect::<Option<_>>()?;

    let mut spans = Vec::new();
    let mut i = 0usize;
    while i + needle.len() <= hay.len() {
        let window = &hay[i..i + needle.len()];
        if window.iter().zip(&needle).all(|((_, h), n)| h == n) {
            let start = hay[i].0;
            let end = hay.get(i + needle.len()).map_or(text.len(), |(b, _)| *b);
            spans.push((start, end));
            i += needle.len();
        } else {
            i += 1;
        }
    }
    Some(spans)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
