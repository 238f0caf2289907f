#![forbid(unsafe_code)]

//! Entry discovery: which user entries exist right now.
//!
//! Hosts often nest the entry pattern (a turn wrapper and the message body
//! inside it can both carry the user-role marker). A match nested inside
//! another match is never a candidate, even when the outer one has no
//! rendered box (`display: contents` wrappers), so one logical message
//! yields at most one candidate. Candidates are returned in document order.

use tracing::trace;

use crate::config::CompiledSelectors;
use crate::dom::Document;

/// Visible, outermost entry nodes in document order.
pub fn discover<D>(doc: &D, selectors: &CompiledSelectors) -> Vec<D::Node>
where
    D: Document + ?Sized,
{
    let matched = doc.query_all(None, &selectors.entry);
    let total = matched.len();
    let outermost: Vec<D::Node> = matched
        .into_iter()
        .filter(|node| doc.bounding_rect(node).is_some_and(|r| r.is_visible()))
        .filter(|node| !has_entry_ancestor(doc, node, selectors))
        .collect();

    trace!(matched = total, outermost = outermost.len(), "entry discovery");
    outermost
}

/// Whether any proper ancestor of `node` matches the entry pattern,
/// visible or not.
fn has_entry_ancestor<D>(doc: &D, node: &D::Node, selectors: &CompiledSelectors) -> bool
where
    D: Document + ?Sized,
{
    doc.parent(node)
        .and_then(|parent| doc.closest(&parent, &selectors.entry))
        .is_some()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TocConfig;
    use crate::dom::Rect;
    use crate::headless::HeadlessDocument;
    use pretty_assertions::assert_eq;

    fn selectors() -> CompiledSelectors {
        TocConfig::default().compile().unwrap()
    }

    #[test]
    fn finds_user_turns_in_order() {
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        let a = doc.append_turn(main, "user", "one", 0.0, 100.0);
        doc.append_turn(main, "assistant", "reply", 100.0, 100.0);
        let b = doc.append_turn(main, "user", "two", 200.0, 100.0);
        assert_eq!(discover(&doc, &selectors()), vec![a, b]);
    }

    #[test]
    fn skips_zero_area_and_unlaid_nodes() {
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        let a = doc.append_turn(main, "user", "one", 0.0, 100.0);
        let hidden = doc.append_turn(main, "user", "collapsed", 100.0, 100.0);
        doc.set_layout(hidden, Rect::new(100.0, 0.0, 0.0, 0.0));
        doc.append_element(main, "article", &[("data-message-author-role", "user")]);
        assert_eq!(discover(&doc, &selectors()), vec![a]);
    }

    #[test]
    fn keeps_outermost_of_nested_matches() {
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        let outer = doc.append_element(main, "div", &[("data-testid", "conversation-turn-User")]);
        doc.set_layout(outer, Rect::new(0.0, 0.0, 800.0, 120.0));
        let wrapper = doc.append_element(outer, "section", &[]);
        let inner = doc.append_element(wrapper, "div", &[("data-message-author-role", "user")]);
        doc.set_layout(inner, Rect::new(10.0, 0.0, 780.0, 100.0));
        doc.append_text(inner, "nested question");

        assert_eq!(discover(&doc, &selectors()), vec![outer]);
    }

    #[test]
    fn nested_match_is_dropped_even_when_outer_is_invisible() {
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        let outer = doc.append_element(main, "div", &[("data-testid", "conversation-turn-User")]);
        doc.set_layout(outer, Rect::new(0.0, 0.0, 0.0, 0.0));
        let inner = doc.append_element(outer, "div", &[("data-message-author-role", "user")]);
        doc.set_layout(inner, Rect::new(10.0, 0.0, 780.0, 100.0));
        doc.append_text(inner, "wrapped question");
        assert_eq!(discover(&doc, &selectors()), Vec::new());
    }
}
