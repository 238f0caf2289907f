#![forbid(unsafe_code)]

//! The deduplicating entry index.
//!
//! # Design
//!
//! The index is rebuilt wholesale on every hydration cycle; there is no
//! incremental diffing. What survives a rebuild is *identity*: each entry is
//! keyed by its case-folded, whitespace-collapsed full text, and a key seen
//! in the previous cycle keeps the identity it had. Re-rendering, moving, or
//! replacing the node behind an entry therefore does not change its identity.
//!
//! When the same key appears on several nodes (the host re-rendered a turn
//! and the old copy is still around) the lowest one on screen wins. Ordinals
//! are then assigned `1..=N` following the document order of the winners.
//!
//! Identities are `q-<n>` strings drawn from a counter that only moves
//! forward, so an identity is never reused for a different text.
//!
//! # Anchors
//!
//! Each entry caches the node that backed it at rebuild time. Anchors go
//! stale whenever the host re-renders; [`EntryIndex::resolve`] re-validates
//! before every use and re-queries the document when the cache is dead.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::config::CompiledSelectors;
use crate::discover::discover;
use crate::dom::Document;
use crate::text::{dedup_key, extract};

/// One logical user question.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<N> {
    /// Stable key across rebuilds while the text persists.
    pub identity: String,
    /// 1-based position in the current snapshot.
    pub ordinal: usize,
    /// First sentences of the text, for the label.
    pub display_text: String,
    /// Full normalized text, the filter corpus.
    pub full_text: String,
    anchor: N,
    key: String,
}

impl<N> Entry<N> {
    /// Node that backed this entry at the last rebuild. May be stale.
    pub fn anchor(&self) -> &N {
        &self.anchor
    }

    /// Deduplication key (lowercase, whitespace-collapsed full text).
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Counters from one rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Nodes handed to the rebuild.
    pub candidates: usize,
    /// Entries in the resulting snapshot.
    pub admitted: usize,
    /// Candidates folded into an existing key.
    pub duplicates: usize,
    /// Candidates with no extractable text.
    pub skipped_empty: usize,
}

/// Authoritative snapshot of entries plus the identity table.
#[derive(Debug, Clone)]
pub struct EntryIndex<N> {
    entries: Vec<Entry<N>>,
    by_identity: HashMap<String, usize>,
    identities: HashMap<String, String>,
    next_serial: u64,
    generation: u64,
    last_stats: RebuildStats,
}

impl<N> Default for EntryIndex<N> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            by_identity: HashMap::new(),
            identities: HashMap::new(),
            next_serial: 1,
            generation: 0,
            last_stats: RebuildStats::default(),
        }
    }
}

impl<N: Clone + PartialEq + core::fmt::Debug> EntryIndex<N> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot from `discovered` (document order).
    pub fn rebuild<D>(
        &mut self,
        doc: &D,
        discovered: &[N],
        selectors: &CompiledSelectors,
    ) -> &[Entry<N>]
    where
        D: Document<Node = N> + ?Sized,
    {
        let mut stats = RebuildStats {
            candidates: discovered.len(),
            ..RebuildStats::default()
        };

        // (document position, top, entry) per key, in first-seen order.
        let mut slots: Vec<(usize, f64, Entry<N>)> = Vec::new();
        let mut slot_of: HashMap<String, usize> = HashMap::new();

        for (position, node) in discovered.iter().enumerate() {
            let Some(extraction) = extract(doc, node, selectors) else {
                stats.skipped_empty += 1;
                continue;
            };
            let key = dedup_key(&extraction.full_text);
            if key.is_empty() {
                stats.skipped_empty += 1;
                continue;
            }
            let top = doc
                .bounding_rect(node)
                .map_or(f64::NEG_INFINITY, |r| r.top);
            let entry = Entry {
                identity: String::new(),
                ordinal: 0,
                display_text: extraction.display_text,
                full_text: extraction.full_text,
                anchor: node.clone(),
                key: key.clone(),
            };
            match slot_of.get(&key) {
                Some(&slot) => {
                    stats.duplicates += 1;
                    if top > slots[slot].1 {
                        trace!(key = %key, "duplicate entry replaces higher copy");
                        slots[slot] = (position, top, entry);
                    }
                }
                None => {
                    slot_of.insert(key, slots.len());
                    slots.push((position, top, entry));
                }
            }
        }

        slots.sort_by_key(|(position, _, _)| *position);

        let previous = std::mem::take(&mut self.identities);
        self.entries.clear();
        self.by_identity.clear();
        for (i, (_, _, mut entry)) in slots.into_iter().enumerate() {
            entry.identity = match previous.get(&entry.key) {
                Some(identity) => identity.clone(),
                None => self.mint(),
            };
            entry.ordinal = i + 1;
            self.identities
                .insert(entry.key.clone(), entry.identity.clone());
            self.by_identity.insert(entry.identity.clone(), i);
            self.entries.push(entry);
        }

        stats.admitted = self.entries.len();
        self.generation += 1;
        self.last_stats = stats;
        debug!(
            generation = self.generation,
            candidates = stats.candidates,
            admitted = stats.admitted,
            duplicates = stats.duplicates,
            skipped_empty = stats.skipped_empty,
            "index rebuilt"
        );
        &self.entries
    }

    /// Discover entries in `doc` and rebuild from them.
    pub fn rebuild_from<D>(&mut self, doc: &D, selectors: &CompiledSelectors) -> &[Entry<N>]
    where
        D: Document<Node = N> + ?Sized,
    {
        let discovered = discover(doc, selectors);
        self.rebuild(doc, &discovered, selectors)
    }

    fn mint(&mut self) -> String {
        let identity = format!("q-{}", self.next_serial);
        self.next_serial += 1;
        identity
    }

    /// Live node for `identity`.
    ///
    /// The cached anchor is returned if still attached. Otherwise the
    /// document is searched for a visible entry with the same key (lowest
    /// wins) and the cache is updated. `None` when the entry is gone.
    pub fn resolve<D>(
        &mut self,
        doc: &D,
        identity: &str,
        selectors: &CompiledSelectors,
    ) -> Option<N>
    where
        D: Document<Node = N> + ?Sized,
    {
        let Some(&slot) = self.by_identity.get(identity) else {
            debug!(identity, "unknown identity");
            return None;
        };
        let entry = self.entries.get_mut(slot)?;
        if doc.is_attached(&entry.anchor) {
            return Some(entry.anchor.clone());
        }

        let mut best: Option<(f64, N)> = None;
        for node in discover(doc, selectors) {
            let Some(extraction) = extract(doc, &node, selectors) else {
                continue;
            };
            if dedup_key(&extraction.full_text) != entry.key {
                continue;
            }
            let top = doc.bounding_rect(&node).map_or(f64::NEG_INFINITY, |r| r.top);
            if best.as_ref().is_none_or(|(t, _)| top > *t) {
                best = Some((top, node));
            }
        }
        match best {
            Some((_, node)) => {
                trace!(identity, "stale anchor re-resolved");
                entry.anchor = node.clone();
                Some(node)
            }
            None => {
                debug!(identity, "anchor is gone");
                None
            }
        }
    }

    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&Entry<N>> {
        self.by_identity
            .get(identity)
            .and_then(|&slot| self.entries.get(slot))
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry<N>] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of completed rebuilds.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn last_stats(&self) -> RebuildStats {
        self.last_stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TocConfig;
    use crate::headless::{HeadlessDocument, NodeId};
    use pretty_assertions::assert_eq;

    fn selectors() -> CompiledSelectors {
        TocConfig::default().compile().unwrap()
    }

    fn identities(index: &EntryIndex<NodeId>) -> Vec<String> {
        index.entries().iter().map(|e| e.identity.clone()).collect()
    }

    #[test]
    fn duplicate_text_collapses_to_lower_node() {
        let sel = selectors();
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        let first = doc.append_turn(main, "user", "Explain recursion", 0.0, 100.0);
        doc.append_turn(main, "user", "Something else", 100.0, 100.0);
        let second = doc.append_turn(main, "user", "explain   RECURSION", 200.0, 100.0);

        let mut index = EntryIndex::new();
        index.rebuild_from(&doc, &sel);
        assert_eq!(index.len(), 2);
        let stats = index.last_stats();
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.candidates, 3);

        let recursion = &index.entries()[1];
        assert_eq!(recursion.anchor(), &second);
        assert_ne!(recursion.anchor(), &first);
        assert_eq!(recursion.ordinal, 2);
        assert_eq!(index.entries()[0].full_text, "Something else");
    }

    #[test]
    fn rebuild_is_idempotent() {
        let sel = selectors();
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        for (i, q) in ["a?", "b?", "a?", "c?"].iter().enumerate() {
            doc.append_turn(main, "user", q, i as f64 * 100.0, 100.0);
        }
        let mut index = EntryIndex::new();
        let once: Vec<_> = index.rebuild_from(&doc, &sel).to_vec();
        let twice: Vec<_> = index.rebuild_from(&doc, &sel).to_vec();
        assert_eq!(once, twice);
        assert_eq!(index.generation(), 2);
    }

    #[test]
    fn ordinals_are_dense() {
        let sel = selectors();
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        doc.append_turn(main, "user", "one", 0.0, 50.0);
        let code = doc.append_element(main, "article", &[("data-message-author-role", "user")]);
        doc.set_layout(code, crate::dom::Rect::new(50.0, 0.0, 100.0, 50.0));
        let pre = doc.append_element(code, "pre", &[]);
        doc.append_text(pre, "only code");
        doc.append_turn(main, "user", "two", 100.0, 50.0);

        let mut index = EntryIndex::new();
        let ordinals: Vec<usize> = index
            .rebuild_from(&doc, &sel)
            .iter()
            .map(|e| e.ordinal)
            .collect();
        assert_eq!(ordinals, vec![1, 2]);
        assert_eq!(index.last_stats().skipped_empty, 1);
    }

    #[test]
    fn identity_survives_rerender() {
        let sel = selectors();
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        let old = doc.append_turn(main, "user", "Keep me", 0.0, 100.0);
        doc.append_turn(main, "user", "Other", 100.0, 100.0);

        let mut index = EntryIndex::new();
        index.rebuild_from(&doc, &sel);
        let before = identities(&index);

        let fresh = doc.append_turn(main, "user", "Keep  me", 0.0, 100.0);
        doc.remove(fresh);
        doc.replace(old, fresh);
        index.rebuild_from(&doc, &sel);
        assert_eq!(identities(&index), before);
        assert_eq!(index.entries()[0].anchor(), &fresh);
    }

    #[test]
    fn vanished_text_gets_new_identity_on_return() {
        let sel = selectors();
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        let turn = doc.append_turn(main, "user", "Transient", 0.0, 100.0);
        let mut index = EntryIndex::new();
        index.rebuild_from(&doc, &sel);
        let first = index.entries()[0].identity.clone();

        doc.remove(turn);
        index.rebuild_from(&doc, &sel);
        assert!(index.is_empty());
        assert!(index.get(&first).is_none());

        doc.append_turn(main, "user", "Transient", 0.0, 100.0);
        index.rebuild_from(&doc, &sel);
        assert_ne!(index.entries()[0].identity, first);
    }

    #[test]
    fn resolve_revalidates_stale_anchor() {
        let sel = selectors();
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        let old = doc.append_turn(main, "user", "Find me", 0.0, 100.0);
        let mut index = EntryIndex::new();
        index.rebuild_from(&doc, &sel);
        let id = index.entries()[0].identity.clone();
        assert_eq!(index.resolve(&doc, &id, &sel), Some(old));

        doc.remove(old);
        let fresh = doc.append_turn(main, "user", "find me", 300.0, 100.0);
        assert_eq!(index.resolve(&doc, &id, &sel), Some(fresh));
        assert_eq!(index.get(&id).map(|e| *e.anchor()), Some(fresh));

        doc.remove(fresh);
        assert_eq!(index.resolve(&doc, &id, &sel), None);
        assert_eq!(index.resolve(&doc, "q-999", &sel), None);
    }
}
