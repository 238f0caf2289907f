#![forbid(unsafe_code)]

//! Headless document for tests and native hosts.
//!
//! `HeadlessDocument` is an arena-backed element tree with just enough layout
//! to exercise the engine without a browser:
//!
//! - every element may carry a layout box in **content coordinates** (where
//!   it would sit with every scroller at offset 0);
//! - any element may be a scroll container; its offset shifts the boxes of
//!   all descendants, exactly like `getBoundingClientRect`;
//! - nodes can be removed, replaced, and shifted to simulate virtualization
//!   and late layout.
//!
//! # Example
//!
//! ```
//! use qtoc_core::dom::Document;
//! use qtoc_core::headless::HeadlessDocument;
//!
//! let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
//! let turn = doc.append_turn(main, "user", "Explain recursion", 0.0, 120.0);
//! assert!(doc.is_attached(&turn));
//! assert_eq!(doc.bounding_rect(&turn).map(|r| r.height), Some(120.0));
//! ```

use crate::dom::{Content, Document, DomError, Overflow, Rect, ScrollBehavior, ScrollMetrics};
use crate::selector::Selector;

/// Handle into a [`HeadlessDocument`]. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    layout: Option<Rect>,
    scroll: Option<ScrollMetrics>,
}

/// One scroll request observed by the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollRecord {
    pub container: NodeId,
    pub top: f64,
    pub behavior: ScrollBehavior,
}

/// In-memory element tree implementing [`Document`].
#[derive(Debug, Clone)]
pub struct HeadlessDocument {
    nodes: Vec<NodeData>,
    root: NodeId,
    body: NodeId,
    smooth_scroll: bool,
    scroll_log: Vec<ScrollRecord>,
}

impl Default for HeadlessDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDocument {
    /// An empty `<html><body></body></html>` document.
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            smooth_scroll: true,
            scroll_log: Vec::new(),
        };
        doc.root = doc.create_element("html", &[]);
        doc.body = doc.append_element(doc.root, "body", &[]);
        doc
    }

    /// A document whose `<main>` is a scroll container of the given height.
    ///
    /// Returns the document and the `<main>` node.
    #[must_use]
    pub fn with_scroller(viewport_height: f64) -> (Self, NodeId) {
        let mut doc = Self::new();
        let body = doc.body;
        let main = doc.append_element(body, "main", &[]);
        doc.set_layout(main, Rect::new(0.0, 0.0, 1024.0, viewport_height));
        doc.set_scroll_box(main, Overflow::Auto, viewport_height, viewport_height);
        (doc, main)
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn body(&self) -> NodeId {
        self.body
    }

    // -- Construction -------------------------------------------------------

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), (*v).to_owned()))
                .collect(),
        })
    }

    /// Create an element and append it to `parent`.
    pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let id = self.create_element(tag, attrs);
        self.append_child(parent, id);
        id
    }

    /// Append a text run to `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.push(NodeKind::Text(text.to_owned()));
        self.append_child(parent, id);
        id
    }

    /// Append a chat turn: `article[data-message-author-role=role]` wrapping a
    /// `div.whitespace-pre-wrap` text container, laid out at `top` inside
    /// `container`. Grows the container's scroll height to fit.
    pub fn append_turn(
        &mut self,
        container: NodeId,
        role: &str,
        text: &str,
        top: f64,
        height: f64,
    ) -> NodeId {
        let turn = self.append_element(container, "article", &[("data-message-author-role", role)]);
        let body = self.append_element(turn, "div", &[("class", "whitespace-pre-wrap")]);
        self.append_text(body, text);
        let width = self.layout(container).map_or(1024.0, |r| r.width);
        let rect = Rect::new(top, 0.0, width, height);
        self.set_layout(turn, rect);
        self.set_layout(body, rect);

        let origin = self.layout(container).map_or(0.0, |r| r.top);
        if let Some(scroll) = self.node_mut(container).and_then(|n| n.scroll.as_mut()) {
            scroll.scroll_height = scroll.scroll_height.max(top + height - origin);
        }
        turn
    }

    /// Move `child` (detached or not) to the end of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.unlink(child);
        if let Some(p) = self.node_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
    }

    /// Detach `node` from its parent. Its subtree stays intact but detached.
    pub fn remove(&mut self, node: NodeId) {
        self.unlink(node);
    }

    /// Put `replacement` where `old` was and detach `old`.
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) {
        let Some(parent) = self.node(old).and_then(|n| n.parent) else {
            return;
        };
        self.unlink(replacement);
        if let Some(p) = self.node_mut(parent)
            && let Some(slot) = p.children.iter_mut().find(|c| **c == old)
        {
            *slot = replacement;
        }
        if let Some(r) = self.node_mut(replacement) {
            r.parent = Some(parent);
        }
        if let Some(o) = self.node_mut(old) {
            o.parent = None;
        }
    }

    // -- Layout -------------------------------------------------------------

    /// Set the content-coordinate box of an element.
    pub fn set_layout(&mut self, node: NodeId, rect: Rect) {
        if let Some(n) = self.node_mut(node) {
            n.layout = Some(rect);
        }
    }

    #[must_use]
    pub fn layout(&self, node: NodeId) -> Option<Rect> {
        self.node(node).and_then(|n| n.layout)
    }

    /// Make `node` a scroll container.
    pub fn set_scroll_box(
        &mut self,
        node: NodeId,
        overflow_y: Overflow,
        scroll_height: f64,
        client_height: f64,
    ) {
        if let Some(n) = self.node_mut(node) {
            n.scroll = Some(ScrollMetrics {
                overflow_y,
                scroll_top: 0.0,
                scroll_height,
                client_height,
            });
        }
    }

    /// Shift `node` and its whole subtree vertically (late layout, image load).
    pub fn shift_layout(&mut self, node: NodeId, dy: f64) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(n) = self.node_mut(id) else {
                continue;
            };
            if let Some(rect) = n.layout.as_mut() {
                rect.top += dy;
            }
            stack.extend(n.children.iter().copied());
        }
    }

    #[must_use]
    pub fn scroll_top(&self, node: NodeId) -> f64 {
        self.node(node)
            .and_then(|n| n.scroll)
            .map_or(0.0, |s| s.scroll_top)
    }

    /// Whether `scroll_to` with [`ScrollBehavior::Smooth`] is accepted.
    pub fn set_smooth_scroll_supported(&mut self, supported: bool) {
        self.smooth_scroll = supported;
    }

    /// Every scroll request applied so far, oldest first.
    #[must_use]
    pub fn scroll_log(&self) -> &[ScrollRecord] {
        &self.scroll_log
    }

    #[must_use]
    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|v| v.split_ascii_whitespace().any(|c| c == class))
    }

    // -- Internals ----------------------------------------------------------

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            layout: None,
            scroll: None,
        });
        id
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0 as usize)
    }

    fn unlink(&mut self, node: NodeId) {
        let Some(parent) = self.node(node).and_then(|n| n.parent) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != node);
        }
        if let Some(n) = self.node_mut(node) {
            n.parent = None;
        }
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.node(node)?.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    fn is_element(&self, node: NodeId) -> bool {
        self.node(node)
            .is_some_and(|n| matches!(n.kind, NodeKind::Element { .. }))
    }

    /// Sum of scroll offsets of all strict ancestors.
    fn ancestor_scroll(&self, node: NodeId) -> f64 {
        let mut total = 0.0;
        let mut cursor = self.node(node).and_then(|n| n.parent);
        while let Some(id) = cursor {
            let Some(n) = self.node(id) else {
                break;
            };
            total += n.scroll.map_or(0.0, |s| s.scroll_top);
            cursor = n.parent;
        }
        total
    }

    fn apply_scroll(
        &mut self,
        container: NodeId,
        top: f64,
        behavior: ScrollBehavior,
    ) -> Result<(), DomError> {
        if !self.is_attached(&container) {
            return Err(DomError::Detached);
        }
        if let Some(scroll) = self.node_mut(container).and_then(|n| n.scroll.as_mut()) {
            scroll.scroll_top = top.clamp(0.0, scroll.max_scroll_top());
        }
        self.scroll_log.push(ScrollRecord {
            container,
            top,
            behavior,
        });
        Ok(())
    }
}

impl Document for HeadlessDocument {
    type Node = NodeId;

    fn query_all(&self, scope: Option<&NodeId>, selector: &Selector) -> Vec<NodeId> {
        let start = scope.copied().unwrap_or(self.root);
        let mut out = Vec::new();
        // Pre-order walk; the document root itself is a candidate, a scope is not.
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(n) = self.node(id) else {
                continue;
            };
            let include_self = scope.is_none() || id != start;
            if include_self && self.is_element(id) && selector.matches(self, &id) {
                out.push(id);
            }
            stack.extend(n.children.iter().rev().copied());
        }
        out
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.node(*node).and_then(|n| n.parent)
    }

    fn children(&self, node: &NodeId) -> Vec<Content<NodeId>> {
        let Some(n) = self.node(*node) else {
            return Vec::new();
        };
        n.children
            .iter()
            .filter_map(|c| match &self.node(*c)?.kind {
                NodeKind::Element { .. } => Some(Content::Element(*c)),
                NodeKind::Text(text) => Some(Content::Text(text.clone())),
            })
            .collect()
    }

    fn tag_name(&self, node: &NodeId) -> String {
        match self.node(*node).map(|n| &n.kind) {
            Some(NodeKind::Element { tag, .. }) => tag.clone(),
            Some(NodeKind::Text(_)) => "#text".to_owned(),
            None => String::new(),
        }
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.attr(*node, name).map(str::to_owned)
    }

    fn is_attached(&self, node: &NodeId) -> bool {
        let mut cursor = Some(*node);
        while let Some(id) = cursor {
            if id == self.root {
                return true;
            }
            cursor = self.node(id).and_then(|n| n.parent);
        }
        false
    }

    fn bounding_rect(&self, node: &NodeId) -> Option<Rect> {
        if !self.is_attached(node) {
            return None;
        }
        let layout = self.node(*node)?.layout?;
        Some(Rect {
            top: layout.top - self.ancestor_scroll(*node),
            ..layout
        })
    }

    fn scroll_metrics(&self, node: &NodeId) -> Option<ScrollMetrics> {
        let n = self.node(*node)?;
        if let Some(scroll) = n.scroll {
            return Some(scroll);
        }
        let layout = n.layout?;
        Some(ScrollMetrics {
            overflow_y: Overflow::Visible,
            scroll_top: 0.0,
            scroll_height: layout.height,
            client_height: layout.height,
        })
    }

    fn primary_scroller(&self) -> Option<NodeId> {
        let main = Selector::parse("main").ok()?;
        self.query_all(None, &main)
            .into_iter()
            .next()
            .or(Some(self.root))
    }

    fn is_viewport_scroller(&self, node: &NodeId) -> bool {
        *node == self.root
    }

    fn scroll_to(
        &mut self,
        container: &NodeId,
        top: f64,
        behavior: ScrollBehavior,
    ) -> Result<(), DomError> {
        if behavior == ScrollBehavior::Smooth && !self.smooth_scroll {
            return Err(DomError::SmoothScrollUnsupported);
        }
        self.apply_scroll(*container, top, behavior)
    }

    fn set_scroll_top(&mut self, container: &NodeId, top: f64) -> Result<(), DomError> {
        self.apply_scroll(*container, top, ScrollBehavior::Instant)
    }

    fn toggle_class(&mut self, node: &NodeId, class: &str, on: bool) -> Result<(), DomError> {
        let Some(NodeKind::Element { attrs, .. }) = self.node_mut(*node).map(|n| &mut n.kind) else {
            return Err(DomError::Detached);
        };
        let current = attrs
            .iter()
            .find(|(k, _)| k == "class")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let mut classes: Vec<&str> = current
            .split_ascii_whitespace()
            .filter(|c| *c != class)
            .collect();
        if on {
            classes.push(class);
        }
        let updated = classes.join(" ");
        match attrs.iter_mut().find(|(k, _)| k == "class") {
            Some((_, v)) => *v = updated,
            None => attrs.push(("class".to_owned(), updated)),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
