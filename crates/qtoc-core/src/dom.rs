#![forbid(unsafe_code)]

//! Host document abstraction.
//!
//! The engine treats the transcript as an external, untrusted, constantly
//! changing resource. Everything it needs from the host goes through
//! [`Document`]:
//!
//! - **Structure**: selector queries, parent links, child content, attributes.
//! - **Geometry**: viewport-relative boxes and scroll metrics.
//! - **Effects**: scrolling a container and toggling a highlight class.
//!
//! Node handles ([`Document::Node`]) are cheap clones with identity
//! semantics. They are never assumed to stay valid: callers re-check
//! [`Document::is_attached`] or re-query after any delay.

use core::fmt;

use crate::selector::Selector;

/// Errors reported by document adapters.
///
/// None of these are fatal; the engine recovers from each locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomError {
    /// The host cannot animate scrolling; the caller should set the offset.
    SmoothScrollUnsupported,
    /// The node is no longer part of the document.
    Detached,
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SmoothScrollUnsupported => write!(f, "smooth scrolling is not supported"),
            Self::Detached => write!(f, "node is detached from the document"),
        }
    }
}

impl std::error::Error for DomError {}

/// Viewport-relative bounding box, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// A box with non-zero rendered area.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Computed `overflow-y`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Overflow {
    #[default]
    Visible,
    Hidden,
    Clip,
    Auto,
    Scroll,
}

impl Overflow {
    /// Parse a computed style value; unknown values read as `Visible`.
    #[must_use]
    pub fn from_css(value: &str) -> Self {
        match value.trim() {
            "auto" | "overlay" => Self::Auto,
            "scroll" => Self::Scroll,
            "hidden" => Self::Hidden,
            "clip" => Self::Clip,
            _ => Self::Visible,
        }
    }

    #[must_use]
    pub fn allows_user_scroll(self) -> bool {
        matches!(self, Self::Auto | Self::Scroll)
    }
}

/// Vertical scroll state of an element.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollMetrics {
    pub overflow_y: Overflow,
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    /// Active vertical overflow with content taller than the box.
    #[must_use]
    pub fn is_scrollable(&self) -> bool {
        self.overflow_y.allows_user_scroll() && self.scroll_height > self.client_height
    }

    #[must_use]
    pub fn max_scroll_top(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }
}

/// How a scroll request should move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

/// One child of an element: a nested element or a run of text.
#[derive(Debug, Clone, PartialEq)]
pub enum Content<N> {
    Element(N),
    Text(String),
}

/// Everything the engine reads from and writes to the host document.
pub trait Document {
    /// Handle to an element. Equality is node identity.
    type Node: Clone + PartialEq + fmt::Debug;

    /// Elements matching `selector` in document order.
    ///
    /// With a `scope`, only descendants of the scope (not the scope itself)
    /// are returned, like `Element.querySelectorAll`.
    fn query_all(&self, scope: Option<&Self::Node>, selector: &Selector) -> Vec<Self::Node>;

    /// Nearest inclusive ancestor matching `selector`.
    fn closest(&self, node: &Self::Node, selector: &Selector) -> Option<Self::Node> {
        let mut cursor = Some(node.clone());
        while let Some(current) = cursor {
            if selector.matches(self, &current) {
                return Some(current);
            }
            cursor = self.parent(&current);
        }
        None
    }

    /// Parent element; `None` for the document root or a detached subtree.
    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Child elements and text runs in order.
    fn children(&self, node: &Self::Node) -> Vec<Content<Self::Node>>;

    /// Lowercase tag name.
    fn tag_name(&self, node: &Self::Node) -> String;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    /// Whether the node is still connected to the live document.
    fn is_attached(&self, node: &Self::Node) -> bool;

    /// Viewport-relative box, or `None` if the node has no layout.
    fn bounding_rect(&self, node: &Self::Node) -> Option<Rect>;

    /// Scroll metrics of an element, or `None` if unavailable.
    fn scroll_metrics(&self, node: &Self::Node) -> Option<ScrollMetrics>;

    /// The scroller used when no ancestor container scrolls.
    fn primary_scroller(&self) -> Option<Self::Node>;

    /// Whether `node` scrolls the viewport itself (its box is the viewport).
    fn is_viewport_scroller(&self, node: &Self::Node) -> bool {
        let _ = node;
        false
    }

    /// Request a scroll of `container` to the absolute offset `top`.
    fn scroll_to(
        &mut self,
        container: &Self::Node,
        top: f64,
        behavior: ScrollBehavior,
    ) -> Result<(), DomError>;

    /// Assign the scroll offset directly.
    fn set_scroll_top(&mut self, container: &Self::Node, top: f64) -> Result<(), DomError>;

    /// Add (`on == true`) or remove a class on an element.
    fn toggle_class(&mut self, node: &Self::Node, class: &str, on: bool) -> Result<(), DomError>;
}
