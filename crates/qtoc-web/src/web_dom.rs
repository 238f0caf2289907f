#![forbid(unsafe_code)]

//! [`Document`] adapter over the live browser DOM.
//!
//! Queries go to the native selector engine (`querySelectorAll` /
//! `closest`) using each selector's source text; geometry comes from
//! `getBoundingClientRect` and computed styles. Only compiled on `wasm32`.

use js_sys::Reflect;
use qtoc_core::{
    Content, Document, DomError, Overflow, Rect, ScrollBehavior, ScrollMetrics, Selector,
};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, HtmlElement, Node, ScrollToOptions};

/// The page's document, seen through the engine's abstraction.
pub struct WebDocument {
    window: web_sys::Window,
    document: web_sys::Document,
    smooth_scroll: bool,
}

impl WebDocument {
    /// Bind to the current window. `None` outside a browsing context.
    pub fn from_window() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        let smooth_scroll = document
            .document_element()
            .and_then(|el| el.dyn_into::<HtmlElement>().ok())
            .is_some_and(|el| {
                Reflect::has(&el.style(), &JsValue::from_str("scrollBehavior")).unwrap_or(false)
            });
        Some(Self {
            window,
            document,
            smooth_scroll,
        })
    }

    pub fn window(&self) -> &web_sys::Window {
        &self.window
    }

    pub fn document(&self) -> &web_sys::Document {
        &self.document
    }

    fn collect(list: Result<web_sys::NodeList, JsValue>) -> Vec<Element> {
        let Ok(list) = list else {
            return Vec::new();
        };
        (0..list.length())
            .filter_map(|i| list.item(i))
            .filter_map(|n| n.dyn_into::<Element>().ok())
            .collect()
    }
}

impl Document for WebDocument {
    type Node = Element;

    fn query_all(&self, scope: Option<&Element>, selector: &Selector) -> Vec<Element> {
        match scope {
            Some(el) => Self::collect(el.query_selector_all(selector.as_css())),
            None => Self::collect(self.document.query_selector_all(selector.as_css())),
        }
    }

    fn closest(&self, node: &Element, selector: &Selector) -> Option<Element> {
        node.closest(selector.as_css()).ok().flatten()
    }

    fn parent(&self, node: &Element) -> Option<Element> {
        node.parent_element()
    }

    fn children(&self, node: &Element) -> Vec<Content<Element>> {
        let nodes = node.child_nodes();
        let mut out = Vec::with_capacity(nodes.length() as usize);
        for i in 0..nodes.length() {
            let Some(child) = nodes.item(i) else {
                continue;
            };
            match child.node_type() {
                Node::ELEMENT_NODE => {
                    if let Ok(el) = child.dyn_into::<Element>() {
                        out.push(Content::Element(el));
                    }
                }
                Node::TEXT_NODE | Node::CDATA_SECTION_NODE => {
                    if let Some(text) = child.text_content() {
                        out.push(Content::Text(text));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn tag_name(&self, node: &Element) -> String {
        node.local_name().to_ascii_lowercase()
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn is_attached(&self, node: &Element) -> bool {
        node.is_connected()
    }

    fn bounding_rect(&self, node: &Element) -> Option<Rect> {
        if !node.is_connected() {
            return None;
        }
        let r = node.get_bounding_client_rect();
        Some(Rect::new(r.top(), r.left(), r.width(), r.height()))
    }

    fn scroll_metrics(&self, node: &Element) -> Option<ScrollMetrics> {
        let style = self.window.get_computed_style(node).ok().flatten()?;
        let overflow_y = style
            .get_property_value("overflow-y")
            .map(|v| Overflow::from_css(&v))
            .unwrap_or_default();
        Some(ScrollMetrics {
            overflow_y,
            scroll_top: f64::from(node.scroll_top()),
            scroll_height: f64::from(node.scroll_height()),
            client_height: f64::from(node.client_height()),
        })
    }

    fn primary_scroller(&self) -> Option<Element> {
        self.document
            .query_selector("main")
            .ok()
            .flatten()
            .filter(|main| self.scroll_metrics(main).is_some_and(|m| m.is_scrollable()))
            .or_else(|| self.document.scrolling_element())
            .or_else(|| self.document.document_element())
    }

    fn is_viewport_scroller(&self, node: &Element) -> bool {
        self.document
            .scrolling_element()
            .is_some_and(|el| &el == node)
    }

    fn scroll_to(
        &mut self,
        container: &Element,
        top: f64,
        behavior: ScrollBehavior,
    ) -> Result<(), DomError> {
        if !container.is_connected() {
            return Err(DomError::Detached);
        }
        let behavior = match behavior {
            ScrollBehavior::Smooth if !self.smooth_scroll => {
                return Err(DomError::SmoothScrollUnsupported);
            }
            ScrollBehavior::Smooth => web_sys::ScrollBehavior::Smooth,
            ScrollBehavior::Instant => web_sys::ScrollBehavior::Instant,
        };
        let options = ScrollToOptions::new();
        options.set_top(top);
        options.set_behavior(behavior);
        container.scroll_to_with_scroll_to_options(&options);
        Ok(())
    }

    fn set_scroll_top(&mut self, container: &Element, top: f64) -> Result<(), DomError> {
        if !container.is_connected() {
            return Err(DomError::Detached);
        }
        container.set_scroll_top(top.round() as i32);
        Ok(())
    }

    fn toggle_class(&mut self, node: &Element, class: &str, on: bool) -> Result<(), DomError> {
        let list = node.class_list();
        let result = if on {
            list.add_1(class)
        } else {
            list.remove_1(class)
        };
        result.map_err(|_| DomError::Detached)
    }
}
