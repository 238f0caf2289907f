#![forbid(unsafe_code)]

//! `wasm-bindgen` exports for [`QuestionsToc`].
//!
//! This module wraps [`super::runner_core::RunnerCore`] with JS-friendly
//! types and wires browser events into the session's [`SignalFeed`]:
//!
//! | Browser event                         | Signal                          |
//! |---------------------------------------|---------------------------------|
//! | `MutationObserver` on the app root    | `Mutation`                      |
//! | `popstate`, `location.href` changes   | `RouteChanged`                  |
//! | `scroll` anywhere outside the panel   | `Scroll`                        |
//! | panel `mouseenter` / `mouseleave`     | `InteractionStart/End(Hover)`   |
//! | panel `wheel`                         | `InteractionStart(Wheel)`       |
//!
//! Only compiled on `wasm32` targets.

use js_sys::{Array, Reflect};
use qtoc_core::{Document, HostSignal, InteractionKind, SignalFeed};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    AddEventListenerOptions, Element, Event, EventTarget, MutationObserver, MutationObserverInit,
    MutationRecord, Node,
};

use super::runner_core::RunnerCore;
use super::web_dom::WebDocument;

/// Report through `console.error`; silently dropped if the console is missing.
fn console_error(msg: &str) {
    let console = Reflect::get(&js_sys::global(), &"console".into()).ok();
    let error = console
        .as_ref()
        .and_then(|console| Reflect::get(console, &"error".into()).ok())
        .and_then(|error| error.dyn_into::<js_sys::Function>().ok());
    if let (Some(console), Some(error)) = (console, error) {
        let _ = error.call1(&console, &JsValue::from_str(msg));
    }
}

/// Route panics to `console.error`, prefixed with `qtoc:`.
fn install_panic_hook() {
    static HOOK: std::sync::Once = std::sync::Once::new();
    HOOK.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let location = info
                .location()
                .map(|loc| format!(" at {}:{}", loc.file(), loc.line()))
                .unwrap_or_default();
            console_error(&format!("qtoc: question index panicked{location}: {info}"));
        }));
    });
}

/// An event listener that unregisters itself on drop.
struct Listener {
    target: EventTarget,
    event: &'static str,
    capture: bool,
    callback: Closure<dyn FnMut(Event)>,
}

impl Listener {
    fn new(
        target: &EventTarget,
        event: &'static str,
        capture: bool,
        callback: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        let callback = Closure::<dyn FnMut(Event)>::new(callback);
        let options = AddEventListenerOptions::new();
        options.set_capture(capture);
        options.set_passive(true);
        target.add_event_listener_with_callback_and_add_event_listener_options(
            event,
            callback.as_ref().unchecked_ref(),
            &options,
        )?;
        Ok(Self {
            target: target.clone(),
            event,
            capture,
            callback,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self.target.remove_event_listener_with_callback_and_bool(
            self.event,
            self.callback.as_ref().unchecked_ref(),
            self.capture,
        );
    }
}

/// Whether `target` (an event target or mutated node) lies inside `panel`.
fn inside(panel: Option<&Element>, target: Option<Node>) -> bool {
    match (panel, target) {
        (Some(panel), Some(node)) => panel.contains(Some(&node)),
        _ => false,
    }
}

/// Live question index for the current page.
///
/// Host-driven: JavaScript calls `step(performance.now())` from
/// `requestAnimationFrame`, reads `rowsJson()` when `rowsVersion()` changes,
/// and forwards row clicks to `navigateTo`.
#[wasm_bindgen]
pub struct QuestionsToc {
    inner: RunnerCore<WebDocument>,
    feed: SignalFeed,
    observer: Option<(MutationObserver, Closure<dyn FnMut(Array, MutationObserver)>)>,
    listeners: Vec<Listener>,
    last_href: Option<String>,
}

#[wasm_bindgen(start)]
pub fn wasm_start() {
    install_panic_hook();
}

#[wasm_bindgen]
impl QuestionsToc {
    /// Create an index for the current page. `config_json` may be partial.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<QuestionsToc, JsValue> {
        install_panic_hook();
        let document = WebDocument::from_window()
            .ok_or_else(|| JsValue::from_str("no window or document available"))?;
        let mut inner = RunnerCore::new(document, config_json.as_deref())
            .map_err(|err| JsValue::from_str(&err.to_string()))?;
        let feed = SignalFeed::new();
        inner.attach(&feed);
        Ok(Self {
            inner,
            feed,
            observer: None,
            listeners: Vec::new(),
            last_href: None,
        })
    }

    /// Start observing the page. `panel` is the host-rendered index element;
    /// hovering or wheeling it suspends rebuilds, and its own mutations and
    /// scrolls are ignored. Also runs the first rebuild.
    pub fn install(&mut self, panel: Option<Element>) -> Result<(), JsValue> {
        self.uninstall();
        let doc = self.inner.session().document();
        let window = doc.window().clone();
        let root = doc
            .query_all(None, &self.inner.session().selectors().app_root)
            .into_iter()
            .next()
            .or_else(|| doc.document().body().map(Into::into))
            .ok_or_else(|| JsValue::from_str("no application root"))?;

        // Mutations outside the panel.
        let feed = self.feed.clone();
        let panel_for_mutations = panel.clone();
        let callback = Closure::<dyn FnMut(Array, MutationObserver)>::new(
            move |records: Array, _observer: MutationObserver| {
                let relevant = records.iter().any(|record| {
                    let target = record
                        .dyn_into::<MutationRecord>()
                        .ok()
                        .and_then(|r| r.target());
                    !inside(panel_for_mutations.as_ref(), target)
                });
                if relevant {
                    feed.publish(HostSignal::Mutation);
                }
            },
        );
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_character_data(true);
        observer.observe_with_options(&root, &init)?;
        self.observer = Some((observer, callback));

        // History navigation.
        let feed = self.feed.clone();
        self.listeners.push(Listener::new(&window, "popstate", false, move |_| {
            feed.publish(HostSignal::RouteChanged);
        })?);

        // Manual page scroll; scroll events do not bubble, so capture them.
        let feed = self.feed.clone();
        let panel_for_scroll = panel.clone();
        self.listeners.push(Listener::new(&window, "scroll", true, move |event: Event| {
            let target = event.target().and_then(|t| t.dyn_into::<Node>().ok());
            if !inside(panel_for_scroll.as_ref(), target) {
                feed.publish(HostSignal::Scroll);
            }
        })?);

        if let Some(panel) = panel {
            let target: &EventTarget = panel.as_ref();
            for (event, signal) in [
                (
                    "mouseenter",
                    HostSignal::InteractionStart {
                        interaction: InteractionKind::Hover,
                    },
                ),
                (
                    "mouseleave",
                    HostSignal::InteractionEnd {
                        interaction: InteractionKind::Hover,
                    },
                ),
                (
                    "wheel",
                    HostSignal::InteractionStart {
                        interaction: InteractionKind::Wheel,
                    },
                ),
            ] {
                let feed = self.feed.clone();
                self.listeners.push(Listener::new(target, event, false, move |_| {
                    feed.publish(signal);
                })?);
            }
        }

        self.last_href = window.location().href().ok();
        self.inner.refresh();
        Ok(())
    }

    /// Disconnect the observer and every listener.
    pub fn uninstall(&mut self) {
        if let Some((observer, _callback)) = self.observer.take() {
            observer.disconnect();
        }
        self.listeners.clear();
    }

    /// Advance to host time `now_ms`.
    /// Returns `{ signalsProcessed, rebuilt, queryApplied, navigation, rowsVersion }`.
    pub fn step(&mut self, now_ms: f64) -> JsValue {
        // SPA navigations through pushState fire no event; compare the URL.
        let href = self
            .inner
            .session()
            .document()
            .window()
            .location()
            .href()
            .ok();
        if href.is_some() && href != self.last_href {
            if self.last_href.is_some() {
                self.feed.publish(HostSignal::RouteChanged);
            }
            self.last_href = href;
        }

        let summary = self.inner.step(now_ms);
        serde_json::to_string(&summary)
            .ok()
            .and_then(|json| js_sys::JSON::parse(&json).ok())
            .unwrap_or(JsValue::NULL)
    }

    /// Queue a JSON-encoded host signal. Returns `false` if malformed.
    #[wasm_bindgen(js_name = pushSignal)]
    pub fn push_signal(&mut self, json: &str) -> bool {
        self.inner.push_encoded_signal(json)
    }

    /// Rebuild now, ignoring debounce and suspension.
    pub fn refresh(&mut self) {
        self.inner.refresh();
    }

    /// Set the filter text (debounced).
    #[wasm_bindgen(js_name = setQuery)]
    pub fn set_query(&mut self, query: &str) {
        self.inner.set_query(query);
    }

    #[wasm_bindgen(js_name = clearQuery)]
    pub fn clear_query(&mut self) {
        self.inner.clear_query();
    }

    /// Jump to a row's entry. Returns `true` if scrolling started.
    #[wasm_bindgen(js_name = navigateTo)]
    pub fn navigate_to(&mut self, identity: &str) -> bool {
        self.inner.navigate_to(identity)
    }

    /// Rows as a JSON array of
    /// `{ identity, ordinal, display_text, full_text, label, visible, markup }`.
    #[wasm_bindgen(js_name = rowsJson)]
    pub fn rows_json(&self) -> String {
        self.inner.rows_json()
    }

    pub fn count(&self) -> u32 {
        u32::try_from(self.inner.count()).unwrap_or(u32::MAX)
    }

    #[wasm_bindgen(js_name = visibleCount)]
    pub fn visible_count(&self) -> u32 {
        u32::try_from(self.inner.visible_count()).unwrap_or(u32::MAX)
    }

    /// Bumped whenever rows change; re-read `rowsJson()` when it moves.
    #[wasm_bindgen(js_name = rowsVersion)]
    pub fn rows_version(&self) -> f64 {
        self.inner.rows_version() as f64
    }

    /// Release observers and listeners.
    pub fn destroy(&mut self) {
        self.uninstall();
    }
}
