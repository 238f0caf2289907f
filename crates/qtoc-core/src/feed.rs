#![forbid(unsafe_code)]

//! Host signals and the subscription channel that carries them.
//!
//! # Design
//!
//! [`SignalFeed`] is a single-threaded broadcast channel: the host adapter
//! publishes [`HostSignal`]s (DOM mutations, history changes, user
//! interaction) and any number of subscribers receive them in registration
//! order. Subscribers are held weakly; the [`Subscription`] guard returned
//! by [`SignalFeed::subscribe`] owns the callback, and dropping it
//! unsubscribes.
//!
//! # Failure Modes
//!
//! - **Re-entrant publish**: a subscriber may publish; callbacks are invoked
//!   outside the internal borrow, so this recurses instead of panicking.
//! - **Dead subscribers** are pruned lazily on the next publish.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

/// Kind of user interaction that suspends hydration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Pointer is over the index panel.
    Hover,
    /// Wheel scrolling inside the index panel.
    Wheel,
    /// Manual page scroll.
    Scroll,
}

/// One notification from the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostSignal {
    /// The transcript subtree changed.
    Mutation,
    /// The SPA navigated to another conversation.
    RouteChanged,
    InteractionStart { interaction: InteractionKind },
    InteractionEnd { interaction: InteractionKind },
    /// A manual page scroll tick; shorthand for a scroll interaction start.
    Scroll,
    /// Explicit user refresh.
    Refresh,
}

impl HostSignal {
    /// Decode one signal from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

type CallbackRc = Rc<dyn Fn(&HostSignal)>;
type CallbackWeak = Weak<dyn Fn(&HostSignal)>;

#[derive(Default)]
struct FeedInner {
    subscribers: Vec<CallbackWeak>,
    published: u64,
}

/// Shared broadcast channel of [`HostSignal`]s.
///
/// Cloning creates another handle to the same channel.
#[derive(Clone, Default)]
pub struct SignalFeed {
    inner: Rc<RefCell<FeedInner>>,
}

impl std::fmt::Debug for SignalFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SignalFeed")
            .field("subscribers", &inner.subscribers.len())
            .field("published", &inner.published)
            .finish()
    }
}

impl SignalFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`. It stays registered while the guard lives.
    pub fn subscribe(&self, callback: impl Fn(&HostSignal) + 'static) -> Subscription {
        let strong: CallbackRc = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Deliver `signal` to every live subscriber.
    pub fn publish(&self, signal: HostSignal) {
        let callbacks: Vec<CallbackRc> = {
            let mut inner = self.inner.borrow_mut();
            inner.published += 1;
            inner.subscribers.retain(|w| w.strong_count() > 0);
            inner.subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for cb in &callbacks {
            cb(&signal);
        }
    }

    /// Registered subscribers, including dead ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Total signals published on this channel.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.inner.borrow().published
    }
}

/// RAII guard for a feed subscriber. Dropping it unsubscribes.
pub struct Subscription {
    _guard: Box<dyn std::any::Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
