#![forbid(unsafe_code)]

//! Scroll reconciliation: jump to an entry and make it stay there.
//!
//! # Design
//!
//! A jump targets the anchor at `anchor_ratio` of the scroll container's
//! visible height. The document keeps moving after the jump starts (images
//! load, code blocks highlight, virtualized turns mount), so the reconciler
//! is fire-and-verify:
//!
//! 1. resolve the identity to a live node (silently give up if gone);
//! 2. suspend hydration with [`Interaction::NAVIGATION`];
//! 3. scroll the nearest scrolling ancestor (or the primary scroller);
//! 4. after `settle_ms`, re-resolve, measure, and issue at most one
//!    corrective scroll if the anchor is off by more than the tolerance;
//! 5. flash the anchor for `highlight_ms`;
//! 6. resume hydration.
//!
//! Like the scheduler it is driven by host time via [`ScrollReconciler::poll`].
//! Starting a navigation supersedes any navigation in flight.
//!
//! # Failure Modes
//!
//! Every failure (entry gone, container detached, highlight refused) aborts
//! the remaining steps and resumes hydration. Nothing is reported to the user.

use core::time::Duration;

use tracing::debug;

use crate::config::{CompiledSelectors, TocConfig};
use crate::dom::{Document, DomError, ScrollBehavior};
use crate::index::EntryIndex;
use crate::scheduler::{HydrationScheduler, Interaction};

/// Result of starting a navigation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavigationOutcome {
    /// The first scroll was issued toward `destination`.
    Started { destination: f64 },
    /// The identity does not resolve to a live node; nothing happened.
    Unresolved,
    /// The entry resolved but could not be scrolled to.
    Aborted,
}

/// Progress reported by [`ScrollReconciler::poll`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavigationEvent {
    /// The anchor drifted by `deviation` px; one corrective scroll was issued.
    Corrected { deviation: f64 },
    /// The anchor landed within tolerance.
    Settled { deviation: f64 },
    /// The anchor or its container vanished; hydration resumed.
    Aborted,
    /// Highlight removed; hydration resumed.
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
enum Phase<N> {
    Idle,
    Settling { identity: String, due: Duration },
    Highlighting { node: N, until: Duration },
}

/// Drives one navigation at a time.
#[derive(Debug, Clone)]
pub struct ScrollReconciler<N> {
    phase: Phase<N>,
    anchor_ratio: f64,
    tolerance: f64,
    settle: Duration,
    highlight: Duration,
    flash_class: String,
}

impl<N: Clone + PartialEq + core::fmt::Debug> ScrollReconciler<N> {
    #[must_use]
    pub fn new(config: &TocConfig) -> Self {
        Self {
            phase: Phase::Idle,
            anchor_ratio: config.anchor_ratio,
            tolerance: config.center_tolerance_px,
            settle: config.settle(),
            highlight: config.highlight(),
            flash_class: config.flash_class.clone(),
        }
    }

    /// Whether a navigation is in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Identity awaiting verification, if any.
    #[must_use]
    pub fn settling_identity(&self) -> Option<&str> {
        match &self.phase {
            Phase::Settling { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Start navigating to `identity`.
    pub fn navigate_to<D>(
        &mut self,
        doc: &mut D,
        index: &mut EntryIndex<N>,
        selectors: &CompiledSelectors,
        scheduler: &mut HydrationScheduler,
        identity: &str,
        now: Duration,
    ) -> NavigationOutcome
    where
        D: Document<Node = N> + ?Sized,
    {
        let superseded = self.is_active();
        self.clear_highlight(doc);
        self.phase = Phase::Idle;

        let Some(anchor) = index.resolve(&*doc, identity, selectors) else {
            debug!(identity, "navigation target unresolved");
            if superseded {
                scheduler.end_interaction(Interaction::NAVIGATION, now);
            }
            return NavigationOutcome::Unresolved;
        };

        scheduler.begin_interaction(Interaction::NAVIGATION, now);

        let Some(destination) = self.scroll_toward(doc, &anchor) else {
            debug!(identity, "navigation aborted before first scroll");
            scheduler.end_interaction(Interaction::NAVIGATION, now);
            return NavigationOutcome::Aborted;
        };

        self.phase = Phase::Settling {
            identity: identity.to_owned(),
            due: now + self.settle,
        };
        NavigationOutcome::Started { destination }
    }

    /// Advance to `now`.
    pub fn poll<D>(
        &mut self,
        doc: &mut D,
        index: &mut EntryIndex<N>,
        selectors: &CompiledSelectors,
        scheduler: &mut HydrationScheduler,
        now: Duration,
    ) -> Option<NavigationEvent>
    where
        D: Document<Node = N> + ?Sized,
    {
        match &self.phase {
            Phase::Idle => None,
            Phase::Settling { due, .. } if *due > now => None,
            Phase::Settling { identity, .. } => {
                let identity = identity.clone();
                Some(self.verify(doc, index, selectors, scheduler, &identity, now))
            }
            Phase::Highlighting { until, .. } if *until > now => None,
            Phase::Highlighting { .. } => {
                self.clear_highlight(doc);
                self.phase = Phase::Idle;
                scheduler.end_interaction(Interaction::NAVIGATION, now);
                Some(NavigationEvent::Finished)
            }
        }
    }

    /// Drop any navigation in flight, remove its highlight and resume
    /// hydration. No-op when idle.
    pub fn cancel<D>(&mut self, doc: &mut D, scheduler: &mut HydrationScheduler, now: Duration)
    where
        D: Document<Node = N> + ?Sized,
    {
        if self.is_active() {
            self.clear_highlight(doc);
            self.phase = Phase::Idle;
            scheduler.end_interaction(Interaction::NAVIGATION, now);
        }
    }

    fn verify<D>(
        &mut self,
        doc: &mut D,
        index: &mut EntryIndex<N>,
        selectors: &CompiledSelectors,
        scheduler: &mut HydrationScheduler,
        identity: &str,
        now: Duration,
    ) -> NavigationEvent
    where
        D: Document<Node = N> + ?Sized,
    {
        let measured = index
            .resolve(&*doc, identity, selectors)
            .and_then(|anchor| {
                let container = find_container(&*doc, &anchor)?;
                let deviation = self.deviation(&*doc, &anchor, &container)?;
                Some((anchor, container, deviation))
            });
        let Some((anchor, container, deviation)) = measured else {
            return self.abort(scheduler, identity, now);
        };

        let event = if deviation.abs() > self.tolerance {
            if self.scroll_by(doc, &container, deviation).is_none() {
                return self.abort(scheduler, identity, now);
            }
            debug!(identity, deviation, "corrective scroll");
            NavigationEvent::Corrected { deviation }
        } else {
            NavigationEvent::Settled { deviation }
        };

        if doc.toggle_class(&anchor, &self.flash_class, true).is_err() {
            return self.abort(scheduler, identity, now);
        }
        self.phase = Phase::Highlighting {
            node: anchor,
            until: now + self.highlight,
        };
        event
    }

    fn abort(
        &mut self,
        scheduler: &mut HydrationScheduler,
        identity: &str,
        now: Duration,
    ) -> NavigationEvent {
        debug!(identity, "navigation aborted");
        self.phase = Phase::Idle;
        scheduler.end_interaction(Interaction::NAVIGATION, now);
        NavigationEvent::Aborted
    }

    fn clear_highlight<D>(&self, doc: &mut D)
    where
        D: Document<Node = N> + ?Sized,
    {
        if let Phase::Highlighting { node, .. } = &self.phase {
            // A detached node has nothing left to un-highlight.
            let _ = doc.toggle_class(node, &self.flash_class, false);
        }
    }

    /// Signed distance between the anchor and its target position.
    fn deviation<D>(&self, doc: &D, anchor: &N, container: &N) -> Option<f64>
    where
        D: Document<Node = N> + ?Sized,
    {
        let target = doc.bounding_rect(anchor)?;
        let metrics = doc.scroll_metrics(container)?;
        let container_top = if doc.is_viewport_scroller(container) {
            0.0
        } else {
            doc.bounding_rect(container)?.top
        };
        Some((target.top - container_top) - metrics.client_height * self.anchor_ratio)
    }

    fn scroll_toward<D>(&self, doc: &mut D, anchor: &N) -> Option<f64>
    where
        D: Document<Node = N> + ?Sized,
    {
        let container = find_container(&*doc, anchor)?;
        let deviation = self.deviation(&*doc, anchor, &container)?;
        self.scroll_by(doc, &container, deviation)
    }

    /// Scroll `container` by `delta`, clamped; returns the destination.
    fn scroll_by<D>(&self, doc: &mut D, container: &N, delta: f64) -> Option<f64>
    where
        D: Document<Node = N> + ?Sized,
    {
        let metrics = doc.scroll_metrics(container)?;
        let destination = (metrics.scroll_top + delta).clamp(0.0, metrics.max_scroll_top());
        match doc.scroll_to(container, destination, ScrollBehavior::Smooth) {
            Ok(()) => Some(destination),
            Err(DomError::SmoothScrollUnsupported) => {
                doc.set_scroll_top(container, destination).ok()?;
                Some(destination)
            }
            Err(DomError::Detached) => None,
        }
    }
}

/// Nearest scrolling ancestor of `node`, else the primary scroller.
fn find_container<D>(doc: &D, node: &D::Node) -> Option<D::Node>
where
    D: Document + ?Sized,
{
    let mut cursor = doc.parent(node);
    while let Some(current) = cursor {
        let parent = doc.parent(&current);
        if parent.is_none() {
            break;
        }
        if doc
            .scroll_metrics(&current)
            .is_some_and(|m| m.is_scrollable())
        {
            return Some(current);
        }
        cursor = parent;
    }
    doc.primary_scroller()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
