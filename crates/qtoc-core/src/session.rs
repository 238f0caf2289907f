#![forbid(unsafe_code)]

//! The session controller.
//!
//! [`TocSession`] is the single context object for one page: it owns the
//! document adapter, the scheduler, the index, the reconciler, the query,
//! and the rendered rows. There is no global state; a host creates one
//! session, feeds it signals, and calls [`TocSession::step`] from its frame
//! or timer loop with a monotonic clock.
//!
//! # Step order
//!
//! 1. drain queued host signals into the scheduler;
//! 2. apply a debounced query if due;
//! 3. advance the scroll reconciler (its completion may resume hydration);
//! 4. poll the scheduler and rebuild if granted.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use core::time::Duration;

use serde::Serialize;
use tracing::{debug, debug_span};

use crate::config::{CompiledSelectors, ConfigError, TocConfig};
use crate::dom::Document;
use crate::feed::{HostSignal, SignalFeed, Subscription};
use crate::fuzzy::{matches, render_with_class};
use crate::index::{Entry, EntryIndex};
use crate::scheduler::{HydrationScheduler, HydrationState, Interaction, RebuildReason};
use crate::scroll::{NavigationEvent, NavigationOutcome, ScrollReconciler};
use crate::text::shorten;

/// One rendered line of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub identity: String,
    pub ordinal: usize,
    pub display_text: String,
    pub full_text: String,
    /// `"{ordinal}. {display_text}"`, shortened.
    pub label: String,
    /// Whether the row passes the current query.
    pub visible: bool,
    /// Escaped label with query highlights.
    pub markup: String,
}

impl Row {
    fn new<N>(entry: &Entry<N>, query: &str, config: &TocConfig) -> Self {
        let label = format!("{}. {}", entry.ordinal, entry.display_text);
        let label = shorten(&label, config.max_label_chars).into_owned();
        let mut row = Self {
            identity: entry.identity.clone(),
            ordinal: entry.ordinal,
            display_text: entry.display_text.clone(),
            full_text: entry.full_text.clone(),
            label,
            visible: true,
            markup: String::new(),
        };
        row.apply_query(query, &config.mark_class);
        row
    }

    fn apply_query(&mut self, query: &str, mark_class: &str) {
        self.visible = matches(&self.full_text, query);
        self.markup = render_with_class(&self.label, query, mark_class);
    }
}

/// What one [`TocSession::step`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepReport {
    pub signals_processed: usize,
    pub rebuilt: Option<RebuildReason>,
    pub query_applied: bool,
    pub navigation: Option<NavigationEvent>,
}

/// Live question index bound to one document.
pub struct TocSession<D: Document> {
    document: D,
    config: TocConfig,
    selectors: CompiledSelectors,
    scheduler: HydrationScheduler,
    index: EntryIndex<D::Node>,
    reconciler: ScrollReconciler<D::Node>,

    query: String,
    pending_query: Option<(String, Duration)>,
    rows: Vec<Row>,
    rows_version: u64,

    inbox: Rc<RefCell<VecDeque<HostSignal>>>,
    subscription: Option<Subscription>,
    now: Duration,
}

impl<D: Document> std::fmt::Debug for TocSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TocSession")
            .field("state", &self.scheduler.state())
            .field("entries", &self.index.len())
            .field("query", &self.query)
            .field("rows_version", &self.rows_version)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl<D: Document> TocSession<D> {
    /// Bind a session to `document`. Fails only on invalid configuration.
    pub fn new(document: D, config: TocConfig) -> Result<Self, ConfigError> {
        let selectors = config.compile()?;
        Ok(Self {
            document,
            scheduler: HydrationScheduler::new(&config),
            reconciler: ScrollReconciler::new(&config),
            selectors,
            config,
            index: EntryIndex::new(),
            query: String::new(),
            pending_query: None,
            rows: Vec::new(),
            rows_version: 0,
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            subscription: None,
            now: Duration::ZERO,
        })
    }

    // -- Signals ------------------------------------------------------------

    /// Subscribe to `feed`; signals are queued until the next step.
    /// Replaces any previous subscription.
    pub fn attach(&mut self, feed: &SignalFeed) {
        let inbox = Rc::clone(&self.inbox);
        self.subscription = Some(feed.subscribe(move |signal| {
            inbox.borrow_mut().push_back(*signal);
        }));
    }

    /// Drop the feed subscription.
    pub fn detach(&mut self) {
        self.subscription = None;
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Queue a signal directly, bypassing any feed.
    pub fn push_signal(&self, signal: HostSignal) {
        self.inbox.borrow_mut().push_back(signal);
    }

    // -- Driving ------------------------------------------------------------

    /// Advance the session to `now` (monotonic; earlier values are clamped).
    pub fn step(&mut self, now: Duration) -> StepReport {
        self.now = self.now.max(now);
        let now = self.now;
        let mut report = StepReport::default();

        let signals: Vec<HostSignal> = self.inbox.borrow_mut().drain(..).collect();
        report.signals_processed = signals.len();
        for signal in signals {
            if let Some(reason) = self.handle_signal(signal, now) {
                report.rebuilt = Some(reason);
            }
        }

        let query_due = self
            .pending_query
            .as_ref()
            .is_some_and(|(_, due)| *due <= now);
        if query_due && let Some((query, _)) = self.pending_query.take() {
            self.query = query;
            self.refilter();
            report.query_applied = true;
        }

        report.navigation = self.reconciler.poll(
            &mut self.document,
            &mut self.index,
            &self.selectors,
            &mut self.scheduler,
            now,
        );

        if let Some(reason) = self.scheduler.poll(now) {
            self.hydrate(reason);
            report.rebuilt = Some(reason);
        }
        report
    }

    fn handle_signal(&mut self, signal: HostSignal, now: Duration) -> Option<RebuildReason> {
        match signal {
            HostSignal::Mutation => {
                self.scheduler.on_mutation(now);
            }
            HostSignal::RouteChanged => {
                // The transcript is about to be replaced; its anchors go with it.
                self.reconciler.cancel(&mut self.document, &mut self.scheduler, now);
                self.scheduler.on_route_change(now);
            }
            HostSignal::InteractionStart { interaction } => {
                self.scheduler
                    .begin_interaction(Interaction::started_by(interaction), now);
            }
            HostSignal::InteractionEnd { interaction } => {
                self.scheduler
                    .end_interaction(Interaction::ended_by(interaction), now);
            }
            HostSignal::Scroll => {
                self.scheduler.begin_interaction(Interaction::SCROLL, now);
            }
            HostSignal::Refresh => return Some(self.refresh()),
        }
        None
    }

    /// Rebuild right now, bypassing debounce and suspension.
    pub fn refresh(&mut self) -> RebuildReason {
        let reason = self.scheduler.force_refresh();
        self.hydrate(reason);
        reason
    }

    fn hydrate(&mut self, reason: RebuildReason) {
        let _span = debug_span!("hydrate", ?reason, generation = self.index.generation()).entered();
        self.index.rebuild_from(&self.document, &self.selectors);
        self.rows = self
            .index
            .entries()
            .iter()
            .map(|entry| Row::new(entry, &self.query, &self.config))
            .collect();
        self.rows_version += 1;
        debug!(
            rows = self.rows.len(),
            visible = self.visible_count(),
            "rows rendered"
        );
    }

    fn refilter(&mut self) {
        for row in &mut self.rows {
            row.apply_query(&self.query, &self.config.mark_class);
        }
        self.rows_version += 1;
    }

    // -- Query --------------------------------------------------------------

    /// Set the filter text; applied after the filter debounce.
    pub fn set_query(&mut self, query: &str) {
        let due = self.now + self.config.filter_debounce();
        self.pending_query = Some((query.to_owned(), due));
    }

    /// Clear the filter immediately.
    pub fn clear_query(&mut self) {
        self.pending_query = None;
        if !self.query.is_empty() {
            self.query.clear();
            self.refilter();
        }
    }

    /// The applied filter text.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    // -- Navigation ---------------------------------------------------------

    /// Jump to the entry with `identity`. Unknown identities are a no-op.
    pub fn navigate_to(&mut self, identity: &str) -> NavigationOutcome {
        self.reconciler.navigate_to(
            &mut self.document,
            &mut self.index,
            &self.selectors,
            &mut self.scheduler,
            identity,
            self.now,
        )
    }

    #[must_use]
    pub fn is_navigating(&self) -> bool {
        self.reconciler.is_active()
    }

    // -- Accessors ----------------------------------------------------------

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry<D::Node>] {
        self.index.entries()
    }

    #[must_use]
    pub fn index(&self) -> &EntryIndex<D::Node> {
        &self.index
    }

    /// Number of entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Rows passing the current query.
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.rows.iter().filter(|r| r.visible).count()
    }

    /// Bumped whenever rows are rebuilt or re-filtered.
    #[must_use]
    pub fn rows_version(&self) -> u64 {
        self.rows_version
    }

    #[must_use]
    pub fn state(&self) -> HydrationState {
        self.scheduler.state()
    }

    #[must_use]
    pub fn scheduler(&self) -> &HydrationScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn config(&self) -> &TocConfig {
        &self.config
    }

    /// Selectors compiled from the configuration.
    #[must_use]
    pub fn selectors(&self) -> &CompiledSelectors {
        &self.selectors
    }

    #[must_use]
    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.now
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
