#![forbid(unsafe_code)]

//! Platform-independent runner core wrapping [`TocSession`].
//!
//! This module contains the logic shared between the wasm-bindgen exports
//! and the native test harness. No JS/WASM types here: time arrives as
//! host milliseconds, signals as JSON, rows leave as JSON.

use core::time::Duration;

use qtoc_core::{
    ConfigError, Document, HostSignal, NavigationEvent, NavigationOutcome, RebuildReason, Row,
    SignalFeed, StepReport, TocConfig, TocSession,
};
use serde::Serialize;
use tracing::{debug, warn};

/// JSON-facing summary of one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub signals_processed: usize,
    /// `"debounce" | "resumed" | "route_change" | "forced"`, if rebuilt.
    pub rebuilt: Option<&'static str>,
    pub query_applied: bool,
    /// `"corrected" | "settled" | "aborted" | "finished"`, if any.
    pub navigation: Option<&'static str>,
    pub rows_version: u64,
}

fn reason_name(reason: RebuildReason) -> &'static str {
    match reason {
        RebuildReason::Debounce => "debounce",
        RebuildReason::Resumed => "resumed",
        RebuildReason::RouteChange => "route_change",
        RebuildReason::Forced => "forced",
    }
}

fn event_name(event: NavigationEvent) -> &'static str {
    match event {
        NavigationEvent::Corrected { .. } => "corrected",
        NavigationEvent::Settled { .. } => "settled",
        NavigationEvent::Aborted => "aborted",
        NavigationEvent::Finished => "finished",
    }
}

/// Host milliseconds to a clock value; garbage reads as zero.
fn ms_to_duration(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms / 1000.0)
    } else {
        Duration::ZERO
    }
}

/// Platform-independent runner around one session.
pub struct RunnerCore<D: Document> {
    session: TocSession<D>,
}

impl<D: Document> RunnerCore<D> {
    /// Create a runner; `config_json` may be partial or absent.
    pub fn new(document: D, config_json: Option<&str>) -> Result<Self, ConfigError> {
        let config = match config_json.map(str::trim) {
            Some(json) if !json.is_empty() => TocConfig::from_json(json)?,
            _ => TocConfig::default(),
        };
        Ok(Self {
            session: TocSession::new(document, config)?,
        })
    }

    /// Route signals published on `feed` into the session.
    pub fn attach(&mut self, feed: &SignalFeed) {
        self.session.attach(feed);
    }

    /// Queue a JSON-encoded [`HostSignal`]. Returns `false` if malformed.
    pub fn push_encoded_signal(&mut self, json: &str) -> bool {
        match HostSignal::from_json(json) {
            Ok(signal) => {
                self.session.push_signal(signal);
                true
            }
            Err(err) => {
                warn!(%err, "rejected host signal");
                false
            }
        }
    }

    /// Advance to host time `now_ms` (e.g. `performance.now()`).
    pub fn step(&mut self, now_ms: f64) -> StepSummary {
        let report: StepReport = self.session.step(ms_to_duration(now_ms));
        StepSummary {
            signals_processed: report.signals_processed,
            rebuilt: report.rebuilt.map(reason_name),
            query_applied: report.query_applied,
            navigation: report.navigation.map(event_name),
            rows_version: self.session.rows_version(),
        }
    }

    pub fn refresh(&mut self) {
        self.session.refresh();
    }

    pub fn set_query(&mut self, query: &str) {
        self.session.set_query(query);
    }

    pub fn clear_query(&mut self) {
        self.session.clear_query();
    }

    /// Start a jump; `true` if the first scroll was issued.
    pub fn navigate_to(&mut self, identity: &str) -> bool {
        let outcome = self.session.navigate_to(identity);
        debug!(identity, ?outcome, "navigate");
        matches!(outcome, NavigationOutcome::Started { .. })
    }

    /// Current rows as a JSON array.
    pub fn rows_json(&self) -> String {
        serde_json::to_string(self.session.rows()).unwrap_or_else(|_| "[]".to_owned())
    }

    #[cfg_attr(target_arch = "wasm32", allow(dead_code))]
    pub fn rows(&self) -> &[Row] {
        self.session.rows()
    }

    pub fn count(&self) -> usize {
        self.session.count()
    }

    pub fn visible_count(&self) -> usize {
        self.session.visible_count()
    }

    pub fn rows_version(&self) -> u64 {
        self.session.rows_version()
    }

    pub fn session(&self) -> &TocSession<D> {
        &self.session
    }
}
