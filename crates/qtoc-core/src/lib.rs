#![forbid(unsafe_code)]

//! Core: a live, navigable index of user questions in a mutating transcript.
//!
//! # Role in qtoc
//! `qtoc-core` is the host-agnostic engine. It never touches a browser API
//! directly; every read and write of the transcript goes through the
//! [`dom::Document`] trait, so the same engine runs against the real page
//! (via `qtoc-web`) and against [`headless::HeadlessDocument`] in tests.
//!
//! # Primary responsibilities
//! - **Text**: normalize rendered text, pick the richest text container of an
//!   entry, and reduce it to a short label ([`text`]).
//! - **Discovery + indexing**: find the outermost visible user entries and
//!   fold them into a deduplicated, stably-identified index ([`discover`],
//!   [`index`]).
//! - **Filtering**: permissive subsequence matching and injection-safe
//!   highlight markup ([`fuzzy`]).
//! - **Scheduling**: debounce rebuilds and suspend them while the user is
//!   interacting ([`scheduler`]).
//! - **Navigation**: scroll an entry into place and verify it once after
//!   layout settles ([`scroll`]).
//!
//! # How it fits together
//! ```text
//! host signals ─▶ SignalFeed ─▶ TocSession::step(now)
//!   ├─ HydrationScheduler::poll ─▶ discover ─▶ EntryIndex::rebuild ─▶ rows
//!   └─ ScrollReconciler::poll   ─▶ Document::scroll_to / toggle_class
//! ```
//! All time is supplied by the host as a monotonic [`core::time::Duration`],
//! which keeps every state machine deterministic under replay.

pub mod config;
pub mod discover;
pub mod dom;
pub mod feed;
pub mod fuzzy;
pub mod headless;
pub mod index;
pub mod scheduler;
pub mod scroll;
pub mod selector;
pub mod session;
pub mod text;

pub use config::{CompiledSelectors, ConfigError, TocConfig};
pub use dom::{Content, Document, DomError, Overflow, Rect, ScrollBehavior, ScrollMetrics};
pub use feed::{HostSignal, InteractionKind, SignalFeed, Subscription};
pub use index::{Entry, EntryIndex, RebuildStats};
pub use scheduler::{HydrationScheduler, HydrationState, Interaction, RebuildReason};
pub use scroll::{NavigationEvent, NavigationOutcome, ScrollReconciler};
pub use selector::{Selector, SelectorError};
pub use session::{Row, StepReport, TocSession};
