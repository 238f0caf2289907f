#![forbid(unsafe_code)]

//! Hydration scheduling: when to rebuild the index.
//!
//! # Design
//!
//! Mutation signals arrive in bursts while the host streams a reply, so
//! rebuilds are debounced (cancel and re-arm on every signal). Rebuilding
//! while the user is hovering the index, wheeling through it, scrolling the
//! page, or mid-navigation would yank rows out from under them, so any
//! active [`Interaction`] suspends hydration; when the last one ends an
//! immediate rebuild is scheduled to catch up.
//!
//! The scheduler owns no timers. The host supplies a monotonic `now` and
//! calls [`HydrationScheduler::poll`]; every deadline is a plain `Duration`.
//! This keeps the state machine deterministic and replayable in tests.
//!
//! ```text
//!            mutation                   debounce due
//!   Idle ─────────────▶ Scheduled ─────────────────────▶ rebuild ─▶ Idle
//!    ▲                     │ interaction
//!    │  last interaction   ▼
//!    └─ ends (rebuild ── Suspended   (mutations ignored)
//!       scheduled now)
//! ```
//!
//! Forced refreshes and route changes bypass suspension.

use core::time::Duration;

use bitflags::bitflags;
use tracing::trace;

use crate::config::TocConfig;
use crate::feed::InteractionKind;

bitflags! {
    /// Active user interactions. Hydration is suspended while any is set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Interaction: u8 {
        const HOVER = 1 << 0;
        const WHEEL = 1 << 1;
        const SCROLL = 1 << 2;
        const NAVIGATION = 1 << 3;
    }
}

impl Interaction {
    /// Bits set when `kind` starts.
    #[must_use]
    pub fn started_by(kind: InteractionKind) -> Self {
        match kind {
            InteractionKind::Hover => Self::HOVER,
            InteractionKind::Wheel => Self::WHEEL,
            InteractionKind::Scroll => Self::SCROLL,
        }
    }

    /// Bits cleared when `kind` ends. Leaving the panel also ends wheeling.
    #[must_use]
    pub fn ended_by(kind: InteractionKind) -> Self {
        match kind {
            InteractionKind::Hover => Self::HOVER | Self::WHEEL,
            InteractionKind::Wheel => Self::WHEEL,
            InteractionKind::Scroll => Self::SCROLL,
        }
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationState {
    /// Nothing pending.
    Idle,
    /// A rebuild is armed.
    Scheduled,
    /// An interaction is active; rebuilds are refused.
    Suspended,
}

/// Why a rebuild ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebuildReason {
    /// The mutation debounce elapsed.
    Debounce,
    /// The last interaction ended.
    Resumed,
    /// The route settled after a navigation.
    RouteChange,
    /// Explicit refresh.
    Forced,
}

/// Handle of an armed task. A newer arm invalidates older handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(u64);

/// One pending task per purpose; the newest request wins.
#[derive(Debug, Clone, Copy, Default)]
struct TaskSlot {
    due: Option<Duration>,
    serial: u64,
}

impl TaskSlot {
    fn arm(&mut self, due: Duration) -> TaskHandle {
        self.serial += 1;
        self.due = Some(due);
        TaskHandle(self.serial)
    }

    fn cancel(&mut self) {
        self.due = None;
    }

    fn is_armed(&self) -> bool {
        self.due.is_some()
    }

    fn is_current(&self, handle: TaskHandle) -> bool {
        self.is_armed() && self.serial == handle.0
    }

    /// Disarm and return `true` if due at `now`.
    fn fire(&mut self, now: Duration) -> bool {
        match self.due {
            Some(due) if due <= now => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}

/// Debounced, interaction-aware rebuild scheduler.
#[derive(Debug, Clone)]
pub struct HydrationScheduler {
    debounce: Duration,
    fallback: Duration,
    scroll_idle: Duration,
    route_settle: Duration,

    interactions: Interaction,
    rebuild_task: TaskSlot,
    rebuild_reason: RebuildReason,
    scroll_idle_task: TaskSlot,
    route_task: TaskSlot,
    next_fallback: Option<Duration>,
    rebuilds: u64,
}

impl HydrationScheduler {
    #[must_use]
    pub fn new(config: &TocConfig) -> Self {
        Self {
            debounce: config.debounce(),
            fallback: config.fallback_scan(),
            scroll_idle: config.scroll_idle(),
            route_settle: config.route_settle(),
            interactions: Interaction::empty(),
            rebuild_task: TaskSlot::default(),
            rebuild_reason: RebuildReason::Debounce,
            scroll_idle_task: TaskSlot::default(),
            route_task: TaskSlot::default(),
            next_fallback: None,
            rebuilds: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> HydrationState {
        if !self.interactions.is_empty() {
            HydrationState::Suspended
        } else if self.rebuild_task.is_armed() {
            HydrationState::Scheduled
        } else {
            HydrationState::Idle
        }
    }

    #[must_use]
    pub fn interactions(&self) -> Interaction {
        self.interactions
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        !self.interactions.is_empty()
    }

    /// Rebuilds granted so far.
    #[must_use]
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// A mutation signal: re-arm the debounce. Ignored while suspended.
    pub fn on_mutation(&mut self, now: Duration) -> Option<TaskHandle> {
        if self.is_suspended() {
            trace!(interactions = ?self.interactions, "mutation ignored while suspended");
            return None;
        }
        self.rebuild_reason = RebuildReason::Debounce;
        Some(self.rebuild_task.arm(now + self.debounce))
    }

    /// Whether `handle` is still the pending rebuild.
    #[must_use]
    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.rebuild_task.is_current(handle)
    }

    /// Start (or continue) an interaction. Cancels any pending rebuild.
    ///
    /// A scroll interaction has no end event; each call re-arms its idle
    /// timer and the timer's expiry ends it.
    pub fn begin_interaction(&mut self, interaction: Interaction, now: Duration) {
        self.interactions |= interaction;
        self.rebuild_task.cancel();
        if interaction.contains(Interaction::SCROLL) {
            self.scroll_idle_task.arm(now + self.scroll_idle);
        }
    }

    /// End an interaction. When none remain, a rebuild is scheduled for `now`.
    pub fn end_interaction(&mut self, interaction: Interaction, now: Duration) {
        if !self.interactions.intersects(interaction) {
            return;
        }
        self.interactions.remove(interaction);
        if interaction.contains(Interaction::SCROLL) {
            self.scroll_idle_task.cancel();
        }
        if self.interactions.is_empty() {
            trace!("interactions ended; catching up");
            self.rebuild_reason = RebuildReason::Resumed;
            self.rebuild_task.arm(now);
        }
    }

    /// A route change: force a rebuild once the new page has settled.
    pub fn on_route_change(&mut self, now: Duration) -> TaskHandle {
        self.route_task.arm(now + self.route_settle)
    }

    /// Grant a rebuild right now, regardless of suspension.
    pub fn force_refresh(&mut self) -> RebuildReason {
        self.rebuild_task.cancel();
        self.rebuilds += 1;
        RebuildReason::Forced
    }

    /// Advance to `now`; returns the rebuild to perform, if any.
    pub fn poll(&mut self, now: Duration) -> Option<RebuildReason> {
        if self.scroll_idle_task.fire(now) {
            self.end_interaction(Interaction::SCROLL, now);
        }

        match self.next_fallback {
            None => self.next_fallback = Some(now + self.fallback),
            Some(due) if due <= now => {
                self.next_fallback = Some(now + self.fallback);
                trace!("fallback rescan tick");
                if !self.rebuild_task.is_armed() {
                    self.on_mutation(now);
                }
            }
            Some(_) => {}
        }

        if self.route_task.fire(now) {
            self.rebuild_task.cancel();
            self.rebuilds += 1;
            return Some(RebuildReason::RouteChange);
        }

        if !self.is_suspended() && self.rebuild_task.fire(now) {
            self.rebuilds += 1;
            return Some(self.rebuild_reason);
        }
        None
    }

    /// Earliest armed deadline, for hosts that sleep between polls.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        [
            self.rebuild_task.due,
            self.scroll_idle_task.due,
            self.route_task.due,
            self.next_fallback,
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn scheduler() -> HydrationScheduler {
        HydrationScheduler::new(&TocConfig::default())
    }

    #[test]
    fn mutation_burst_debounces_to_one_rebuild() {
        let mut s = scheduler();
        assert_eq!(s.state(), HydrationState::Idle);
        s.on_mutation(ms(0));
        s.on_mutation(ms(100));
        let last = s.on_mutation(ms(200)).unwrap();
        assert_eq!(s.state(), HydrationState::Scheduled);
        assert!(s.is_pending(last));

        assert_eq!(s.poll(ms(500)), None);
        assert_eq!(s.poll(ms(600)), Some(RebuildReason::Debounce));
        assert_eq!(s.state(), HydrationState::Idle);
        assert_eq!(s.poll(ms(700)), None);
        assert_eq!(s.rebuilds(), 1);
    }

    #[test]
    fn newer_arm_supersedes_handle() {
        let mut s = scheduler();
        let first = s.on_mutation(ms(0)).unwrap();
        let second = s.on_mutation(ms(10)).unwrap();
        assert!(!s.is_pending(first));
        assert!(s.is_pending(second));
    }

    #[test]
    fn suspension_refuses_then_catches_up_once() {
        let mut s = scheduler();
        s.on_mutation(ms(0));
        s.begin_interaction(Interaction::HOVER, ms(100));
        assert_eq!(s.state(), HydrationState::Suspended);

        for t in (200..5000).step_by(100) {
            assert!(s.on_mutation(ms(t)).is_none());
            assert_eq!(s.poll(ms(t)), None);
        }

        s.end_interaction(Interaction::HOVER, ms(5000));
        assert_eq!(s.state(), HydrationState::Scheduled);
        assert_eq!(s.poll(ms(5000)), Some(RebuildReason::Resumed));
        assert_eq!(s.poll(ms(5100)), None);
        assert_eq!(s.rebuilds(), 1);
    }

    #[test]
    fn overlapping_interactions_resume_after_last() {
        let mut s = scheduler();
        s.begin_interaction(Interaction::HOVER, ms(0));
        s.begin_interaction(Interaction::WHEEL, ms(10));
        s.end_interaction(Interaction::WHEEL, ms(20));
        assert_eq!(s.state(), HydrationState::Suspended);
        s.end_interaction(Interaction::ended_by(InteractionKind::Hover), ms(30));
        assert_eq!(s.state(), HydrationState::Scheduled);
    }

    #[test]
    fn ending_inactive_interaction_is_noop() {
        let mut s = scheduler();
        s.end_interaction(Interaction::HOVER, ms(0));
        assert_eq!(s.state(), HydrationState::Idle);
    }

    #[test]
    fn scroll_ends_after_idle_period() {
        let mut s = scheduler();
        s.begin_interaction(Interaction::SCROLL, ms(0));
        s.begin_interaction(Interaction::SCROLL, ms(400));
        assert_eq!(s.poll(ms(900)), None);
        assert!(s.is_suspended());
        assert_eq!(s.poll(ms(1000)), Some(RebuildReason::Resumed));
        assert!(!s.is_suspended());
    }

    #[test]
    fn forced_refresh_bypasses_suspension() {
        let mut s = scheduler();
        s.begin_interaction(Interaction::NAVIGATION, ms(0));
        assert_eq!(s.force_refresh(), RebuildReason::Forced);
        assert_eq!(s.rebuilds(), 1);
        assert!(s.is_suspended());
    }

    #[test]
    fn route_change_fires_while_suspended() {
        let mut s = scheduler();
        s.begin_interaction(Interaction::HOVER, ms(0));
        s.on_route_change(ms(0));
        assert_eq!(s.poll(ms(100)), None);
        assert_eq!(s.poll(ms(150)), Some(RebuildReason::RouteChange));
    }

    #[test]
    fn fallback_tick_acts_like_mutation() {
        let mut s = scheduler();
        assert_eq!(s.poll(ms(0)), None);
        assert_eq!(s.next_deadline(), Some(ms(8000)));
        assert_eq!(s.poll(ms(8000)), None);
        assert_eq!(s.state(), HydrationState::Scheduled);
        assert_eq!(s.poll(ms(8400)), Some(RebuildReason::Debounce));
    }

    #[test]
    fn fallback_tick_ignored_while_suspended() {
        let mut s = scheduler();
        s.poll(ms(0));
        s.begin_interaction(Interaction::HOVER, ms(1));
        assert_eq!(s.poll(ms(8000)), None);
        assert_eq!(s.poll(ms(9000)), None);
        assert_eq!(s.rebuilds(), 0);
    }
}
