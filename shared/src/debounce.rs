//! Shell-driven timers with logical cancellation, the reusable trailing
//! debounce built on them, and the view-commit gate.
//!
//! The core never sleeps. Arming a timer emits a [`Followup::StartTimer`]
//! carrying a [`TimerId`]; the shell answers with the same id once the delay
//! elapses. Every re-arm bumps the generation, so a late answer for a
//! superseded timer no longer matches and is ignored.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GateProfile;
use crate::followup::{Followup, Followups};
use crate::model::{LatLng, ObservedView, ViewState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerSlot {
    ViewCommit,
    ProgrammaticMoveTimeout,
    InitPoll,
    InitForceReady,
    ClickRetry,
    PanelResize,
    BoundsLoad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerId {
    pub slot: TimerSlot,
    pub generation: u64,
}

/// One pending timer per slot. Arming again supersedes the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotTimer {
    slot: TimerSlot,
    generation: u64,
    pending: Option<TimerId>,
}

impl OneShotTimer {
    #[must_use]
    pub const fn new(slot: TimerSlot) -> Self {
        Self {
            slot,
            generation: 0,
            pending: None,
        }
    }

    pub fn arm(&mut self, delay_ms: u64, out: &mut Followups) -> TimerId {
        if let Some(previous) = self.pending.take() {
            out.push(Followup::ClearTimer(previous));
        }
        self.generation += 1;
        let id = TimerId {
            slot: self.slot,
            generation: self.generation,
        };
        self.pending = Some(id);
        out.push(Followup::StartTimer { id, delay_ms });
        id
    }

    /// Consumes the pending timer if `id` is the current one.
    pub fn fire(&mut self, id: TimerId) -> bool {
        if self.pending == Some(id) {
            self.pending = None;
            true
        } else {
            debug!(?id, current = ?self.pending, "ignoring superseded timer");
            false
        }
    }

    pub fn cancel(&mut self, out: &mut Followups) -> Option<TimerId> {
        let cancelled = self.pending.take();
        if let Some(id) = cancelled {
            out.push(Followup::ClearTimer(id));
        }
        cancelled
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub const fn slot(&self) -> TimerSlot {
        self.slot
    }
}

/// Trailing debounce: only the last significant input of a burst fires.
///
/// The debounce keeps no copy of the input. Whoever handles the fired timer
/// re-reads live state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailingDebounce {
    timer: OneShotTimer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Scheduled(TimerId),
    Insignificant,
}

impl TrailingDebounce {
    #[must_use]
    pub const fn new(slot: TimerSlot) -> Self {
        Self {
            timer: OneShotTimer::new(slot),
        }
    }

    /// Re-arms the timer when `is_significant` accepts `input`. An
    /// insignificant input leaves any pending fire untouched.
    pub fn offer<T, F>(
        &mut self,
        input: &T,
        delay_ms: u64,
        is_significant: F,
        out: &mut Followups,
    ) -> Offer
    where
        F: FnOnce(&T) -> bool,
    {
        if is_significant(input) {
            Offer::Scheduled(self.timer.arm(delay_ms, out))
        } else {
            Offer::Insignificant
        }
    }

    /// Unconditional re-arm.
    pub fn touch(&mut self, delay_ms: u64, out: &mut Followups) -> TimerId {
        self.timer.arm(delay_ms, out)
    }

    pub fn fire(&mut self, id: TimerId) -> bool {
        self.timer.fire(id)
    }

    pub fn cancel(&mut self, out: &mut Followups) -> Option<TimerId> {
        self.timer.cancel(out)
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// A programmatic move is in flight. Nothing was scheduled.
    Programmatic,
    BelowThreshold,
    Scheduled(TimerId),
}

/// What a fired commit should write to the store.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommitPlan {
    pub center: Option<LatLng>,
    pub zoom: Option<f64>,
}

impl CommitPlan {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.center.is_none() && self.zoom.is_none()
    }
}

/// Coalesces user-driven move and zoom ends into rate-limited commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewCommitGate {
    debounce: TrailingDebounce,
}

impl Default for ViewCommitGate {
    fn default() -> Self {
        Self {
            debounce: TrailingDebounce::new(TimerSlot::ViewCommit),
        }
    }
}

impl ViewCommitGate {
    pub fn offer(
        &mut self,
        observed: &ObservedView,
        committed: &ViewState,
        user_interaction: bool,
        profile: &GateProfile,
        out: &mut Followups,
    ) -> GateDecision {
        if !user_interaction {
            return GateDecision::Programmatic;
        }
        let offer = self.debounce.offer(
            observed,
            profile.delay_ms,
            |view| !Self::plan(committed, view, profile).is_empty(),
            out,
        );
        match offer {
            Offer::Scheduled(id) => {
                debug!(?id, delay_ms = profile.delay_ms, "view commit scheduled");
                GateDecision::Scheduled(id)
            }
            Offer::Insignificant => GateDecision::BelowThreshold,
        }
    }

    pub fn fire(&mut self, id: TimerId) -> bool {
        self.debounce.fire(id)
    }

    pub fn cancel(&mut self, out: &mut Followups) {
        if let Some(id) = self.debounce.cancel(out) {
            debug!(?id, "pending view commit cancelled");
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Center and zoom are judged separately; only the parts that moved
    /// past the profile's thresholds are committed.
    #[must_use]
    pub fn plan(committed: &ViewState, observed: &ObservedView, profile: &GateProfile) -> CommitPlan {
        CommitPlan {
            center: profile
                .center_changed(&committed.center, &observed.center)
                .then_some(observed.center),
            zoom: profile
                .zoom_changed(committed.zoom, observed.zoom)
                .then_some(observed.zoom),
        }
    }
}
