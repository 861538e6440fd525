//! Tags view-change events as user-driven or application-driven.
//!
//! A programmatic move commits its target up front and raises the in-flight
//! flag; the widget's resulting move/zoom end is then recognised and not fed
//! back into the commit gate.

use tracing::{debug, info, warn};

use crate::config::GateProfile;
use crate::debounce::{OneShotTimer, TimerId, TimerSlot};
use crate::followup::{Followup, Followups};
use crate::model::{EventState, ExternalUpdate, ObservedView, UnixTimeMs, ViewState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractionState {
    Idle,
    ProgrammaticMoveInFlight { target: ViewState },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    User,
    /// Widget echo of an in-flight move that has not reached its target yet.
    Programmatic,
    /// The echo that completed the in-flight move.
    CompletedProgrammatic,
}

impl Classification {
    #[must_use]
    pub const fn is_user(self) -> bool {
        matches!(self, Self::User)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionClassifier {
    state: InteractionState,
    timeout: OneShotTimer,
    last_external_update: Option<ExternalUpdate>,
}

impl Default for InteractionClassifier {
    fn default() -> Self {
        Self {
            state: InteractionState::Idle,
            timeout: OneShotTimer::new(TimerSlot::ProgrammaticMoveTimeout),
            last_external_update: None,
        }
    }
}

impl InteractionClassifier {
    /// Enters `ProgrammaticMoveInFlight`, arms the reset timeout and issues
    /// the view command. A move already in flight is superseded.
    pub fn start_programmatic_move(
        &mut self,
        target: ViewState,
        issued_at: Option<UnixTimeMs>,
        timeout_ms: u64,
        out: &mut Followups,
    ) -> TimerId {
        if let InteractionState::ProgrammaticMoveInFlight { target: previous } = self.state {
            debug!(?previous, ?target, "superseding in-flight programmatic move");
        }
        let timeout = self.timeout.arm(timeout_ms, out);
        self.state = InteractionState::ProgrammaticMoveInFlight { target };
        self.last_external_update = Some(ExternalUpdate {
            center: target.center,
            zoom: target.zoom,
            issued_at,
        });
        info!(center = %target.center, zoom = target.zoom, "programmatic move started");
        out.push(Followup::SetView {
            center: target.center,
            zoom: target.zoom,
        });
        timeout
    }

    /// Classifies a move or zoom end. An echo matching the in-flight target
    /// within `tolerance` completes the move.
    pub fn classify(
        &mut self,
        view: &ObservedView,
        tolerance: &GateProfile,
        out: &mut Followups,
    ) -> Classification {
        match self.state {
            InteractionState::Idle => Classification::User,
            InteractionState::ProgrammaticMoveInFlight { target } => {
                let reached = !tolerance.center_changed(&target.center, &view.center)
                    && !tolerance.zoom_changed(target.zoom, view.zoom);
                if reached {
                    self.timeout.cancel(out);
                    self.state = InteractionState::Idle;
                    self.last_external_update = None;
                    info!(center = %view.center, zoom = view.zoom, "programmatic move completed");
                    Classification::CompletedProgrammatic
                } else {
                    debug!(center = %view.center, zoom = view.zoom, "intermediate programmatic echo");
                    Classification::Programmatic
                }
            }
        }
    }

    /// Forced reset when no completion arrived in time.
    pub fn on_timeout(&mut self, id: TimerId) -> bool {
        if !self.timeout.fire(id) {
            return false;
        }
        if let InteractionState::ProgrammaticMoveInFlight { target } = self.state {
            warn!(center = %target.center, zoom = target.zoom, "programmatic move timed out, resetting to idle");
            self.state = InteractionState::Idle;
            self.last_external_update = None;
            return true;
        }
        false
    }

    #[must_use]
    pub const fn is_user_interaction(&self) -> bool {
        matches!(self.state, InteractionState::Idle)
    }

    #[must_use]
    pub const fn state(&self) -> InteractionState {
        self.state
    }

    #[must_use]
    pub const fn event_state(&self) -> EventState {
        EventState {
            is_programmatic_move: !self.is_user_interaction(),
            last_external_update: self.last_external_update,
        }
    }
}
