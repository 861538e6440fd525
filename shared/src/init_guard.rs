//! Tracks whether the widget's projection and sizing can be trusted yet.
//!
//! Right after a reload the widget may report plausible-looking events before
//! its projection settles. Until the first self-consistent measurement (or the
//! forced-ready timeout) background clicks are vetted with a projection round
//! trip and one recalibration retry.

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::debounce::{OneShotTimer, TimerId, TimerSlot};
use crate::followup::{Followup, Followups, MeasurePurpose};
use crate::model::{
    validate_zoom, ContainerSize, LatLng, ProjectionRoundTrip, ScreenPoint, ViewMeasurement,
};

/// Upper pixel bound when the container size is unknown.
pub const MAX_PLAUSIBLE_PIXELS: f64 = 10_000.0;
pub const ROUND_TRIP_TOLERANCE_PX: f64 = 2.0;
const EDGE_SLACK_PX: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    Initializing,
    Ready { forced: bool },
}

#[must_use]
pub fn is_plausible_point(point: &ScreenPoint, container: &ContainerSize) -> bool {
    if !(point.x.is_finite() && point.y.is_finite()) || point.x < 0.0 || point.y < 0.0 {
        return false;
    }
    if container.is_empty() {
        point.x <= MAX_PLAUSIBLE_PIXELS && point.y <= MAX_PLAUSIBLE_PIXELS
    } else {
        point.x <= container.width + EDGE_SLACK_PX && point.y <= container.height + EDGE_SLACK_PX
    }
}

#[must_use]
pub fn is_plausible_round_trip(clicked: &ScreenPoint, round_trip: &ProjectionRoundTrip) -> bool {
    round_trip.coordinate.is_valid()
        && is_plausible_point(&round_trip.point, &round_trip.container)
        && round_trip.point.distance_to(clicked) <= ROUND_TRIP_TOLERANCE_PX
}

/// Valid center, zoom and bounds, a non-empty container, and a plausible
/// screen position for the probe coordinate.
#[must_use]
pub fn is_self_consistent(measurement: &ViewMeasurement) -> bool {
    measurement.center.is_valid()
        && validate_zoom(measurement.zoom).is_ok()
        && measurement.bounds.is_valid()
        && measurement.bounds.contains(measurement.center)
        && !measurement.container.is_empty()
        && measurement
            .probe_point
            .is_some_and(|p| is_plausible_point(&p, &measurement.container))
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingClick {
    seq: u64,
    coordinate: LatLng,
    point: ScreenPoint,
    retried: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitGuard {
    phase: InitPhase,
    poll: OneShotTimer,
    force_ready: OneShotTimer,
    click_retry: OneShotTimer,
    click_seq: u64,
    pending_click: Option<PendingClick>,
}

impl Default for InitGuard {
    fn default() -> Self {
        Self {
            phase: InitPhase::Initializing,
            poll: OneShotTimer::new(TimerSlot::InitPoll),
            force_ready: OneShotTimer::new(TimerSlot::InitForceReady),
            click_retry: OneShotTimer::new(TimerSlot::ClickRetry),
            click_seq: 0,
            pending_click: None,
        }
    }
}

impl InitGuard {
    #[must_use]
    pub const fn phase(&self) -> InitPhase {
        self.phase
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.phase, InitPhase::Ready { .. })
    }

    /// Arms the forced-ready fallback and takes the first measurement.
    pub fn begin(&mut self, config: &EngineConfig, probe: LatLng, out: &mut Followups) {
        if self.is_ready() || self.force_ready.is_pending() {
            return;
        }
        self.force_ready.arm(config.init_force_ready_ms, out);
        self.request_measurement(config, probe, out);
    }

    /// Measures now and keeps polling until ready.
    pub fn request_measurement(&mut self, config: &EngineConfig, probe: LatLng, out: &mut Followups) {
        if self.is_ready() {
            return;
        }
        out.push(Followup::Measure {
            purpose: MeasurePurpose::Readiness,
            probe,
        });
        self.poll.arm(config.init_poll_ms, out);
    }

    /// Returns true when this measurement made the guard ready.
    pub fn on_measurement(&mut self, measurement: &ViewMeasurement, out: &mut Followups) -> bool {
        if self.is_ready() {
            return false;
        }
        if is_self_consistent(measurement) {
            info!(center = %measurement.center, zoom = measurement.zoom, "map projection ready");
            self.mark_ready(false, out);
            true
        } else {
            debug!(?measurement, "map projection not settled yet");
            false
        }
    }

    pub fn on_poll(&mut self, id: TimerId, config: &EngineConfig, probe: LatLng, out: &mut Followups) {
        if self.poll.fire(id) {
            self.request_measurement(config, probe, out);
        }
    }

    /// Returns true when the fallback fired and forced readiness.
    pub fn on_force_ready(&mut self, id: TimerId, out: &mut Followups) -> bool {
        if !self.force_ready.fire(id) || self.is_ready() {
            return false;
        }
        warn!("map projection never settled, forcing ready");
        self.mark_ready(true, out);
        true
    }

    fn mark_ready(&mut self, forced: bool, out: &mut Followups) {
        self.phase = InitPhase::Ready { forced };
        self.poll.cancel(out);
        self.force_ready.cancel(out);
    }

    /// Once ready, a background click resolves to its reported coordinate.
    /// Before that the click is parked until its round trip comes back.
    pub fn vet_click(
        &mut self,
        coordinate: LatLng,
        point: ScreenPoint,
        out: &mut Followups,
    ) -> Option<LatLng> {
        if self.is_ready() {
            return Some(coordinate);
        }
        self.click_seq += 1;
        if let Some(previous) = self.pending_click.take() {
            debug!(seq = previous.seq, "pending click superseded");
            self.click_retry.cancel(out);
        }
        self.pending_click = Some(PendingClick {
            seq: self.click_seq,
            coordinate,
            point,
            retried: false,
        });
        out.push(Followup::RoundTrip {
            seq: self.click_seq,
            point,
        });
        None
    }

    /// Resolves the parked click, or schedules the single recalibration retry.
    /// `None` output means the widget could not convert the point at all.
    pub fn on_round_trip(
        &mut self,
        seq: u64,
        output: Option<ProjectionRoundTrip>,
        config: &EngineConfig,
        out: &mut Followups,
    ) -> Option<LatLng> {
        let Some(mut pending) = self.pending_click.filter(|p| p.seq == seq) else {
            debug!(seq, "dropping stale round trip");
            return None;
        };
        if let Some(round_trip) = output.filter(|rt| is_plausible_round_trip(&pending.point, rt)) {
            self.pending_click = None;
            return Some(round_trip.coordinate);
        }
        if pending.retried {
            warn!(coordinate = %pending.coordinate, "projection still implausible, using best-effort coordinate");
            self.pending_click = None;
            return Some(pending.coordinate);
        }
        warn!(?output, "implausible click projection, recalibrating");
        pending.retried = true;
        self.pending_click = Some(pending);
        out.push(Followup::InvalidateSize {
            purpose: MeasurePurpose::ClickRecalibration,
        });
        self.click_retry.arm(config.click_retry_ms, out);
        None
    }

    pub fn on_click_retry(&mut self, id: TimerId, out: &mut Followups) {
        if !self.click_retry.fire(id) {
            return;
        }
        if let Some(pending) = self.pending_click {
            out.push(Followup::RoundTrip {
                seq: pending.seq,
                point: pending.point,
            });
        }
    }
}
