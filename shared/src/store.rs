//! The single source of truth for the map.
//!
//! Fields are private. Consumers read through getters and write through the
//! named actions (`set_map_center`, `set_zoom`, `set_unique_popup`,
//! `clear_popup`, `start_programmatic_move`, `debounce_state_update`); the
//! reaction methods further down orchestrate the components in response to
//! widget, timer and service events.

use tracing::{debug, info, instrument, warn};

use crate::cache::GeocodeCache;
use crate::capabilities::{MarkerBatch, ServiceError};
use crate::config::{EngineConfig, GateProfile};
use crate::debounce::{GateDecision, OneShotTimer, TimerId, TimerSlot, ViewCommitGate};
use crate::event::ClickTarget;
use crate::followup::{Followup, Followups, MeasurePurpose};
use crate::init_guard::{InitGuard, InitPhase};
use crate::interaction::InteractionClassifier;
use crate::loader::{Acceptance, DataLoader, LoadDecision, LoadTicket};
use crate::model::{
    validate_zoom, Bounds, ContainerSize, EventState, GeocodeResult, LatLng, MarkerCategory,
    MarkerCode, MarkerSet, ObservedView, Park, Preferences, ProjectionRoundTrip,
    ReferenceCandidate, ReferenceDetail, Summit, UnixTimeMs, ViewMeasurement, ViewState,
};
use crate::persist::ViewSnapshot;
use crate::popup::{
    EnrichmentOutcome, EnrichmentTicket, PopupChange, PopupInfo, PopupManager, PopupRequest,
    ReferenceBrief,
};

#[derive(Debug)]
pub struct MapStore {
    config: EngineConfig,
    view: ViewState,
    observed: Option<ObservedView>,
    preferences: Preferences,
    summits: MarkerSet<Summit>,
    parks: MarkerSet<Park>,
    current_location: Option<LatLng>,
    guard: InitGuard,
    classifier: InteractionClassifier,
    gate: ViewCommitGate,
    popups: PopupManager,
    loader: DataLoader,
    panel_resize: OneShotTimer,
    panel_anchor: Option<LatLng>,
    reference_lookup: u64,
    reference_issued_at: Option<UnixTimeMs>,
    geocode_cache: GeocodeCache,
}

impl Default for MapStore {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl MapStore {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            view: ViewState {
                center: config.default_center,
                zoom: config.default_zoom,
            },
            observed: None,
            preferences: Preferences::default(),
            summits: MarkerSet::default(),
            parks: MarkerSet::default(),
            current_location: None,
            guard: InitGuard::default(),
            classifier: InteractionClassifier::default(),
            gate: ViewCommitGate::default(),
            popups: PopupManager::default(),
            loader: DataLoader::default(),
            panel_resize: OneShotTimer::new(TimerSlot::PanelResize),
            panel_anchor: None,
            reference_lookup: 0,
            reference_issued_at: None,
            geocode_cache: GeocodeCache::new(config.geocode_cache_capacity),
            config,
        }
    }

    // --- Getters ---

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn map_center(&self) -> LatLng {
        self.view.center
    }

    #[must_use]
    pub const fn zoom(&self) -> f64 {
        self.view.zoom
    }

    #[must_use]
    pub const fn view_state(&self) -> ViewState {
        self.view
    }

    #[must_use]
    pub const fn observed_view(&self) -> Option<ObservedView> {
        self.observed
    }

    #[must_use]
    pub const fn event_state(&self) -> EventState {
        self.classifier.event_state()
    }

    /// The popup occupying the slot, visible or not.
    #[must_use]
    pub const fn popup_info(&self) -> Option<&PopupInfo> {
        self.popups.active()
    }

    #[must_use]
    pub fn visible_popup(&self) -> Option<&PopupInfo> {
        self.popups.visible()
    }

    #[must_use]
    pub const fn summits(&self) -> &MarkerSet<Summit> {
        &self.summits
    }

    #[must_use]
    pub const fn parks(&self) -> &MarkerSet<Park> {
        &self.parks
    }

    #[must_use]
    pub const fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    #[must_use]
    pub const fn current_location(&self) -> Option<LatLng> {
        self.current_location
    }

    #[must_use]
    pub const fn init_phase(&self) -> InitPhase {
        self.guard.phase()
    }

    #[must_use]
    pub const fn is_map_ready(&self) -> bool {
        self.guard.is_ready()
    }

    #[must_use]
    pub const fn is_user_interaction(&self) -> bool {
        self.classifier.is_user_interaction()
    }

    #[must_use]
    pub fn is_commit_pending(&self) -> bool {
        self.gate.is_pending()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loader.has_outstanding()
    }

    /// The gate profile in force right now.
    #[must_use]
    pub fn active_profile(&self) -> &GateProfile {
        self.config.profile(self.popups.visible().is_some())
    }

    // --- Actions ---

    pub fn set_map_center(&mut self, center: LatLng) {
        if center.is_valid() {
            self.view.center = center;
        } else {
            warn!(%center, "ignoring invalid map center");
        }
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        match validate_zoom(zoom) {
            Ok(zoom) => self.view.zoom = zoom,
            Err(e) => warn!(error = %e, "ignoring invalid zoom"),
        }
    }

    pub fn set_unique_popup(&mut self, request: PopupRequest, out: &mut Followups) -> PopupChange {
        let change = self.popups.set_unique_popup(request, out);
        if matches!(change, PopupChange::Replaced(_)) {
            out.push(Followup::Render);
        }
        change
    }

    pub fn clear_popup(&mut self, out: &mut Followups) -> Option<PopupInfo> {
        let cleared = self.popups.clear_popup();
        if cleared.is_some() {
            out.push(Followup::Render);
        }
        cleared
    }

    /// Commits the target, then marks the move in flight so its widget
    /// echo is not mistaken for user intent.
    pub fn start_programmatic_move(
        &mut self,
        center: LatLng,
        zoom: f64,
        issued_at: Option<UnixTimeMs>,
        out: &mut Followups,
    ) {
        if self.move_view(center, zoom, issued_at, out) {
            self.persist(out);
        }
    }

    fn move_view(
        &mut self,
        center: LatLng,
        zoom: f64,
        issued_at: Option<UnixTimeMs>,
        out: &mut Followups,
    ) -> bool {
        if !center.is_valid() || validate_zoom(zoom).is_err() {
            warn!(%center, zoom, "rejecting programmatic move to invalid view");
            return false;
        }
        self.gate.cancel(out);
        self.set_map_center(center);
        self.set_zoom(zoom);
        self.classifier.start_programmatic_move(
            self.view,
            issued_at,
            self.config.programmatic_move_timeout_ms,
            out,
        );
        out.push(Followup::Render);
        true
    }

    /// Offers a settled view to the commit gate.
    pub fn debounce_state_update(&mut self, observed: &ObservedView, out: &mut Followups) -> GateDecision {
        let profile = *self.active_profile();
        let decision = self.gate.offer(
            observed,
            &self.view,
            self.classifier.is_user_interaction(),
            &profile,
            out,
        );
        debug!(?decision, "gate decision");
        decision
    }

    // --- Reactions ---

    fn readiness_probe(&self) -> LatLng {
        self.observed.map_or(self.view.center, |o| o.center)
    }

    pub fn on_started(&mut self, out: &mut Followups) {
        out.push(Followup::LoadSnapshot);
        let probe = self.readiness_probe();
        self.guard.begin(&self.config, probe, out);
        out.push(Followup::Render);
    }

    pub fn on_configure(&mut self, config: EngineConfig) {
        match config.validate() {
            Ok(()) => {
                if config.geocode_cache_capacity != self.config.geocode_cache_capacity {
                    self.geocode_cache = GeocodeCache::new(config.geocode_cache_capacity);
                }
                info!("engine config applied");
                self.config = config;
            }
            Err(e) => warn!(error = %e, "rejecting engine config"),
        }
    }

    #[instrument(skip(self, out))]
    pub fn on_map_clicked(&mut self, target: ClickTarget, out: &mut Followups) {
        match target {
            ClickTarget::Marker {
                category,
                code,
                position,
            } => {
                let brief = self.brief_for(category, &code);
                self.set_unique_popup(PopupRequest::marker(position, brief), out);
            }
            ClickTarget::Gps { position } => {
                self.set_unique_popup(PopupRequest::gps(position), out);
            }
            ClickTarget::Background { coordinate, point } => {
                if let Some(resolved) = self.guard.vet_click(coordinate, point, out) {
                    self.open_geocode_popup(resolved, out);
                }
            }
        }
    }

    fn brief_for(&self, category: MarkerCategory, code: &MarkerCode) -> ReferenceBrief {
        let name = match category {
            MarkerCategory::Summit => self.summits.get(code).map(|s| s.name.clone()),
            MarkerCategory::Park => self.parks.get(code).map(|p| p.name.clone()),
        };
        ReferenceBrief {
            code: code.clone(),
            name,
            category: Some(category),
        }
    }

    fn open_geocode_popup(&mut self, position: LatLng, out: &mut Followups) {
        let cached = self.geocode_cache.get(position);
        if cached.is_some() {
            debug!(%position, "geocode cache hit");
        }
        self.set_unique_popup(PopupRequest::geocode(position, cached), out);
    }

    pub fn on_click_round_trip(
        &mut self,
        seq: u64,
        round_trip: Option<ProjectionRoundTrip>,
        out: &mut Followups,
    ) {
        if let Some(resolved) = self.guard.on_round_trip(seq, round_trip, &self.config, out) {
            self.open_geocode_popup(resolved, out);
        }
    }

    pub fn on_move_end(&mut self, center: LatLng, zoom: f64, bounds: Bounds, out: &mut Followups) {
        self.on_view_settled(ObservedView { center, zoom, bounds }, out);
    }

    pub fn on_zoom_end(&mut self, zoom: f64, bounds: Bounds, out: &mut Followups) {
        self.on_view_settled(
            ObservedView {
                center: bounds.center(),
                zoom,
                bounds,
            },
            out,
        );
    }

    /// Shared path for move and zoom ends: classify, offer to the gate when
    /// user-driven, and always re-arm the bounds load.
    #[instrument(skip(self, out), fields(center = %view.center, zoom = view.zoom))]
    fn on_view_settled(&mut self, view: ObservedView, out: &mut Followups) {
        if !view.center.is_valid() || validate_zoom(view.zoom).is_err() || !view.bounds.is_valid() {
            warn!(?view, "ignoring implausible view report");
            return;
        }
        self.observed = Some(view);
        self.popups.log_containment(&view.bounds);

        if !self.guard.is_ready() {
            self.guard.request_measurement(&self.config, view.center, out);
        }

        let idle = self.config.idle_profile;
        let class = self.classifier.classify(&view, &idle, out);
        if class.is_user() {
            self.debounce_state_update(&view, out);
        } else {
            debug!(?class, "programmatic view change, gate skipped");
        }

        self.loader.schedule(self.config.bounds_load_ms, out);
    }

    pub fn on_resized(&mut self, container: ContainerSize, out: &mut Followups) {
        debug!(?container, "map container resized");
        if !self.guard.is_ready() {
            let probe = self.readiness_probe();
            self.guard.request_measurement(&self.config, probe, out);
        }
    }

    pub fn on_timer(&mut self, id: TimerId, out: &mut Followups) {
        match id.slot {
            TimerSlot::ViewCommit => {
                if self.gate.fire(id) {
                    self.commit_observed_view(out);
                }
            }
            TimerSlot::ProgrammaticMoveTimeout => {
                self.classifier.on_timeout(id);
            }
            TimerSlot::InitPoll => {
                let probe = self.readiness_probe();
                self.guard.on_poll(id, &self.config, probe, out);
            }
            TimerSlot::InitForceReady => {
                if self.guard.on_force_ready(id, out) {
                    self.after_ready(out);
                }
            }
            TimerSlot::ClickRetry => self.guard.on_click_retry(id, out),
            TimerSlot::PanelResize => {
                if self.panel_resize.fire(id) {
                    if let Some(anchor) = self.panel_anchor.take() {
                        out.push(Followup::InvalidateSize {
                            purpose: MeasurePurpose::PanelResize { anchor },
                        });
                    }
                }
            }
            TimerSlot::BoundsLoad => {
                if self.loader.fire(id) {
                    self.load_markers(out);
                }
            }
        }
    }

    /// Fired commit: re-reads the live view, popup and classifier state.
    fn commit_observed_view(&mut self, out: &mut Followups) {
        if !self.classifier.is_user_interaction() {
            debug!("programmatic move in flight, dropping view commit");
            return;
        }
        let Some(observed) = self.observed else {
            return;
        };
        let plan = ViewCommitGate::plan(&self.view, &observed, self.active_profile());
        if plan.is_empty() {
            debug!("view settled back within thresholds, nothing to commit");
            return;
        }
        if let Some(center) = plan.center {
            self.set_map_center(center);
        }
        if let Some(zoom) = plan.zoom {
            self.set_zoom(zoom);
        }
        info!(center = %self.view.center, zoom = self.view.zoom, "view committed");
        self.persist(out);
        out.push(Followup::Render);
    }

    fn after_ready(&mut self, out: &mut Followups) {
        if self.observed.is_some() {
            self.loader.schedule(self.config.bounds_load_ms, out);
        }
        out.push(Followup::Render);
    }

    fn load_markers(&mut self, out: &mut Followups) {
        let Some(observed) = self.observed else {
            debug!("no bounds observed yet, skipping load");
            return;
        };
        let decisions = self.loader.load_for_bounds(
            &observed.bounds,
            observed.zoom,
            &self.preferences,
            self.config.bounds_precision,
            out,
        );
        for (category, decision) in decisions {
            if decision == LoadDecision::Disabled && self.clear_category(category) {
                out.push(Followup::Render);
            }
        }
    }

    fn clear_category(&mut self, category: MarkerCategory) -> bool {
        let was_empty = match category {
            MarkerCategory::Summit => std::mem::take(&mut self.summits).is_empty(),
            MarkerCategory::Park => std::mem::take(&mut self.parks).is_empty(),
        };
        !was_empty
    }

    pub fn on_markers_loaded(
        &mut self,
        ticket: LoadTicket,
        result: Result<MarkerBatch, ServiceError>,
        out: &mut Followups,
    ) {
        match (self.loader.accept(&ticket, result.is_ok()), result) {
            (Acceptance::Stale, _) => {}
            (Acceptance::Apply, Ok(MarkerBatch::Summits(summits))) => {
                self.summits = MarkerSet::from_entries(summits);
                info!(count = self.summits.len(), "summits loaded");
                out.push(Followup::Render);
            }
            (Acceptance::Apply, Ok(MarkerBatch::Parks(parks))) => {
                let preferences = &self.preferences;
                self.parks =
                    MarkerSet::from_entries(parks.into_iter().filter(|p| preferences.keeps_park(p)));
                info!(count = self.parks.len(), "parks loaded");
                out.push(Followup::Render);
            }
            (_, result) => {
                if let Err(e) = result {
                    warn!(category = %ticket.category, error = %e, "marker load failed");
                }
                if self.clear_category(ticket.category) {
                    out.push(Followup::Render);
                }
            }
        }
    }

    pub fn on_view_measured(
        &mut self,
        purpose: MeasurePurpose,
        measurement: Option<ViewMeasurement>,
        out: &mut Followups,
    ) {
        let Some(measurement) = measurement else {
            warn!(?purpose, "map view unavailable for measurement");
            return;
        };
        let observed = measurement.observed();
        if observed.center.is_valid() && observed.bounds.is_valid() {
            self.observed = Some(observed);
        }
        match purpose {
            MeasurePurpose::Readiness | MeasurePurpose::ClickRecalibration => {
                if self.guard.on_measurement(&measurement, out) {
                    self.after_ready(out);
                }
            }
            MeasurePurpose::PanelResize { anchor } => {
                if measurement.center.is_near(&anchor, self.config.recenter_tolerance_deg) {
                    debug!(%anchor, "center preserved across panel resize");
                } else {
                    warn!(%anchor, drifted = %measurement.center, "panel resize moved the map, restoring center");
                    self.move_view(anchor, measurement.zoom, None, out);
                }
            }
        }
    }

    /// Defers the size recalculation until the panel animation is over. The
    /// anchor is the center read before the first toggle of a burst.
    pub fn on_panel_toggled(&mut self, visible: bool, out: &mut Followups) {
        let anchor = self.readiness_probe();
        let anchor = *self.panel_anchor.get_or_insert(anchor);
        debug!(visible, %anchor, "side panel toggled");
        self.panel_resize.arm(self.config.panel_resize_delay_ms(), out);
    }

    pub fn on_reference_search(
        &mut self,
        code: MarkerCode,
        issued_at: Option<UnixTimeMs>,
        out: &mut Followups,
    ) {
        self.reference_lookup += 1;
        self.reference_issued_at = issued_at;
        out.push(Followup::SearchReference {
            lookup: self.reference_lookup,
            code,
        });
    }

    pub fn on_reference_found(
        &mut self,
        lookup: u64,
        result: Result<ReferenceCandidate, ServiceError>,
        out: &mut Followups,
    ) {
        if lookup != self.reference_lookup {
            debug!(lookup, current = self.reference_lookup, "dropping stale reference lookup");
            return;
        }
        match result {
            Ok(candidate) => {
                self.start_programmatic_move(
                    candidate.position,
                    self.config.reference_zoom,
                    self.reference_issued_at,
                    out,
                );
                let brief = ReferenceBrief {
                    code: candidate.code,
                    name: Some(candidate.name),
                    category: candidate.category,
                };
                self.set_unique_popup(PopupRequest::marker(candidate.position, brief), out);
            }
            Err(e) => warn!(error = %e, "reference lookup failed"),
        }
    }

    pub fn on_detail_loaded(
        &mut self,
        ticket: &EnrichmentTicket,
        result: Result<ReferenceDetail, ServiceError>,
        out: &mut Followups,
    ) {
        if self.popups.apply_detail(ticket, result) == EnrichmentOutcome::Applied {
            out.push(Followup::Render);
        }
    }

    pub fn on_geocode_resolved(
        &mut self,
        ticket: &EnrichmentTicket,
        position: LatLng,
        result: Result<GeocodeResult, ServiceError>,
        out: &mut Followups,
    ) {
        if let Ok(address) = &result {
            self.geocode_cache.insert(position, address);
        }
        if self.popups.apply_geocode(ticket, result) == EnrichmentOutcome::Applied {
            out.push(Followup::Render);
        }
    }

    pub fn on_location_updated(&mut self, position: Option<LatLng>, out: &mut Followups) {
        self.current_location = position.filter(LatLng::is_valid);
        out.push(Followup::Render);
    }

    /// New filters invalidate every completed load and re-arm loading.
    pub fn on_preferences_changed(&mut self, preferences: Preferences, out: &mut Followups) {
        if !preferences.zoom_threshold.is_finite() {
            warn!(threshold = preferences.zoom_threshold, "rejecting preferences");
            return;
        }
        self.apply_preferences(preferences, out);
        self.persist(out);
    }

    fn apply_preferences(&mut self, preferences: Preferences, out: &mut Followups) {
        self.preferences = preferences;
        self.loader.invalidate();
        for category in MarkerCategory::ALL {
            if !self.preferences.shows(category) {
                self.clear_category(category);
            }
        }
        self.loader.schedule(self.config.bounds_load_ms, out);
        out.push(Followup::Render);
    }

    pub fn on_snapshot_loaded(&mut self, result: Result<Option<Vec<u8>>, String>, out: &mut Followups) {
        let bytes = match result {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("no stored view state");
                return;
            }
            Err(e) => {
                warn!(error = %e, "reading stored view state failed");
                return;
            }
        };
        match ViewSnapshot::decode(&bytes) {
            Ok(snapshot) => {
                info!(center = %snapshot.view.center, zoom = snapshot.view.zoom, "restoring view state");
                self.apply_preferences(snapshot.preferences, out);
                self.move_view(snapshot.view.center, snapshot.view.zoom, None, out);
            }
            Err(e) => warn!(error = %e, "ignoring stored view state"),
        }
    }

    fn persist(&self, out: &mut Followups) {
        let snapshot = ViewSnapshot {
            preferences: self.preferences.clone(),
            view: self.view,
        };
        match snapshot.encode() {
            Ok(bytes) => out.push(Followup::SaveSnapshot(bytes)),
            Err(e) => warn!(error = %e, "encoding view state failed"),
        }
    }
}
