use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capabilities::Capabilities;
use crate::event::Event;
use crate::followup::{Followup, Followups};
use crate::model::{LatLng, Park, Preferences, Summit};
use crate::persist::SNAPSHOT_KEY;
use crate::popup::{PopupContent, PopupIdentity};
use crate::store::MapStore;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PopupView {
    pub position: LatLng,
    pub identity: PopupIdentity,
    pub content: PopupContent,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub center: LatLng,
    pub zoom: f64,
    /// Only a popup with something to show is exposed.
    pub popup: Option<PopupView>,
    pub summits: Vec<Summit>,
    pub parks: Vec<Park>,
    pub preferences: Preferences,
    pub map_ready: bool,
    /// A marker search is in flight.
    pub is_loading: bool,
    pub current_location: Option<LatLng>,
}

#[derive(Default)]
pub struct App;

impl App {
    /// Runs one event through the store and returns the side effects it
    /// asked for, without touching any capability.
    pub fn handle(event: Event, model: &mut MapStore) -> Followups {
        let mut out = Followups::new();
        match event {
            Event::Started => model.on_started(&mut out),
            Event::Configure(config) => model.on_configure(*config),

            Event::MapClicked(target) => model.on_map_clicked(target, &mut out),
            Event::MoveEnd {
                center,
                zoom,
                bounds,
            } => model.on_move_end(center, zoom, bounds, &mut out),
            Event::ZoomEnd { zoom, bounds } => model.on_zoom_end(zoom, bounds, &mut out),
            Event::Resized { container } => model.on_resized(container, &mut out),

            Event::PopupCloseRequested => {
                model.clear_popup(&mut out);
            }
            Event::ProgrammaticMoveRequested {
                center,
                zoom,
                issued_at,
            } => model.start_programmatic_move(center, zoom, issued_at, &mut out),
            Event::PanelToggled { visible } => model.on_panel_toggled(visible, &mut out),
            Event::ReferenceSearchRequested { code, issued_at } => {
                model.on_reference_search(code, issued_at, &mut out);
            }
            Event::LocationUpdated { position } => model.on_location_updated(position, &mut out),
            Event::PreferencesChanged(preferences) => {
                model.on_preferences_changed(*preferences, &mut out);
            }

            Event::TimerFired(id) => model.on_timer(id, &mut out),
            Event::ViewMeasured {
                purpose,
                measurement,
            } => model.on_view_measured(purpose, measurement.map(|m| *m), &mut out),
            Event::ClickRoundTrip { seq, round_trip } => {
                model.on_click_round_trip(seq, round_trip, &mut out);
            }
            Event::MarkersLoaded { ticket, result } => {
                model.on_markers_loaded(ticket, result, &mut out);
            }
            Event::ReferenceFound { lookup, result } => {
                model.on_reference_found(lookup, *result, &mut out);
            }
            Event::DetailLoaded { ticket, result } => {
                model.on_detail_loaded(&ticket, *result, &mut out);
            }
            Event::GeocodeResolved {
                ticket,
                position,
                result,
            } => model.on_geocode_resolved(&ticket, position, *result, &mut out),
            Event::SnapshotLoaded(result) => model.on_snapshot_loaded(result, &mut out),
            Event::SnapshotSaved(result) => {
                if let Err(e) = result {
                    warn!(error = %e, "saving view state failed");
                }
            }
        }
        out
    }

    fn dispatch(followups: Followups, caps: &Capabilities) {
        let mut rendered = false;
        for followup in followups {
            match followup {
                Followup::SetView { center, zoom } => caps.map_view.set_view(center, zoom),
                Followup::InvalidateSize { purpose } => {
                    caps.map_view.invalidate_size(move |measurement| Event::ViewMeasured {
                        purpose,
                        measurement: measurement.map(Box::new),
                    });
                }
                Followup::Measure { purpose, probe } => {
                    caps.map_view.measure(probe, move |measurement| Event::ViewMeasured {
                        purpose,
                        measurement: measurement.map(Box::new),
                    });
                }
                Followup::RoundTrip { seq, point } => {
                    caps.map_view
                        .round_trip(point, move |round_trip| Event::ClickRoundTrip { seq, round_trip });
                }
                Followup::StartTimer { id, delay_ms } => {
                    caps.timer.start(id, delay_ms, Event::TimerFired);
                }
                Followup::ClearTimer(id) => caps.timer.clear(id),
                Followup::SearchInBounds(query) => {
                    let ticket = query.ticket;
                    caps.markers
                        .search_in_bounds(query, move |result| Event::MarkersLoaded { ticket, result });
                }
                Followup::SearchReference { lookup, code } => {
                    caps.markers.search_reference(code, move |result| Event::ReferenceFound {
                        lookup,
                        result: Box::new(result),
                    });
                }
                Followup::SearchFull { ticket, code } => {
                    caps.markers.search_full(code, move |result| Event::DetailLoaded {
                        ticket,
                        result: Box::new(result),
                    });
                }
                Followup::ReverseGeocode { ticket, position } => {
                    caps.geocoder.reverse_geocode(position, move |result| Event::GeocodeResolved {
                        ticket,
                        position,
                        result: Box::new(result),
                    });
                }
                Followup::LoadSnapshot => {
                    caps.kv.get(SNAPSHOT_KEY.to_string(), |result| {
                        Event::SnapshotLoaded(result.map_err(|e| format!("{e:?}")))
                    });
                }
                Followup::SaveSnapshot(bytes) => {
                    caps.kv.set(SNAPSHOT_KEY.to_string(), bytes, |result| {
                        Event::SnapshotSaved(result.map(|_| ()).map_err(|e| format!("{e:?}")))
                    });
                }
                Followup::Render => {
                    // One render per update is enough.
                    if !rendered {
                        caps.render.render();
                        rendered = true;
                    }
                }
            }
        }
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = MapStore;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut MapStore, caps: &Capabilities) {
        let followups = Self::handle(event, model);
        debug!(count = followups.len(), "dispatching followups");
        Self::dispatch(followups, caps);
    }

    fn view(&self, model: &MapStore) -> ViewModel {
        ViewModel {
            center: model.map_center(),
            zoom: model.zoom(),
            popup: model.visible_popup().map(|p| PopupView {
                position: p.position,
                identity: p.identity.clone(),
                content: p.content.clone(),
            }),
            summits: model.summits().as_slice().to_vec(),
            parks: model.parks().as_slice().to_vec(),
            preferences: model.preferences().clone(),
            map_ready: model.is_map_ready(),
            is_loading: model.is_loading(),
            current_location: model.current_location(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ClickTarget;
    use crate::model::{Bounds, MarkerCategory, MarkerCode};

    #[test]
    fn test_handle_is_pure_over_the_store() {
        let mut model = MapStore::default();
        let followups = App::handle(Event::Started, &mut model);
        assert_eq!(followups.first(), Some(&Followup::LoadSnapshot));
        assert!(followups.contains(&Followup::Render));
    }

    #[test]
    fn test_view_hides_pending_geocode_popup() {
        let mut model = MapStore::default();
        App::handle(
            Event::ViewMeasured {
                purpose: crate::followup::MeasurePurpose::Readiness,
                measurement: Some(Box::new(crate::model::ViewMeasurement {
                    center: model.map_center(),
                    zoom: model.zoom(),
                    bounds: Bounds::new(30.0, 130.0, 45.0, 145.0),
                    container: crate::model::ContainerSize::new(800.0, 600.0),
                    probe_point: Some(crate::model::ScreenPoint::new(400.0, 300.0)),
                })),
            },
            &mut model,
        );
        App::handle(
            Event::MapClicked(ClickTarget::Background {
                coordinate: LatLng::new(35.0, 139.0),
                point: crate::model::ScreenPoint::new(10.0, 10.0),
            }),
            &mut model,
        );
        assert!(model.popup_info().is_some());
        assert!(crux_core::App::view(&App, &model).popup.is_none());
    }

    #[test]
    fn test_view_exposes_marker_popup() {
        let mut model = MapStore::default();
        App::handle(
            Event::MapClicked(ClickTarget::Marker {
                category: MarkerCategory::Park,
                code: MarkerCode::new("JA-0001"),
                position: LatLng::new(44.0, 145.0),
            }),
            &mut model,
        );
        let view = crux_core::App::view(&App, &model);
        assert!(!view.is_loading);
        let popup = view.popup.unwrap();
        assert_eq!(popup.identity, PopupIdentity::Marker(MarkerCode::new("JA-0001")));
        assert_eq!(popup.position, LatLng::new(44.0, 145.0));
    }
}
