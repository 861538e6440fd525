#![allow(dead_code)]

use crux_core::testing::{AppTester, Update};
use crux_core::Request;
use mapsync::capabilities::{
    GeocodeOperation, MapViewOperation, MapViewOutput, MarkerOperation, TimerOperation,
};
use mapsync::{
    App, Bounds, ContainerSize, Effect, Event, LatLng, Model, ScreenPoint, ViewMeasurement,
};

pub type Tester = AppTester<App, Effect>;

pub fn around(center: LatLng) -> Bounds {
    Bounds::new(center.lat - 0.5, center.lng - 0.5, center.lat + 0.5, center.lng + 0.5)
}

pub fn measurement(center: LatLng, zoom: f64) -> ViewMeasurement {
    ViewMeasurement {
        center,
        zoom,
        bounds: around(center),
        container: ContainerSize::new(800.0, 600.0),
        probe_point: Some(ScreenPoint::new(400.0, 300.0)),
    }
}

/// Feeds the events produced by a resolved request back into the app.
pub fn feed(app: &Tester, model: &mut Model, update: Update<Effect, Event>) -> Vec<Effect> {
    let mut effects = update.effects;
    for event in update.events {
        effects.extend(app.update(event, model).effects);
    }
    effects
}

pub fn take_map_view(
    effects: &mut Vec<Effect>,
    wanted: impl Fn(&MapViewOperation) -> bool,
) -> Request<MapViewOperation> {
    let index = effects
        .iter()
        .position(|e| matches!(e, Effect::MapView(r) if wanted(&r.operation)))
        .expect("map view request");
    match effects.remove(index) {
        Effect::MapView(request) => request,
        _ => unreachable!(),
    }
}

pub fn take_timer(
    effects: &mut Vec<Effect>,
    wanted: impl Fn(&TimerOperation) -> bool,
) -> Request<TimerOperation> {
    let index = effects
        .iter()
        .position(|e| matches!(e, Effect::Timer(r) if wanted(&r.operation)))
        .expect("timer request");
    match effects.remove(index) {
        Effect::Timer(request) => request,
        _ => unreachable!(),
    }
}

pub fn take_markers(
    effects: &mut Vec<Effect>,
    wanted: impl Fn(&MarkerOperation) -> bool,
) -> Request<MarkerOperation> {
    let index = effects
        .iter()
        .position(|e| matches!(e, Effect::Markers(r) if wanted(&r.operation)))
        .expect("markers request");
    match effects.remove(index) {
        Effect::Markers(request) => request,
        _ => unreachable!(),
    }
}

pub fn take_geocoder(effects: &mut Vec<Effect>) -> Request<GeocodeOperation> {
    let index = effects
        .iter()
        .position(|e| matches!(e, Effect::Geocoder(_)))
        .expect("geocoder request");
    match effects.remove(index) {
        Effect::Geocoder(request) => request,
        _ => unreachable!(),
    }
}

/// Starts the app and answers the first readiness measurement.
pub fn start_ready(app: &Tester, model: &mut Model) {
    let mut effects = app.update(Event::Started, model).effects;
    let mut measure = take_map_view(&mut effects, |op| matches!(op, MapViewOperation::Measure { .. }));
    let update = app
        .resolve(
            &mut measure,
            MapViewOutput::Measured(measurement(model.map_center(), model.zoom())),
        )
        .expect("resolve measurement");
    feed(app, model, update);
    assert!(model.is_map_ready());
}
