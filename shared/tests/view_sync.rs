mod common;

use common::{around, feed, measurement, start_ready, take_map_view, take_timer, Tester};
use mapsync::capabilities::{MapViewOperation, MapViewOutput, TimerOperation, TimerOutput};
use mapsync::debounce::TimerSlot;
use mapsync::{Effect, Event, LatLng, Model, UnixTimeMs};

fn starts(effects: &[Effect], slot: TimerSlot) -> bool {
    effects.iter().any(|e| {
        matches!(e, Effect::Timer(r) if matches!(r.operation, TimerOperation::Start { id, .. } if id.slot == slot))
    })
}

#[test]
fn test_user_pan_is_committed_after_the_idle_delay() {
    let app = Tester::default();
    let mut model = Model::default();
    start_ready(&app, &mut model);

    let dragged = LatLng::new(36.2, 138.4);
    let mut effects = app
        .update(
            Event::MoveEnd {
                center: dragged,
                zoom: 6.0,
                bounds: around(dragged),
            },
            &mut model,
        )
        .effects;
    let mut commit = take_timer(&mut effects, |op| {
        matches!(op, TimerOperation::Start { id, millis: 300 } if id.slot == TimerSlot::ViewCommit)
    });
    assert_ne!(model.map_center(), dragged);

    let update = app.resolve(&mut commit, TimerOutput::Fired).expect("fire commit");
    let effects = feed(&app, &mut model, update);
    assert_eq!(model.map_center(), dragged);
    assert!(effects.iter().any(|e| matches!(e, Effect::KeyValue(_))));
}

#[test]
fn test_programmatic_move_echo_is_not_user_intent() {
    let app = Tester::default();
    let mut model = Model::default();
    start_ready(&app, &mut model);

    let target = LatLng::new(35.68, 139.76);
    let mut effects = app
        .update(
            Event::ProgrammaticMoveRequested {
                center: target,
                zoom: 15.0,
                issued_at: Some(UnixTimeMs(1_700_000_000_000)),
            },
            &mut model,
        )
        .effects;
    let set_view = take_map_view(&mut effects, |op| matches!(op, MapViewOperation::SetView { .. }));
    assert_eq!(
        set_view.operation,
        MapViewOperation::SetView {
            center: target,
            zoom: 15.0
        }
    );
    assert_eq!(model.map_center(), target);
    assert!(!model.is_user_interaction());
    assert_eq!(
        model.event_state().last_external_update.and_then(|u| u.issued_at),
        Some(UnixTimeMs(1_700_000_000_000))
    );

    let midway = LatLng::new(36.4, 138.8);
    let effects = app
        .update(
            Event::MoveEnd {
                center: midway,
                zoom: 11.0,
                bounds: around(midway),
            },
            &mut model,
        )
        .effects;
    assert!(!starts(&effects, TimerSlot::ViewCommit));
    assert_eq!(model.map_center(), target);

    app.update(
        Event::MoveEnd {
            center: target,
            zoom: 15.0,
            bounds: around(target),
        },
        &mut model,
    );
    assert!(model.is_user_interaction());
}

#[test]
fn test_unfinished_programmatic_move_times_out() {
    let app = Tester::default();
    let mut model = Model::default();
    start_ready(&app, &mut model);

    let mut effects = app
        .update(
            Event::ProgrammaticMoveRequested {
                center: LatLng::new(43.06, 141.35),
                zoom: 12.0,
                issued_at: None,
            },
            &mut model,
        )
        .effects;
    let mut timeout = take_timer(&mut effects, |op| {
        matches!(op, TimerOperation::Start { id, .. } if id.slot == TimerSlot::ProgrammaticMoveTimeout)
    });
    assert!(!model.is_user_interaction());

    let update = app.resolve(&mut timeout, TimerOutput::Fired).expect("fire timeout");
    feed(&app, &mut model, update);
    assert!(model.is_user_interaction());
}

#[test]
fn test_panel_toggle_preserves_the_center() {
    let app = Tester::default();
    let mut model = Model::default();
    start_ready(&app, &mut model);
    let anchor = model.map_center();

    let mut effects = app
        .update(Event::PanelToggled { visible: true }, &mut model)
        .effects;
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::MapView(r) if r.operation == MapViewOperation::InvalidateSize)));
    let mut resize = take_timer(&mut effects, |op| {
        matches!(op, TimerOperation::Start { id, millis: 350 } if id.slot == TimerSlot::PanelResize)
    });

    let update = app.resolve(&mut resize, TimerOutput::Fired).expect("fire resize");
    let mut effects = feed(&app, &mut model, update);
    let mut invalidate =
        take_map_view(&mut effects, |op| *op == MapViewOperation::InvalidateSize);

    let drifted = LatLng::new(anchor.lat, anchor.lng + 0.3);
    let update = app
        .resolve(
            &mut invalidate,
            MapViewOutput::Measured(measurement(drifted, model.zoom())),
        )
        .expect("resolve invalidate");
    let mut effects = feed(&app, &mut model, update);
    let restore = take_map_view(&mut effects, |op| matches!(op, MapViewOperation::SetView { .. }));
    assert_eq!(
        restore.operation,
        MapViewOperation::SetView {
            center: anchor,
            zoom: model.zoom()
        }
    );
}

#[test]
fn test_settled_bounds_load_both_categories_once() {
    let app = Tester::default();
    let mut model = Model::default();
    start_ready(&app, &mut model);

    let center = LatLng::new(35.36, 138.73);
    let mut effects = app
        .update(
            Event::MoveEnd {
                center,
                zoom: 11.0,
                bounds: around(center),
            },
            &mut model,
        )
        .effects;
    let mut load = take_timer(&mut effects, |op| {
        matches!(op, TimerOperation::Start { id, millis: 500 } if id.slot == TimerSlot::BoundsLoad)
    });
    let update = app.resolve(&mut load, TimerOutput::Fired).expect("fire load");
    let effects = feed(&app, &mut model, update);
    let searches = effects
        .iter()
        .filter(|e| matches!(e, Effect::Markers(_)))
        .count();
    assert_eq!(searches, 2);
}
