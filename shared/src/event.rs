use serde::{Deserialize, Serialize};

use crate::capabilities::{MarkerBatch, ServiceError};
use crate::config::EngineConfig;
use crate::debounce::TimerId;
use crate::followup::MeasurePurpose;
use crate::loader::LoadTicket;
use crate::model::{
    Bounds, ContainerSize, GeocodeResult, LatLng, MarkerCategory, MarkerCode, Preferences,
    ProjectionRoundTrip, ReferenceCandidate, ReferenceDetail, ScreenPoint, UnixTimeMs,
    ViewMeasurement,
};
use crate::popup::EnrichmentTicket;

/// Who owns a click. Each interactive entity reports its own kind, so the
/// core never guesses from the visual element that was hit.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClickTarget {
    Marker {
        category: MarkerCategory,
        code: MarkerCode,
        position: LatLng,
    },
    Gps {
        position: LatLng,
    },
    Background {
        coordinate: LatLng,
        point: ScreenPoint,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // --- Shell lifecycle ---
    Started,
    Configure(Box<EngineConfig>),

    // --- Widget events ---
    MapClicked(ClickTarget),
    MoveEnd {
        center: LatLng,
        zoom: f64,
        bounds: Bounds,
    },
    ZoomEnd {
        zoom: f64,
        bounds: Bounds,
    },
    Resized {
        container: ContainerSize,
    },

    // --- UI actions ---
    PopupCloseRequested,
    ProgrammaticMoveRequested {
        center: LatLng,
        zoom: f64,
        #[serde(default)]
        issued_at: Option<UnixTimeMs>,
    },
    PanelToggled {
        visible: bool,
    },
    ReferenceSearchRequested {
        code: MarkerCode,
        #[serde(default)]
        issued_at: Option<UnixTimeMs>,
    },
    LocationUpdated {
        position: Option<LatLng>,
    },
    PreferencesChanged(Box<Preferences>),

    // --- Capability results ---
    #[serde(skip)]
    TimerFired(TimerId),
    #[serde(skip)]
    ViewMeasured {
        purpose: MeasurePurpose,
        measurement: Option<Box<ViewMeasurement>>,
    },
    #[serde(skip)]
    ClickRoundTrip {
        seq: u64,
        round_trip: Option<ProjectionRoundTrip>,
    },
    #[serde(skip)]
    MarkersLoaded {
        ticket: LoadTicket,
        result: Result<MarkerBatch, ServiceError>,
    },
    #[serde(skip)]
    ReferenceFound {
        lookup: u64,
        result: Box<Result<ReferenceCandidate, ServiceError>>,
    },
    #[serde(skip)]
    DetailLoaded {
        ticket: EnrichmentTicket,
        result: Box<Result<ReferenceDetail, ServiceError>>,
    },
    #[serde(skip)]
    GeocodeResolved {
        ticket: EnrichmentTicket,
        position: LatLng,
        result: Box<Result<GeocodeResult, ServiceError>>,
    },
    #[serde(skip)]
    SnapshotLoaded(Result<Option<Vec<u8>>, String>),
    #[serde(skip)]
    SnapshotSaved(Result<(), String>),
}
