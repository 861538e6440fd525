//! Side effects requested by the engine components. The app turns each one
//! into a capability call; components never talk to the shell directly.

use crate::debounce::TimerId;
use crate::loader::BoundsQuery;
use crate::model::{LatLng, MarkerCode, ScreenPoint};
use crate::popup::EnrichmentTicket;

/// Why a measurement was requested, so the answer is routed back to the
/// component that asked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurePurpose {
    Readiness,
    ClickRecalibration,
    PanelResize { anchor: LatLng },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Followup {
    SetView { center: LatLng, zoom: f64 },
    InvalidateSize { purpose: MeasurePurpose },
    Measure { purpose: MeasurePurpose, probe: LatLng },
    RoundTrip { seq: u64, point: ScreenPoint },
    StartTimer { id: TimerId, delay_ms: u64 },
    ClearTimer(TimerId),
    SearchInBounds(BoundsQuery),
    SearchReference { lookup: u64, code: MarkerCode },
    SearchFull { ticket: EnrichmentTicket, code: MarkerCode },
    ReverseGeocode { ticket: EnrichmentTicket, position: LatLng },
    LoadSnapshot,
    SaveSnapshot(Vec<u8>),
    Render,
}

pub type Followups = Vec<Followup>;
