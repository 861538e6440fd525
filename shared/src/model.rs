//! Domain types shared by the engine components: geometry reported by the
//! map widget, committed view state, marker collections and user preferences.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 24.0;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(MarkerCode);

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("invalid coordinate: lat={0}, lng={1}")]
    InvalidCoordinate(f64, f64),
    #[error("invalid zoom: {0}")]
    InvalidZoom(f64),
}

// --- Time ---

/// Wall-clock time as reported by the shell. The core never reads a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

// --- Geometry ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validated(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        let candidate = Self { lat, lng };
        if candidate.is_valid() {
            Ok(candidate)
        } else {
            Err(CoordinateError::InvalidCoordinate(lat, lng))
        }
    }

    /// Finite, latitude within ±90. Longitude may wrap past ±180 when the
    /// widget is panned across the antimeridian.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && (-90.0..=90.0).contains(&self.lat)
    }

    /// Largest per-axis difference in degrees.
    #[must_use]
    pub fn max_delta(&self, other: &Self) -> f64 {
        (self.lat - other.lat)
            .abs()
            .max((self.lng - other.lng).abs())
    }

    #[must_use]
    pub fn is_near(&self, other: &Self, tolerance_deg: f64) -> bool {
        self.max_delta(other) <= tolerance_deg
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

pub fn validate_zoom(zoom: f64) -> Result<f64, CoordinateError> {
    if zoom.is_finite() && (MIN_ZOOM..=MAX_ZOOM).contains(&zoom) {
        Ok(zoom)
    } else {
        Err(CoordinateError::InvalidZoom(zoom))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    #[must_use]
    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.south, self.west, self.north, self.east]
            .iter()
            .all(|v| v.is_finite())
            && self.south < self.north
            && self.west < self.east
            && self.south >= -90.0
            && self.north <= 90.0
    }

    #[must_use]
    pub fn contains(&self, point: LatLng) -> bool {
        (self.south..=self.north).contains(&point.lat)
            && (self.west..=self.east).contains(&point.lng)
    }

    #[must_use]
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0)
    }
}

// --- View state ---

/// Last committed center and zoom. Never a mid-gesture value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub center: LatLng,
    pub zoom: f64,
}

/// Latest view reported by the widget, committed or not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedView {
    pub center: LatLng,
    pub zoom: f64,
    pub bounds: Bounds,
}

/// A full snapshot of the widget's projection, answered by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewMeasurement {
    pub center: LatLng,
    pub zoom: f64,
    pub bounds: Bounds,
    pub container: ContainerSize,
    /// Screen position of the requested probe coordinate.
    #[serde(default)]
    pub probe_point: Option<ScreenPoint>,
}

impl ViewMeasurement {
    #[must_use]
    pub fn observed(&self) -> ObservedView {
        ObservedView {
            center: self.center,
            zoom: self.zoom,
            bounds: self.bounds,
        }
    }
}

/// A click point converted to a coordinate and back to a screen point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRoundTrip {
    pub coordinate: LatLng,
    pub point: ScreenPoint,
    pub container: ContainerSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExternalUpdate {
    pub center: LatLng,
    pub zoom: f64,
    /// Shell time of the request, absent for moves the core starts itself.
    pub issued_at: Option<UnixTimeMs>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EventState {
    pub is_programmatic_move: bool,
    pub last_external_update: Option<ExternalUpdate>,
}

// --- Markers ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerCategory {
    Summit,
    Park,
}

impl MarkerCategory {
    pub const ALL: [Self; 2] = [Self::Summit, Self::Park];
}

impl fmt::Display for MarkerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Summit => f.write_str("summit"),
            Self::Park => f.write_str("park"),
        }
    }
}

pub trait Marker {
    const CATEGORY: MarkerCategory;

    /// Stable key of the entry. Entries without one are not kept.
    fn code(&self) -> Option<&MarkerCode>;
    fn position(&self) -> LatLng;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summit {
    pub code: MarkerCode,
    pub name: String,
    #[serde(default)]
    pub name_local: Option<String>,
    pub position: LatLng,
    #[serde(default)]
    pub altitude_m: Option<f64>,
    #[serde(default)]
    pub points: Option<u32>,
    #[serde(default)]
    pub activation_count: u32,
}

impl Marker for Summit {
    const CATEGORY: MarkerCategory = MarkerCategory::Summit;

    fn code(&self) -> Option<&MarkerCode> {
        Some(&self.code)
    }
    fn position(&self) -> LatLng {
        self.position
    }
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Park {
    #[serde(default)]
    pub pota_code: Option<MarkerCode>,
    #[serde(default)]
    pub wwff_code: Option<MarkerCode>,
    pub name: String,
    pub position: LatLng,
    #[serde(default)]
    pub activation_count: u32,
}

impl Marker for Park {
    const CATEGORY: MarkerCategory = MarkerCategory::Park;

    fn code(&self) -> Option<&MarkerCode> {
        self.pota_code.as_ref().or(self.wwff_code.as_ref())
    }
    fn position(&self) -> LatLng {
        self.position
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// Markers of one category keyed by code. Only ever replaced wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSet<T> {
    entries: Vec<T>,
}

impl<T> Default for MarkerSet<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Marker> MarkerSet<T> {
    /// Keeps the first entry per code and drops entries with no code or an
    /// unusable position.
    pub fn from_entries(entries: impl IntoIterator<Item = T>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|m| m.position().is_valid())
            .filter(|m| m.code().is_some_and(|code| seen.insert(code.clone())))
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn get(&self, code: &MarkerCode) -> Option<&T> {
        self.entries.iter().find(|m| m.code() == Some(code))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }
}

// --- Enrichment payloads ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCandidate {
    pub code: MarkerCode,
    pub name: String,
    pub position: LatLng,
    #[serde(default)]
    pub category: Option<MarkerCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDetail {
    pub code: MarkerCode,
    pub name: String,
    #[serde(default)]
    pub name_local: Option<String>,
    #[serde(default)]
    pub altitude_m: Option<f64>,
    #[serde(default)]
    pub points: Option<u32>,
    #[serde(default)]
    pub activation_count: Option<u32>,
    #[serde(default)]
    pub last_activation: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub maidenhead: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeocodeStatus {
    Ok,
    #[serde(alias = "OUTSIDE_JA")]
    OutsideCoverage,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub status: GeocodeStatus,
    #[serde(default)]
    pub prefecture: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub jcc_code: Option<String>,
    #[serde(default)]
    pub jcc_text: Option<String>,
    #[serde(default)]
    pub jcg_code: Option<String>,
    #[serde(default)]
    pub jcg_text: Option<String>,
    #[serde(default)]
    pub maidenhead: Option<String>,
    #[serde(default)]
    pub elevation_m: Option<f64>,
    #[serde(default)]
    pub elevation_source: Option<String>,
}

impl GeocodeResult {
    /// Whether the payload is worth showing in a popup.
    #[must_use]
    pub fn is_displayable(&self) -> bool {
        self.status == GeocodeStatus::Ok && (self.municipality.is_some() || self.address.is_some())
    }
}

// --- Preferences ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub show_summits: bool,
    pub show_pota: bool,
    pub show_wwff: bool,
    /// At or above this zoom, queries drop the elevation and area floors.
    pub zoom_threshold: f64,
    pub show_activation_log: bool,
    pub log_as_activator: bool,
    pub activator_log_id: Option<String>,
    pub hunter_log_id: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            show_summits: true,
            show_pota: true,
            show_wwff: true,
            zoom_threshold: 12.0,
            show_activation_log: false,
            log_as_activator: false,
            activator_log_id: None,
            hunter_log_id: None,
        }
    }
}

impl Preferences {
    #[must_use]
    pub fn shows(&self, category: MarkerCategory) -> bool {
        match category {
            MarkerCategory::Summit => self.show_summits,
            MarkerCategory::Park => self.show_pota || self.show_wwff,
        }
    }

    #[must_use]
    pub fn keeps_park(&self, park: &Park) -> bool {
        (self.show_pota && park.pota_code.is_some()) || (self.show_wwff && park.wwff_code.is_some())
    }

    #[must_use]
    pub fn log_id(&self) -> Option<&str> {
        if !self.show_activation_log {
            return None;
        }
        if self.log_as_activator {
            self.activator_log_id.as_deref()
        } else {
            self.hunter_log_id.as_deref()
        }
    }
}
