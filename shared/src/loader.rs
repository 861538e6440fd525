//! Bounds-driven marker loading.
//!
//! Each category tracks its own requests. A load is skipped when the
//! quantized bounds signature was already loaded or is already outstanding,
//! and a response is applied only when its ticket is still the latest one
//! requested for that category.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::debounce::{TimerId, TimerSlot, TrailingDebounce};
use crate::followup::{Followup, Followups};
use crate::model::{Bounds, MarkerCategory, Preferences};

/// Bounds rounded to a fixed number of decimals plus zoom rounded to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundsSignature {
    south: i64,
    west: i64,
    north: i64,
    east: i64,
    zoom_tenths: i64,
    precision: u32,
}

#[allow(clippy::cast_possible_truncation)]
fn quantize(value: f64, scale: f64) -> i64 {
    (value * scale).round() as i64
}

impl BoundsSignature {
    #[must_use]
    pub fn new(bounds: &Bounds, zoom: f64, precision: u32) -> Self {
        let scale = 10f64.powi(i32::try_from(precision).unwrap_or(6));
        Self {
            south: quantize(bounds.south, scale),
            west: quantize(bounds.west, scale),
            north: quantize(bounds.north, scale),
            east: quantize(bounds.east, scale),
            zoom_tenths: quantize(zoom, 10.0),
            precision,
        }
    }
}

impl fmt::Display for BoundsSignature {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10f64.powi(i32::try_from(self.precision).unwrap_or(6));
        let p = self.precision as usize;
        write!(
            f,
            "{:.p$},{:.p$},{:.p$},{:.p$},{:.1}",
            self.south as f64 / scale,
            self.west as f64 / scale,
            self.north as f64 / scale,
            self.east as f64 / scale,
            self.zoom_tenths as f64 / 10.0,
        )
    }
}

/// Floors sent with a bounds query so that wide views stay sparse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomFilter {
    pub min_elevation_m: u32,
    pub min_area: u32,
}

#[must_use]
pub fn zoom_filter(zoom: f64, zoom_threshold: f64) -> ZoomFilter {
    let (min_elevation_m, min_area) = if zoom >= zoom_threshold {
        (0, 0)
    } else if zoom > 9.0 {
        (800, 1)
    } else if zoom > 8.0 {
        (1_000, 10)
    } else if zoom > 6.0 {
        (1_500, 20)
    } else {
        (2_000, 30)
    };
    ZoomFilter {
        min_elevation_m,
        min_area,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadTicket {
    pub category: MarkerCategory,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsQuery {
    pub ticket: LoadTicket,
    pub bounds: Bounds,
    pub zoom: f64,
    pub filter: ZoomFilter,
    #[serde(default)]
    pub log_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDecision {
    Issued(LoadTicket),
    AlreadyLoaded,
    InFlight,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Current and successful: replace the category wholesale.
    Apply,
    /// Current but failed: the category becomes empty.
    Failed,
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CategoryLoads {
    latest: Option<u64>,
    outstanding: Vec<(u64, BoundsSignature)>,
    last_completed: Option<BoundsSignature>,
}

impl CategoryLoads {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLoader {
    summits: CategoryLoads,
    parks: CategoryLoads,
    next_seq: u64,
    debounce: TrailingDebounce,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self {
            summits: CategoryLoads::default(),
            parks: CategoryLoads::default(),
            next_seq: 0,
            debounce: TrailingDebounce::new(TimerSlot::BoundsLoad),
        }
    }
}

impl DataLoader {
    fn loads_mut(&mut self, category: MarkerCategory) -> &mut CategoryLoads {
        match category {
            MarkerCategory::Summit => &mut self.summits,
            MarkerCategory::Park => &mut self.parks,
        }
    }

    /// Arms the trailing load debounce. The fired timer reads live bounds.
    pub fn schedule(&mut self, delay_ms: u64, out: &mut Followups) -> TimerId {
        self.debounce.touch(delay_ms, out)
    }

    pub fn fire(&mut self, id: TimerId) -> bool {
        self.debounce.fire(id)
    }

    pub fn load_for_bounds(
        &mut self,
        bounds: &Bounds,
        zoom: f64,
        preferences: &Preferences,
        precision: u32,
        out: &mut Followups,
    ) -> Vec<(MarkerCategory, LoadDecision)> {
        let signature = BoundsSignature::new(bounds, zoom, precision);
        let filter = zoom_filter(zoom, preferences.zoom_threshold);
        MarkerCategory::ALL
            .into_iter()
            .map(|category| {
                let decision = if preferences.shows(category) {
                    self.request(category, signature, bounds, zoom, filter, preferences, out)
                } else {
                    self.loads_mut(category).reset();
                    LoadDecision::Disabled
                };
                (category, decision)
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn request(
        &mut self,
        category: MarkerCategory,
        signature: BoundsSignature,
        bounds: &Bounds,
        zoom: f64,
        filter: ZoomFilter,
        preferences: &Preferences,
        out: &mut Followups,
    ) -> LoadDecision {
        let loads = self.loads_mut(category);
        if loads.last_completed == Some(signature) {
            debug!(%category, %signature, "bounds already loaded, skipping");
            return LoadDecision::AlreadyLoaded;
        }
        if let Some(&(seq, _)) = loads.outstanding.iter().find(|(_, s)| *s == signature) {
            debug!(%category, %signature, seq, "same bounds already in flight");
            loads.latest = Some(seq);
            return LoadDecision::InFlight;
        }

        self.next_seq += 1;
        let ticket = LoadTicket {
            category,
            seq: self.next_seq,
        };
        let loads = self.loads_mut(category);
        loads.outstanding.push((ticket.seq, signature));
        loads.latest = Some(ticket.seq);
        info!(%category, %signature, seq = ticket.seq, "loading markers");
        out.push(Followup::SearchInBounds(BoundsQuery {
            ticket,
            bounds: *bounds,
            zoom,
            filter,
            log_id: preferences.log_id().map(str::to_owned),
        }));
        LoadDecision::Issued(ticket)
    }

    /// Settles a response. Success records the signature as completed;
    /// failure leaves it unrecorded so the same bounds can be retried.
    pub fn accept(&mut self, ticket: &LoadTicket, succeeded: bool) -> Acceptance {
        let loads = self.loads_mut(ticket.category);
        let Some(index) = loads.outstanding.iter().position(|(seq, _)| *seq == ticket.seq) else {
            debug!(category = %ticket.category, seq = ticket.seq, "dropping unknown load response");
            return Acceptance::Stale;
        };
        let (_, signature) = loads.outstanding.remove(index);
        if loads.latest != Some(ticket.seq) {
            debug!(category = %ticket.category, %signature, "dropping superseded load response");
            return Acceptance::Stale;
        }
        if succeeded {
            loads.last_completed = Some(signature);
            Acceptance::Apply
        } else {
            Acceptance::Failed
        }
    }

    /// Forgets every completed and outstanding load so the next call
    /// reloads, e.g. after the filters changed.
    ///
    /// Duplicate suppression is per query, not per bounds: a request still in
    /// flight was issued with the old filters, so re-requesting the same
    /// bounds is a different query and its late response is dropped by the
    /// ticket check.
    pub fn invalidate(&mut self) {
        self.summits.reset();
        self.parks.reset();
    }

    #[must_use]
    pub fn last_completed(&self, category: MarkerCategory) -> Option<BoundsSignature> {
        match category {
            MarkerCategory::Summit => self.summits.last_completed,
            MarkerCategory::Park => self.parks.last_completed,
        }
    }

    #[must_use]
    pub fn has_outstanding(&self) -> bool {
        !self.summits.outstanding.is_empty() || !self.parks.outstanding.is_empty()
    }
}
