//! The single active-popup slot.
//!
//! Replacement is atomic: the slot holds `Option<PopupInfo>`, so two popups
//! can never coexist. Each replacement bumps a generation, and enrichment
//! responses are merged only when their ticket still names the active popup.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capabilities::ServiceError;
use crate::followup::{Followup, Followups};
use crate::model::{
    Bounds, GeocodeResult, LatLng, MarkerCategory, MarkerCode, ReferenceDetail,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum PopupIdentity {
    Marker(MarkerCode),
    Gps,
    Geocode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Enrichment<T> {
    Pending,
    Ready(T),
    Unavailable,
}

impl<T> Enrichment<T> {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    #[must_use]
    pub const fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    fn from_result(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(e) => {
                debug!(error = %e, "enrichment unavailable");
                Self::Unavailable
            }
        }
    }
}

/// What the popup can show before any enrichment arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBrief {
    pub code: MarkerCode,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<MarkerCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PopupContent {
    Reference {
        brief: ReferenceBrief,
        detail: Enrichment<ReferenceDetail>,
    },
    Gps,
    Geocode {
        address: Enrichment<GeocodeResult>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopupInfo {
    pub position: LatLng,
    pub identity: PopupIdentity,
    pub content: PopupContent,
    generation: u64,
}

impl PopupInfo {
    /// Geocode popups stay hidden until a displayable address arrives, so
    /// an empty popup is never rendered.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        match &self.content {
            PopupContent::Geocode { address } => {
                address.ready().is_some_and(GeocodeResult::is_displayable)
            }
            PopupContent::Reference { .. } | PopupContent::Gps => true,
        }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    fn ticket(&self) -> EnrichmentTicket {
        EnrichmentTicket {
            generation: self.generation,
            identity: self.identity.clone(),
        }
    }
}

/// A request to occupy the popup slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupRequest {
    pub position: LatLng,
    pub identity: PopupIdentity,
    pub content: PopupContent,
}

impl PopupRequest {
    #[must_use]
    pub fn marker(position: LatLng, brief: ReferenceBrief) -> Self {
        Self {
            position,
            identity: PopupIdentity::Marker(brief.code.clone()),
            content: PopupContent::Reference {
                brief,
                detail: Enrichment::Pending,
            },
        }
    }

    #[must_use]
    pub const fn gps(position: LatLng) -> Self {
        Self {
            position,
            identity: PopupIdentity::Gps,
            content: PopupContent::Gps,
        }
    }

    /// A cached address skips the reverse-geocode round trip.
    #[must_use]
    pub fn geocode(position: LatLng, cached: Option<GeocodeResult>) -> Self {
        Self {
            position,
            identity: PopupIdentity::Geocode,
            content: PopupContent::Geocode {
                address: cached.map_or(Enrichment::Pending, Enrichment::Ready),
            },
        }
    }
}

/// Names the popup an enrichment request was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnrichmentTicket {
    pub generation: u64,
    pub identity: PopupIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupChange {
    Replaced(EnrichmentTicket),
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    Applied,
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopupManager {
    active: Option<PopupInfo>,
    generation: u64,
}

impl PopupManager {
    #[must_use]
    pub const fn active(&self) -> Option<&PopupInfo> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn visible(&self) -> Option<&PopupInfo> {
        self.active.as_ref().filter(|p| p.is_visible())
    }

    /// Replaces the active popup. Repeating the same identity at the same
    /// position is a no-op, so pending enrichment is not requested twice.
    pub fn set_unique_popup(&mut self, request: PopupRequest, out: &mut Followups) -> PopupChange {
        if let Some(active) = &self.active {
            if active.identity == request.identity && active.position == request.position {
                debug!(identity = ?active.identity, "popup already active");
                return PopupChange::Unchanged;
            }
        }

        self.generation += 1;
        let popup = PopupInfo {
            position: request.position,
            identity: request.identity,
            content: request.content,
            generation: self.generation,
        };
        let ticket = popup.ticket();
        match &popup.content {
            PopupContent::Reference { brief, detail } if detail.is_pending() => {
                out.push(Followup::SearchFull {
                    ticket: ticket.clone(),
                    code: brief.code.clone(),
                });
            }
            PopupContent::Geocode { address } if address.is_pending() => {
                out.push(Followup::ReverseGeocode {
                    ticket: ticket.clone(),
                    position: popup.position,
                });
            }
            _ => {}
        }
        if let Some(previous) = self.active.replace(popup) {
            debug!(previous = ?previous.identity, next = ?ticket.identity, "popup replaced");
        }
        PopupChange::Replaced(ticket)
    }

    /// Explicit user close. The only way the slot is emptied.
    pub fn clear_popup(&mut self) -> Option<PopupInfo> {
        let cleared = self.active.take();
        if let Some(popup) = &cleared {
            info!(identity = ?popup.identity, "popup closed by user");
        }
        cleared
    }

    fn current_for(&mut self, ticket: &EnrichmentTicket) -> Option<&mut PopupInfo> {
        let popup = self
            .active
            .as_mut()
            .filter(|p| p.generation == ticket.generation && p.identity == ticket.identity);
        if popup.is_none() {
            debug!(identity = ?ticket.identity, generation = ticket.generation, "dropping stale enrichment");
        }
        popup
    }

    pub fn apply_detail(
        &mut self,
        ticket: &EnrichmentTicket,
        result: Result<ReferenceDetail, ServiceError>,
    ) -> EnrichmentOutcome {
        match self.current_for(ticket).map(|p| &mut p.content) {
            Some(PopupContent::Reference { detail, .. }) => {
                *detail = Enrichment::from_result(result);
                EnrichmentOutcome::Applied
            }
            _ => EnrichmentOutcome::Stale,
        }
    }

    pub fn apply_geocode(
        &mut self,
        ticket: &EnrichmentTicket,
        result: Result<GeocodeResult, ServiceError>,
    ) -> EnrichmentOutcome {
        match self.current_for(ticket).map(|p| &mut p.content) {
            Some(PopupContent::Geocode { address }) => {
                *address = Enrichment::from_result(result);
                EnrichmentOutcome::Applied
            }
            _ => EnrichmentOutcome::Stale,
        }
    }

    /// Diagnostics only. Leaving the viewport never closes the popup.
    pub fn log_containment(&self, bounds: &Bounds) {
        if let Some(popup) = &self.active {
            debug!(
                identity = ?popup.identity,
                inside = bounds.contains(popup.position),
                "popup containment"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeocodeStatus;

    fn brief(code: &str) -> ReferenceBrief {
        ReferenceBrief {
            code: MarkerCode::new(code),
            name: Some(format!("Summit {code}")),
            category: Some(MarkerCategory::Summit),
        }
    }

    fn detail(code: &str) -> ReferenceDetail {
        ReferenceDetail {
            code: MarkerCode::new(code),
            name: format!("Summit {code}"),
            name_local: None,
            altitude_m: Some(1_200.0),
            points: Some(4),
            activation_count: Some(3),
            last_activation: None,
            locality: None,
            maidenhead: None,
        }
    }

    fn address() -> GeocodeResult {
        GeocodeResult {
            status: GeocodeStatus::Ok,
            prefecture: Some("Shizuoka".into()),
            municipality: Some("Fuji".into()),
            address: None,
            jcc_code: None,
            jcc_text: None,
            jcg_code: None,
            jcg_text: None,
            maidenhead: Some("PM95".into()),
            elevation_m: Some(42.0),
            elevation_source: None,
        }
    }

    fn replaced(change: PopupChange) -> EnrichmentTicket {
        match change {
            PopupChange::Replaced(ticket) => ticket,
            PopupChange::Unchanged => panic!("expected a replacement"),
        }
    }

    #[test]
    fn test_marker_popup_requests_detail_and_is_visible() {
        let mut popups = PopupManager::default();
        let mut out = Vec::new();
        let ticket = replaced(popups.set_unique_popup(
            PopupRequest::marker(LatLng::new(35.0, 139.0), brief("A-001")),
            &mut out,
        ));
        assert_eq!(
            out,
            vec![Followup::SearchFull { ticket, code: MarkerCode::new("A-001") }]
        );
        assert!(popups.visible().is_some());
    }

    #[test]
    fn test_same_identity_and_position_is_idempotent() {
        let mut popups = PopupManager::default();
        let mut out = Vec::new();
        let request = PopupRequest::marker(LatLng::new(35.0, 139.0), brief("A-001"));
        popups.set_unique_popup(request.clone(), &mut out);
        let before = popups.active().cloned();
        out.clear();

        assert_eq!(popups.set_unique_popup(request, &mut out), PopupChange::Unchanged);
        assert!(out.is_empty());
        assert_eq!(popups.active().cloned(), before);
    }

    #[test]
    fn test_late_detail_for_superseded_marker_is_dropped() {
        let mut popups = PopupManager::default();
        let mut out = Vec::new();
        let first = replaced(popups.set_unique_popup(
            PopupRequest::marker(LatLng::new(35.0, 139.0), brief("A-001")),
            &mut out,
        ));
        let second = replaced(popups.set_unique_popup(
            PopupRequest::marker(LatLng::new(35.1, 139.1), brief("A-002")),
            &mut out,
        ));

        assert_eq!(popups.apply_detail(&first, Ok(detail("A-001"))), EnrichmentOutcome::Stale);
        assert_eq!(popups.apply_detail(&second, Ok(detail("A-002"))), EnrichmentOutcome::Applied);

        let active = popups.active().unwrap();
        assert_eq!(active.identity, PopupIdentity::Marker(MarkerCode::new("A-002")));
        match &active.content {
            PopupContent::Reference { detail, .. } => {
                assert_eq!(detail.ready().map(|d| d.code.as_str()), Some("A-002"));
            }
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[test]
    fn test_geocode_popup_hidden_until_address_resolves() {
        let mut popups = PopupManager::default();
        let mut out = Vec::new();
        let ticket = replaced(popups.set_unique_popup(
            PopupRequest::geocode(LatLng::new(35.0, 139.0), None),
            &mut out,
        ));
        assert!(popups.active().is_some());
        assert!(popups.visible().is_none());

        popups.apply_geocode(&ticket, Ok(address()));
        assert!(popups.visible().is_some());
    }

    #[test]
    fn test_geocode_error_never_shows_popup() {
        let mut popups = PopupManager::default();
        let mut out = Vec::new();
        let ticket = replaced(popups.set_unique_popup(
            PopupRequest::geocode(LatLng::new(35.0, 139.0), None),
            &mut out,
        ));
        popups.apply_geocode(&ticket, Err(ServiceError::network("offline")));
        assert!(popups.visible().is_none());
    }

    #[test]
    fn test_geocode_for_earlier_background_click_is_stale() {
        let mut popups = PopupManager::default();
        let mut out = Vec::new();
        let first = replaced(popups.set_unique_popup(
            PopupRequest::geocode(LatLng::new(35.0, 139.0), None),
            &mut out,
        ));
        popups.set_unique_popup(PopupRequest::geocode(LatLng::new(36.0, 140.0), None), &mut out);

        assert_eq!(popups.apply_geocode(&first, Ok(address())), EnrichmentOutcome::Stale);
        assert!(popups.visible().is_none());
    }

    #[test]
    fn test_cached_geocode_skips_request() {
        let mut popups = PopupManager::default();
        let mut out = Vec::new();
        popups.set_unique_popup(PopupRequest::geocode(LatLng::new(35.0, 139.0), Some(address())), &mut out);
        assert!(out.is_empty());
        assert!(popups.visible().is_some());
    }

    #[test]
    fn test_clear_removes_and_late_enrichment_is_stale() {
        let mut popups = PopupManager::default();
        let mut out = Vec::new();
        let ticket = replaced(popups.set_unique_popup(PopupRequest::gps(LatLng::new(35.0, 139.0)), &mut out));
        assert!(popups.clear_popup().is_some());
        assert!(popups.active().is_none());
        assert_eq!(popups.apply_detail(&ticket, Ok(detail("A-001"))), EnrichmentOutcome::Stale);
        assert!(popups.clear_popup().is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Marker(u8),
            Gps,
            Geocode(u8),
            Clear,
            ResolveEarliest,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..3).prop_map(Op::Marker),
                Just(Op::Gps),
                (0u8..3).prop_map(Op::Geocode),
                Just(Op::Clear),
                Just(Op::ResolveEarliest),
            ]
        }

        proptest! {
            #[test]
            fn stale_tickets_never_change_active_popup(ops in proptest::collection::vec(op(), 1..40)) {
                let mut popups = PopupManager::default();
                let mut out = Vec::new();
                let mut tickets: Vec<EnrichmentTicket> = Vec::new();
                let mut expected: Option<PopupIdentity> = None;

                for op in ops {
                    match op {
                        Op::Marker(n) => {
                            let code = format!("A-00{n}");
                            let request = PopupRequest::marker(LatLng::new(35.0 + f64::from(n), 139.0), brief(&code));
                            expected = Some(request.identity.clone());
                            if let PopupChange::Replaced(t) = popups.set_unique_popup(request, &mut out) {
                                tickets.push(t);
                            }
                        }
                        Op::Gps => {
                            expected = Some(PopupIdentity::Gps);
                            if let PopupChange::Replaced(t) = popups.set_unique_popup(PopupRequest::gps(LatLng::new(34.0, 135.0)), &mut out) {
                                tickets.push(t);
                            }
                        }
                        Op::Geocode(n) => {
                            expected = Some(PopupIdentity::Geocode);
                            let request = PopupRequest::geocode(LatLng::new(33.0, 130.0 + f64::from(n)), None);
                            if let PopupChange::Replaced(t) = popups.set_unique_popup(request, &mut out) {
                                tickets.push(t);
                            }
                        }
                        Op::Clear => {
                            popups.clear_popup();
                            expected = None;
                        }
                        Op::ResolveEarliest => {
                            if tickets.is_empty() {
                                continue;
                            }
                            let ticket = tickets.remove(0);
                            let current = popups.active().map(PopupInfo::generation);
                            let before = popups.active().cloned();
                            let outcome = popups.apply_geocode(&ticket, Ok(address()));
                            if current != Some(ticket.generation) {
                                prop_assert_eq!(outcome, EnrichmentOutcome::Stale);
                                prop_assert_eq!(popups.active().cloned(), before);
                            }
                        }
                    }
                    prop_assert_eq!(popups.active().map(|p| p.identity.clone()), expected.clone());
                }
            }
        }
    }
}
