//! Boundary to the imperative map widget.

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::model::{LatLng, ProjectionRoundTrip, ScreenPoint, ViewMeasurement};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", content = "data")]
pub enum MapViewOperation {
    SetView { center: LatLng, zoom: f64 },
    /// Recompute the widget size, then answer with a fresh measurement.
    InvalidateSize,
    /// Current center, zoom, bounds and container size, plus the screen
    /// position of `probe`.
    Measure { probe: LatLng },
    /// Convert `point` to a coordinate and back to a screen point.
    RoundTrip { point: ScreenPoint },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum MapViewOutput {
    Done,
    Measured(ViewMeasurement),
    RoundTrip(ProjectionRoundTrip),
    /// The widget is not mounted or the conversion threw.
    Unavailable,
}

impl MapViewOutput {
    #[must_use]
    pub const fn measurement(&self) -> Option<ViewMeasurement> {
        match self {
            Self::Measured(m) => Some(*m),
            _ => None,
        }
    }

    #[must_use]
    pub const fn round_trip(&self) -> Option<ProjectionRoundTrip> {
        match self {
            Self::RoundTrip(rt) => Some(*rt),
            _ => None,
        }
    }
}

impl Operation for MapViewOperation {
    type Output = MapViewOutput;
}

pub struct MapView<Ev> {
    context: CapabilityContext<MapViewOperation, Ev>,
}

impl<Ev> Capability<Ev> for MapView<Ev> {
    type Operation = MapViewOperation;
    type MappedSelf<MappedEv> = MapView<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        MapView::new(self.context.map_event(f))
    }
}

impl<Ev> MapView<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<MapViewOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn set_view(&self, center: LatLng, zoom: f64) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.request_from_shell(MapViewOperation::SetView { center, zoom })
                .await;
        });
    }

    pub fn invalidate_size<F>(&self, make_event: F)
    where
        F: FnOnce(Option<ViewMeasurement>) -> Ev + Send + 'static,
    {
        self.measure_with(MapViewOperation::InvalidateSize, make_event);
    }

    pub fn measure<F>(&self, probe: LatLng, make_event: F)
    where
        F: FnOnce(Option<ViewMeasurement>) -> Ev + Send + 'static,
    {
        self.measure_with(MapViewOperation::Measure { probe }, make_event);
    }

    fn measure_with<F>(&self, operation: MapViewOperation, make_event: F)
    where
        F: FnOnce(Option<ViewMeasurement>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx.request_from_shell(operation).await;
            ctx.update_app(make_event(output.measurement()));
        });
    }

    pub fn round_trip<F>(&self, point: ScreenPoint, make_event: F)
    where
        F: FnOnce(Option<ProjectionRoundTrip>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(MapViewOperation::RoundTrip { point })
                .await;
            ctx.update_app(make_event(output.round_trip()));
        });
    }
}
