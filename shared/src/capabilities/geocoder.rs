use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use super::ServiceError;
use crate::model::{GeocodeResult, LatLng};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", content = "data")]
pub enum GeocodeOperation {
    ReverseGeocode { position: LatLng },
}

impl Operation for GeocodeOperation {
    type Output = Result<GeocodeResult, ServiceError>;
}

pub struct Geocoder<Ev> {
    context: CapabilityContext<GeocodeOperation, Ev>,
}

impl<Ev> Capability<Ev> for Geocoder<Ev> {
    type Operation = GeocodeOperation;
    type MappedSelf<MappedEv> = Geocoder<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Geocoder::new(self.context.map_event(f))
    }
}

impl<Ev> Geocoder<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<GeocodeOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn reverse_geocode<F>(&self, position: LatLng, make_event: F)
    where
        F: FnOnce(Result<GeocodeResult, ServiceError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx
                .request_from_shell(GeocodeOperation::ReverseGeocode { position })
                .await;
            ctx.update_app(make_event(result));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeocodeStatus;

    #[test]
    fn test_reverse_geocode_payload() {
        let json = r#"{"Ok":{"status":"OK","prefecture":"Tokyo","municipality":"Chiyoda",
            "jcc_code":"100101","maidenhead":"PM95vq","elevation_m":5.2}}"#;
        let result: Result<GeocodeResult, ServiceError> = serde_json::from_str(json).unwrap();
        let address = result.unwrap();
        assert_eq!(address.status, GeocodeStatus::Ok);
        assert!(address.is_displayable());
        assert_eq!(address.jcc_code.as_deref(), Some("100101"));
    }

    #[test]
    fn test_operation_serialization() {
        let op = GeocodeOperation::ReverseGeocode {
            position: LatLng::new(35.0, 139.0),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "ReverseGeocode");
        assert_eq!(json["data"]["position"]["lng"], 139.0);
    }
}
