use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use super::ServiceError;
use crate::loader::BoundsQuery;
use crate::model::{MarkerCategory, MarkerCode, Park, ReferenceCandidate, ReferenceDetail, Summit};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", content = "data")]
pub enum MarkerOperation {
    /// Markers of `query.ticket.category` inside the bounds.
    SearchInBounds(BoundsQuery),
    /// Fast lookup: coordinates and name only.
    SearchReference { code: MarkerCode },
    /// Slow lookup: full detail for a popup.
    SearchFull { code: MarkerCode },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "category", content = "markers")]
pub enum MarkerBatch {
    Summits(Vec<Summit>),
    Parks(Vec<Park>),
}

impl MarkerBatch {
    #[must_use]
    pub const fn category(&self) -> MarkerCategory {
        match self {
            Self::Summits(_) => MarkerCategory::Summit,
            Self::Parks(_) => MarkerCategory::Park,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Summits(s) => s.len(),
            Self::Parks(p) => p.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum MarkerOutput {
    Batch(MarkerBatch),
    Candidate(ReferenceCandidate),
    Detail(ReferenceDetail),
}

pub type MarkerResult = Result<MarkerOutput, ServiceError>;

impl Operation for MarkerOperation {
    type Output = MarkerResult;
}

pub struct Markers<Ev> {
    context: CapabilityContext<MarkerOperation, Ev>,
}

impl<Ev> Capability<Ev> for Markers<Ev> {
    type Operation = MarkerOperation;
    type MappedSelf<MappedEv> = Markers<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Markers::new(self.context.map_event(f))
    }
}

impl<Ev> Markers<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<MarkerOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn search_in_bounds<F>(&self, query: BoundsQuery, make_event: F)
    where
        F: FnOnce(Result<MarkerBatch, ServiceError>) -> Ev + Send + 'static,
    {
        let expected = query.ticket.category;
        let pick = move |output: MarkerOutput| match output {
            MarkerOutput::Batch(batch) if batch.category() == expected => Ok(batch),
            other => Err(ServiceError::unexpected("SearchInBounds", &other)),
        };
        self.request(MarkerOperation::SearchInBounds(query), pick, make_event);
    }

    pub fn search_reference<F>(&self, code: MarkerCode, make_event: F)
    where
        F: FnOnce(Result<ReferenceCandidate, ServiceError>) -> Ev + Send + 'static,
    {
        let pick = |output: MarkerOutput| match output {
            MarkerOutput::Candidate(candidate) => Ok(candidate),
            other => Err(ServiceError::unexpected("SearchReference", &other)),
        };
        self.request(MarkerOperation::SearchReference { code }, pick, make_event);
    }

    pub fn search_full<F>(&self, code: MarkerCode, make_event: F)
    where
        F: FnOnce(Result<ReferenceDetail, ServiceError>) -> Ev + Send + 'static,
    {
        let pick = |output: MarkerOutput| match output {
            MarkerOutput::Detail(detail) => Ok(detail),
            other => Err(ServiceError::unexpected("SearchFull", &other)),
        };
        self.request(MarkerOperation::SearchFull { code }, pick, make_event);
    }

    fn request<T, P, F>(&self, operation: MarkerOperation, pick: P, make_event: F)
    where
        T: Send + 'static,
        P: FnOnce(MarkerOutput) -> Result<T, ServiceError> + Send + 'static,
        F: FnOnce(Result<T, ServiceError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx.request_from_shell(operation).await.and_then(pick);
            ctx.update_app(make_event(result));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LatLng;

    #[test]
    fn test_batch_category_and_len() {
        let batch = MarkerBatch::Summits(vec![Summit {
            code: MarkerCode::new("JA/NI-001"),
            name: "Tanigawadake".into(),
            name_local: None,
            position: LatLng::new(36.837, 138.930),
            altitude_m: Some(1_977.0),
            points: Some(8),
            activation_count: 12,
        }]);
        assert_eq!(batch.category(), MarkerCategory::Summit);
        assert_eq!(batch.len(), 1);
        assert!(MarkerBatch::Parks(Vec::new()).is_empty());
    }

    #[test]
    fn test_result_deserializes_from_shell_json() {
        let json = r#"{"Ok":{"type":"Batch","data":{"category":"Parks","markers":[
            {"pota_code":"JA-0001","name":"Shiretoko","position":{"lat":44.0,"lng":145.0}}
        ]}}}"#;
        let result: MarkerResult = serde_json::from_str(json).unwrap();
        match result {
            Ok(MarkerOutput::Batch(MarkerBatch::Parks(parks))) => {
                assert_eq!(parks[0].pota_code, Some(MarkerCode::new("JA-0001")));
                assert_eq!(parks[0].wwff_code, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        let err: MarkerResult =
            serde_json::from_str(r#"{"Err":{"NotFound":"JA/XX-999"}}"#).unwrap();
        assert_eq!(err, Err(ServiceError::NotFound("JA/XX-999".into())));
    }
}
