mod geocoder;
mod map_view;
mod markers;
mod timer;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::geocoder::{GeocodeOperation, Geocoder};
pub use self::map_view::{MapView, MapViewOperation, MapViewOutput};
pub use self::markers::{MarkerBatch, MarkerOperation, MarkerOutput, MarkerResult, Markers};
pub use self::timer::{Timer, TimerOperation, TimerOutput};

// Render and key-value come straight from Crux.
pub use crux_core::render::Render;
pub use crux_kv::KeyValue;

use crate::event::Event;
// The Effect derive refers to `App` by name.
#[allow(unused_imports)]
use crate::App;

/// Failure reported by the marker or geocoding services. Never fatal: the
/// engine degrades to missing content.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceError {
    #[error("network error: {message}")]
    Network {
        message: String,
        #[serde(default)]
        is_retryable: bool,
    },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("reference not found: {0}")]
    NotFound(String),

    #[error("position outside service coverage")]
    OutsideCoverage,

    #[error("operation timed out")]
    Timeout,

    #[error("unexpected output: {0}")]
    UnexpectedOutput(String),
}

impl ServiceError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { is_retryable, .. } => *is_retryable,
            Self::Timeout => true,
            Self::Malformed(_)
            | Self::NotFound(_)
            | Self::OutsideCoverage
            | Self::UnexpectedOutput(_) => false,
        }
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            is_retryable: true,
        }
    }

    pub(crate) fn unexpected(operation: &str, output: &impl fmt::Debug) -> Self {
        Self::UnexpectedOutput(format!("{operation} answered with {output:?}"))
    }
}

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub map_view: MapView<Event>,
    pub timer: Timer<Event>,
    pub markers: Markers<Event>,
    pub geocoder: Geocoder<Event>,
    pub kv: KeyValue<Event>,
}
