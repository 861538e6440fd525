//! Map interaction synchronization core.
//!
//! Keeps the committed map view, the single popup slot and the visible
//! marker sets consistent while the shell reports widget events. All side
//! effects leave through Crux capabilities.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod cache;
pub mod capabilities;
pub mod config;
pub mod debounce;
pub mod event;
pub mod followup;
pub mod init_guard;
pub mod interaction;
pub mod loader;
pub mod model;
pub mod persist;
pub mod popup;
pub mod store;

pub use app::{App, PopupView, ViewModel};
pub use capabilities::{Capabilities, Effect, ServiceError};
pub use config::{ConfigError, EngineConfig, GateProfile};
pub use crux_core::{render::Render, App as CruxApp};
pub use event::{ClickTarget, Event};
pub use followup::{Followup, MeasurePurpose};
pub use model::{
    Bounds, ContainerSize, EventState, ExternalUpdate, GeocodeResult, GeocodeStatus, LatLng,
    MarkerCategory, MarkerCode, Park, Preferences, ProjectionRoundTrip, ScreenPoint, Summit,
    UnixTimeMs, ViewMeasurement, ViewState,
};
pub use popup::{PopupContent, PopupIdentity};
pub use store::MapStore;

/// The Crux model is the store itself.
pub type Model = MapStore;
