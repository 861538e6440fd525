use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{validate_zoom, LatLng};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Validation(String),

    #[error("config parse error: {0}")]
    Parse(String),
}

/// Debounce delay plus the change magnitudes that count as significant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateProfile {
    pub delay_ms: u64,
    pub center_threshold_deg: f64,
    pub zoom_threshold: f64,
}

impl GateProfile {
    pub const IDLE: Self = Self {
        delay_ms: 300,
        center_threshold_deg: 0.0001,
        zoom_threshold: 0.1,
    };

    pub const POPUP: Self = Self {
        delay_ms: 1_000,
        center_threshold_deg: 0.001,
        zoom_threshold: 0.5,
    };

    #[must_use]
    pub fn is_strictly_looser_than(&self, other: &Self) -> bool {
        self.delay_ms > other.delay_ms
            && self.center_threshold_deg > other.center_threshold_deg
            && self.zoom_threshold > other.zoom_threshold
    }

    #[must_use]
    pub fn center_changed(&self, from: &LatLng, to: &LatLng) -> bool {
        from.max_delta(to) > self.center_threshold_deg
    }

    #[must_use]
    pub fn zoom_changed(&self, from: f64, to: f64) -> bool {
        (from - to).abs() > self.zoom_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub idle_profile: GateProfile,
    pub popup_profile: GateProfile,
    pub programmatic_move_timeout_ms: u64,
    pub init_force_ready_ms: u64,
    pub init_poll_ms: u64,
    pub click_retry_ms: u64,
    pub panel_transition_ms: u64,
    pub panel_settle_margin_ms: u64,
    pub bounds_load_ms: u64,
    pub bounds_precision: u32,
    pub recenter_tolerance_deg: f64,
    pub reference_zoom: f64,
    pub geocode_cache_capacity: usize,
    pub default_center: LatLng,
    pub default_zoom: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_profile: GateProfile::IDLE,
            popup_profile: GateProfile::POPUP,
            programmatic_move_timeout_ms: 2_000,
            init_force_ready_ms: 5_000,
            init_poll_ms: 200,
            click_retry_ms: 500,
            panel_transition_ms: 300,
            panel_settle_margin_ms: 50,
            bounds_load_ms: 500,
            bounds_precision: 3,
            recenter_tolerance_deg: 0.0001,
            reference_zoom: 14.0,
            geocode_cache_capacity: 16,
            default_center: LatLng::new(37.514_444, 137.712_222),
            default_zoom: 6.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.popup_profile.is_strictly_looser_than(&self.idle_profile) {
            return Err(ConfigError::Validation(
                "popup_profile must have a larger delay and thresholds than idle_profile".into(),
            ));
        }
        if self.idle_profile.delay_ms == 0 || self.idle_profile.center_threshold_deg <= 0.0 {
            return Err(ConfigError::Validation(
                "idle_profile delay and threshold must be > 0".into(),
            ));
        }
        let timeouts = [
            ("programmatic_move_timeout_ms", self.programmatic_move_timeout_ms),
            ("init_force_ready_ms", self.init_force_ready_ms),
            ("init_poll_ms", self.init_poll_ms),
            ("click_retry_ms", self.click_retry_ms),
            ("bounds_load_ms", self.bounds_load_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Validation(format!("{name} must be > 0")));
        }
        if self.init_poll_ms >= self.init_force_ready_ms {
            return Err(ConfigError::Validation(
                "init_poll_ms must be shorter than init_force_ready_ms".into(),
            ));
        }
        if self.bounds_precision > 6 {
            return Err(ConfigError::Validation(
                "bounds_precision must be at most 6 decimals".into(),
            ));
        }
        if !(self.recenter_tolerance_deg.is_finite() && self.recenter_tolerance_deg > 0.0) {
            return Err(ConfigError::Validation(
                "recenter_tolerance_deg must be > 0".into(),
            ));
        }
        if self.geocode_cache_capacity == 0 {
            return Err(ConfigError::Validation(
                "geocode_cache_capacity must be > 0".into(),
            ));
        }
        if !self.default_center.is_valid() {
            return Err(ConfigError::Validation(format!(
                "default_center {} is not a valid coordinate",
                self.default_center
            )));
        }
        validate_zoom(self.default_zoom)
            .and(validate_zoom(self.reference_zoom))
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(())
    }

    /// The profile in force for the current popup state.
    #[must_use]
    pub const fn profile(&self, popup_active: bool) -> &GateProfile {
        if popup_active {
            &self.popup_profile
        } else {
            &self.idle_profile
        }
    }

    #[must_use]
    pub const fn panel_resize_delay_ms(&self) -> u64 {
        self.panel_transition_ms + self.panel_settle_margin_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_popup_profile_is_strictly_looser() {
        let config = EngineConfig::default();
        let idle = config.profile(false);
        let popup = config.profile(true);
        assert!(popup.delay_ms > idle.delay_ms);
        assert!(popup.center_threshold_deg > idle.center_threshold_deg);
        assert!(popup.zoom_threshold > idle.zoom_threshold);
    }

    #[test]
    fn test_rejects_popup_profile_tighter_than_idle() {
        let config = EngineConfig {
            popup_profile: GateProfile::IDLE,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = EngineConfig {
            programmatic_move_timeout_ms: 0,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("programmatic_move_timeout_ms"));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = EngineConfig::from_json(r#"{"bounds_load_ms": 750}"#).unwrap();
        assert_eq!(config.bounds_load_ms, 750);
        assert_eq!(config.idle_profile, GateProfile::IDLE);
    }

    #[test]
    fn test_from_json_reports_parse_errors() {
        assert!(matches!(
            EngineConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_panel_resize_delay_exceeds_transition() {
        let config = EngineConfig::default();
        assert_eq!(config.panel_resize_delay_ms(), 350);
    }
}
