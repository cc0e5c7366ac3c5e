//! Runtime configuration for the matchers, the tracker and the dispatcher.
//!
//! Loading is left to the embedding service; these structs only carry
//! defaults and validation. `#[serde(default)]` lets a partial document
//! override individual fields.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for the ProximityAlertEngine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Outer pre-filter radius; officers beyond it skip angle math (default: 1000 m)
    pub scan_radius_m: f64,

    /// Inner radius inside which alerts may fire (default: 500 m)
    pub alert_radius_m: f64,

    /// Below this distance the approach test is skipped (default: 100 m)
    pub close_range_m: f64,

    /// Max angular difference for "approaching" (default: 45°)
    pub approach_angle_deg: f64,

    /// Speed floor for ETA so stationary officers get a finite ETA (default: 5 m/s)
    pub eta_floor_speed_mps: f64,

    /// Per-(officer, plate) suppression window; zero disables it (default: 0 s)
    #[serde(with = "duration_secs")]
    pub alert_cooldown: Duration,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            scan_radius_m: 1000.0,
            alert_radius_m: 500.0,
            close_range_m: 100.0,
            approach_angle_deg: 45.0,
            eta_floor_speed_mps: 5.0,
            alert_cooldown: Duration::ZERO,
        }
    }
}

impl ProximityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("scan_radius_m", self.scan_radius_m)?;
        positive("alert_radius_m", self.alert_radius_m)?;
        positive("eta_floor_speed_mps", self.eta_floor_speed_mps)?;
        if !self.close_range_m.is_finite() || self.close_range_m < 0.0 {
            return Err(ConfigError::NotPositive {
                field: "close_range_m",
                value: self.close_range_m,
            });
        }
        if self.alert_radius_m > self.scan_radius_m {
            return Err(ConfigError::RadiusOrder {
                alert: self.alert_radius_m,
                scan: self.scan_radius_m,
            });
        }
        if !(self.approach_angle_deg > 0.0 && self.approach_angle_deg <= 180.0) {
            return Err(ConfigError::ApproachAngle(self.approach_angle_deg));
        }
        Ok(())
    }
}

/// Configuration for the ReIdentificationTracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReIdConfig {
    /// Idle gap after which a plate starts a new session (default: 30 min)
    #[serde(with = "duration_secs")]
    pub session_window: Duration,

    /// Distinct cameras required before path updates are broadcast (default: 2)
    pub min_cameras_for_path: usize,
}

impl Default for ReIdConfig {
    fn default() -> Self {
        Self {
            session_window: Duration::from_secs(30 * 60),
            min_cameras_for_path: 2,
        }
    }
}

impl ReIdConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_window.is_zero() {
            return Err(ConfigError::Zero("session_window"));
        }
        if self.min_cameras_for_path == 0 {
            return Err(ConfigError::Zero("min_cameras_for_path"));
        }
        Ok(())
    }
}

/// Configuration for the EventDispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Capacity of the worker -> dispatch loop handoff queue (default: 1024)
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { queue_capacity: 1024 }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue_capacity"));
        }
        Ok(())
    }
}

/// Aggregate configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterdictConfig {
    pub proximity: ProximityConfig,
    pub reid: ReIdConfig,
    pub dispatch: DispatchConfig,
}

impl InterdictConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.proximity.validate()?;
        self.reid.validate()?;
        self.dispatch.validate()
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

/// Durations as whole seconds on the wire.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
