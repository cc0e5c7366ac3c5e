//! Error taxonomy for the Interdict core.

use thiserror::Error;

/// Malformed input, rejected before any component runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Latitude out of range: {0}")]
    InvalidLatitude(f64),

    #[error("Longitude out of range: {0}")]
    InvalidLongitude(f64),

    #[error("Heading must be finite, got {0}")]
    InvalidHeading(f64),

    #[error("Speed must be finite and non-negative, got {0}")]
    InvalidSpeed(f64),

    #[error("Confidence must be within [0, 1], got {0}")]
    InvalidConfidence(f64),

    #[error("Timestamp out of range: {0} ms")]
    InvalidTimestamp(i64),

    #[error("Empty {0}")]
    Empty(&'static str),
}

/// Failures reported by a `SightingStore`.
///
/// These are fatal only for the event that triggered them.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("alert_radius_m ({alert}) exceeds scan_radius_m ({scan})")]
    RadiusOrder { alert: f64, scan: f64 },

    #[error("approach_angle_deg must be within (0, 180], got {0}")]
    ApproachAngle(f64),

    #[error("{0} must be non-zero")]
    Zero(&'static str),
}

/// Any error a core operation can return to its caller.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
