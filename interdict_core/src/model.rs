//! Domain entities owned by the sighting store.
//!
//! Every timestamp is Unix milliseconds. Plates are always stored in their
//! normalized form (see [`normalize_plate`]).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::geo_math::Location;

/// Canonical plate form: trimmed, ASCII upper-case, no spaces or hyphens.
pub fn normalize_plate(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

// ============================================================================
// ENUMS
// ============================================================================

/// Watchlist lifecycle. Transitions only ever leave `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchlistStatus {
    Active,
    Resolved,
    Cancelled,
}

impl WatchlistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchlistStatus::Active => "ACTIVE",
            WatchlistStatus::Resolved => "RESOLVED",
            WatchlistStatus::Cancelled => "CANCELLED",
        }
    }

    /// One-way: ACTIVE -> RESOLVED | CANCELLED, nothing else.
    pub fn can_transition_to(&self, next: WatchlistStatus) -> bool {
        matches!(
            (self, next),
            (WatchlistStatus::Active, WatchlistStatus::Resolved)
                | (WatchlistStatus::Active, WatchlistStatus::Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseType {
    Kidnapping,
    HitAndRun,
    Stolen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationType {
    ExpiredPermit,
    UnpaidFine,
    SuspendedRegistration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Pending,
    Acknowledged,
    Expired,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "PENDING",
            AlertStatus::Acknowledged => "ACKNOWLEDGED",
            AlertStatus::Expired => "EXPIRED",
        }
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// One identified vehicle, as handed over by the perception front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentificationEvent {
    pub plate: String,
    pub make: String,
    pub model: String,
    pub camera_id: String,
    pub location: Location,
    /// Plate recognizer confidence [0.0 - 1.0]
    pub confidence: f64,
    /// Capture time; stamped from the context clock when absent
    #[serde(default)]
    pub observed_at_ms: Option<i64>,
}

/// 9999-12-31T23:59:59.999Z
pub const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

impl IdentificationEvent {
    /// Reject malformed geometry and empty identifiers.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.location.validate()?;
        if normalize_plate(&self.plate).is_empty() {
            return Err(ValidationError::Empty("plate"));
        }
        if self.camera_id.trim().is_empty() {
            return Err(ValidationError::Empty("camera_id"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::InvalidConfidence(self.confidence));
        }
        if let Some(at_ms) = self.observed_at_ms {
            if !(0..=MAX_TIMESTAMP_MS).contains(&at_ms) {
                return Err(ValidationError::InvalidTimestamp(at_ms));
            }
        }
        Ok(())
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

/// One detection of a vehicle at a camera. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub id: Uuid,
    pub plate: String,
    pub camera_id: String,
    pub location: Location,
    pub confidence: f64,
    pub timestamp_ms: i64,
    /// Set when the sighting was recorded against a watchlist entry
    pub watchlist_entry_id: Option<Uuid>,
}

impl Sighting {
    pub fn new(
        plate: &str,
        camera_id: &str,
        location: Location,
        confidence: f64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            plate: normalize_plate(plate),
            camera_id: camera_id.to_string(),
            location,
            confidence,
            timestamp_ms,
            watchlist_entry_id: None,
        }
    }
}

/// A vehicle under active investigative interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: Uuid,
    pub plate: String,
    pub make: String,
    pub model: String,
    pub case_type: CaseType,
    pub case_number: String,
    pub priority: Priority,
    pub status: WatchlistStatus,
    pub registered_at_ms: i64,
    pub registered_by: String,
}

/// Registration request for a new watchlist entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWatchlistEntry {
    pub plate: String,
    pub make: String,
    pub model: String,
    pub case_type: CaseType,
    pub case_number: String,
    pub priority: Priority,
    pub registered_by: String,
}

/// Vehicle with outstanding infractions. Static reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEntry {
    pub plate: String,
    pub violation_type: ViolationType,
    pub description: String,
    pub severity: Severity,
    pub added_at_ms: i64,
}

/// Last reported position of an officer. Upserted, never versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficerState {
    pub officer_id: String,
    pub location: Location,
    /// Direction of travel, degrees clockwise from north
    pub heading_deg: f64,
    pub speed_mps: f64,
    pub on_duty: bool,
    pub last_updated_ms: i64,
}

impl OfficerState {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.officer_id.trim().is_empty() {
            return Err(ValidationError::Empty("officer_id"));
        }
        self.location.validate()?;
        if !self.heading_deg.is_finite() {
            return Err(ValidationError::InvalidHeading(self.heading_deg));
        }
        if !self.speed_mps.is_finite() || self.speed_mps < 0.0 {
            return Err(ValidationError::InvalidSpeed(self.speed_mps));
        }
        Ok(())
    }
}

/// Notification that a violation vehicle is within reach of an officer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptAlert {
    pub id: Uuid,
    pub officer_id: String,
    pub plate: String,
    pub make: String,
    pub model: String,
    pub violation_type: ViolationType,
    /// Vehicle position at sighting time
    pub location: Location,
    pub distance_m: f64,
    /// 8-point compass label, vehicle toward officer
    pub direction: String,
    pub eta_s: f64,
    pub generated_at_ms: i64,
    pub acknowledged_at_ms: Option<i64>,
    pub status: AlertStatus,
}

/// Time-windowed aggregation of one plate's sightings across cameras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSession {
    pub id: Uuid,
    pub plate: String,
    pub started_at_ms: i64,
    pub last_seen_at_ms: i64,
    /// Distinct camera ids across `path`
    pub camera_count: usize,
    /// Sightings ordered by timestamp
    pub path: Vec<Sighting>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plate() {
        assert_eq!(normalize_plate(" dl 3c-ab 1234 "), "DL3CAB1234");
        assert_eq!(normalize_plate("MH12AB0001"), "MH12AB0001");
        assert_eq!(normalize_plate("  "), "");
    }

    #[test]
    fn test_watchlist_transitions_are_one_way() {
        use WatchlistStatus::*;
        assert!(Active.can_transition_to(Resolved));
        assert!(Active.can_transition_to(Cancelled));
        assert!(!Active.can_transition_to(Active));
        assert!(!Resolved.can_transition_to(Active));
        assert!(!Resolved.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Resolved));
    }

    #[test]
    fn test_identification_event_validation() {
        let mut event = IdentificationEvent {
            plate: "KA01AB1234".into(),
            make: "Toyota".into(),
            model: "Innova".into(),
            camera_id: "CAM-1".into(),
            location: Location { latitude: 12.97, longitude: 77.59 },
            confidence: 0.93,
            observed_at_ms: None,
        };
        assert!(event.validate().is_ok());

        event.location.latitude = 120.0;
        assert_eq!(event.validate(), Err(ValidationError::InvalidLatitude(120.0)));

        event.location.latitude = 12.97;
        event.plate = " - ".into();
        assert_eq!(event.validate(), Err(ValidationError::Empty("plate")));

        event.plate = "KA01AB1234".into();
        event.confidence = 1.5;
        assert_eq!(event.validate(), Err(ValidationError::InvalidConfidence(1.5)));

        event.confidence = 0.93;
        event.observed_at_ms = Some(i64::MIN);
        assert_eq!(event.validate(), Err(ValidationError::InvalidTimestamp(i64::MIN)));
        event.observed_at_ms = Some(MAX_TIMESTAMP_MS + 1);
        assert!(event.validate().is_err());
        event.observed_at_ms = Some(1_700_000_000_000);
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&ViolationType::SuspendedRegistration).unwrap();
        assert_eq!(json, "\"SUSPENDED_REGISTRATION\"");
        let status: AlertStatus = serde_json::from_str("\"ACKNOWLEDGED\"").unwrap();
        assert_eq!(status, AlertStatus::Acknowledged);
    }
}
