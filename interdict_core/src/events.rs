//! Outbound event payloads.
//!
//! Serialized as JSON objects tagged by `type`, e.g.
//! `{"type":"INTERCEPT_ALERT","alert_id":...}`. Timestamps are Unix ms.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo_math::Location;
use crate::model::{
    CaseType, InterceptAlert, OfficerState, Priority, Sighting, TrackingSession, ViolationType,
    WatchlistEntry,
};

/// Every event the core hands to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertEvent {
    /// Watchlist hit, broadcast to control channels
    CriticalVehicleDetected(CriticalVehicleDetected),
    /// Proximity hit, sent to one officer
    InterceptAlert(InterceptAlertPayload),
    /// Cross-camera journey, broadcast to control channels
    VehiclePathUpdate(VehiclePathUpdate),
    /// Officer position change, broadcast to control channels
    OfficerLocationUpdate(OfficerLocationUpdate),
}

impl AlertEvent {
    /// Wire name of the event, matching the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::CriticalVehicleDetected(_) => "CRITICAL_VEHICLE_DETECTED",
            AlertEvent::InterceptAlert(_) => "INTERCEPT_ALERT",
            AlertEvent::VehiclePathUpdate(_) => "VEHICLE_PATH_UPDATE",
            AlertEvent::OfficerLocationUpdate(_) => "OFFICER_LOCATION_UPDATE",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalVehicleDetected {
    pub watchlist_entry_id: Uuid,
    pub sighting_id: Uuid,
    pub plate: String,
    /// Make and model as reported by the camera
    pub make: String,
    pub model: String,
    pub case_type: CaseType,
    pub case_number: String,
    pub priority: Priority,
    pub location: Location,
    pub camera_id: String,
    pub timestamp_ms: i64,
}

impl CriticalVehicleDetected {
    pub fn new(entry: &WatchlistEntry, sighting: &Sighting, make: &str, model: &str) -> Self {
        Self {
            watchlist_entry_id: entry.id,
            sighting_id: sighting.id,
            plate: sighting.plate.clone(),
            make: make.to_string(),
            model: model.to_string(),
            case_type: entry.case_type,
            case_number: entry.case_number.clone(),
            priority: entry.priority,
            location: sighting.location,
            camera_id: sighting.camera_id.clone(),
            timestamp_ms: sighting.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptAlertPayload {
    pub alert_id: Uuid,
    pub officer_id: String,
    pub plate: String,
    pub make: String,
    pub model: String,
    pub violation_type: ViolationType,
    pub location: Location,
    pub distance_m: f64,
    pub direction: String,
    pub eta_s: f64,
}

impl From<&InterceptAlert> for InterceptAlertPayload {
    fn from(alert: &InterceptAlert) -> Self {
        Self {
            alert_id: alert.id,
            officer_id: alert.officer_id.clone(),
            plate: alert.plate.clone(),
            make: alert.make.clone(),
            model: alert.model.clone(),
            violation_type: alert.violation_type,
            location: alert.location,
            distance_m: alert.distance_m,
            direction: alert.direction.clone(),
            eta_s: alert.eta_s,
        }
    }
}

/// One point of a journey polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub camera_id: String,
    pub lat: f64,
    pub lng: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePathUpdate {
    pub tracking_id: Uuid,
    pub plate: String,
    pub camera_count: usize,
    /// Haversine length of the polyline, meters
    pub path_length_m: f64,
    pub path: Vec<PathPoint>,
}

impl VehiclePathUpdate {
    pub fn new(session: &TrackingSession, path_length_m: f64) -> Self {
        Self {
            tracking_id: session.id,
            plate: session.plate.clone(),
            camera_count: session.camera_count,
            path_length_m,
            path: session
                .path
                .iter()
                .map(|s| PathPoint {
                    camera_id: s.camera_id.clone(),
                    lat: s.location.latitude,
                    lng: s.location.longitude,
                    timestamp_ms: s.timestamp_ms,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficerLocationUpdate {
    pub officer_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub speed_mps: f64,
    pub on_duty: bool,
    pub last_updated_ms: i64,
}

impl From<&OfficerState> for OfficerLocationUpdate {
    fn from(officer: &OfficerState) -> Self {
        Self {
            officer_id: officer.officer_id.clone(),
            latitude: officer.location.latitude,
            longitude: officer.location.longitude,
            heading: officer.heading_deg,
            speed_mps: officer.speed_mps,
            on_duty: officer.on_duty,
            last_updated_ms: officer.last_updated_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_tagged_by_type() {
        let event = AlertEvent::OfficerLocationUpdate(OfficerLocationUpdate {
            officer_id: "OFF-7".into(),
            latitude: 28.61,
            longitude: 77.20,
            heading: 90.0,
            speed_mps: 8.3,
            on_duty: true,
            last_updated_ms: 1_700_000_000_000,
        });

        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "OFFICER_LOCATION_UPDATE");
        assert_eq!(json["type"], event.kind());
        assert_eq!(json["officer_id"], "OFF-7");
        assert_eq!(json["on_duty"], true);
    }

    #[test]
    fn test_path_update_preserves_order() {
        let loc = Location { latitude: 28.6, longitude: 77.2 };
        let session = TrackingSession {
            id: Uuid::new_v4(),
            plate: "DL01AB0001".into(),
            started_at_ms: 0,
            last_seen_at_ms: 20,
            camera_count: 2,
            path: vec![
                Sighting::new("DL01AB0001", "CAM-A", loc, 0.9, 0),
                Sighting::new("DL01AB0001", "CAM-B", loc, 0.9, 10),
                Sighting::new("DL01AB0001", "CAM-A", loc, 0.9, 20),
            ],
        };

        let update = VehiclePathUpdate::new(&session, 0.0);
        let cams: Vec<&str> = update.path.iter().map(|p| p.camera_id.as_str()).collect();
        assert_eq!(cams, ["CAM-A", "CAM-B", "CAM-A"]);

        let json = AlertEvent::VehiclePathUpdate(update).to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"VEHICLE_PATH_UPDATE""#));
    }
}
