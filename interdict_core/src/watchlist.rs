//! WatchlistMatcher - flags vehicles under active investigative interest.
//!
//! A hit needs all of:
//! - normalized plate equality
//! - an ACTIVE entry
//! - the reported make and the registered make overlapping as a
//!   case-insensitive substring, in either direction
//!
//! A plate hit with a disjoint make is treated as a miss and only logged.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use interdict_env::InterdictContext;

use crate::dispatch::EventSink;
use crate::error::{CoreError, StoreError, ValidationError};
use crate::events::{AlertEvent, CriticalVehicleDetected};
use crate::geo_math::{extrapolate, Location};
use crate::model::{
    normalize_plate, IdentificationEvent, NewWatchlistEntry, Sighting, WatchlistEntry,
    WatchlistStatus,
};
use crate::store::SightingStore;

/// Make comparison tolerant of recognizer noise ("Maruti" vs "Maruti Suzuki").
pub fn make_matches(reported: &str, registered: &str) -> bool {
    let reported = reported.trim().to_lowercase();
    let registered = registered.trim().to_lowercase();
    reported.contains(&registered) || registered.contains(&reported)
}

/// A recorded watchlist hit.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchlistHit {
    pub entry: WatchlistEntry,
    pub sighting: Sighting,
}

/// An ACTIVE entry together with how often it has been seen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveEntry {
    #[serde(flatten)]
    pub entry: WatchlistEntry,
    pub sighting_count: usize,
}

pub struct WatchlistMatcher<Ctx: InterdictContext> {
    ctx: Arc<Ctx>,
    store: Arc<dyn SightingStore>,
    sink: Arc<dyn EventSink>,
}

impl<Ctx: InterdictContext> WatchlistMatcher<Ctx> {
    pub fn new(ctx: Arc<Ctx>, store: Arc<dyn SightingStore>, sink: Arc<dyn EventSink>) -> Self {
        Self { ctx, store, sink }
    }

    /// Match one identification against the watchlist.
    ///
    /// On a hit, persists a sighting linked to the entry and broadcasts a
    /// `CRITICAL_VEHICLE_DETECTED` event. On a miss nothing is written.
    pub fn check_and_record(
        &self,
        event: &IdentificationEvent,
    ) -> Result<Option<WatchlistHit>, StoreError> {
        let plate = normalize_plate(&event.plate);
        let candidates = self.store.active_watchlist_by_plate(&plate)?;
        if candidates.is_empty() {
            debug!(plate = %plate, "No watchlist entry");
            return Ok(None);
        }

        let Some(entry) = candidates
            .into_iter()
            .find(|entry| make_matches(&event.make, &entry.make))
        else {
            warn!(
                plate = %plate,
                reported_make = %event.make,
                "Watchlist plate hit with mismatched make, ignoring"
            );
            return Ok(None);
        };

        let timestamp_ms = event.observed_at_ms.unwrap_or_else(|| self.ctx.unix_ms());
        let mut sighting = Sighting::new(
            &plate,
            &event.camera_id,
            event.location,
            event.confidence,
            timestamp_ms,
        );
        sighting.watchlist_entry_id = Some(entry.id);
        self.store.insert_sighting(&sighting)?;

        info!(
            plate = %plate,
            case_number = %entry.case_number,
            camera_id = %event.camera_id,
            "Critical vehicle detected"
        );

        let payload = CriticalVehicleDetected::new(&entry, &sighting, &event.make, &event.model);
        self.sink
            .broadcast(&AlertEvent::CriticalVehicleDetected(payload));

        Ok(Some(WatchlistHit { entry, sighting }))
    }

    /// Register a new ACTIVE entry.
    pub fn register(&self, request: NewWatchlistEntry) -> Result<WatchlistEntry, CoreError> {
        let plate = normalize_plate(&request.plate);
        if plate.is_empty() {
            return Err(ValidationError::Empty("plate").into());
        }
        if request.make.trim().is_empty() {
            return Err(ValidationError::Empty("make").into());
        }

        let entry = WatchlistEntry {
            id: Uuid::new_v4(),
            plate,
            make: request.make,
            model: request.model,
            case_type: request.case_type,
            case_number: request.case_number,
            priority: request.priority,
            status: WatchlistStatus::Active,
            registered_at_ms: self.ctx.unix_ms(),
            registered_by: request.registered_by,
        };
        self.store.insert_watchlist_entry(&entry)?;
        info!(plate = %entry.plate, case_number = %entry.case_number, "Watchlist entry registered");
        Ok(entry)
    }

    /// ACTIVE -> RESOLVED
    pub fn resolve(&self, id: Uuid) -> Result<WatchlistEntry, StoreError> {
        let entry = self.store.transition_watchlist(id, WatchlistStatus::Resolved)?;
        info!(plate = %entry.plate, "Watchlist entry resolved");
        Ok(entry)
    }

    /// ACTIVE -> CANCELLED
    pub fn cancel(&self, id: Uuid) -> Result<WatchlistEntry, StoreError> {
        let entry = self.store.transition_watchlist(id, WatchlistStatus::Cancelled)?;
        info!(plate = %entry.plate, "Watchlist entry cancelled");
        Ok(entry)
    }

    /// Straight-line route prediction for a watchlisted vehicle.
    ///
    /// Returns `[last seen, projected]`, where the projection continues the
    /// motion between the two most recent sightings for `minutes` more.
    /// Fewer than two sightings yields an empty route.
    pub fn predict_route(&self, entry_id: Uuid, minutes: u32) -> Result<Vec<Location>, StoreError> {
        let recent = self.store.recent_sightings(entry_id, 2)?;
        let [current, previous] = recent.as_slice() else {
            debug!(entry_id = %entry_id, sightings = recent.len(), "Too few sightings to predict a route");
            return Ok(Vec::new());
        };

        let target = extrapolate(
            previous.location,
            previous.timestamp_ms,
            current.location,
            current.timestamp_ms,
            f64::from(minutes) * 60.0,
        );
        debug!(
            plate = %current.plate,
            minutes,
            lat = target.latitude,
            lon = target.longitude,
            "Route predicted"
        );
        Ok(vec![current.location, target])
    }

    /// All ACTIVE entries, newest first, with their sighting counts.
    pub fn active_entries(&self) -> Result<Vec<ActiveEntry>, StoreError> {
        self.store
            .active_watchlist()?
            .into_iter()
            .map(|entry| {
                let sighting_count = self.store.sighting_count(entry.id)?;
                Ok(ActiveEntry { entry, sighting_count })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RecordingSink;
    use crate::geo_math::Location;
    use crate::model::{CaseType, Priority};
    use crate::store::MemoryStore;
    use interdict_env::TokioContext;

    fn setup() -> (WatchlistMatcher<TokioContext>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let matcher = WatchlistMatcher::new(
            TokioContext::shared(),
            Arc::new(MemoryStore::new()),
            sink.clone(),
        );
        (matcher, sink)
    }

    fn request(plate: &str, make: &str) -> NewWatchlistEntry {
        NewWatchlistEntry {
            plate: plate.to_string(),
            make: make.to_string(),
            model: "Swift".to_string(),
            case_type: CaseType::Kidnapping,
            case_number: "FIR-2024-042".to_string(),
            priority: Priority::Critical,
            registered_by: "desk-sgt".to_string(),
        }
    }

    fn sighting(plate: &str, make: &str) -> IdentificationEvent {
        IdentificationEvent {
            plate: plate.to_string(),
            make: make.to_string(),
            model: "Swift".to_string(),
            camera_id: "CAM-07".to_string(),
            location: Location { latitude: 28.6139, longitude: 77.2090 },
            confidence: 0.91,
            observed_at_ms: Some(1_700_000_000_000),
        }
    }

    #[test]
    fn test_make_matches_either_direction() {
        assert!(make_matches("Maruti", "Maruti Suzuki"));
        assert!(make_matches("MARUTI SUZUKI", "maruti"));
        assert!(!make_matches("Hyundai", "Maruti"));
    }

    #[test]
    fn test_hit_records_sighting_and_broadcasts() {
        let (matcher, sink) = setup();
        let entry = matcher.register(request("dl-3c ab 1234", "Maruti Suzuki")).unwrap();
        assert_eq!(entry.plate, "DL3CAB1234");

        let hit = matcher
            .check_and_record(&sighting("DL3CAB1234", "maruti"))
            .unwrap()
            .expect("watchlist hit");
        assert_eq!(hit.entry.id, entry.id);
        assert_eq!(hit.sighting.watchlist_entry_id, Some(entry.id));
        assert_eq!(hit.sighting.timestamp_ms, 1_700_000_000_000);

        let events = sink.control_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            AlertEvent::CriticalVehicleDetected(p) => {
                assert_eq!(p.case_number, "FIR-2024-042");
                assert_eq!(p.camera_id, "CAM-07");
            }
            other => panic!("unexpected event {:?}", other),
        }

        let active = matcher.active_entries().unwrap();
        assert_eq!(active[0].sighting_count, 1);
    }

    #[test]
    fn test_make_mismatch_is_a_miss() {
        let (matcher, sink) = setup();
        let entry = matcher.register(request("KA01MX0001", "Toyota")).unwrap();

        let hit = matcher.check_and_record(&sighting("KA01MX0001", "Honda")).unwrap();
        assert!(hit.is_none());
        assert!(sink.control_events().is_empty());
        assert_eq!(matcher.active_entries().unwrap()[0].entry.id, entry.id);
        assert_eq!(matcher.active_entries().unwrap()[0].sighting_count, 0);
    }

    #[test]
    fn test_resolved_entry_no_longer_matches() {
        let (matcher, sink) = setup();
        let entry = matcher.register(request("MH12AB0001", "Tata")).unwrap();
        matcher.resolve(entry.id).unwrap();

        assert!(matcher.check_and_record(&sighting("MH12AB0001", "Tata")).unwrap().is_none());
        assert!(sink.control_events().is_empty());
        assert!(matcher.active_entries().unwrap().is_empty());

        let err = matcher.cancel(entry.id).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_predict_route_needs_two_sightings() {
        let (matcher, _) = setup();
        let entry = matcher.register(request("DL8CAF0001", "Maruti")).unwrap();
        assert!(matcher.predict_route(entry.id, 5).unwrap().is_empty());

        matcher.check_and_record(&sighting("DL8CAF0001", "Maruti")).unwrap();
        assert!(matcher.predict_route(entry.id, 5).unwrap().is_empty());
    }

    #[test]
    fn test_predict_route_extends_latest_motion() {
        let (matcher, _) = setup();
        let entry = matcher.register(request("DL8CAF0002", "Maruti")).unwrap();

        let mut first = sighting("DL8CAF0002", "Maruti");
        first.location = Location { latitude: 28.6000, longitude: 77.2000 };
        let mut second = first.clone();
        second.location = Location { latitude: 28.6010, longitude: 77.2000 };
        second.observed_at_ms = Some(1_700_000_060_000);
        // Delivered out of order; capture time decides which is current
        matcher.check_and_record(&second).unwrap();
        matcher.check_and_record(&first).unwrap();

        let route = matcher.predict_route(entry.id, 2).unwrap();
        assert_eq!(route.len(), 2);
        assert_eq!(route[0], second.location);
        assert!((route[1].latitude - 28.6030).abs() < 1e-9, "got {:?}", route[1]);
        assert_eq!(route[1].longitude, 77.2000);
    }

    #[test]
    fn test_predict_route_same_timestamp_is_finite() {
        let (matcher, _) = setup();
        let entry = matcher.register(request("DL8CAF0003", "Maruti")).unwrap();
        let first = sighting("DL8CAF0003", "Maruti");
        let mut second = first.clone();
        second.location.latitude += 0.0001;
        matcher.check_and_record(&first).unwrap();
        matcher.check_and_record(&second).unwrap();

        let route = matcher.predict_route(entry.id, 1).unwrap();
        assert_eq!(route.len(), 2);
        assert!(route[1].validate().is_ok());
    }

    #[test]
    fn test_register_rejects_empty_plate() {
        let (matcher, _) = setup();
        let err = matcher.register(request(" - ", "Tata")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::Empty("plate"))));
    }
}
