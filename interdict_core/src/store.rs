//! The transactional repository behind every component.
//!
//! Components never cache entities; each call reads what it needs and
//! writes its results back here. Implementations must make the two
//! read-modify-write paths atomic:
//! - `update_latest_session` (session lookup + append + recount)
//! - `transition_watchlist` / `transition_alert` (status changes)

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    AlertStatus, InterceptAlert, OfficerState, Sighting, TrackingSession, ViolationEntry,
    WatchlistEntry, WatchlistStatus,
};

/// Closure applied to the latest session for a plate under the store's lock.
///
/// Receives the most recently updated session (if any) and returns the
/// session to persist, which may be a brand new one.
pub type SessionUpdate<'a> = &'a mut dyn FnMut(Option<TrackingSession>) -> TrackingSession;

/// Repository interface consumed by the matchers and the tracker.
///
/// All operations are synchronous and committed on return.
pub trait SightingStore: Send + Sync {
    // --- Watchlist ---

    fn insert_watchlist_entry(&self, entry: &WatchlistEntry) -> Result<(), StoreError>;

    /// ACTIVE entries whose plate equals `plate` (already normalized).
    fn active_watchlist_by_plate(&self, plate: &str) -> Result<Vec<WatchlistEntry>, StoreError>;

    /// All ACTIVE entries, newest registration first.
    fn active_watchlist(&self) -> Result<Vec<WatchlistEntry>, StoreError>;

    /// Atomically move an entry to `next`, enforcing one-way transitions.
    fn transition_watchlist(
        &self,
        id: Uuid,
        next: WatchlistStatus,
    ) -> Result<WatchlistEntry, StoreError>;

    fn insert_sighting(&self, sighting: &Sighting) -> Result<(), StoreError>;

    /// Number of sightings recorded against a watchlist entry.
    fn sighting_count(&self, entry_id: Uuid) -> Result<usize, StoreError>;

    /// Sightings recorded against a watchlist entry, newest capture first.
    fn recent_sightings(&self, entry_id: Uuid, limit: usize) -> Result<Vec<Sighting>, StoreError>;

    // --- Violations ---

    /// Insert a violation; a second entry for the same plate is a conflict.
    fn insert_violation(&self, entry: &ViolationEntry) -> Result<(), StoreError>;

    fn violation_by_plate(&self, plate: &str) -> Result<Option<ViolationEntry>, StoreError>;

    fn violations(&self) -> Result<Vec<ViolationEntry>, StoreError>;

    // --- Officers ---

    /// Last-value-wins upsert keyed by officer id.
    fn upsert_officer(&self, officer: &OfficerState) -> Result<(), StoreError>;

    fn on_duty_officers(&self) -> Result<Vec<OfficerState>, StoreError>;

    // --- Alerts ---

    fn insert_alert(&self, alert: &InterceptAlert) -> Result<(), StoreError>;

    /// Atomically move an alert out of PENDING, stamping `at_ms` on acknowledge.
    fn transition_alert(
        &self,
        id: Uuid,
        next: AlertStatus,
        at_ms: i64,
    ) -> Result<InterceptAlert, StoreError>;

    /// Alerts newest first, optionally for one officer.
    fn alerts(&self, officer_id: Option<&str>, limit: usize)
        -> Result<Vec<InterceptAlert>, StoreError>;

    /// Most recent alert for an (officer, plate) pair.
    fn latest_alert_for(
        &self,
        officer_id: &str,
        plate: &str,
    ) -> Result<Option<InterceptAlert>, StoreError>;

    /// Mark every PENDING alert generated before `cutoff_ms` as EXPIRED.
    fn expire_alerts(&self, cutoff_ms: i64) -> Result<usize, StoreError>;

    // --- Tracking sessions ---

    /// Atomically read the latest session for `plate`, apply `update`, persist
    /// and return the result.
    ///
    /// The plate's latest pointer only moves to the returned session when it
    /// was last seen no earlier than the current latest one.
    fn update_latest_session(
        &self,
        plate: &str,
        update: SessionUpdate<'_>,
    ) -> Result<TrackingSession, StoreError>;

    /// Most recently updated session for `plate`, active or not.
    fn latest_session(&self, plate: &str) -> Result<Option<TrackingSession>, StoreError>;
}

/// Whether `next` should become the plate's latest session in place of `current`.
pub(crate) fn supersedes(current: Option<&TrackingSession>, next: &TrackingSession) -> bool {
    match current {
        Some(current) => current.id == next.id || next.last_seen_at_ms >= current.last_seen_at_ms,
        None => true,
    }
}

/// Shared transition rule for alerts: only PENDING may move, and never to PENDING.
pub(crate) fn check_alert_transition(
    current: AlertStatus,
    next: AlertStatus,
) -> Result<(), StoreError> {
    if current == AlertStatus::Pending && next != AlertStatus::Pending {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            from: current.as_str().to_string(),
            to: next.as_str().to_string(),
        })
    }
}

pub(crate) fn check_watchlist_transition(
    current: WatchlistStatus,
    next: WatchlistStatus,
) -> Result<(), StoreError> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            from: current.as_str().to_string(),
            to: next.as_str().to_string(),
        })
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Default)]
struct Tables {
    watchlist: HashMap<Uuid, WatchlistEntry>,
    sightings: Vec<Sighting>,
    violations: HashMap<String, ViolationEntry>,
    officers: HashMap<String, OfficerState>,
    alerts: Vec<InterceptAlert>,
    sessions: HashMap<Uuid, TrackingSession>,
    /// plate -> id of its most recently updated session
    latest_session: HashMap<String, Uuid>,
}

/// Mutex-guarded in-memory store.
///
/// Every operation takes the single table lock, so all read-modify-write
/// paths are trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl SightingStore for MemoryStore {
    fn insert_watchlist_entry(&self, entry: &WatchlistEntry) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.watchlist.contains_key(&entry.id) {
            return Err(StoreError::Conflict(format!("watchlist entry {} exists", entry.id)));
        }
        tables.watchlist.insert(entry.id, entry.clone());
        Ok(())
    }

    fn active_watchlist_by_plate(&self, plate: &str) -> Result<Vec<WatchlistEntry>, StoreError> {
        let tables = self.lock()?;
        let mut hits: Vec<WatchlistEntry> = tables
            .watchlist
            .values()
            .filter(|e| e.plate == plate && e.status == WatchlistStatus::Active)
            .cloned()
            .collect();
        hits.sort_by_key(|e| std::cmp::Reverse(e.registered_at_ms));
        Ok(hits)
    }

    fn active_watchlist(&self) -> Result<Vec<WatchlistEntry>, StoreError> {
        let tables = self.lock()?;
        let mut entries: Vec<WatchlistEntry> = tables
            .watchlist
            .values()
            .filter(|e| e.status == WatchlistStatus::Active)
            .cloned()
            .collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.registered_at_ms));
        Ok(entries)
    }

    fn transition_watchlist(
        &self,
        id: Uuid,
        next: WatchlistStatus,
    ) -> Result<WatchlistEntry, StoreError> {
        let mut tables = self.lock()?;
        let entry = tables
            .watchlist
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("watchlist entry {}", id)))?;
        check_watchlist_transition(entry.status, next)?;
        entry.status = next;
        Ok(entry.clone())
    }

    fn insert_sighting(&self, sighting: &Sighting) -> Result<(), StoreError> {
        self.lock()?.sightings.push(sighting.clone());
        Ok(())
    }

    fn sighting_count(&self, entry_id: Uuid) -> Result<usize, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .sightings
            .iter()
            .filter(|s| s.watchlist_entry_id == Some(entry_id))
            .count())
    }

    fn recent_sightings(&self, entry_id: Uuid, limit: usize) -> Result<Vec<Sighting>, StoreError> {
        let tables = self.lock()?;
        let mut sightings: Vec<Sighting> = tables
            .sightings
            .iter()
            .filter(|s| s.watchlist_entry_id == Some(entry_id))
            .cloned()
            .collect();
        sightings.sort_by_key(|s| std::cmp::Reverse(s.timestamp_ms));
        sightings.truncate(limit);
        Ok(sightings)
    }

    fn insert_violation(&self, entry: &ViolationEntry) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.violations.contains_key(&entry.plate) {
            return Err(StoreError::Conflict(format!(
                "plate {} already on violation list",
                entry.plate
            )));
        }
        tables.violations.insert(entry.plate.clone(), entry.clone());
        Ok(())
    }

    fn violation_by_plate(&self, plate: &str) -> Result<Option<ViolationEntry>, StoreError> {
        Ok(self.lock()?.violations.get(plate).cloned())
    }

    fn violations(&self) -> Result<Vec<ViolationEntry>, StoreError> {
        let tables = self.lock()?;
        let mut all: Vec<ViolationEntry> = tables.violations.values().cloned().collect();
        all.sort_by(|a, b| a.plate.cmp(&b.plate));
        Ok(all)
    }

    fn upsert_officer(&self, officer: &OfficerState) -> Result<(), StoreError> {
        self.lock()?
            .officers
            .insert(officer.officer_id.clone(), officer.clone());
        Ok(())
    }

    fn on_duty_officers(&self) -> Result<Vec<OfficerState>, StoreError> {
        let tables = self.lock()?;
        let mut officers: Vec<OfficerState> =
            tables.officers.values().filter(|o| o.on_duty).cloned().collect();
        officers.sort_by(|a, b| a.officer_id.cmp(&b.officer_id));
        Ok(officers)
    }

    fn insert_alert(&self, alert: &InterceptAlert) -> Result<(), StoreError> {
        self.lock()?.alerts.push(alert.clone());
        Ok(())
    }

    fn transition_alert(
        &self,
        id: Uuid,
        next: AlertStatus,
        at_ms: i64,
    ) -> Result<InterceptAlert, StoreError> {
        let mut tables = self.lock()?;
        let alert = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {}", id)))?;
        check_alert_transition(alert.status, next)?;
        alert.status = next;
        if next == AlertStatus::Acknowledged {
            alert.acknowledged_at_ms = Some(at_ms);
        }
        Ok(alert.clone())
    }

    fn alerts(
        &self,
        officer_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<InterceptAlert>, StoreError> {
        let tables = self.lock()?;
        let mut alerts: Vec<InterceptAlert> = tables
            .alerts
            .iter()
            .filter(|a| officer_id.map_or(true, |id| a.officer_id == id))
            .cloned()
            .collect();
        alerts.sort_by_key(|a| std::cmp::Reverse(a.generated_at_ms));
        alerts.truncate(limit);
        Ok(alerts)
    }

    fn latest_alert_for(
        &self,
        officer_id: &str,
        plate: &str,
    ) -> Result<Option<InterceptAlert>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .alerts
            .iter()
            .filter(|a| a.officer_id == officer_id && a.plate == plate)
            .max_by_key(|a| a.generated_at_ms)
            .cloned())
    }

    fn expire_alerts(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
        let mut tables = self.lock()?;
        let mut expired = 0;
        for alert in tables
            .alerts
            .iter_mut()
            .filter(|a| a.status == AlertStatus::Pending && a.generated_at_ms < cutoff_ms)
        {
            alert.status = AlertStatus::Expired;
            expired += 1;
        }
        Ok(expired)
    }

    fn update_latest_session(
        &self,
        plate: &str,
        update: SessionUpdate<'_>,
    ) -> Result<TrackingSession, StoreError> {
        let mut tables = self.lock()?;
        let current = tables
            .latest_session
            .get(plate)
            .and_then(|id| tables.sessions.get(id))
            .cloned();

        let session = update(current.clone());
        if supersedes(current.as_ref(), &session) {
            tables.latest_session.insert(plate.to_string(), session.id);
        }
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    fn latest_session(&self, plate: &str) -> Result<Option<TrackingSession>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .latest_session
            .get(plate)
            .and_then(|id| tables.sessions.get(id))
            .cloned())
    }
}

// ============================================================================
// CONTRACT TESTS (shared by every implementation)
// ============================================================================

#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use crate::geo_math::Location;
    use crate::model::{CaseType, Priority, Severity, ViolationType};

    pub fn watchlist_entry(plate: &str, make: &str, registered_at_ms: i64) -> WatchlistEntry {
        WatchlistEntry {
            id: Uuid::new_v4(),
            plate: plate.to_string(),
            make: make.to_string(),
            model: "Swift".to_string(),
            case_type: CaseType::Stolen,
            case_number: "FIR-2024-001".to_string(),
            priority: Priority::Critical,
            status: WatchlistStatus::Active,
            registered_at_ms,
            registered_by: "desk-sgt".to_string(),
        }
    }

    pub fn violation(plate: &str) -> ViolationEntry {
        ViolationEntry {
            plate: plate.to_string(),
            violation_type: ViolationType::UnpaidFine,
            description: "3 unpaid challans".to_string(),
            severity: Severity::Medium,
            added_at_ms: 0,
        }
    }

    pub fn officer(id: &str, on_duty: bool) -> OfficerState {
        OfficerState {
            officer_id: id.to_string(),
            location: Location { latitude: 28.6139, longitude: 77.2090 },
            heading_deg: 0.0,
            speed_mps: 0.0,
            on_duty,
            last_updated_ms: 0,
        }
    }

    pub fn alert(officer_id: &str, plate: &str, generated_at_ms: i64) -> InterceptAlert {
        InterceptAlert {
            id: Uuid::new_v4(),
            officer_id: officer_id.to_string(),
            plate: plate.to_string(),
            make: "Maruti".to_string(),
            model: "Swift".to_string(),
            violation_type: ViolationType::UnpaidFine,
            location: Location { latitude: 28.6139, longitude: 77.2090 },
            distance_m: 120.0,
            direction: "N".to_string(),
            eta_s: 24.0,
            generated_at_ms,
            acknowledged_at_ms: None,
            status: AlertStatus::Pending,
        }
    }

    pub fn run_all(store: &dyn SightingStore) {
        watchlist_roundtrip(store);
        watchlist_transitions(store);
        violation_conflict(store);
        officer_upsert(store);
        alert_lifecycle(store);
        session_update(store);
    }

    fn watchlist_roundtrip(store: &dyn SightingStore) {
        let older = watchlist_entry("WL0001", "Maruti", 1_000);
        let newer = watchlist_entry("WL0001", "Hyundai", 2_000);
        store.insert_watchlist_entry(&older).unwrap();
        store.insert_watchlist_entry(&newer).unwrap();

        let hits = store.active_watchlist_by_plate("WL0001").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, newer.id);
        assert!(store.active_watchlist_by_plate("NOPE").unwrap().is_empty());

        let mut sighting = Sighting::new(
            "WL0001",
            "CAM-1",
            Location { latitude: 28.6, longitude: 77.2 },
            0.9,
            5_000,
        );
        sighting.watchlist_entry_id = Some(older.id);
        store.insert_sighting(&sighting).unwrap();
        assert_eq!(store.sighting_count(older.id).unwrap(), 1);
        assert_eq!(store.sighting_count(newer.id).unwrap(), 0);

        let mut earlier = sighting.clone();
        earlier.id = Uuid::new_v4();
        earlier.timestamp_ms = 4_000;
        store.insert_sighting(&earlier).unwrap();
        let recent = store.recent_sightings(older.id, 5).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, sighting.id);
        assert_eq!(store.recent_sightings(older.id, 1).unwrap().len(), 1);
        assert!(store.recent_sightings(newer.id, 5).unwrap().is_empty());
    }

    fn watchlist_transitions(store: &dyn SightingStore) {
        let entry = watchlist_entry("WL0002", "Tata", 3_000);
        store.insert_watchlist_entry(&entry).unwrap();

        let resolved = store.transition_watchlist(entry.id, WatchlistStatus::Resolved).unwrap();
        assert_eq!(resolved.status, WatchlistStatus::Resolved);
        assert!(store.active_watchlist_by_plate("WL0002").unwrap().is_empty());

        let err = store
            .transition_watchlist(entry.id, WatchlistStatus::Active)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let err = store
            .transition_watchlist(Uuid::new_v4(), WatchlistStatus::Cancelled)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    fn violation_conflict(store: &dyn SightingStore) {
        store.insert_violation(&violation("VL0001")).unwrap();
        let err = store.insert_violation(&violation("VL0001")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.violation_by_plate("VL0001").unwrap().is_some());
        assert!(store.violation_by_plate("VL9999").unwrap().is_none());
        assert_eq!(store.violations().unwrap().len(), 1);
    }

    fn officer_upsert(store: &dyn SightingStore) {
        store.upsert_officer(&officer("OFF-1", true)).unwrap();
        store.upsert_officer(&officer("OFF-2", true)).unwrap();
        // Last value wins
        store.upsert_officer(&officer("OFF-2", false)).unwrap();

        let on_duty = store.on_duty_officers().unwrap();
        assert_eq!(on_duty.len(), 1);
        assert_eq!(on_duty[0].officer_id, "OFF-1");
    }

    fn alert_lifecycle(store: &dyn SightingStore) {
        let old = alert("OFF-9", "VL0001", 1_000);
        let new = alert("OFF-9", "VL0001", 9_000);
        let other = alert("OFF-8", "VL0001", 5_000);
        for a in [&old, &new, &other] {
            store.insert_alert(a).unwrap();
        }

        let latest = store.latest_alert_for("OFF-9", "VL0001").unwrap().unwrap();
        assert_eq!(latest.id, new.id);

        let for_officer = store.alerts(Some("OFF-9"), 10).unwrap();
        assert_eq!(for_officer.len(), 2);
        assert_eq!(for_officer[0].id, new.id);
        assert_eq!(store.alerts(None, 1).unwrap().len(), 1);

        let acked = store
            .transition_alert(new.id, AlertStatus::Acknowledged, 9_500)
            .unwrap();
        assert_eq!(acked.acknowledged_at_ms, Some(9_500));
        let err = store
            .transition_alert(new.id, AlertStatus::Acknowledged, 9_600)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        // Only `old` (pending, before cutoff) expires; `new` is acknowledged
        assert_eq!(store.expire_alerts(4_000).unwrap(), 1);
        assert_eq!(store.expire_alerts(4_000).unwrap(), 0);
    }

    fn session_update(store: &dyn SightingStore) {
        assert!(store.latest_session("TR0001").unwrap().is_none());

        let first = store
            .update_latest_session("TR0001", &mut |current| {
                assert!(current.is_none());
                TrackingSession {
                    id: Uuid::new_v4(),
                    plate: "TR0001".to_string(),
                    started_at_ms: 100,
                    last_seen_at_ms: 100,
                    camera_count: 1,
                    path: vec![],
                }
            })
            .unwrap();

        let second = store
            .update_latest_session("TR0001", &mut |current| {
                let mut session = current.expect("session persisted");
                session.last_seen_at_ms = 200;
                session
            })
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            store.latest_session("TR0001").unwrap().unwrap().last_seen_at_ms,
            200
        );

        // An older, disjoint session is stored but does not take over
        let stale = store
            .update_latest_session("TR0001", &mut |_| TrackingSession {
                id: Uuid::new_v4(),
                plate: "TR0001".to_string(),
                started_at_ms: 10,
                last_seen_at_ms: 10,
                camera_count: 1,
                path: vec![],
            })
            .unwrap();
        assert_ne!(stale.id, first.id);
        assert_eq!(store.latest_session("TR0001").unwrap().unwrap().id, first.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_contract() {
        let store = MemoryStore::new();
        contract::run_all(&store);
    }

    #[test]
    fn test_concurrent_session_updates_never_fork() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .update_latest_session("RACE01", &mut |current| match current {
                            Some(mut s) => {
                                s.camera_count += 1;
                                s
                            }
                            None => TrackingSession {
                                id: Uuid::new_v4(),
                                plate: "RACE01".to_string(),
                                started_at_ms: 0,
                                last_seen_at_ms: 0,
                                camera_count: 1,
                                path: vec![],
                            },
                        })
                        .unwrap()
                        .id
                })
            })
            .collect();

        let ids: Vec<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(store.latest_session("RACE01").unwrap().unwrap().camera_count, 8);
    }
}
