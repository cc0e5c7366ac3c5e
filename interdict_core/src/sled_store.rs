//! Sled-backed persistent `SightingStore`.
//!
//! One tree per entity, values encoded as JSON. Sled gives per-key
//! atomicity only, so every write path runs under a store-level mutex;
//! readers go straight to the trees.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    AlertStatus, InterceptAlert, OfficerState, Sighting, TrackingSession, ViolationEntry,
    WatchlistEntry, WatchlistStatus,
};
use crate::store::{
    check_alert_transition, check_watchlist_transition, supersedes, SessionUpdate, SightingStore,
};

const WATCHLIST: &str = "watchlist";
const SIGHTINGS: &str = "sightings";
const VIOLATIONS: &str = "violations";
const OFFICERS: &str = "officers";
const ALERTS: &str = "alerts";
const SESSIONS: &str = "sessions";
/// plate -> id of its most recently updated session
const SESSION_INDEX: &str = "session_index";

/// Sled-based persistent store
///
/// Uses an embedded key-value database for durability.
pub struct SledStore {
    db: sled::Db,
    watchlist: sled::Tree,
    sightings: sled::Tree,
    violations: sled::Tree,
    officers: sled::Tree,
    alerts: sled::Tree,
    sessions: sled::Tree,
    session_index: sled::Tree,
    write_lock: Mutex<()>,
}

impl SledStore {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Unavailable(format!("Failed to open sled DB: {}", e)))?;
        Self::from_db(db)
    }

    /// Create a temporary store (for testing)
    #[cfg(test)]
    pub fn open_temp() -> Result<Self, StoreError> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| StoreError::Unavailable(format!("Failed to open temp DB: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| StoreError::Unavailable(format!("Failed to open tree {}: {}", name, e)))
        };
        Ok(Self {
            watchlist: tree(WATCHLIST)?,
            sightings: tree(SIGHTINGS)?,
            violations: tree(VIOLATIONS)?,
            officers: tree(OFFICERS)?,
            alerts: tree(ALERTS)?,
            sessions: tree(SESSIONS)?,
            session_index: tree(SESSION_INDEX)?,
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("sled write lock poisoned".to_string()))
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Unavailable(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

// ============================================================================
// ENCODING HELPERS
// ============================================================================

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn put<K: AsRef<[u8]>, T: Serialize>(tree: &sled::Tree, key: K, value: &T) -> Result<(), StoreError> {
    tree.insert(key, encode(value)?)
        .map_err(|e| StoreError::Unavailable(format!("Insert failed: {}", e)))?;
    Ok(())
}

fn get<K: AsRef<[u8]>, T: DeserializeOwned>(tree: &sled::Tree, key: K) -> Result<Option<T>, StoreError> {
    match tree
        .get(key)
        .map_err(|e| StoreError::Unavailable(format!("Get failed: {}", e)))?
    {
        Some(bytes) => decode(&bytes).map(Some),
        None => Ok(None),
    }
}

/// Decode every value in a tree, keeping those matching `keep`.
fn scan<T: DeserializeOwned>(
    tree: &sled::Tree,
    mut keep: impl FnMut(&T) -> bool,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for result in tree.iter() {
        let (_, bytes) =
            result.map_err(|e| StoreError::Unavailable(format!("Iteration failed: {}", e)))?;
        let value: T = decode(&bytes)?;
        if keep(&value) {
            out.push(value);
        }
    }
    Ok(out)
}

// ============================================================================
// STORE IMPL
// ============================================================================

impl SightingStore for SledStore {
    fn insert_watchlist_entry(&self, entry: &WatchlistEntry) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        if get::<_, WatchlistEntry>(&self.watchlist, entry.id.as_bytes())?.is_some() {
            return Err(StoreError::Conflict(format!("watchlist entry {} exists", entry.id)));
        }
        put(&self.watchlist, entry.id.as_bytes(), entry)?;
        self.flush()
    }

    fn active_watchlist_by_plate(&self, plate: &str) -> Result<Vec<WatchlistEntry>, StoreError> {
        let mut hits = scan(&self.watchlist, |e: &WatchlistEntry| {
            e.plate == plate && e.status == WatchlistStatus::Active
        })?;
        hits.sort_by_key(|e| std::cmp::Reverse(e.registered_at_ms));
        Ok(hits)
    }

    fn active_watchlist(&self) -> Result<Vec<WatchlistEntry>, StoreError> {
        let mut entries =
            scan(&self.watchlist, |e: &WatchlistEntry| e.status == WatchlistStatus::Active)?;
        entries.sort_by_key(|e| std::cmp::Reverse(e.registered_at_ms));
        Ok(entries)
    }

    fn transition_watchlist(
        &self,
        id: Uuid,
        next: WatchlistStatus,
    ) -> Result<WatchlistEntry, StoreError> {
        let _guard = self.lock()?;
        let mut entry: WatchlistEntry = get(&self.watchlist, id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(format!("watchlist entry {}", id)))?;
        check_watchlist_transition(entry.status, next)?;
        entry.status = next;
        put(&self.watchlist, id.as_bytes(), &entry)?;
        self.flush()?;
        Ok(entry)
    }

    fn insert_sighting(&self, sighting: &Sighting) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        put(&self.sightings, sighting.id.as_bytes(), sighting)?;
        self.flush()
    }

    fn sighting_count(&self, entry_id: Uuid) -> Result<usize, StoreError> {
        Ok(scan(&self.sightings, |s: &Sighting| s.watchlist_entry_id == Some(entry_id))?.len())
    }

    fn recent_sightings(&self, entry_id: Uuid, limit: usize) -> Result<Vec<Sighting>, StoreError> {
        let mut sightings =
            scan(&self.sightings, |s: &Sighting| s.watchlist_entry_id == Some(entry_id))?;
        sightings.sort_by_key(|s| std::cmp::Reverse(s.timestamp_ms));
        sightings.truncate(limit);
        Ok(sightings)
    }

    fn insert_violation(&self, entry: &ViolationEntry) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        if get::<_, ViolationEntry>(&self.violations, &entry.plate)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "plate {} already on violation list",
                entry.plate
            )));
        }
        put(&self.violations, &entry.plate, entry)?;
        self.flush()
    }

    fn violation_by_plate(&self, plate: &str) -> Result<Option<ViolationEntry>, StoreError> {
        get(&self.violations, plate)
    }

    fn violations(&self) -> Result<Vec<ViolationEntry>, StoreError> {
        // Keys are plates, so iteration order is already sorted
        scan(&self.violations, |_: &ViolationEntry| true)
    }

    fn upsert_officer(&self, officer: &OfficerState) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        put(&self.officers, &officer.officer_id, officer)?;
        self.flush()
    }

    fn on_duty_officers(&self) -> Result<Vec<OfficerState>, StoreError> {
        scan(&self.officers, |o: &OfficerState| o.on_duty)
    }

    fn insert_alert(&self, alert: &InterceptAlert) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        put(&self.alerts, alert.id.as_bytes(), alert)?;
        self.flush()
    }

    fn transition_alert(
        &self,
        id: Uuid,
        next: AlertStatus,
        at_ms: i64,
    ) -> Result<InterceptAlert, StoreError> {
        let _guard = self.lock()?;
        let mut alert: InterceptAlert = get(&self.alerts, id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(format!("alert {}", id)))?;
        check_alert_transition(alert.status, next)?;
        alert.status = next;
        if next == AlertStatus::Acknowledged {
            alert.acknowledged_at_ms = Some(at_ms);
        }
        put(&self.alerts, id.as_bytes(), &alert)?;
        self.flush()?;
        Ok(alert)
    }

    fn alerts(
        &self,
        officer_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<InterceptAlert>, StoreError> {
        let mut alerts = scan(&self.alerts, |a: &InterceptAlert| {
            officer_id.map_or(true, |id| a.officer_id == id)
        })?;
        alerts.sort_by_key(|a| std::cmp::Reverse(a.generated_at_ms));
        alerts.truncate(limit);
        Ok(alerts)
    }

    fn latest_alert_for(
        &self,
        officer_id: &str,
        plate: &str,
    ) -> Result<Option<InterceptAlert>, StoreError> {
        let alerts = scan(&self.alerts, |a: &InterceptAlert| {
            a.officer_id == officer_id && a.plate == plate
        })?;
        Ok(alerts.into_iter().max_by_key(|a| a.generated_at_ms))
    }

    fn expire_alerts(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
        let _guard = self.lock()?;
        let stale = scan(&self.alerts, |a: &InterceptAlert| {
            a.status == AlertStatus::Pending && a.generated_at_ms < cutoff_ms
        })?;
        for mut alert in stale.iter().cloned() {
            alert.status = AlertStatus::Expired;
            put(&self.alerts, alert.id.as_bytes(), &alert)?;
        }
        if !stale.is_empty() {
            self.flush()?;
        }
        Ok(stale.len())
    }

    fn update_latest_session(
        &self,
        plate: &str,
        update: SessionUpdate<'_>,
    ) -> Result<TrackingSession, StoreError> {
        let _guard = self.lock()?;
        let current = match self
            .session_index
            .get(plate)
            .map_err(|e| StoreError::Unavailable(format!("Get failed: {}", e)))?
        {
            Some(id) => get(&self.sessions, id)?,
            None => None,
        };

        let session = update(current.clone());
        put(&self.sessions, session.id.as_bytes(), &session)?;
        if supersedes(current.as_ref(), &session) {
            self.session_index
                .insert(plate, &session.id.as_bytes()[..])
                .map_err(|e| StoreError::Unavailable(format!("Insert failed: {}", e)))?;
        }
        self.flush()?;
        Ok(session)
    }

    fn latest_session(&self, plate: &str) -> Result<Option<TrackingSession>, StoreError> {
        match self
            .session_index
            .get(plate)
            .map_err(|e| StoreError::Unavailable(format!("Get failed: {}", e)))?
        {
            Some(id) => get(&self.sessions, id),
            None => Ok(None),
        }
    }
}
