//! ReIdentificationTracker - stitches sightings of one plate into journeys.
//!
//! A session stays open while consecutive sightings arrive within
//! `session_window` of the last one; the window rolls forward with every
//! sighting. Once the session spans `min_cameras_for_path` distinct cameras
//! the full ordered path is broadcast on every further sighting.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use interdict_env::InterdictContext;

use crate::config::ReIdConfig;
use crate::dispatch::EventSink;
use crate::error::StoreError;
use crate::events::{AlertEvent, VehiclePathUpdate};
use crate::geo_math::{path_length, Location};
use crate::model::{normalize_plate, IdentificationEvent, Sighting, TrackingSession};
use crate::store::SightingStore;

/// Result of folding one sighting into the plate's journey.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackUpdate {
    pub session: TrackingSession,
    /// True when this sighting opened a new session
    pub started: bool,
    /// True when a path update was broadcast
    pub path_broadcast: bool,
}

pub struct ReIdentificationTracker<Ctx: InterdictContext> {
    ctx: Arc<Ctx>,
    config: ReIdConfig,
    store: Arc<dyn SightingStore>,
    sink: Arc<dyn EventSink>,
}

impl<Ctx: InterdictContext> ReIdentificationTracker<Ctx> {
    pub fn new(
        ctx: Arc<Ctx>,
        config: ReIdConfig,
        store: Arc<dyn SightingStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self { ctx, config, store, sink }
    }

    /// Fold one sighting into the latest session for its plate, or start a
    /// new one if the window has lapsed.
    ///
    /// A late sighting more than `session_window` before the session started
    /// gets a disjoint session of its own; the plate's latest session stays put.
    ///
    /// Lookup, insertion and camera recount happen in a single atomic store
    /// update.
    pub fn record_sighting(&self, event: &IdentificationEvent) -> Result<TrackUpdate, StoreError> {
        let plate = normalize_plate(&event.plate);
        let timestamp_ms = event.observed_at_ms.unwrap_or_else(|| self.ctx.unix_ms());
        let window_ms = self.config.session_window.as_millis() as i64;
        let sighting = Sighting::new(
            &plate,
            &event.camera_id,
            event.location,
            event.confidence,
            timestamp_ms,
        );

        let mut started = false;
        let session = self.store.update_latest_session(&plate, &mut |current| {
            let mut session = match current {
                // Within the window of either end of the session's span
                Some(session)
                    if timestamp_ms >= session.started_at_ms.saturating_sub(window_ms)
                        && timestamp_ms <= session.last_seen_at_ms.saturating_add(window_ms) =>
                {
                    session
                }
                _ => {
                    started = true;
                    TrackingSession {
                        id: Uuid::new_v4(),
                        plate: plate.clone(),
                        started_at_ms: timestamp_ms,
                        last_seen_at_ms: timestamp_ms,
                        camera_count: 0,
                        path: Vec::new(),
                    }
                }
            };

            // Ordered by capture time, not arrival
            let idx = session
                .path
                .partition_point(|s| s.timestamp_ms <= sighting.timestamp_ms);
            session.path.insert(idx, sighting.clone());
            session.camera_count = session
                .path
                .iter()
                .map(|s| s.camera_id.as_str())
                .collect::<HashSet<_>>()
                .len();
            session.started_at_ms = session.started_at_ms.min(timestamp_ms);
            session.last_seen_at_ms = session.last_seen_at_ms.max(timestamp_ms);
            session
        })?;

        if started {
            debug!(plate = %plate, tracking_id = %session.id, "Tracking session started");
        }

        let path_broadcast = session.camera_count >= self.config.min_cameras_for_path;
        if path_broadcast {
            let points: Vec<Location> = session.path.iter().map(|s| s.location).collect();
            let length_m = path_length(&points);
            self.sink.broadcast(&AlertEvent::VehiclePathUpdate(VehiclePathUpdate::new(
                &session, length_m,
            )));
            info!(
                plate = %plate,
                sightings = session.path.len(),
                cameras = session.camera_count,
                "Path broadcast"
            );
        }

        Ok(TrackUpdate {
            session,
            started,
            path_broadcast,
        })
    }

    /// Most recently updated session for a plate, open or lapsed.
    pub fn latest_session(&self, plate: &str) -> Result<Option<TrackingSession>, StoreError> {
        self.store.latest_session(&normalize_plate(plate))
    }
}
