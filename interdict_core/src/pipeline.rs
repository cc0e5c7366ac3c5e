//! Fan-out of one identification event to every component.
//!
//! Validation happens once, up front. After that each component runs
//! independently: a store failure in one is logged and reported but never
//! stops the others.

use std::sync::Arc;
use tracing::{error, instrument};

use interdict_env::InterdictContext;

use crate::config::InterdictConfig;
use crate::dispatch::EventSink;
use crate::error::{ConfigError, StoreError, ValidationError};
use crate::model::{normalize_plate, IdentificationEvent, InterceptAlert};
use crate::proximity::ProximityAlertEngine;
use crate::reid::{ReIdentificationTracker, TrackUpdate};
use crate::store::SightingStore;
use crate::watchlist::{WatchlistHit, WatchlistMatcher};

/// Per-component outcome of one event.
#[derive(Debug)]
pub struct PipelineReport {
    pub plate: String,
    pub observed_at_ms: i64,
    pub watchlist: Result<Option<WatchlistHit>, StoreError>,
    pub intercepts: Result<Vec<InterceptAlert>, StoreError>,
    pub track: Result<TrackUpdate, StoreError>,
}

impl PipelineReport {
    pub fn is_watchlist_hit(&self) -> bool {
        matches!(self.watchlist, Ok(Some(_)))
    }

    pub fn alert_count(&self) -> usize {
        self.intercepts.as_ref().map_or(0, |a| a.len())
    }

    /// True if any component hit a store error.
    pub fn has_errors(&self) -> bool {
        self.watchlist.is_err() || self.intercepts.is_err() || self.track.is_err()
    }
}

pub struct Pipeline<Ctx: InterdictContext> {
    ctx: Arc<Ctx>,
    watchlist: WatchlistMatcher<Ctx>,
    proximity: ProximityAlertEngine<Ctx>,
    tracker: ReIdentificationTracker<Ctx>,
}

impl<Ctx: InterdictContext> Pipeline<Ctx> {
    /// Wire up all components over one store and one sink.
    pub fn new(
        ctx: Arc<Ctx>,
        config: &InterdictConfig,
        store: Arc<dyn SightingStore>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            watchlist: WatchlistMatcher::new(Arc::clone(&ctx), Arc::clone(&store), Arc::clone(&sink)),
            proximity: ProximityAlertEngine::new(
                Arc::clone(&ctx),
                config.proximity.clone(),
                Arc::clone(&store),
                Arc::clone(&sink),
            ),
            tracker: ReIdentificationTracker::new(Arc::clone(&ctx), config.reid.clone(), store, sink),
            ctx,
        })
    }

    pub fn watchlist(&self) -> &WatchlistMatcher<Ctx> {
        &self.watchlist
    }

    pub fn proximity(&self) -> &ProximityAlertEngine<Ctx> {
        &self.proximity
    }

    pub fn tracker(&self) -> &ReIdentificationTracker<Ctx> {
        &self.tracker
    }

    /// Validate, timestamp and fan out one identification event.
    ///
    /// Blocking; call from a worker thread or `spawn_blocking`.
    #[instrument(skip_all, fields(camera_id = %event.camera_id))]
    pub fn process(&self, mut event: IdentificationEvent) -> Result<PipelineReport, ValidationError> {
        event.validate()?;
        event.plate = normalize_plate(&event.plate);
        let observed_at_ms = *event.observed_at_ms.get_or_insert_with(|| self.ctx.unix_ms());

        let watchlist = self.watchlist.check_and_record(&event);
        if let Err(e) = &watchlist {
            error!(plate = %event.plate, error = %e, "Watchlist match failed");
        }

        let intercepts = self.proximity.process(&event);
        if let Err(e) = &intercepts {
            error!(plate = %event.plate, error = %e, "Proximity scan failed");
        }

        let track = self.tracker.record_sighting(&event);
        if let Err(e) = &track {
            error!(plate = %event.plate, error = %e, "Re-identification failed");
        }

        Ok(PipelineReport {
            plate: event.plate,
            observed_at_ms,
            watchlist,
            intercepts,
            track,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RecordingSink;
    use crate::geo_math::Location;
    use crate::model::{
        CaseType, NewWatchlistEntry, OfficerState, Priority, Severity, ViolationEntry,
        ViolationType,
    };
    use crate::model::{AlertStatus, Sighting, TrackingSession, WatchlistEntry, WatchlistStatus};
    use crate::store::{MemoryStore, SessionUpdate};
    use interdict_env::TokioContext;
    use uuid::Uuid;

    /// MemoryStore whose violation lookups are down.
    #[derive(Default)]
    struct ViolationsDown {
        inner: MemoryStore,
    }

    impl SightingStore for ViolationsDown {
        fn insert_watchlist_entry(&self, entry: &WatchlistEntry) -> Result<(), StoreError> {
            self.inner.insert_watchlist_entry(entry)
        }
        fn active_watchlist_by_plate(&self, plate: &str) -> Result<Vec<WatchlistEntry>, StoreError> {
            self.inner.active_watchlist_by_plate(plate)
        }
        fn active_watchlist(&self) -> Result<Vec<WatchlistEntry>, StoreError> {
            self.inner.active_watchlist()
        }
        fn transition_watchlist(
            &self,
            id: Uuid,
            next: WatchlistStatus,
        ) -> Result<WatchlistEntry, StoreError> {
            self.inner.transition_watchlist(id, next)
        }
        fn insert_sighting(&self, sighting: &Sighting) -> Result<(), StoreError> {
            self.inner.insert_sighting(sighting)
        }
        fn sighting_count(&self, entry_id: Uuid) -> Result<usize, StoreError> {
            self.inner.sighting_count(entry_id)
        }
        fn recent_sightings(&self, entry_id: Uuid, limit: usize) -> Result<Vec<Sighting>, StoreError> {
            self.inner.recent_sightings(entry_id, limit)
        }
        fn insert_violation(&self, entry: &ViolationEntry) -> Result<(), StoreError> {
            self.inner.insert_violation(entry)
        }
        fn violation_by_plate(&self, _plate: &str) -> Result<Option<ViolationEntry>, StoreError> {
            Err(StoreError::Unavailable("violation table offline".to_string()))
        }
        fn violations(&self) -> Result<Vec<ViolationEntry>, StoreError> {
            self.inner.violations()
        }
        fn upsert_officer(&self, officer: &OfficerState) -> Result<(), StoreError> {
            self.inner.upsert_officer(officer)
        }
        fn on_duty_officers(&self) -> Result<Vec<OfficerState>, StoreError> {
            self.inner.on_duty_officers()
        }
        fn insert_alert(&self, alert: &InterceptAlert) -> Result<(), StoreError> {
            self.inner.insert_alert(alert)
        }
        fn transition_alert(
            &self,
            id: Uuid,
            next: AlertStatus,
            at_ms: i64,
        ) -> Result<InterceptAlert, StoreError> {
            self.inner.transition_alert(id, next, at_ms)
        }
        fn alerts(
            &self,
            officer_id: Option<&str>,
            limit: usize,
        ) -> Result<Vec<InterceptAlert>, StoreError> {
            self.inner.alerts(officer_id, limit)
        }
        fn latest_alert_for(
            &self,
            officer_id: &str,
            plate: &str,
        ) -> Result<Option<InterceptAlert>, StoreError> {
            self.inner.latest_alert_for(officer_id, plate)
        }
        fn expire_alerts(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
            self.inner.expire_alerts(cutoff_ms)
        }
        fn update_latest_session(
            &self,
            plate: &str,
            update: SessionUpdate<'_>,
        ) -> Result<TrackingSession, StoreError> {
            self.inner.update_latest_session(plate, update)
        }
        fn latest_session(&self, plate: &str) -> Result<Option<TrackingSession>, StoreError> {
            self.inner.latest_session(plate)
        }
    }

    fn pipeline() -> (Pipeline<TokioContext>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = Pipeline::new(
            TokioContext::shared(),
            &InterdictConfig::default(),
            Arc::new(MemoryStore::new()),
            sink.clone(),
        )
        .unwrap();
        (pipeline, sink)
    }

    fn event(plate: &str, make: &str) -> IdentificationEvent {
        IdentificationEvent {
            plate: plate.into(),
            make: make.into(),
            model: "Nexon".into(),
            camera_id: "CAM-3".into(),
            location: Location { latitude: 19.0760, longitude: 72.8777 },
            confidence: 0.9,
            observed_at_ms: None,
        }
    }

    #[test]
    fn test_event_reaches_every_component() {
        let (pipeline, sink) = pipeline();
        pipeline
            .watchlist()
            .register(NewWatchlistEntry {
                plate: "MH01ZZ9999".into(),
                make: "Tata".into(),
                model: "Nexon".into(),
                case_type: CaseType::HitAndRun,
                case_number: "HR-77".into(),
                priority: Priority::High,
                registered_by: "control".into(),
            })
            .unwrap();
        pipeline
            .proximity()
            .add_violation(ViolationEntry {
                plate: "MH01ZZ9999".into(),
                violation_type: ViolationType::SuspendedRegistration,
                description: String::new(),
                severity: Severity::High,
                added_at_ms: 0,
            })
            .unwrap();
        pipeline
            .proximity()
            .upsert_officer(OfficerState {
                officer_id: "OFF-1".into(),
                location: Location { latitude: 19.0761, longitude: 72.8777 },
                heading_deg: 0.0,
                speed_mps: 0.0,
                on_duty: true,
                last_updated_ms: 0,
            })
            .unwrap();

        let report = pipeline.process(event("mh01 zz 9999", "TATA MOTORS")).unwrap();
        assert_eq!(report.plate, "MH01ZZ9999");
        assert!(report.is_watchlist_hit());
        assert_eq!(report.alert_count(), 1);
        assert!(!report.has_errors());

        let track = report.track.unwrap();
        assert!(track.started);
        assert_eq!(track.session.last_seen_at_ms, report.observed_at_ms);
        assert_eq!(sink.officer_events().len(), 1);
    }

    #[test]
    fn test_store_failure_stays_with_its_component() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = Pipeline::new(
            TokioContext::shared(),
            &InterdictConfig::default(),
            Arc::new(ViolationsDown::default()),
            sink.clone(),
        )
        .unwrap();
        pipeline
            .watchlist()
            .register(NewWatchlistEntry {
                plate: "MH02AB4321".into(),
                make: "Tata".into(),
                model: "Nexon".into(),
                case_type: CaseType::Stolen,
                case_number: "ST-19".into(),
                priority: Priority::Critical,
                registered_by: "control".into(),
            })
            .unwrap();

        let report = pipeline.process(event("MH02AB4321", "Tata")).unwrap();
        assert!(matches!(report.intercepts, Err(StoreError::Unavailable(_))));
        assert_eq!(report.alert_count(), 0);
        assert!(report.has_errors());

        // The other components ran to completion
        assert!(report.is_watchlist_hit());
        let track = report.track.as_ref().unwrap();
        assert!(track.started);
        assert_eq!(sink.control_events().len(), 1);
        assert!(pipeline.tracker().latest_session("MH02AB4321").unwrap().is_some());
    }

    #[test]
    fn test_invalid_event_rejected_before_any_component() {
        let (pipeline, _) = pipeline();
        let mut bad = event("MH01ZZ9999", "Tata");
        bad.location.longitude = 200.0;

        let err = pipeline.process(bad).unwrap_err();
        assert_eq!(err, ValidationError::InvalidLongitude(200.0));
        assert!(pipeline.tracker().latest_session("MH01ZZ9999").unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = InterdictConfig::default();
        config.reid.min_cameras_for_path = 0;
        let result = Pipeline::new(
            TokioContext::shared(),
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingSink::default()),
        );
        assert!(matches!(result, Err(ConfigError::Zero("min_cameras_for_path"))));
    }
}
