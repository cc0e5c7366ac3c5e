//! The "INTERCEPT" Engine - routes violation vehicles to nearby officers.
//!
//! For every identification of a plate on the violation list, each on-duty
//! officer is tested in two stages:
//!
//! 1. **Scan**: haversine distance, discarded beyond `scan_radius_m`
//! 2. **Alert**: inside `alert_radius_m` AND either approaching (bearing
//!    from vehicle to officer within `approach_angle_deg` of the officer's
//!    heading) or closer than `close_range_m`
//!
//! Every qualifying officer gets an independent, persisted alert pushed to
//! their own channel.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use interdict_env::InterdictContext;

use crate::config::ProximityConfig;
use crate::dispatch::EventSink;
use crate::error::{CoreError, StoreError, ValidationError};
use crate::events::{AlertEvent, InterceptAlertPayload, OfficerLocationUpdate};
use crate::geo_math::{compass_label, is_approaching};
use crate::model::{
    normalize_plate, AlertStatus, IdentificationEvent, InterceptAlert, OfficerState,
    ViolationEntry,
};
use crate::store::SightingStore;

/// Round to one decimal place, as persisted and pushed.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub struct ProximityAlertEngine<Ctx: InterdictContext> {
    ctx: Arc<Ctx>,
    config: ProximityConfig,
    store: Arc<dyn SightingStore>,
    sink: Arc<dyn EventSink>,
}

impl<Ctx: InterdictContext> ProximityAlertEngine<Ctx> {
    pub fn new(
        ctx: Arc<Ctx>,
        config: ProximityConfig,
        store: Arc<dyn SightingStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self { ctx, config, store, sink }
    }

    /// Scan on-duty officers for one identification.
    ///
    /// Returns the alerts generated, empty when the plate is not on the
    /// violation list or nobody qualifies.
    pub fn process(&self, event: &IdentificationEvent) -> Result<Vec<InterceptAlert>, StoreError> {
        let plate = normalize_plate(&event.plate);
        let Some(violation) = self.store.violation_by_plate(&plate)? else {
            return Ok(Vec::new());
        };
        info!(plate = %plate, violation = ?violation.violation_type, "Violation vehicle in frame");

        let now_ms = event.observed_at_ms.unwrap_or_else(|| self.ctx.unix_ms());
        let cooldown_ms = self.config.alert_cooldown.as_millis() as i64;
        let vehicle = event.location;
        let mut alerts = Vec::new();

        for officer in self.store.on_duty_officers()? {
            let distance = vehicle.distance_to(&officer.location);
            // Cheap pre-filter before any angle math
            if distance > self.config.scan_radius_m {
                continue;
            }

            let bearing = vehicle.bearing_to(&officer.location);
            let approaching =
                is_approaching(bearing, officer.heading_deg, self.config.approach_angle_deg);

            if distance > self.config.alert_radius_m {
                continue;
            }
            if !approaching && distance > self.config.close_range_m {
                debug!(
                    officer_id = %officer.officer_id,
                    plate = %plate,
                    distance_m = distance,
                    "Officer in range but not approaching"
                );
                continue;
            }

            if cooldown_ms > 0 {
                if let Some(prev) = self.store.latest_alert_for(&officer.officer_id, &plate)? {
                    if now_ms.saturating_sub(prev.generated_at_ms) < cooldown_ms {
                        debug!(officer_id = %officer.officer_id, plate = %plate, "Alert suppressed by cooldown");
                        continue;
                    }
                }
            }

            let eta = distance / officer.speed_mps.max(self.config.eta_floor_speed_mps);
            let alert = InterceptAlert {
                id: Uuid::new_v4(),
                officer_id: officer.officer_id.clone(),
                plate: plate.clone(),
                make: event.make.clone(),
                model: event.model.clone(),
                violation_type: violation.violation_type,
                location: vehicle,
                distance_m: round1(distance),
                direction: compass_label(bearing).to_string(),
                eta_s: round1(eta),
                generated_at_ms: now_ms,
                acknowledged_at_ms: None,
                status: AlertStatus::Pending,
            };
            self.store.insert_alert(&alert)?;

            self.sink.send_to_officer(
                &alert.officer_id,
                &AlertEvent::InterceptAlert(InterceptAlertPayload::from(&alert)),
            );
            info!(
                officer_id = %alert.officer_id,
                plate = %plate,
                distance_m = alert.distance_m,
                direction = %alert.direction,
                "Intercept alert issued"
            );
            alerts.push(alert);
        }

        Ok(alerts)
    }

    /// Last-value-wins officer update, then broadcast to control channels.
    pub fn upsert_officer(&self, mut officer: OfficerState) -> Result<OfficerState, CoreError> {
        officer.validate()?;
        officer.last_updated_ms = self.ctx.unix_ms();
        self.store.upsert_officer(&officer)?;

        self.sink.broadcast(&AlertEvent::OfficerLocationUpdate(
            OfficerLocationUpdate::from(&officer),
        ));
        debug!(officer_id = %officer.officer_id, on_duty = officer.on_duty, "Officer location updated");
        Ok(officer)
    }

    /// Add a plate to the violation list. A plate already present is a conflict.
    pub fn add_violation(&self, mut entry: ViolationEntry) -> Result<ViolationEntry, CoreError> {
        entry.plate = normalize_plate(&entry.plate);
        if entry.plate.is_empty() {
            return Err(ValidationError::Empty("plate").into());
        }
        entry.added_at_ms = self.ctx.unix_ms();
        self.store.insert_violation(&entry)?;
        info!(plate = %entry.plate, violation = ?entry.violation_type, "Violation added");
        Ok(entry)
    }

    /// PENDING -> ACKNOWLEDGED
    pub fn acknowledge(&self, alert_id: Uuid) -> Result<InterceptAlert, StoreError> {
        let alert = self
            .store
            .transition_alert(alert_id, AlertStatus::Acknowledged, self.ctx.unix_ms())?;
        info!(officer_id = %alert.officer_id, plate = %alert.plate, "Alert acknowledged");
        Ok(alert)
    }

    /// Expire every PENDING alert older than `ttl`. Returns how many changed.
    pub fn expire_stale(&self, ttl: Duration) -> Result<usize, StoreError> {
        let cutoff = self.ctx.unix_ms().saturating_sub(ttl.as_millis() as i64);
        let expired = self.store.expire_alerts(cutoff)?;
        if expired > 0 {
            info!(expired, "Stale alerts expired");
        }
        Ok(expired)
    }

    /// Alerts newest first, optionally for a single officer.
    pub fn alerts_for(
        &self,
        officer_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<InterceptAlert>, StoreError> {
        self.store.alerts(officer_id, limit)
    }
}
