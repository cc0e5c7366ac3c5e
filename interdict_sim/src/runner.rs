//! Scenario runner - drives the full pipeline against synthetic traffic.
//!
//! Each run builds a fresh world: virtual clock, store, channel registry,
//! dispatch loop and pipeline. Identification events are processed on
//! blocking worker threads exactly as a perception front-end would, while
//! the dispatch loop lives on the tokio runtime that owns the channels.

use crate::context::SimContext;
use crate::error::SimError;
use crate::scenarios::ScenarioId;
use crate::traffic::{project, Camera, TrafficGenerator};

use interdict_core::model::{
    CaseType, NewWatchlistEntry, Priority, Severity, ViolationEntry, ViolationType,
};
use interdict_core::{
    ChannelRegistry, DispatchMonitor, DispatchStats, EventDispatcher, IdentificationEvent,
    InterdictConfig, MemoryStore, OfficerState, Pipeline, PipelineReport, SightingStore,
    SledStore,
};
use interdict_env::{ClientId, InterdictContext, MpscChannel};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// How long to wait for the dispatch loop to drain after a run.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Identification events pushed through the pipeline
    pub events_processed: u64,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    fn aborted(scenario: ScenarioId, seed: u64, error: SimError) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            events_processed: 0,
            final_time_secs: 0.0,
            failure_reason: Some(error.to_string()),
            metrics: ScenarioMetrics::default(),
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    pub watchlist_hits: u64,
    pub intercept_alerts: u64,
    pub path_updates: u64,
    pub sessions_started: u64,
    /// Events where at least one component hit a store error
    pub component_errors: u64,
    /// Payloads received on the harness control channel
    pub control_messages: u64,
    /// Payloads received across harness officer channels
    pub officer_messages: u64,
    pub dispatch: DispatchStats,
}

/// Runs scenarios.
pub struct ScenarioRunner {
    seed: u64,
    config: InterdictConfig,
    /// Parent directory for per-run sled stores; in-memory when unset
    store_dir: Option<PathBuf>,
    gps_noise_std_m: f64,
    background_vehicles: usize,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: InterdictConfig::default(),
            store_dir: None,
            gps_noise_std_m: 3.0,
            background_vehicles: 20,
        }
    }

    /// Persist each run in its own sled database under `dir`.
    pub fn with_store(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    pub fn with_config(mut self, config: InterdictConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the per-axis GPS jitter in meters.
    pub fn with_gps_noise(mut self, std_m: f64) -> Self {
        self.gps_noise_std_m = std_m;
        self
    }

    /// Runs a scenario and returns the result.
    ///
    /// Builds its own tokio runtime; must not be called from inside one.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let outcome = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(SimError::from)
            .and_then(|rt| rt.block_on(self.run_async(scenario)));

        match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(scenario = %scenario, error = %e, "Scenario aborted");
                ScenarioResult::aborted(scenario, self.seed, e)
            }
        }
    }

    async fn run_async(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        let mut world = World::build(self, scenario).await?;

        let failures = match scenario {
            ScenarioId::WatchlistHit => self.run_watchlist_hit(&mut world).await?,
            ScenarioId::MakeMismatch => self.run_make_mismatch(&mut world).await?,
            ScenarioId::Intercept => self.run_intercept(&mut world).await?,
            ScenarioId::CrossCamera => self.run_cross_camera(&mut world).await?,
            ScenarioId::WindowLapse => self.run_window_lapse(&mut world).await?,
            ScenarioId::ChannelChurn => self.run_channel_churn(&mut world).await?,
        };

        let passed = failures.is_empty();
        info!(
            "Scenario {} complete: {} events, {} alerts, {} delivered",
            scenario.name(),
            world.events,
            world.metrics.intercept_alerts,
            world.metrics.dispatch.delivered
        );

        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            events_processed: world.events,
            final_time_secs: world.ctx.now().as_secs_f64(),
            failure_reason: (!passed).then(|| failures.join("; ")),
            metrics: world.metrics,
        })
    }

    fn open_store(&self, scenario: ScenarioId) -> Result<Arc<dyn SightingStore>, SimError> {
        match &self.store_dir {
            Some(dir) => {
                let path = dir.join(format!("{}-{}", scenario.name(), self.seed));
                // Scratch space owned by the harness; start clean every run
                if path.exists() {
                    std::fs::remove_dir_all(&path)?;
                }
                debug!(path = %path.display(), "Opening sled store");
                Ok(Arc::new(SledStore::open(&path)?))
            }
            None => Ok(Arc::new(MemoryStore::new())),
        }
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// A stolen vehicle passes one camera amid background traffic.
    async fn run_watchlist_hit(&self, world: &mut World) -> Result<Vec<String>, SimError> {
        world.start_dispatch();
        let plate = world.traffic.plate();
        world.pipeline()?.watchlist().register(watch_request(&plate, "Maruti Suzuki", self.seed))?;

        let mut events: Vec<IdentificationEvent> = world
            .traffic
            .background(&world.cameras, self.background_vehicles)
            .into_iter()
            .filter(|e| e.plate != plate)
            .collect();
        let at = world.traffic.between(0.0, events.len() as f64 + 1.0) as usize;
        let camera = world.cameras[at % world.cameras.len()].clone();
        let target = world.traffic.observe(&plate, "MARUTI", "Swift", &camera);
        events.insert(at.min(events.len()), target);

        for event in events {
            world.process(event).await?;
            world.ctx.advance_time(Duration::from_secs(5));
        }
        world.finish().await?;

        let control = drain(&mut world.control_rx);
        world.metrics.control_messages = control.len() as u64;

        let mut failures = Vec::new();
        expect(&mut failures, world.metrics.watchlist_hits == 1, || {
            format!("expected 1 watchlist hit, got {}", world.metrics.watchlist_hits)
        });
        expect(&mut failures, count_type(&control, "CRITICAL_VEHICLE_DETECTED") == 1, || {
            "control channel did not receive exactly one CRITICAL_VEHICLE_DETECTED".to_string()
        });
        Ok(failures)
    }

    /// Watchlisted plate on a different make must stay silent.
    async fn run_make_mismatch(&self, world: &mut World) -> Result<Vec<String>, SimError> {
        world.start_dispatch();
        let plate = world.traffic.plate();
        world.pipeline()?.watchlist().register(watch_request(&plate, "Toyota", self.seed))?;

        let cameras = world.cameras.clone();
        for camera in cameras.iter().take(2) {
            let event = world.traffic.observe(&plate, "Honda", "City", camera);
            world.process(event).await?;
            world.ctx.advance_time(Duration::from_secs(90));
        }
        world.finish().await?;

        let control = drain(&mut world.control_rx);
        world.metrics.control_messages = control.len() as u64;

        let mut failures = Vec::new();
        expect(&mut failures, world.metrics.watchlist_hits == 0, || {
            format!("mismatched make produced {} hits", world.metrics.watchlist_hits)
        });
        expect(&mut failures, count_type(&control, "CRITICAL_VEHICLE_DETECTED") == 0, || {
            "mismatched make reached the control channel".to_string()
        });
        Ok(failures)
    }

    /// Officers at 80 m, 300 m on axis, 300 m off axis and 600 m.
    async fn run_intercept(&self, world: &mut World) -> Result<Vec<String>, SimError> {
        world.start_dispatch();
        let plate = world.traffic.plate();
        world.pipeline()?.proximity().add_violation(violation(&plate))?;

        let camera = world.cameras[1].clone();
        let theta = world.traffic.bearing();
        let jitter = world.traffic.between(-20.0, 20.0);
        // (id, bearing from vehicle, distance, heading, expect alert)
        let layout = [
            ("OFF-NEAR", theta + 90.0, 80.0, theta + 180.0, true),
            ("OFF-AXIS", theta, 300.0, theta + jitter, true),
            ("OFF-AWAY", theta, 300.0, theta + 180.0, false),
            ("OFF-FAR", theta + 200.0, 600.0, theta + 200.0, false),
        ];

        let mut receivers = Vec::new();
        for (id, bearing, distance, heading, expected) in layout {
            let rx = world.register_officer(id).await;
            let speed = world.traffic.between(0.0, 15.0);
            world.pipeline()?.proximity().upsert_officer(OfficerState {
                officer_id: id.to_string(),
                location: project(camera.location, bearing, distance),
                heading_deg: heading.rem_euclid(360.0),
                speed_mps: speed,
                on_duty: true,
                last_updated_ms: 0,
            })?;
            receivers.push((id, rx, expected));
        }

        let (make, model) = world.traffic.vehicle();
        let event = world.traffic.observe(&plate, make, model, &camera);
        world.process(event).await?;
        world.finish().await?;

        let mut failures = Vec::new();
        expect(&mut failures, world.metrics.intercept_alerts == 2, || {
            format!("expected 2 intercept alerts, got {}", world.metrics.intercept_alerts)
        });
        for (id, mut rx, expected) in receivers {
            let got = count_type(&drain(&mut rx), "INTERCEPT_ALERT");
            world.metrics.officer_messages += got as u64;
            expect(&mut failures, (got == 1) == expected, || {
                format!("{} received {} alerts, expected {}", id, got, u8::from(expected))
            });
        }
        Ok(failures)
    }

    /// One vehicle crosses three cameras and comes back to the first.
    async fn run_cross_camera(&self, world: &mut World) -> Result<Vec<String>, SimError> {
        world.start_dispatch();
        let plate = world.traffic.plate();
        let (make, model) = world.traffic.vehicle();
        let route = [0usize, 1, 2, 0];

        let mut last = None;
        for idx in route {
            let camera = world.cameras[idx].clone();
            let event = world.traffic.observe(&plate, make, model, &camera);
            last = Some(world.process(event).await?);
            let gap = world.traffic.between(120.0, 300.0);
            world.ctx.advance_time(Duration::from_secs_f64(gap));
        }
        world.finish().await?;

        let control = drain(&mut world.control_rx);
        world.metrics.control_messages = control.len() as u64;

        let mut failures = Vec::new();
        expect(&mut failures, world.metrics.sessions_started == 1, || {
            format!("expected 1 session, got {}", world.metrics.sessions_started)
        });
        expect(&mut failures, world.metrics.path_updates == 3, || {
            format!("expected 3 path updates, got {}", world.metrics.path_updates)
        });
        match last.map(|r| r.track) {
            Some(Ok(track)) => {
                expect(&mut failures, track.session.camera_count == 3, || {
                    format!("expected 3 cameras, got {}", track.session.camera_count)
                });
                expect(&mut failures, track.session.path.len() == 4, || {
                    format!("expected path of 4, got {}", track.session.path.len())
                });
            }
            _ => failures.push("final sighting was not tracked".to_string()),
        }
        expect(&mut failures, count_type(&control, "VEHICLE_PATH_UPDATE") == 3, || {
            "control channel did not receive 3 VEHICLE_PATH_UPDATE".to_string()
        });
        Ok(failures)
    }

    /// A sighting after the session window opens a disjoint session.
    async fn run_window_lapse(&self, world: &mut World) -> Result<Vec<String>, SimError> {
        world.start_dispatch();
        let plate = world.traffic.plate();
        let (make, model) = world.traffic.vehicle();

        let first = world.cameras[0].clone();
        let event = world.traffic.observe(&plate, make, model, &first);
        world.process(event).await?;

        let lapse = self.config.reid.session_window + Duration::from_secs(60);
        world.ctx.advance_time(lapse);

        let second = world.cameras[1].clone();
        let event = world.traffic.observe(&plate, make, model, &second);
        world.process(event).await?;

        let latest = world.pipeline()?.tracker().latest_session(&plate)?;
        world.finish().await?;

        let mut failures = Vec::new();
        expect(&mut failures, world.metrics.sessions_started == 2, || {
            format!("expected 2 sessions, got {}", world.metrics.sessions_started)
        });
        expect(&mut failures, world.metrics.path_updates == 0, || {
            format!("lapsed sightings produced {} path updates", world.metrics.path_updates)
        });
        expect(&mut failures, latest.map_or(0, |s| s.path.len()) == 1, || {
            "latest session should hold only the second sighting".to_string()
        });
        Ok(failures)
    }

    /// Dead channels are evicted; healthy ones keep receiving.
    async fn run_channel_churn(&self, world: &mut World) -> Result<Vec<String>, SimError> {
        let plate = world.traffic.plate();
        world.pipeline()?.proximity().add_violation(violation(&plate))?;
        let camera = world.cameras[2].clone();

        // Dispatch loop not running yet: this broadcast is dropped
        world.pipeline()?.proximity().upsert_officer(officer_near(&camera, "OFF-DEAD", 0.0))?;

        let (dead_dash, dead_dash_rx) = MpscChannel::pair("control:dead");
        drop(dead_dash_rx);
        world
            .registry
            .register_control(ClientId::from_seed(self.seed.wrapping_add(1)), Arc::new(dead_dash))
            .await;
        let dead_officer_rx = world.register_officer("OFF-DEAD").await;
        drop(dead_officer_rx);
        let mut live_rx = world.register_officer("OFF-LIVE").await;

        world.start_dispatch();
        world.pipeline()?.proximity().upsert_officer(officer_near(&camera, "OFF-LIVE", 180.0))?;

        let (make, model) = world.traffic.vehicle();
        for _ in 0..2 {
            let event = world.traffic.observe(&plate, make, model, &camera);
            world.process(event).await?;
            world.ctx.advance_time(Duration::from_secs(10));
        }
        world.finish().await?;

        let live = count_type(&drain(&mut live_rx), "INTERCEPT_ALERT");
        world.metrics.officer_messages = live as u64;
        let control = drain(&mut world.control_rx);
        world.metrics.control_messages = control.len() as u64;
        let stats = world.metrics.dispatch;

        let mut failures = Vec::new();
        expect(&mut failures, stats.evicted == 2, || {
            format!("expected 2 evictions, got {}", stats.evicted)
        });
        expect(&mut failures, stats.dropped >= 1, || {
            "broadcast before dispatch start was not dropped".to_string()
        });
        expect(&mut failures, live == 2, || {
            format!("live officer received {} alerts, expected 2", live)
        });
        expect(&mut failures, count_type(&control, "OFFICER_LOCATION_UPDATE") == 1, || {
            "healthy dashboard missed the officer update".to_string()
        });
        let controls = world.registry.control_count().await;
        let officers = world.registry.officer_count().await;
        expect(&mut failures, controls == 1 && officers == 1, || {
            format!("registry left with {} control / {} officer channels", controls, officers)
        });
        Ok(failures)
    }
}

// ============================================================================
// WORLD
// ============================================================================

/// Everything one scenario run owns.
struct World {
    ctx: Arc<SimContext>,
    pipeline: Option<Arc<Pipeline<SimContext>>>,
    dispatcher: Option<EventDispatcher>,
    registry: Arc<ChannelRegistry>,
    monitor: DispatchMonitor,
    control_rx: UnboundedReceiver<String>,
    traffic: TrafficGenerator,
    cameras: Vec<Camera>,
    metrics: ScenarioMetrics,
    events: u64,
}

impl World {
    async fn build(runner: &ScenarioRunner, scenario: ScenarioId) -> Result<Self, SimError> {
        let ctx = SimContext::shared(runner.seed);
        let store = runner.open_store(scenario)?;
        let registry = Arc::new(ChannelRegistry::new());

        let (dispatcher, handle) = EventDispatcher::new(&runner.config.dispatch, Arc::clone(&registry));
        let monitor = handle.monitor();

        let (control, control_rx) = MpscChannel::pair("control:sim");
        registry
            .register_control(ClientId::from_seed(runner.seed), Arc::new(control))
            .await;

        let pipeline = Pipeline::new(Arc::clone(&ctx), &runner.config, store, Arc::new(handle))?;
        let traffic = TrafficGenerator::new(ctx.rng_for(1), runner.gps_noise_std_m)?;
        let cameras = traffic.corridor(4, 600.0);

        Ok(Self {
            ctx,
            pipeline: Some(Arc::new(pipeline)),
            dispatcher: Some(dispatcher),
            registry,
            monitor,
            control_rx,
            traffic,
            cameras,
            metrics: ScenarioMetrics::default(),
            events: 0,
        })
    }

    fn pipeline(&self) -> Result<&Arc<Pipeline<SimContext>>, SimError> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| SimError::Runtime("pipeline already shut down".to_string()))
    }

    fn start_dispatch(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.spawn(self.ctx.as_ref());
        }
    }

    async fn register_officer(&self, officer_id: &str) -> UnboundedReceiver<String> {
        let (channel, rx) = MpscChannel::pair(format!("officer:{}", officer_id));
        self.registry.register_officer(officer_id, Arc::new(channel)).await;
        rx
    }

    /// Process one event on a blocking worker, the way the perception side does.
    async fn process(&mut self, event: IdentificationEvent) -> Result<PipelineReport, SimError> {
        let pipeline = Arc::clone(self.pipeline()?);
        let report = tokio::task::spawn_blocking(move || pipeline.process(event))
            .await
            .map_err(|e| SimError::Runtime(format!("worker failed: {}", e)))??;

        self.events += 1;
        if report.is_watchlist_hit() {
            self.metrics.watchlist_hits += 1;
        }
        self.metrics.intercept_alerts += report.alert_count() as u64;
        if let Ok(track) = &report.track {
            if track.started {
                self.metrics.sessions_started += 1;
            }
            if track.path_broadcast {
                self.metrics.path_updates += 1;
            }
        }
        if report.has_errors() {
            self.metrics.component_errors += 1;
        }
        Ok(report)
    }

    /// Shut the pipeline down and wait for the dispatch loop to drain.
    async fn finish(&mut self) -> Result<(), SimError> {
        self.pipeline = None;
        self.dispatcher = None;

        let started = Instant::now();
        while self.monitor.is_active() {
            if started.elapsed() > DRAIN_TIMEOUT {
                return Err(SimError::Runtime("dispatch loop did not drain".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.metrics.dispatch = self.monitor.stats();
        Ok(())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn watch_request(plate: &str, make: &str, seed: u64) -> NewWatchlistEntry {
    NewWatchlistEntry {
        plate: plate.to_string(),
        make: make.to_string(),
        model: "Swift".to_string(),
        case_type: CaseType::Stolen,
        case_number: format!("FIR-{:04}", seed % 10_000),
        priority: Priority::Critical,
        registered_by: "sim".to_string(),
    }
}

fn violation(plate: &str) -> ViolationEntry {
    ViolationEntry {
        plate: plate.to_string(),
        violation_type: ViolationType::UnpaidFine,
        description: "Simulated outstanding challans".to_string(),
        severity: Severity::Medium,
        added_at_ms: 0,
    }
}

fn officer_near(camera: &Camera, officer_id: &str, bearing: f64) -> OfficerState {
    OfficerState {
        officer_id: officer_id.to_string(),
        location: project(camera.location, bearing, 50.0),
        heading_deg: 0.0,
        speed_mps: 0.0,
        on_duty: true,
        last_updated_ms: 0,
    }
}

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        match serde_json::from_str(&raw) {
            Ok(value) => out.push(value),
            Err(e) => warn!(error = %e, "Unparseable payload on harness channel"),
        }
    }
    out
}

fn count_type(payloads: &[serde_json::Value], kind: &str) -> usize {
    payloads.iter().filter(|p| p["type"] == kind).count()
}

fn expect(failures: &mut Vec<String>, ok: bool, reason: impl FnOnce() -> String) {
    if !ok {
        failures.push(reason());
    }
}
