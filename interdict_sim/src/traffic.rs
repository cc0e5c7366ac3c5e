//! Synthetic traffic for simulation.
//!
//! Generates the camera corridor, plates, officer placements and noisy
//! identification events a perception front-end would produce:
//! - Cameras spaced along a straight road
//! - GPS jitter drawn from a zero-mean normal distribution
//! - Recognizer confidence drawn uniformly from a plausible band

use interdict_core::geo_math::EARTH_RADIUS_M;
use interdict_core::{IdentificationEvent, Location};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::error::SimError;

/// Corridor origin (Connaught Place, New Delhi).
pub const ORIGIN: Location = Location {
    latitude: 28.6315,
    longitude: 77.2167,
};

const MAKES: [(&str, &str); 6] = [
    ("Maruti Suzuki", "Swift"),
    ("Hyundai", "Creta"),
    ("Tata", "Nexon"),
    ("Mahindra", "Scorpio"),
    ("Toyota", "Innova"),
    ("Honda", "City"),
];

/// Displace a location by flat-earth offsets, fine at city scale.
pub fn offset(base: Location, north_m: f64, east_m: f64) -> Location {
    let dlat = (north_m / EARTH_RADIUS_M).to_degrees();
    let dlon = (east_m / (EARTH_RADIUS_M * base.latitude.to_radians().cos())).to_degrees();
    Location {
        latitude: base.latitude + dlat,
        longitude: base.longitude + dlon,
    }
}

/// Point at `distance_m` from `base` along `bearing_deg`.
pub fn project(base: Location, bearing_deg: f64, distance_m: f64) -> Location {
    let theta = bearing_deg.to_radians();
    offset(base, distance_m * theta.cos(), distance_m * theta.sin())
}

/// A fixed ANPR camera.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub id: String,
    pub location: Location,
}

/// Deterministic traffic generator.
pub struct TrafficGenerator {
    rng: ChaCha8Rng,
    gps_noise: Normal<f64>,
}

impl TrafficGenerator {
    /// Creates a generator; `gps_noise_std_m` is the per-axis jitter.
    pub fn new(rng: ChaCha8Rng, gps_noise_std_m: f64) -> Result<Self, SimError> {
        // Normal::new accepts a negative std_dev and mirrors the samples
        if !(gps_noise_std_m >= 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "gps noise {} must be a non-negative number of meters",
                gps_noise_std_m
            )));
        }
        let gps_noise = Normal::new(0.0, gps_noise_std_m)
            .map_err(|e| SimError::InvalidParameter(format!("gps noise {}: {}", gps_noise_std_m, e)))?;
        Ok(Self { rng, gps_noise })
    }

    /// `count` cameras heading east from `ORIGIN`, `spacing_m` apart.
    pub fn corridor(&self, count: usize, spacing_m: f64) -> Vec<Camera> {
        (0..count)
            .map(|i| Camera {
                id: format!("CAM-{:02}", i + 1),
                location: offset(ORIGIN, 0.0, i as f64 * spacing_m),
            })
            .collect()
    }

    /// Random Delhi-style plate, e.g. `DL04CK1234`.
    pub fn plate(&mut self) -> String {
        let district: u8 = self.rng.gen_range(1..=13);
        let series: String = (0..2)
            .map(|_| char::from(b'A' + self.rng.gen_range(0..26u8)))
            .collect();
        let number: u16 = self.rng.gen_range(1..=9999);
        format!("DL{:02}{}{:04}", district, series, number)
    }

    /// Random (make, model) pair.
    pub fn vehicle(&mut self) -> (&'static str, &'static str) {
        MAKES[self.rng.gen_range(0..MAKES.len())]
    }

    /// Uniform bearing in [0, 360).
    pub fn bearing(&mut self) -> f64 {
        self.rng.gen_range(0.0..360.0)
    }

    /// Uniform value in `[lo, hi)`.
    pub fn between(&mut self, lo: f64, hi: f64) -> f64 {
        self.rng.gen_range(lo..hi)
    }

    /// What a camera reports for a passing vehicle, with GPS jitter.
    pub fn observe(&mut self, plate: &str, make: &str, model: &str, camera: &Camera) -> IdentificationEvent {
        let north = self.gps_noise.sample(&mut self.rng);
        let east = self.gps_noise.sample(&mut self.rng);
        IdentificationEvent {
            plate: plate.to_string(),
            make: make.to_string(),
            model: model.to_string(),
            camera_id: camera.id.clone(),
            location: offset(camera.location, north, east),
            confidence: self.rng.gen_range(0.80..0.99),
            // Stamped by the pipeline from the virtual clock
            observed_at_ms: None,
        }
    }

    /// Background traffic: `count` random vehicles across the corridor.
    pub fn background(&mut self, cameras: &[Camera], count: usize) -> Vec<IdentificationEvent> {
        if cameras.is_empty() {
            return Vec::new();
        }
        (0..count)
            .map(|_| {
                let plate = self.plate();
                let (make, model) = self.vehicle();
                let camera = &cameras[self.rng.gen_range(0..cameras.len())];
                self.observe(&plate, make, model, camera)
            })
            .collect()
    }
}
