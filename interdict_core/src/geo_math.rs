//! The "GEO" Engine - great-circle math for intercept decisions
//!
//! Everything here is pure and allocation-free apart from `path_length`:
//! - Haversine distance on a spherical Earth (R = 6 371 000 m)
//! - Initial forward azimuth (bearing) between two fixes
//! - Wraparound-aware approach test between two headings
//! - 8-point compass labels for officer-facing payloads
//! - Straight-line dead reckoning from two timed fixes

use geo::{HaversineLength, LineString, Point};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

const COMPASS_POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// A validated WGS84 fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Create a location, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::InvalidLongitude(longitude));
        }
        Ok(Self { latitude, longitude })
    }

    /// Re-check a location that may have been built with a struct literal
    /// or deserialized from an untrusted source.
    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::new(self.latitude, self.longitude).map(|_| ())
    }

    /// Great-circle distance to another fix, in meters.
    pub fn distance_to(&self, other: &Location) -> f64 {
        distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Initial bearing toward another fix, in degrees [0, 360).
    pub fn bearing_to(&self, other: &Location) -> f64 {
        bearing(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

impl From<Location> for Point<f64> {
    fn from(loc: Location) -> Self {
        // geo uses (x = lon, y = lat)
        Point::new(loc.longitude, loc.latitude)
    }
}

/// Haversine great-circle distance in meters.
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Clamp guards against a > 1.0 from rounding on antipodal points
    let a = a.clamp(0.0, 1.0);

    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Initial bearing (forward azimuth) from point 1 toward point 2.
///
/// Returns degrees in [0, 360). Not symmetric: `bearing(a, b)` and
/// `bearing(b, a)` differ by roughly 180° on short hops.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let x = d_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    let deg = (x.atan2(y).to_degrees() + 360.0) % 360.0;
    // (-0.0 + 360) % 360 can land exactly on 360.0 after rounding
    if deg >= 360.0 {
        0.0
    } else {
        deg
    }
}

/// Smallest absolute difference between two bearings, in [0, 180].
pub fn angular_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// True iff the bearings differ by strictly less than `threshold_deg`.
pub fn is_approaching(source_bearing: f64, target_heading: f64, threshold_deg: f64) -> bool {
    angular_difference(source_bearing, target_heading) < threshold_deg
}

/// 8-point compass label for a bearing in degrees.
pub fn compass_label(bearing_deg: f64) -> &'static str {
    let idx = (bearing_deg / 45.0).round().rem_euclid(8.0) as usize;
    COMPASS_POINTS[idx % 8]
}

/// Project the motion between two timed fixes `ahead_s` seconds past `current`.
///
/// Velocity is taken in degrees per second, so this is only meaningful over
/// city-scale hops. A non-positive time step counts as one second. The result
/// is clamped to valid latitude and wrapped into [-180, 180] longitude.
pub fn extrapolate(
    previous: Location,
    previous_ms: i64,
    current: Location,
    current_ms: i64,
    ahead_s: f64,
) -> Location {
    let dt_ms = current_ms.saturating_sub(previous_ms);
    let dt_s = if dt_ms <= 0 { 1.0 } else { dt_ms as f64 / 1000.0 };

    let v_lat = (current.latitude - previous.latitude) / dt_s;
    let v_lon = (current.longitude - previous.longitude) / dt_s;

    let latitude = (current.latitude + v_lat * ahead_s).clamp(-90.0, 90.0);
    let mut longitude = current.longitude + v_lon * ahead_s;
    if !(-180.0..=180.0).contains(&longitude) {
        longitude = (longitude + 180.0).rem_euclid(360.0) - 180.0;
    }
    Location { latitude, longitude }
}

/// Haversine length of an ordered path, in meters.
///
/// Fewer than two points yields 0.
pub fn path_length(points: &[Location]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let line: LineString<f64> = points.iter().map(|&p| Point::<f64>::from(p)).collect::<Vec<_>>().into();
    line.haversine_length()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_distance_delhi_mumbai() {
        let d = distance(28.6139, 77.2090, 19.0760, 72.8777);
        let expected = 1_148_000.0;
        assert!((d - expected).abs() / expected < 0.01, "got {d}");
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        assert_eq!(distance(12.9716, 77.5946, 12.9716, 77.5946), 0.0);
    }

    #[test]
    fn test_cardinal_bearings() {
        assert_abs_diff_eq!(bearing(0.0, 0.0, 1.0, 0.0), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(0.0, 0.0, 0.0, 1.0), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(1.0, 0.0, 0.0, 0.0), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(0.0, 1.0, 0.0, 0.0), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_approach_test() {
        assert!(is_approaching(180.0, 180.0, 45.0));
        assert!(!is_approaching(0.0, 180.0, 45.0));
        // wraparound
        assert!(is_approaching(350.0, 10.0, 45.0));
        // strictly less than threshold
        assert!(!is_approaching(0.0, 45.0, 45.0));
    }

    #[test]
    fn test_compass_label() {
        assert_eq!(compass_label(0.0), "N");
        assert_eq!(compass_label(22.4), "N");
        assert_eq!(compass_label(22.6), "NE");
        assert_eq!(compass_label(90.0), "E");
        assert_eq!(compass_label(200.0), "S");
        assert_eq!(compass_label(315.0), "NW");
        assert_eq!(compass_label(350.0), "N");
    }

    #[test]
    fn test_location_validation() {
        assert!(Location::new(28.6, 77.2).is_ok());
        assert!(matches!(Location::new(91.0, 0.0), Err(ValidationError::InvalidLatitude(_))));
        assert!(matches!(Location::new(0.0, -180.5), Err(ValidationError::InvalidLongitude(_))));
        assert!(Location::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_path_length_matches_pairwise_distance() {
        let a = Location::new(28.6139, 77.2090).unwrap();
        let b = Location::new(28.6239, 77.2090).unwrap();
        let c = Location::new(28.6239, 77.2190).unwrap();

        assert_eq!(path_length(&[a]), 0.0);

        let expected = a.distance_to(&b) + b.distance_to(&c);
        let got = path_length(&[a, b, c]);
        // geo uses the IUGG mean radius, slightly larger than ours
        assert!((got - expected).abs() / expected < 1e-4, "got {got}, expected {expected}");
    }

    #[test]
    fn test_extrapolate_continues_straight_line() {
        let prev = Location::new(28.6000, 77.2000).unwrap();
        let cur = Location::new(28.6010, 77.2020).unwrap();
        // 60 s between fixes, project 5 minutes ahead
        let target = extrapolate(prev, 0, cur, 60_000, 300.0);
        assert_abs_diff_eq!(target.latitude, 28.6060, epsilon = 1e-9);
        assert_abs_diff_eq!(target.longitude, 77.2120, epsilon = 1e-9);
    }

    #[test]
    fn test_extrapolate_guards_zero_time_step() {
        let prev = Location::new(10.0, 20.0).unwrap();
        let cur = Location::new(10.001, 20.0).unwrap();
        // Same capture time: treated as one second apart
        let target = extrapolate(prev, 5_000, cur, 5_000, 10.0);
        assert!(target.latitude.is_finite());
        assert_abs_diff_eq!(target.latitude, 10.011, epsilon = 1e-9);
        // Reversed order behaves the same way
        let reversed = extrapolate(prev, 9_000, cur, 5_000, 10.0);
        assert_eq!(reversed, target);
    }

    #[test]
    fn test_extrapolate_stays_on_the_globe() {
        let prev = Location::new(89.0, 179.0).unwrap();
        let cur = Location::new(89.5, 179.5).unwrap();
        let target = extrapolate(prev, 0, cur, 1_000, 10.0);
        assert!(target.validate().is_ok(), "got {target:?}");
        assert_eq!(target.latitude, 90.0);
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric(
            lat1 in -89.0f64..89.0, lon1 in -179.0f64..179.0,
            lat2 in -89.0f64..89.0, lon2 in -179.0f64..179.0,
        ) {
            let ab = distance(lat1, lon1, lat2, lon2);
            let ba = distance(lat2, lon2, lat1, lon1);
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!(ab >= 0.0);
        }

        #[test]
        fn prop_distance_to_self_is_zero(lat in -90.0f64..=90.0, lon in -180.0f64..=180.0) {
            prop_assert_eq!(distance(lat, lon, lat, lon), 0.0);
        }

        #[test]
        fn prop_bearing_in_range(
            lat1 in -89.0f64..89.0, lon1 in -179.0f64..179.0,
            lat2 in -89.0f64..89.0, lon2 in -179.0f64..179.0,
        ) {
            let b = bearing(lat1, lon1, lat2, lon2);
            prop_assert!((0.0..360.0).contains(&b));
        }

        #[test]
        fn prop_angular_difference_bounded(a in 0.0f64..360.0, b in 0.0f64..360.0) {
            let d = angular_difference(a, b);
            prop_assert!((0.0..=180.0).contains(&d));
            prop_assert!((d - angular_difference(b, a)).abs() < 1e-9);
        }
    }
}
