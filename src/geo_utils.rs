//! Geographic utilities.
//!
//! Great-circle distances go through the `geo` crate. Algorithms that need a
//! Euclidean space (Kalman smoothing, perpendicular distances) work in a local
//! tangent plane anchored at a reference point; at trip scale the projection
//! error is far below GPS noise.

use geo::{Distance, Haversine};

use crate::Point;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters.
pub fn haversine_distance(p1: &Point, p2: &Point) -> f64 {
    let point1 = geo::Point::new(p1.longitude(), p1.latitude());
    let point2 = geo::Point::new(p2.longitude(), p2.latitude());
    Haversine::distance(point1, point2)
}

/// Total distance along a path in meters.
pub fn polyline_length(points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Equirectangular projection to meters around an anchor.
///
/// `x` grows east, `y` grows north.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    anchor_lat: f64,
    anchor_lng: f64,
    meters_per_deg_lat: f64,
    meters_per_deg_lng: f64,
}

impl LocalProjection {
    pub fn new(anchor_lat: f64, anchor_lng: f64) -> Self {
        let meters_per_deg_lat = EARTH_RADIUS_M.to_radians();
        // Clamp so polar anchors don't collapse the x axis
        let meters_per_deg_lng = meters_per_deg_lat * anchor_lat.to_radians().cos().max(1e-6);
        Self {
            anchor_lat,
            anchor_lng,
            meters_per_deg_lat,
            meters_per_deg_lng,
        }
    }

    /// Projection anchored at a point.
    pub fn around(point: &Point) -> Self {
        Self::new(point.latitude(), point.longitude())
    }

    /// Point position as `[x, y]` meters.
    pub fn project(&self, point: &Point) -> [f64; 2] {
        [
            (point.longitude() - self.anchor_lng) * self.meters_per_deg_lng,
            (point.latitude() - self.anchor_lat) * self.meters_per_deg_lat,
        ]
    }

    /// `[x, y]` meters back to `(latitude, longitude)`.
    pub fn unproject(&self, xy: [f64; 2]) -> (f64, f64) {
        (
            self.anchor_lat + xy[1] / self.meters_per_deg_lat,
            self.anchor_lng + xy[0] / self.meters_per_deg_lng,
        )
    }
}

/// Arithmetic mean and population standard deviation.
pub(crate) fn mean_std(values: impl Iterator<Item = f64> + Clone) -> Option<(f64, f64)> {
    let count = values.clone().count();
    if count == 0 {
        return None;
    }
    let mean = values.clone().sum::<f64>() / count as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    Some((mean, var.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::DateTime;

    fn point(lat: f64, lng: f64) -> Point {
        Point::new(lat, lng, DateTime::from_timestamp(0, 0).unwrap())
    }

    #[test]
    fn test_haversine_distance() {
        let london = point(51.5074, -0.1278);
        let paris = point(48.8566, 2.3522);
        let distance = haversine_distance(&london, &paris);
        assert!(distance > 340_000.0 && distance < 346_000.0);
    }

    #[test]
    fn test_projection_round_trip() {
        let projection = LocalProjection::new(51.5, -0.12);
        let p = point(51.51, -0.13);
        let xy = projection.project(&p);
        let (lat, lng) = projection.unproject(xy);
        assert_relative_eq!(lat, 51.51, epsilon = 1e-9);
        assert_relative_eq!(lng, -0.13, epsilon = 1e-9);
    }

    #[test]
    fn test_projection_matches_haversine() {
        let a = point(51.5, -0.12);
        let b = point(51.505, -0.11);
        let projection = LocalProjection::around(&a);
        let [x, y] = projection.project(&b);
        let planar = (x * x + y * y).sqrt();
        assert_relative_eq!(planar, haversine_distance(&a, &b), max_relative = 1e-3);
    }

    #[test]
    fn test_mean_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let (mean, std) = mean_std(values.iter().copied()).unwrap();
        assert_relative_eq!(mean, 5.0);
        assert_relative_eq!(std, 2.0);
        assert!(mean_std(std::iter::empty()).is_none());
    }
}
