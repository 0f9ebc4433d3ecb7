//! Place references for segment endpoints.
//!
//! Resolution (reverse geocoding, a user's saved places, ...) is left to the
//! caller through [`LocationResolver`].

use serde::{Deserialize, Serialize};

use crate::Point;

/// A named place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }
}

/// Maps a point to a known place, if any.
pub trait LocationResolver {
    fn resolve(&self, point: &Point) -> Option<Location>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::haversine_distance;
    use crate::Segment;
    use chrono::DateTime;

    /// Resolves points within `radius` meters of one of its places.
    struct NearbyPlaces {
        places: Vec<Location>,
        radius: f64,
    }

    impl LocationResolver for NearbyPlaces {
        fn resolve(&self, point: &Point) -> Option<Location> {
            self.places
                .iter()
                .find(|place| {
                    let anchor = Point::new(place.latitude, place.longitude, point.time());
                    haversine_distance(&anchor, point) <= self.radius
                })
                .cloned()
        }
    }

    #[test]
    fn test_infer_locations() {
        let at = |secs: i64| DateTime::from_timestamp(1_600_000_000 + secs, 0).unwrap();
        let segment = Segment::new(vec![
            Point::new(51.5007, -0.1246, at(0)),
            Point::new(51.5033, -0.1196, at(300)),
            Point::new(51.5081, -0.0759, at(900)),
        ]);
        let resolver = NearbyPlaces {
            places: vec![Location::new("Westminster", 51.5007, -0.1246)],
            radius: 100.0,
        };

        let segment = segment.infer_locations(&resolver);
        assert_eq!(segment.location_from().map(|l| l.name.as_str()), Some("Westminster"));
        assert!(segment.location_to().is_none());
    }
}
