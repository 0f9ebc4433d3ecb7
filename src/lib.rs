//! # Trip Pipeline
//!
//! Converts raw, noisy GPS recordings into cleaned trip segments annotated
//! with transportation mode.
//!
//! This library provides:
//! - Noise removal of statistically implausible points
//! - Kalman smoothing with EM-fitted noise parameters
//! - Spatiotemporal segmentation of recordings into independent trips (DBSCAN)
//! - Douglas-Peucker simplification with a minimum time gap
//! - Transportation mode inference (changepoints + soft classifiers)
//!
//! ## Features
//!
//! - **`parallel`** - Process batches of recordings with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::DateTime;
//! use trip_pipeline::{Point, PipelineConfig, TripPipeline};
//!
//! let points: Vec<Point> = (0..120)
//!     .map(|i| {
//!         let time = DateTime::from_timestamp(1_600_000_000 + i, 0).unwrap();
//!         Point::new(51.5074 + i as f64 * 0.0001, -0.1278, time)
//!     })
//!     .collect();
//!
//! let pipeline = TripPipeline::new(PipelineConfig::default());
//! let trip = pipeline.to_trip(points).unwrap();
//! assert!(!trip.segments.is_empty());
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TripError};

// Geographic utilities (distance, local projection)
pub mod geo_utils;

// Disjoint-set forest used by density clustering
pub mod union_find;
pub use union_find::DisjointSet;

// Noise removal
pub mod noise;
pub use noise::{remove_noise, NoiseConfig};

// Kalman smoothing
pub mod smoothing;
pub use smoothing::{smooth_points, SmoothConfig, SmoothingStrategy};

// Spatiotemporal segmentation
pub mod segmentation;
pub use segmentation::{dbscan, segment_points, SegmentationConfig};

// Polyline simplification
pub mod simplify;
pub use simplify::{simplify_points, SimplifyConfig};

// Transportation mode inference
pub mod modes;
pub use modes::{
    infer_transport_modes, Anchor, ChangepointConfig, Classifier, ClassifierConfig,
    InferenceMethod, ModeConfig, ModelStore, SharedClassifier,
};

// Endpoint location references
pub mod location;
pub use location::{Location, LocationResolver};

// End-to-end pipeline
pub mod pipeline;
#[cfg(feature = "parallel")]
pub use pipeline::process_batch_parallel;
pub use pipeline::{process_batch, PipelineConfig, Trip, TripPipeline};

// Algorithm toolbox - modular access to all algorithms
pub mod algorithms;

// ============================================================================
// Core Types
// ============================================================================

/// A timestamped GPS fix.
///
/// `dt` (seconds) and `velocity` (km/h) are derived from the previous point of
/// the sequence by [`compute_metrics`] and cannot be set directly. The first
/// point of a sequence has both at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    latitude: f64,
    longitude: f64,
    time: DateTime<Utc>,
    #[serde(default, skip_deserializing)]
    dt: f64,
    #[serde(default, skip_deserializing)]
    velocity: f64,
}

impl Point {
    /// Create a point with no derived metrics.
    pub fn new(latitude: f64, longitude: f64, time: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            time,
            dt: 0.0,
            velocity: 0.0,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Seconds elapsed since the previous point.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Speed from the previous point in km/h.
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Timestamp as fractional seconds since the Unix epoch.
    pub fn timestamp_secs(&self) -> f64 {
        self.time.timestamp_millis() as f64 / 1000.0
    }

    /// Same timestamp at a new position. Derived metrics are cleared.
    pub fn with_position(&self, latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, self.time)
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    fn derived_from(self, previous: &Point) -> Self {
        let dt = seconds_between(previous, &self);
        let velocity = if dt > 0.0 {
            geo_utils::haversine_distance(previous, &self) / dt * 3.6
        } else {
            0.0
        };
        Self {
            dt,
            velocity,
            ..self
        }
    }
}

/// Seconds from `from` to `to` (negative if `to` is earlier).
pub(crate) fn seconds_between(from: &Point, to: &Point) -> f64 {
    (to.time - from.time).num_milliseconds() as f64 / 1000.0
}

/// Recompute `dt` and `velocity` of every point against its predecessor.
pub fn compute_metrics(points: Vec<Point>) -> Vec<Point> {
    let mut result: Vec<Point> = Vec::with_capacity(points.len());
    for point in points {
        let derived = match result.last() {
            Some(previous) => point.derived_from(previous),
            None => Point::new(point.latitude, point.longitude, point.time),
        };
        result.push(derived);
    }
    result
}

/// Bounding box for a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points. `None` for an empty slice.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Center of the bounds as (latitude, longitude).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Transportation mode label.
///
/// Declaration order is the default registration order of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportMode {
    Stop,
    Foot,
    Run,
    Bike,
    Vehicle,
    /// Interval that could not be classified (zero duration)
    Unknown,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Stop => "Stop",
            TransportMode::Foot => "Foot",
            TransportMode::Run => "Run",
            TransportMode::Bike => "Bike",
            TransportMode::Vehicle => "Vehicle",
            TransportMode::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = TripError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" => Ok(TransportMode::Stop),
            "foot" | "walk" => Ok(TransportMode::Foot),
            "run" => Ok(TransportMode::Run),
            "bike" => Ok(TransportMode::Bike),
            "vehicle" => Ok(TransportMode::Vehicle),
            "unknown" => Ok(TransportMode::Unknown),
            _ => Err(TripError::InvalidMode {
                value: s.to_string(),
            }),
        }
    }
}

/// A contiguous, half-open index range `[from, to)` of a segment with one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSpan {
    pub label: TransportMode,
    pub from: usize,
    pub to: usize,
}

impl ModeSpan {
    pub fn new(label: TransportMode, from: usize, to: usize) -> Self {
        Self { label, from, to }
    }

    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `spans` are sorted, non-empty and cover `[0, len)` exactly.
    pub fn partitions(spans: &[ModeSpan], len: usize) -> bool {
        let mut expected = 0;
        for span in spans {
            if span.from != expected || span.to <= span.from {
                return false;
            }
            expected = span.to;
        }
        expected == len
    }
}

/// An ordered run of points forming one trip, with its mode annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    points: Vec<Point>,
    modes: Vec<ModeSpan>,
    location_from: Option<Location>,
    location_to: Option<Location>,
}

impl Segment {
    /// Create a segment without mode annotations. Derived point metrics are
    /// recomputed.
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points: compute_metrics(points),
            modes: Vec::new(),
            location_from: None,
            location_to: None,
        }
    }

    /// Create a segment with known mode annotations (e.g. user-labelled
    /// training data). Fails unless the spans partition the points.
    pub fn with_modes(points: Vec<Point>, modes: Vec<ModeSpan>) -> Result<Self> {
        Segment::new(points).annotate(modes)
    }

    /// Replace the mode annotations. Fails unless the spans partition the points.
    pub fn annotate(mut self, modes: Vec<ModeSpan>) -> Result<Self> {
        if !modes.is_empty() && !ModeSpan::partitions(&modes, self.points.len()) {
            return Err(TripError::InvalidModeSpans {
                point_count: self.points.len(),
            });
        }
        self.modes = modes;
        Ok(self)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    pub fn modes(&self) -> &[ModeSpan] {
        &self.modes
    }

    pub fn location_from(&self) -> Option<&Location> {
        self.location_from.as_ref()
    }

    pub fn location_to(&self) -> Option<&Location> {
        self.location_to.as_ref()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point_at(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(Point::time)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(Point::time)
    }

    /// Elapsed seconds between the first and last point.
    pub fn duration(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => seconds_between(first, last),
            _ => 0.0,
        }
    }

    /// Path length in meters.
    pub fn distance(&self) -> f64 {
        geo_utils::polyline_length(&self.points)
    }

    /// Bounds of the points in `range`, or of the whole segment.
    pub fn bounds(&self, range: Option<std::ops::Range<usize>>) -> Option<Bounds> {
        match range {
            Some(range) => Bounds::from_points(self.points.get(range)?),
            None => Bounds::from_points(&self.points),
        }
    }

    /// Fill the endpoint location references using an external resolver.
    pub fn infer_locations(mut self, resolver: &dyn LocationResolver) -> Self {
        self.location_from = self.points.first().and_then(|p| resolver.resolve(p));
        self.location_to = self.points.last().and_then(|p| resolver.resolve(p));
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
