//! End-to-end trip processing.
//!
//! A raw recording goes through noise removal, smoothing, segmentation into
//! independent trips and simplification of each trip. Mode inference runs
//! per segment against a snapshot of the shared classifier.
//!
//! Failures are isolated per segment: a segment that fails a stage is
//! reported in [`Trip::failures`] while its siblings are still returned.

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::modes::{infer_transport_modes, Classifier, ModeConfig, SharedClassifier};
use crate::{
    remove_noise, segment_points, simplify_points, smooth_points, NoiseConfig, Point,
    Segment, SegmentationConfig, SimplifyConfig, SmoothConfig, TripError,
};

/// Name format for trips, derived from the start time.
const TRIP_NAME_FORMAT: &str = "%Y-%m-%d";

/// Configuration of every pipeline stage.
///
/// Missing fields in JSON fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub noise: NoiseConfig,
    pub smoothing: SmoothConfig,
    pub segmentation: SegmentationConfig,
    pub simplify: SimplifyConfig,
    pub modes: ModeConfig,
}

impl PipelineConfig {
    /// Parse a configuration. Unknown strategy or method tokens are rejected.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Result of processing one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Name derived from the start time of the first segment.
    pub name: String,
    pub segments: Vec<Segment>,
    /// Errors of segments that were dropped.
    #[serde(skip)]
    pub failures: Vec<TripError>,
}

impl Trip {
    fn new(segments: Vec<Segment>, failures: Vec<TripError>) -> Self {
        let name = segments
            .first()
            .and_then(Segment::start_time)
            .map(|t| t.format(TRIP_NAME_FORMAT).to_string())
            .unwrap_or_default();
        Self {
            name,
            segments,
            failures,
        }
    }

    /// Total path length in meters.
    pub fn distance(&self) -> f64 {
        self.segments.iter().map(Segment::distance).sum()
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }
}

/// Pipeline bound to a configuration and a shared classifier.
///
/// Cheap to share across threads; every call works on owned values.
#[derive(Debug, Clone)]
pub struct TripPipeline {
    config: PipelineConfig,
    classifier: Arc<SharedClassifier>,
}

impl TripPipeline {
    /// Pipeline using the built-in classifier.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_classifier(config, Arc::new(SharedClassifier::default_model()))
    }

    pub fn with_classifier(config: PipelineConfig, classifier: Arc<SharedClassifier>) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Arc<SharedClassifier> {
        &self.classifier
    }

    /// Clean a raw recording into simplified trip segments, without modes.
    ///
    /// Fails if noise removal leaves fewer than 2 points; segments that fail
    /// simplification are reported in [`Trip::failures`].
    pub fn to_trip(&self, points: Vec<Point>) -> Result<Trip> {
        let input_len = points.len();
        let valid: Vec<Point> = points.into_iter().filter(Point::is_valid).collect();
        if valid.len() < input_len {
            warn!(
                "[Pipeline] Dropped {} points with invalid coordinates",
                input_len - valid.len()
            );
        }

        let ordered = drop_out_of_order(valid);

        let filtered = remove_noise(ordered, &self.config.noise)?;
        let smoothed = smooth_points(filtered, &self.config.smoothing);

        let mut segments = Vec::new();
        let mut failures = Vec::new();
        for part in segment_points(smoothed, &self.config.segmentation) {
            match simplify_points(part, &self.config.simplify) {
                Ok(simplified) => segments.push(Segment::new(simplified)),
                Err(e) => {
                    warn!("[Pipeline] Dropping segment: {}", e);
                    failures.push(e);
                }
            }
        }

        info!(
            "[Pipeline] {} input points -> {} segments ({} failed)",
            input_len,
            segments.len(),
            failures.len()
        );
        Ok(Trip::new(segments, failures))
    }

    /// Annotate a segment with inferred mode spans.
    pub fn infer_modes(&self, segment: Segment) -> Result<Segment> {
        let classifier = self.classifier.snapshot();
        self.infer_modes_with(segment, &classifier)
    }

    fn infer_modes_with(&self, segment: Segment, classifier: &Classifier) -> Result<Segment> {
        let spans = infer_transport_modes(segment.points(), Some(classifier), &self.config.modes)?;
        segment.annotate(spans)
    }

    /// [`to_trip`](Self::to_trip) followed by mode inference on every
    /// segment. All segments of one recording see the same model version.
    pub fn process(&self, points: Vec<Point>) -> Result<Trip> {
        let trip = self.to_trip(points)?;
        let classifier = self.classifier.snapshot();

        let mut segments = Vec::with_capacity(trip.segments.len());
        let mut failures = trip.failures;
        for segment in trip.segments {
            match self.infer_modes_with(segment, &classifier) {
                Ok(annotated) => segments.push(annotated),
                Err(e) => {
                    warn!("[Pipeline] Mode inference failed: {}", e);
                    failures.push(e);
                }
            }
        }
        Ok(Trip::new(segments, failures))
    }

    /// Train the shared classifier on a labelled segment.
    pub fn learn(&self, segment: &Segment) -> Arc<Classifier> {
        self.classifier.learn(segment, self.config.modes.ns)
    }
}

/// Keep only fixes strictly later than the previous kept fix.
fn drop_out_of_order(points: Vec<Point>) -> Vec<Point> {
    let input_len = points.len();
    let mut ordered: Vec<Point> = Vec::with_capacity(input_len);
    for point in points {
        if ordered.last().map_or(true, |last| point.time() > last.time()) {
            ordered.push(point);
        }
    }
    if ordered.len() < input_len {
        warn!(
            "[Pipeline] Dropped {} points with duplicate or out-of-order timestamps",
            input_len - ordered.len()
        );
    }
    ordered
}

/// Process recordings one after another. Each recording gets its own result.
pub fn process_batch(pipeline: &TripPipeline, recordings: Vec<Vec<Point>>) -> Vec<Result<Trip>> {
    recordings
        .into_iter()
        .map(|points| pipeline.process(points))
        .collect()
}

/// Process recordings in parallel using rayon.
///
/// Results keep the order of the input recordings.
#[cfg(feature = "parallel")]
pub fn process_batch_parallel(
    pipeline: &TripPipeline,
    recordings: Vec<Vec<Point>>,
) -> Vec<Result<Trip>> {
    use rayon::prelude::*;

    info!("[Pipeline] Processing {} recordings in parallel", recordings.len());
    recordings
        .into_par_iter()
        .map(|points| pipeline.process(points))
        .collect()
}
