//! # Transportation Mode Inference
//!
//! Labels the points of a segment with how they were travelled.
//!
//! ## Changepoint method
//! 1. Detect changepoints in the velocity signal ([`changepoint`])
//! 2. Summarize each interval as a velocity histogram ([`features`])
//! 3. Classify each interval with per-label soft classifiers ([`classifier`])
//! 4. Merge intervals into spans, ignoring short label flips ([`grouping`])
//!
//! ## Naive method
//! Fixed per-point speed thresholds, run-length grouped. Needs no model.

pub mod changepoint;
pub mod classifier;
pub mod features;
pub mod grouping;
pub mod tree;

use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result, TripError};
use crate::{ModeSpan, Point, TransportMode};

pub use changepoint::{boundaries, detect_changepoints, intervals, ChangepointConfig};
pub use classifier::{
    default_anchors, synthesize_samples, Anchor, Classifier, ClassifierConfig, ModelStore,
    SharedClassifier, SoftClassifier, DEFAULT_LABELS,
};
pub use features::extract_features;
pub use grouping::{group_intervals, group_labels, ClassifiedInterval};
pub use tree::{ProbabilityTree, TrainingSample};

/// Mode inference method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMethod {
    /// Changepoint intervals classified by a trained model
    Changepoint,
    /// Per-point speed thresholds
    Naive,
}

impl InferenceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMethod::Changepoint => "changepoint",
            InferenceMethod::Naive => "naive",
        }
    }
}

impl fmt::Display for InferenceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InferenceMethod {
    type Err = TripError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "changepoint" => Ok(InferenceMethod::Changepoint),
            "naive" => Ok(InferenceMethod::Naive),
            _ => Err(TripError::InvalidInferenceMethod {
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for mode inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Default: Changepoint
    pub method: InferenceMethod,
    /// Seconds an interval must last before a label change is accepted.
    /// Default: 10.0
    pub dt_threshold: f64,
    /// Histogram bins per feature vector.
    /// Default: 4
    pub ns: usize,
    pub changepoint: ChangepointConfig,
    /// Naive method: below this speed (km/h) a point is a stop.
    /// Default: 0.1
    pub stop_speed: f64,
    /// Naive method: below this speed (km/h) a point is on foot.
    /// Default: 7.0
    pub walk_speed: f64,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            method: InferenceMethod::Changepoint,
            dt_threshold: 10.0,
            ns: 4,
            changepoint: ChangepointConfig::default(),
            stop_speed: 0.1,
            walk_speed: 7.0,
        }
    }
}

/// Infer mode spans for a segment's points.
///
/// The points must carry derived metrics (see [`crate::compute_metrics`]).
/// Spans are sorted, disjoint and cover `[0, points.len())`. The changepoint
/// method fails with [`TripError::MissingClassifier`] when no model is given.
pub fn infer_transport_modes(
    points: &[Point],
    classifier: Option<&Classifier>,
    config: &ModeConfig,
) -> Result<Vec<ModeSpan>> {
    let spans = match config.method {
        InferenceMethod::Naive => infer_naive(points, config),
        InferenceMethod::Changepoint => {
            let classifier = classifier.ok_or_missing_classifier()?;
            infer_by_changepoints(points, classifier, config)
        }
    };

    info!(
        "[ModeInference] {} spans over {} points ({})",
        spans.len(),
        points.len(),
        config.method
    );
    Ok(spans)
}

fn infer_by_changepoints(points: &[Point], classifier: &Classifier, config: &ModeConfig) -> Vec<ModeSpan> {
    let velocities: Vec<f64> = points.iter().map(Point::velocity).collect();
    let changepoints = detect_changepoints(&velocities, &config.changepoint);
    let bounds = boundaries(&changepoints, points.len());
    debug!("[ModeInference] Boundaries {:?}", bounds);

    let classified: Vec<ClassifiedInterval> = intervals(&bounds, points.len())
        .into_iter()
        .map(|range| {
            let slice = &points[range.clone()];
            let features = extract_features(slice, config.ns);
            let label = classifier.classify(&features);
            let duration: f64 = slice.iter().map(Point::dt).sum();
            debug!(
                "[ModeInference] [{}, {}) -> {} ({:.0}s)",
                range.start, range.end, label, duration
            );
            ClassifiedInterval {
                range,
                label,
                duration,
            }
        })
        .collect();

    group_intervals(&classified, points.len(), config.dt_threshold)
}

fn infer_naive(points: &[Point], config: &ModeConfig) -> Vec<ModeSpan> {
    let labels: Vec<TransportMode> = points
        .iter()
        .map(|p| {
            let v = p.velocity();
            if v < config.stop_speed {
                TransportMode::Stop
            } else if v < config.walk_speed {
                TransportMode::Foot
            } else {
                TransportMode::Vehicle
            }
        })
        .collect();
    group_labels(&labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_metrics;
    use chrono::DateTime;

    fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
        DateTime::from_timestamp(1_600_000_000 + secs, 0).unwrap()
    }

    /// One fix per second with the given speeds (km/h) into each point.
    fn track(speeds: &[f64]) -> Vec<Point> {
        let mut lat = 51.5;
        let mut points = vec![Point::new(lat, -0.12, at(0))];
        for (i, kmh) in speeds.iter().enumerate() {
            lat += kmh / 3.6 / 111_194.93;
            points.push(Point::new(lat, -0.12, at(i as i64 + 1)));
        }
        compute_metrics(points)
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("Naive".parse::<InferenceMethod>().unwrap(), InferenceMethod::Naive);
        assert_eq!(
            "changepoint".parse::<InferenceMethod>().unwrap(),
            InferenceMethod::Changepoint
        );
        assert!(matches!(
            "hmm".parse::<InferenceMethod>(),
            Err(TripError::InvalidInferenceMethod { .. })
        ));
    }

    #[test]
    fn test_missing_classifier() {
        let points = track(&[5.0; 30]);
        let result = infer_transport_modes(&points, None, &ModeConfig::default());
        assert_eq!(result, Err(TripError::MissingClassifier));
    }

    #[test]
    fn test_naive_needs_no_classifier() {
        let mut speeds = vec![0.0; 10];
        speeds.extend(vec![5.0; 10]);
        speeds.extend(vec![40.0; 10]);
        let points = track(&speeds);
        let config = ModeConfig {
            method: InferenceMethod::Naive,
            ..ModeConfig::default()
        };
        let spans = infer_transport_modes(&points, None, &config).unwrap();
        assert_eq!(
            spans,
            vec![
                ModeSpan::new(TransportMode::Stop, 0, 11),
                ModeSpan::new(TransportMode::Foot, 11, 21),
                ModeSpan::new(TransportMode::Vehicle, 21, 31),
            ]
        );
    }

    #[test]
    fn test_constant_walk_is_one_span() {
        let points = track(&[5.0; 60]);
        let classifier = Classifier::default_model();
        let spans = infer_transport_modes(&points, Some(&*classifier), &ModeConfig::default()).unwrap();
        assert_eq!(spans, vec![ModeSpan::new(TransportMode::Foot, 0, 61)]);
    }

    #[test]
    fn test_stop_then_drive() {
        let mut speeds = vec![0.0; 60];
        speeds.extend(vec![50.0; 60]);
        let points = track(&speeds);
        let classifier = Classifier::default_model();
        let spans = infer_transport_modes(&points, Some(&*classifier), &ModeConfig::default()).unwrap();
        assert!(ModeSpan::partitions(&spans, points.len()));
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].label, TransportMode::Stop);
        assert_eq!(spans[1].label, TransportMode::Vehicle);
    }

    #[test]
    fn test_single_point() {
        let points = track(&[]);
        let classifier = Classifier::default_model();
        let spans = infer_transport_modes(&points, Some(&*classifier), &ModeConfig::default()).unwrap();
        assert_eq!(spans, vec![ModeSpan::new(TransportMode::Unknown, 0, 1)]);
    }
}
