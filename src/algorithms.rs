//! # Algorithm Toolbox
//!
//! Direct access to the individual algorithms behind the pipeline, for
//! callers that want to run single stages on their own data without going
//! through [`TripPipeline`](crate::TripPipeline).
//!
//! ## Track Cleaning
//!
//! - **Noise Removal**: Edge-speed outlier rejection
//! - **Kalman Smoothing**: Constant-velocity model with EM-fitted noise
//! - **Segmentation**: DBSCAN over (latitude, longitude, time)
//! - **Simplification**: Douglas-Peucker with a minimum time gap
//!
//! ## Mode Inference
//!
//! - **Changepoint Detection**: Binary segmentation with a mean-shift cost
//! - **Velocity Features**: Time-weighted speed histograms
//! - **Soft Classification**: Per-label probability trees
//!
//! # Example
//!
//! ```rust
//! use trip_pipeline::algorithms::{detect_changepoints, ChangepointConfig};
//!
//! let mut speeds = vec![0.0; 40];
//! speeds.extend(vec![30.0; 40]);
//! let changepoints = detect_changepoints(&speeds, &ChangepointConfig::default());
//! assert_eq!(changepoints, vec![40]);
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{compute_metrics, Bounds, ModeSpan, Point, Segment, TransportMode};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{haversine_distance, polyline_length, LocalProjection};

// =============================================================================
// Track Cleaning
// =============================================================================

pub use crate::noise::{remove_noise, NoiseConfig};
pub use crate::segmentation::{dbscan, segment_points, SegmentationConfig};
pub use crate::simplify::{simplify_points, SimplifyConfig};
pub use crate::smoothing::{smooth_points, SmoothConfig, SmoothingStrategy};
pub use crate::union_find::DisjointSet;

// =============================================================================
// Mode Inference
// =============================================================================

pub use crate::modes::{
    boundaries, detect_changepoints, extract_features, group_intervals, group_labels,
    intervals, synthesize_samples, Anchor, ChangepointConfig, ClassifiedInterval, Classifier,
    ClassifierConfig, ProbabilityTree, SoftClassifier, TrainingSample,
};

// =============================================================================
// Spatial Indexing
// =============================================================================

/// R-tree used for neighbourhood queries during segmentation.
pub use rstar::RTree;
