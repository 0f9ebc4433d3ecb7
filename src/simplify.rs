//! Douglas-Peucker polyline simplification with a minimum time gap.
//!
//! Points are dropped when the simplified line stays within `epsilon` meters
//! of them, unless they sit at least `min_gap` seconds away from one of their
//! neighbours. The time gap keeps sparse stretches of a recording (e.g. a
//! long stop logged once a minute) from collapsing into a single edge.

use geo::{Coord, LineString, SimplifyIdx};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_points, Result};
use crate::geo_utils::LocalProjection;
use crate::{compute_metrics, seconds_between, Point};

const STAGE: &str = "simplifier";

/// Configuration for simplification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimplifyConfig {
    /// Maximum distance in meters between a dropped point and the simplified line.
    /// Default: 10.0
    pub epsilon: f64,
    /// Points at least this many seconds from a neighbour are always kept.
    /// Default: 5.0
    pub min_gap: f64,
}

impl Default for SimplifyConfig {
    fn default() -> Self {
        Self {
            epsilon: 10.0,
            min_gap: 5.0,
        }
    }
}

/// Simplify a point sequence.
///
/// First and last points are always kept, order is preserved and running the
/// simplifier on its own output changes nothing. Fails with
/// `InsufficientPoints` for fewer than 2 points.
pub fn simplify_points(points: Vec<Point>, config: &SimplifyConfig) -> Result<Vec<Point>> {
    ensure_points(STAGE, points.len(), 2)?;

    let projection = LocalProjection::around(&points[0]);
    let coords: Vec<[f64; 2]> = points.iter().map(|p| projection.project(p)).collect();
    let mut keep = douglas_peucker_mask(&coords, config.epsilon);

    // Time gaps are measured against the unsimplified neighbours
    for i in 1..points.len() - 1 {
        if !keep[i]
            && (seconds_between(&points[i - 1], &points[i]) >= config.min_gap
                || seconds_between(&points[i], &points[i + 1]) >= config.min_gap)
        {
            keep[i] = true;
        }
    }

    let input_len = points.len();
    let kept: Vec<Point> = points
        .into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect();

    info!(
        "[Simplifier] Simplified {} to {} points (epsilon={}m, min_gap={}s)",
        input_len,
        kept.len(),
        config.epsilon,
        config.min_gap
    );
    Ok(compute_metrics(kept))
}

/// Douglas-Peucker keep-mask over planar coordinates.
fn douglas_peucker_mask(coords: &[[f64; 2]], epsilon: f64) -> Vec<bool> {
    let line: LineString<f64> = coords.iter().map(|&[x, y]| Coord { x, y }).collect();
    let mut keep = vec![false; coords.len()];
    for i in line.simplify_idx(&epsilon) {
        keep[i] = true;
    }
    keep
}
