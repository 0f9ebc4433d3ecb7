//! Noise removal for raw GPS recordings.
//!
//! GPS spikes show up as a pair of implausible edge speeds: the jump out to
//! the bad fix and the jump back. A point is rejected when the speeds on its
//! edges deviate from the speeds of the surrounding edges by more than `var`
//! standard deviations.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_points, Result};
use crate::geo_utils::{haversine_distance, mean_std};
use crate::{compute_metrics, seconds_between, Point};

const STAGE: &str = "noise filter";

/// Configuration for noise removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Variance multiplier: edges further than `var` standard deviations from
    /// the neighbourhood mean are anomalous.
    /// Default: 2.0
    pub var: f64,
    /// Number of edges on each side that form a point's neighbourhood.
    /// Default: 5
    pub window: usize,
    /// Floor for the neighbourhood standard deviation in km/h, so perfectly
    /// regular tracks don't reject sub-km/h jitter.
    /// Default: 1.0
    pub min_std: f64,
    /// Absolute speed bound in km/h, used when a neighbourhood is too small
    /// for statistics.
    /// Default: 300.0
    pub max_speed: f64,
    /// Maximum number of filtering passes.
    /// Default: 3
    pub max_passes: u32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            var: 2.0,
            window: 5,
            min_std: 1.0,
            max_speed: 300.0,
            max_passes: 3,
        }
    }
}

impl NoiseConfig {
    /// Default configuration with a different variance multiplier.
    pub fn with_var(var: f64) -> Self {
        Self {
            var,
            ..Self::default()
        }
    }
}

/// Remove statistically implausible points.
///
/// Order is preserved and derived metrics are recomputed. Fails with
/// `InsufficientPoints` if fewer than 2 points remain.
pub fn remove_noise(points: Vec<Point>, config: &NoiseConfig) -> Result<Vec<Point>> {
    ensure_points(STAGE, points.len(), 2)?;

    let input_len = points.len();
    let mut current = compute_metrics(points);

    for pass in 0..config.max_passes.max(1) {
        let noisy = flag_noise(&current, config);
        let removed = noisy.iter().filter(|&&flag| flag).count();
        if removed == 0 {
            break;
        }
        debug!("[PointFilter] Pass {}: removing {} points", pass, removed);

        let kept: Vec<Point> = current
            .into_iter()
            .zip(noisy)
            .filter(|(_, flag)| !flag)
            .map(|(p, _)| p)
            .collect();
        current = compute_metrics(kept);
        if current.len() < 2 {
            break;
        }
    }

    ensure_points(STAGE, current.len(), 2)?;
    info!(
        "[PointFilter] Kept {} of {} points (var={})",
        current.len(),
        input_len,
        config.var
    );
    Ok(current)
}

/// Speed in km/h of each edge: `speeds[k]` joins `points[k]` and `points[k + 1]`.
fn edge_speeds(points: &[Point]) -> Vec<f64> {
    points
        .windows(2)
        .map(|w| {
            let dt = seconds_between(&w[0], &w[1]);
            if dt > 0.0 {
                haversine_distance(&w[0], &w[1]) / dt * 3.6
            } else {
                0.0
            }
        })
        .collect()
}

/// Flag noise points. `flags[i]` is true if point `i` should be removed.
fn flag_noise(points: &[Point], config: &NoiseConfig) -> Vec<bool> {
    let speeds = edge_speeds(points);
    let edge_count = speeds.len();
    let last = points.len() - 1;

    (0..points.len())
        .map(|i| {
            if i == 0 || i == last {
                // An endpoint's edge can look anomalous because its neighbour
                // is the spike; only blame the endpoint if the neighbour's
                // other edge is fine.
                let (edge, neighbour_edge) = if i == 0 {
                    (0, (edge_count > 1).then_some(1))
                } else {
                    (edge_count - 1, edge_count.checked_sub(2))
                };
                if !edge_is_anomalous(&speeds, edge, &[edge], config) {
                    return false;
                }
                match neighbour_edge {
                    Some(other) => !edge_is_anomalous(&speeds, other, &[edge, other], config),
                    None => true,
                }
            } else {
                let (incoming, outgoing) = (i - 1, i);
                let own = [incoming, outgoing];
                edge_is_anomalous(&speeds, incoming, &own, config)
                    && edge_is_anomalous(&speeds, outgoing, &own, config)
            }
        })
        .collect()
}

/// Compare one edge against the edges around it, skipping `excluded`.
fn edge_is_anomalous(speeds: &[f64], edge: usize, excluded: &[usize], config: &NoiseConfig) -> bool {
    let lo = edge.saturating_sub(config.window);
    let hi = (edge + config.window + 1).min(speeds.len());
    let neighbourhood = (lo..hi)
        .filter(|k| !excluded.contains(k))
        .map(|k| speeds[k]);

    if neighbourhood.clone().count() < 2 {
        return speeds[edge] > config.max_speed;
    }

    match mean_std(neighbourhood) {
        Some((mean, std)) => (speeds[edge] - mean).abs() > config.var * std.max(config.min_std),
        None => speeds[edge] > config.max_speed,
    }
}
