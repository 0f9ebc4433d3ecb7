//! # Kalman Smoothing
//!
//! Replaces raw GPS positions with posterior means of a constant-velocity
//! Kalman smoother whose noise parameters are fitted by EM.
//!
//! ## Algorithm
//! 1. Project points into a local metric plane anchored at the first point
//! 2. Take the transition `dt` as the statistical mode of the sampling intervals
//! 3. Fit each axis independently (`n_iter` EM rounds), then smooth
//! 4. Project back; timestamps are untouched, derived metrics recomputed
//!
//! ## Boundary bias
//! A smoother starting from an uninformed prior drags the first fixes. Two
//! mitigations are available:
//! - **Extrapolate**: prepend `n` synthetic fixes continuing the mean step
//!   backwards, smooth, and drop them again
//! - **Inverse**: smooth the first `n` fixes in reverse so the true start sits
//!   at the warmed-up end, then splice it onto the full forward result

mod kalman;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::TripError;
use crate::geo_utils::LocalProjection;
use crate::{compute_metrics, Point};
use kalman::ConstantVelocityModel;

/// Boundary-bias mitigation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingStrategy {
    Extrapolate,
    Inverse,
}

impl SmoothingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmoothingStrategy::Extrapolate => "extrapolate",
            SmoothingStrategy::Inverse => "inverse",
        }
    }
}

impl fmt::Display for SmoothingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SmoothingStrategy {
    type Err = TripError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extrapolate" => Ok(SmoothingStrategy::Extrapolate),
            "inverse" => Ok(SmoothingStrategy::Inverse),
            _ => Err(TripError::InvalidStrategy {
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for Kalman smoothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothConfig {
    /// Boundary-bias mitigation strategy.
    /// Default: Extrapolate
    pub strategy: SmoothingStrategy,
    /// Extrapolated points (extrapolate) or reverse-smoothed head length
    /// (inverse, clamped to half the track).
    /// Default: 20
    pub n: usize,
    /// EM iterations.
    /// Default: 5
    pub n_iter: usize,
    /// Inverse strategy only: points at the end of the reversed head that
    /// are discarded in favour of the full-track result.
    /// Default: 20
    pub overlap: usize,
}

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            strategy: SmoothingStrategy::Extrapolate,
            n: 20,
            n_iter: 5,
            overlap: 20,
        }
    }
}

impl SmoothConfig {
    /// Inverse strategy with a 100-point head.
    pub fn inverse() -> Self {
        Self {
            strategy: SmoothingStrategy::Inverse,
            n: 100,
            ..Self::default()
        }
    }
}

/// Smooth a point sequence.
///
/// Sequences with fewer than 2 points are returned unchanged.
pub fn smooth_points(points: Vec<Point>, config: &SmoothConfig) -> Vec<Point> {
    if points.len() < 2 {
        return points;
    }

    let projection = LocalProjection::around(&points[0]);
    let coords: Vec<[f64; 2]> = points.iter().map(|p| projection.project(p)).collect();
    let dt = transition_dt(&points);

    let smoothed = match config.strategy {
        SmoothingStrategy::Extrapolate => smooth_with_extrapolation(&coords, dt, config),
        SmoothingStrategy::Inverse => smooth_with_inverse(&coords, dt, config),
    };

    info!(
        "[Smoother] Smoothed {} points ({}, dt={:.2}s, n_iter={})",
        points.len(),
        config.strategy,
        dt,
        config.n_iter
    );

    let moved: Vec<Point> = points
        .iter()
        .zip(smoothed)
        .map(|(p, xy)| {
            let (lat, lng) = projection.unproject(xy);
            p.with_position(lat, lng)
        })
        .collect();
    compute_metrics(moved)
}

/// Mode of the sampling intervals, rounded to milliseconds.
///
/// The first point's zero interval is ignored and ties go to the shortest
/// interval. Falls back to 1s when no positive interval exists.
fn transition_dt(points: &[Point]) -> f64 {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for w in points.windows(2) {
        let millis = (w[1].time() - w[0].time()).num_milliseconds();
        *counts.entry(millis).or_insert(0) += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for (&millis, &count) in &counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((millis, count));
        }
    }

    match best {
        Some((millis, _)) if millis > 0 => millis as f64 / 1000.0,
        _ => 1.0,
    }
}

/// Fit and smooth both axes.
fn smooth_track(coords: &[[f64; 2]], dt: f64, n_iter: usize) -> Vec<[f64; 2]> {
    let axis = |k: usize| -> Vec<f64> {
        let observations: Vec<f64> = coords.iter().map(|c| c[k]).collect();
        ConstantVelocityModel::new(dt, observations[0])
            .fit(&observations, n_iter)
            .smooth(&observations)
            .positions()
    };
    let xs = axis(0);
    let ys = axis(1);
    xs.into_iter().zip(ys).map(|(x, y)| [x, y]).collect()
}

fn smooth_with_extrapolation(coords: &[[f64; 2]], dt: f64, config: &SmoothConfig) -> Vec<[f64; 2]> {
    let n = config.n;
    let first = coords[0];
    let last = coords[coords.len() - 1];
    let steps = (coords.len() - 1) as f64;
    // Mean of consecutive displacements telescopes to (last - first) / steps
    let step = [(last[0] - first[0]) / steps, (last[1] - first[1]) / steps];

    let mut extended: Vec<[f64; 2]> = (1..=n)
        .rev()
        .map(|k| [first[0] - step[0] * k as f64, first[1] - step[1] * k as f64])
        .collect();
    extended.extend_from_slice(coords);

    debug!("[Smoother] Extrapolated {} points before the start", n);
    let mut smoothed = smooth_track(&extended, dt, config.n_iter);
    smoothed.split_off(n)
}

fn smooth_with_inverse(coords: &[[f64; 2]], dt: f64, config: &SmoothConfig) -> Vec<[f64; 2]> {
    let n = config.n.min(coords.len() / 2);
    let splice = n.saturating_sub(config.overlap);

    let total = smooth_track(coords, dt, config.n_iter);
    if splice == 0 {
        return total;
    }

    let reversed_head: Vec<[f64; 2]> = coords[..n].iter().rev().copied().collect();
    let mut head = smooth_track(&reversed_head, dt, config.n_iter);
    head.reverse();

    debug!(
        "[Smoother] Spliced {} reverse-smoothed points onto {} forward points",
        splice,
        coords.len() - splice
    );
    head.truncate(splice);
    head.extend_from_slice(&total[splice..]);
    head
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn at(millis: i64) -> chrono::DateTime<chrono::Utc> {
        DateTime::from_timestamp_millis(1_600_000_000_000 + millis).unwrap()
    }

    fn track(count: usize) -> Vec<Point> {
        (0..count)
            .map(|i| Point::new(51.5 + i as f64 * 0.0001, -0.12 + i as f64 * 0.00005, at(i as i64 * 1000)))
            .collect()
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("extrapolate".parse::<SmoothingStrategy>().unwrap(), SmoothingStrategy::Extrapolate);
        assert_eq!("inverse".parse::<SmoothingStrategy>().unwrap(), SmoothingStrategy::Inverse);
        assert_eq!(
            "kalman".parse::<SmoothingStrategy>(),
            Err(TripError::InvalidStrategy {
                value: "kalman".to_string()
            })
        );
    }

    #[test]
    fn test_strategy_from_json() {
        let config: SmoothConfig =
            serde_json::from_str(r#"{"strategy":"inverse","n":50,"n_iter":3,"overlap":10}"#).unwrap();
        assert_eq!(config.strategy, SmoothingStrategy::Inverse);
        assert!(serde_json::from_str::<SmoothConfig>(
            r#"{"strategy":"sideways","n":50,"n_iter":3,"overlap":10}"#
        )
        .is_err());
    }

    #[test]
    fn test_transition_dt_uses_mode() {
        let mut points = track(10);
        // One late fix shouldn't change the sampling interval
        points[9] = Point::new(points[9].latitude(), points[9].longitude(), at(20_000));
        assert_eq!(transition_dt(&points), 1.0);
    }

    #[test]
    fn test_transition_dt_tie_goes_to_shortest() {
        let points = vec![
            Point::new(51.5, -0.12, at(0)),
            Point::new(51.5, -0.12, at(2000)),
            Point::new(51.5, -0.12, at(3000)),
        ];
        assert_eq!(transition_dt(&points), 1.0);
    }

    #[test]
    fn test_preserves_timestamps_and_length() {
        for config in [SmoothConfig::default(), SmoothConfig::inverse()] {
            let points = track(60);
            let smoothed = smooth_points(points.clone(), &config);
            assert_eq!(smoothed.len(), points.len());
            for (s, p) in smoothed.iter().zip(&points) {
                assert_eq!(s.time(), p.time());
            }
        }
    }

    #[test]
    fn test_inverse_head_clamped() {
        // n = 100 on 30 points clamps to 15, splice = 0: full forward result
        let points = track(30);
        let smoothed = smooth_points(points.clone(), &SmoothConfig::inverse());
        assert_eq!(smoothed.len(), 30);
    }

    #[test]
    fn test_tiny_inputs() {
        assert!(smooth_points(Vec::new(), &SmoothConfig::default()).is_empty());
        let single = track(1);
        assert_eq!(smooth_points(single.clone(), &SmoothConfig::default()), single);
    }
}
