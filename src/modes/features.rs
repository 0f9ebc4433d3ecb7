//! Velocity histogram features.
//!
//! An interval is summarized by the speeds it spent the most time at:
//! velocities are rounded to whole km/h bins and each point contributes its
//! `dt` to its bin.

use std::collections::BTreeMap;

use crate::Point;

/// Interleaved `[bin, weight, bin, weight, ...]` feature vector of the `ns`
/// heaviest velocity bins, heaviest first. Weights are time shares in
/// `[0, 1]`; equal weights list the lower bin first.
///
/// Returns an empty vector when the points span no time.
pub fn extract_features(points: &[Point], ns: usize) -> Vec<f64> {
    let mut histogram: BTreeMap<i64, f64> = BTreeMap::new();
    let mut total = 0.0;
    for p in points {
        if p.dt() > 0.0 {
            *histogram.entry(p.velocity().round() as i64).or_insert(0.0) += p.dt();
            total += p.dt();
        }
    }
    if total <= 0.0 {
        return Vec::new();
    }

    // BTreeMap iterates bins ascending; a stable sort keeps that order on ties
    let mut bins: Vec<(i64, f64)> = histogram.into_iter().collect();
    bins.sort_by(|a, b| b.1.total_cmp(&a.1));

    bins.into_iter()
        .take(ns)
        .flat_map(|(bin, time)| [bin as f64, time / total])
        .collect()
}

/// Iterate a feature vector as `(bin, weight)` pairs.
pub fn feature_pairs(features: &[f64]) -> impl Iterator<Item = (f64, f64)> + '_ {
    features.chunks_exact(2).map(|pair| (pair[0], pair[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_metrics;
    use approx::assert_relative_eq;
    use chrono::DateTime;

    fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
        DateTime::from_timestamp(1_600_000_000 + secs, 0).unwrap()
    }

    /// One fix per second; `meters[i]` northward distance covered in second i.
    fn walk(meters: &[f64]) -> Vec<Point> {
        let mut lat = 51.5;
        let mut points = vec![Point::new(lat, -0.12, at(0))];
        for (i, m) in meters.iter().enumerate() {
            lat += m / 111_194.93;
            points.push(Point::new(lat, -0.12, at(i as i64 + 1)));
        }
        compute_metrics(points)
    }

    #[test]
    fn test_histogram_weights() {
        // 6 seconds at ~5 km/h, 2 seconds at ~18 km/h
        let points = walk(&[1.389, 1.389, 1.389, 1.389, 1.389, 1.389, 5.0, 5.0]);
        let features = extract_features(&points, 4);
        assert_eq!(features.len(), 4);
        assert_eq!(features[0], 5.0);
        assert_relative_eq!(features[1], 0.75, epsilon = 1e-9);
        assert_eq!(features[2], 18.0);
        assert_relative_eq!(features[3], 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_top_ns_only() {
        let points = walk(&[1.0, 2.0, 3.0, 4.0, 4.0, 4.0]);
        let features = extract_features(&points, 2);
        assert_eq!(features.len(), 4);
        assert_eq!(features[0], 14.0);
    }

    #[test]
    fn test_ties_prefer_lower_bin() {
        let points = walk(&[5.0, 1.389]);
        let features = extract_features(&points, 4);
        assert_eq!(features[0], 5.0);
        assert_eq!(features[2], 18.0);
    }

    #[test]
    fn test_zero_duration_is_empty() {
        let points = walk(&[]);
        assert!(extract_features(&points, 4).is_empty());
        assert!(extract_features(&[], 4).is_empty());
    }

    #[test]
    fn test_feature_pairs() {
        let pairs: Vec<(f64, f64)> = feature_pairs(&[0.0, 0.5, 30.0, 0.5]).collect();
        assert_eq!(pairs, vec![(0.0, 0.5), (30.0, 0.5)]);
    }
}
