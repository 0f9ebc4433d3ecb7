//! Changepoint detection over a velocity signal.
//!
//! Binary segmentation with a least-squares (mean shift) cost: an interval is
//! split at the index that most reduces the summed squared deviation from
//! the interval means, as long as the reduction beats the penalty. Interval
//! costs come from prefix sums, so each candidate split is O(1).

use std::ops::Range;

use log::debug;
use serde::{Deserialize, Serialize};

/// Configuration for changepoint detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangepointConfig {
    /// Penalty multiplier applied to `noise² * ln(n)`.
    /// Default: 3.0
    pub penalty: f64,
    /// Floor for the estimated noise level in km/h, so flat signals don't
    /// split on rounding jitter.
    /// Default: 2.0
    pub min_noise: f64,
    /// Minimum number of samples between changepoints.
    /// Default: 10
    pub min_size: usize,
}

impl Default for ChangepointConfig {
    fn default() -> Self {
        Self {
            penalty: 3.0,
            min_noise: 2.0,
            min_size: 10,
        }
    }
}

/// Prefix sums of a signal and its squares.
struct CostFunction {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl CostFunction {
    fn new(signal: &[f64]) -> Self {
        let mut sum = Vec::with_capacity(signal.len() + 1);
        let mut sum_sq = Vec::with_capacity(signal.len() + 1);
        sum.push(0.0);
        sum_sq.push(0.0);
        for &v in signal {
            sum.push(sum[sum.len() - 1] + v);
            sum_sq.push(sum_sq[sum_sq.len() - 1] + v * v);
        }
        Self { sum, sum_sq }
    }

    /// Squared deviation of `[from, to)` from its mean.
    fn cost(&self, from: usize, to: usize) -> f64 {
        if to <= from {
            return 0.0;
        }
        let s = self.sum[to] - self.sum[from];
        let s2 = self.sum_sq[to] - self.sum_sq[from];
        (s2 - s * s / (to - from) as f64).max(0.0)
    }
}

/// Robust noise estimate from the median absolute first difference.
fn noise_level(signal: &[f64]) -> f64 {
    let mut diffs: Vec<f64> = signal.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    if diffs.is_empty() {
        return 0.0;
    }
    diffs.sort_by(|a, b| a.total_cmp(b));
    let mid = diffs.len() / 2;
    let median = if diffs.len() % 2 == 0 {
        (diffs[mid - 1] + diffs[mid]) / 2.0
    } else {
        diffs[mid]
    };
    median / (0.6745 * std::f64::consts::SQRT_2)
}

/// Interior changepoints of `signal`, sorted ascending.
///
/// A changepoint `k` starts a new regime at sample `k`. Every resulting
/// interval holds at least `min_size` samples.
pub fn detect_changepoints(signal: &[f64], config: &ChangepointConfig) -> Vec<usize> {
    let n = signal.len();
    let min_size = config.min_size.max(1);
    if n < 2 * min_size {
        return Vec::new();
    }

    let noise = noise_level(signal).max(config.min_noise);
    let penalty = config.penalty * noise * noise * (n as f64).ln();
    let cost = CostFunction::new(signal);

    let mut changepoints = Vec::new();
    let mut pending = vec![(0, n)];
    while let Some((from, to)) = pending.pop() {
        if to - from < 2 * min_size {
            continue;
        }
        let total = cost.cost(from, to);
        let mut best: Option<(usize, f64)> = None;
        for k in (from + min_size)..=(to - min_size) {
            let gain = total - cost.cost(from, k) - cost.cost(k, to);
            if best.map_or(true, |(_, g)| gain > g) {
                best = Some((k, gain));
            }
        }

        if let Some((k, gain)) = best {
            if gain > penalty {
                debug!(
                    "[ModeInference] Changepoint at {} in [{}, {}) (gain {:.1} > penalty {:.1})",
                    k, from, to, gain, penalty
                );
                changepoints.push(k);
                pending.push((from, k));
                pending.push((k, to));
            }
        }
    }

    changepoints.sort_unstable();
    changepoints
}

/// Boundary list `[0, changepoints.., len - 1]`.
///
/// Always starts with 0; a signal without changepoints yields `[0, len - 1]`
/// (or just `[0]` for a single sample).
pub fn boundaries(changepoints: &[usize], len: usize) -> Vec<usize> {
    let mut result = Vec::with_capacity(changepoints.len() + 2);
    result.push(0);
    result.extend(changepoints.iter().copied().filter(|&k| k > 0 && k < len));
    let last = len.saturating_sub(1);
    if result.last() != Some(&last) {
        result.push(last);
    }
    result
}

/// Half-open intervals between consecutive boundaries. The last interval
/// extends to `len` so every sample belongs to exactly one interval.
pub fn intervals(boundaries: &[usize], len: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let mut starts: Vec<usize> = boundaries.iter().copied().filter(|&b| b < len).collect();
    starts.dedup();
    // The final boundary marks the last sample, not the start of an interval
    if starts.len() > 1 && starts.last() == Some(&(len - 1)) {
        starts.pop();
    }
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &from)| from..starts.get(i + 1).copied().unwrap_or(len))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stationary, a short acceleration, then cruising at 30 km/h.
    fn ramp() -> Vec<f64> {
        let mut signal = vec![0.0; 51];
        signal.extend([6.0, 12.0, 18.0, 24.0]);
        signal.extend(std::iter::repeat(30.0).take(50));
        signal
    }

    #[test]
    fn test_ramp_single_changepoint() {
        let signal = ramp();
        let changepoints = detect_changepoints(&signal, &ChangepointConfig::default());
        assert_eq!(changepoints, vec![53]);
    }

    #[test]
    fn test_flat_signal_has_no_changepoints() {
        let signal = vec![12.0; 200];
        assert!(detect_changepoints(&signal, &ChangepointConfig::default()).is_empty());
    }

    #[test]
    fn test_short_signal_has_no_changepoints() {
        let signal = [0.0, 0.0, 50.0, 50.0];
        assert!(detect_changepoints(&signal, &ChangepointConfig::default()).is_empty());
    }

    #[test]
    fn test_min_size_respected() {
        let mut signal = vec![0.0; 40];
        signal.extend(vec![50.0; 40]);
        signal.extend(vec![0.0; 40]);
        let config = ChangepointConfig::default();
        let changepoints = detect_changepoints(&signal, &config);
        assert_eq!(changepoints, vec![40, 80]);

        let b = boundaries(&changepoints, signal.len());
        for w in b.windows(2) {
            assert!(w[1] - w[0] >= config.min_size);
        }
    }

    #[test]
    fn test_noise_level() {
        assert_eq!(noise_level(&[1.0, 1.0, 1.0]), 0.0);
        assert!(noise_level(&[0.0, 4.0, 0.0, 4.0, 0.0]) > 4.0);
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(boundaries(&[], 10), vec![0, 9]);
        assert_eq!(boundaries(&[4], 10), vec![0, 4, 9]);
        assert_eq!(boundaries(&[], 1), vec![0]);
    }

    #[test]
    fn test_intervals_cover_signal() {
        assert_eq!(intervals(&[0, 4, 9], 10), vec![0..4, 4..10]);
        assert_eq!(intervals(&[0, 9], 10), vec![0..10]);
        assert_eq!(intervals(&[0], 1), vec![0..1]);
        assert!(intervals(&[0], 0).is_empty());
    }
}
