//! One-dimensional probability decision tree.
//!
//! Fits `P(label | value)` from weighted positive/negative observations:
//! internal nodes split on a value threshold chosen by Gini impurity, leaves
//! hold the positive fraction of their samples.

use serde::{Deserialize, Serialize};

/// Weighted observations at a single value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub value: f64,
    pub positives: f64,
    pub negatives: f64,
}

impl TrainingSample {
    pub fn new(value: f64, positives: f64, negatives: f64) -> Self {
        Self {
            value,
            positives,
            negatives,
        }
    }

    fn total(&self) -> f64 {
        self.positives + self.negatives
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        probability: f64,
    },
    Split {
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Fitted tree. Values at or below a threshold go left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTree {
    root: Node,
    depth: usize,
}

impl ProbabilityTree {
    /// Fit a tree. Samples at equal values are merged first; an empty sample
    /// set gives a tree that predicts 0 everywhere.
    pub fn fit(samples: &[TrainingSample], max_depth: Option<usize>) -> Self {
        let merged = merge_samples(samples);
        let mut depth = 0;
        let root = grow(&merged, 0, max_depth, &mut depth);
        Self { root, depth }
    }

    /// Probability in `[0, 1]` that `value` belongs to the label.
    pub fn predict(&self, value: f64) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { probability } => return *probability,
                Node::Split {
                    threshold,
                    left,
                    right,
                } => node = if value <= *threshold { left } else { right },
            }
        }
    }

    /// Depth of the deepest leaf.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Sort by value and merge duplicates. Non-finite values and empty samples
/// are dropped.
fn merge_samples(samples: &[TrainingSample]) -> Vec<TrainingSample> {
    let mut sorted: Vec<TrainingSample> = samples
        .iter()
        .filter(|s| s.value.is_finite() && s.total() > 0.0)
        .copied()
        .collect();
    sorted.sort_by(|a, b| a.value.total_cmp(&b.value));

    let mut merged: Vec<TrainingSample> = Vec::with_capacity(sorted.len());
    for s in sorted {
        match merged.last_mut() {
            Some(last) if last.value == s.value => {
                last.positives += s.positives;
                last.negatives += s.negatives;
            }
            _ => merged.push(s),
        }
    }
    merged
}

fn gini(positives: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let p = positives / total;
    2.0 * p * (1.0 - p)
}

fn grow(samples: &[TrainingSample], depth: usize, max_depth: Option<usize>, deepest: &mut usize) -> Node {
    *deepest = (*deepest).max(depth);

    let positives: f64 = samples.iter().map(|s| s.positives).sum();
    let total: f64 = samples.iter().map(TrainingSample::total).sum();
    let leaf = Node::Leaf {
        probability: if total > 0.0 { positives / total } else { 0.0 },
    };

    let pure = positives <= 0.0 || positives >= total;
    if samples.len() < 2 || pure || max_depth.is_some_and(|max| depth >= max) {
        return leaf;
    }

    let parent = gini(positives, total);
    let mut best: Option<(usize, f64)> = None;
    let (mut left_pos, mut left_total) = (0.0, 0.0);
    for (i, s) in samples[..samples.len() - 1].iter().enumerate() {
        left_pos += s.positives;
        left_total += s.total();
        let right_total = total - left_total;
        let weighted = (left_total * gini(left_pos, left_total)
            + right_total * gini(positives - left_pos, right_total))
            / total;
        let improvement = parent - weighted;
        if best.map_or(true, |(_, b)| improvement > b) {
            best = Some((i, improvement));
        }
    }

    match best {
        Some((i, improvement)) if improvement > 1e-12 => {
            let threshold = (samples[i].value + samples[i + 1].value) / 2.0;
            Node::Split {
                threshold,
                left: Box::new(grow(&samples[..=i], depth + 1, max_depth, deepest)),
                right: Box::new(grow(&samples[i + 1..], depth + 1, max_depth, deepest)),
            }
        }
        _ => leaf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_step_function() {
        let samples = vec![
            TrainingSample::new(1.0, 10.0, 0.0),
            TrainingSample::new(2.0, 10.0, 0.0),
            TrainingSample::new(3.0, 0.0, 10.0),
            TrainingSample::new(4.0, 0.0, 10.0),
        ];
        let tree = ProbabilityTree::fit(&samples, None);
        assert_eq!(tree.predict(0.0), 1.0);
        assert_eq!(tree.predict(2.5), 1.0);
        assert_eq!(tree.predict(2.6), 0.0);
        assert_eq!(tree.predict(100.0), 0.0);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_leaf_probability_is_positive_fraction() {
        let samples = vec![
            TrainingSample::new(1.0, 3.0, 1.0),
            TrainingSample::new(5.0, 1.0, 3.0),
        ];
        let tree = ProbabilityTree::fit(&samples, None);
        assert_relative_eq!(tree.predict(1.0), 0.75);
        assert_relative_eq!(tree.predict(5.0), 0.25);
    }

    #[test]
    fn test_duplicates_merged() {
        let samples = vec![
            TrainingSample::new(2.0, 1.0, 0.0),
            TrainingSample::new(2.0, 0.0, 1.0),
        ];
        let tree = ProbabilityTree::fit(&samples, None);
        assert_relative_eq!(tree.predict(2.0), 0.5);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_max_depth() {
        let samples: Vec<TrainingSample> = (0..16)
            .map(|i| TrainingSample::new(i as f64, i as f64, 16.0 - i as f64))
            .collect();
        let tree = ProbabilityTree::fit(&samples, Some(2));
        assert!(tree.depth() <= 2);
        assert!(tree.predict(0.0) < tree.predict(15.0));
    }

    #[test]
    fn test_empty_predicts_zero() {
        let tree = ProbabilityTree::fit(&[], None);
        assert_eq!(tree.predict(3.0), 0.0);
    }

    #[test]
    fn test_serde_round_trip() {
        let samples = vec![
            TrainingSample::new(1.0, 10.0, 0.0),
            TrainingSample::new(3.0, 0.0, 10.0),
        ];
        let tree = ProbabilityTree::fit(&samples, None);
        let json = serde_json::to_string(&tree).unwrap();
        let restored: ProbabilityTree = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, tree);
    }
}
