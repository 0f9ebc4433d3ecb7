//! Spatiotemporal segmentation.
//!
//! Detects when one recording actually holds several trips (e.g. logging kept
//! running between them) by density clustering points in standardized
//! (latitude, longitude, time) space.
//!
//! ## Algorithm
//! 1. Standardize each feature column to zero mean and unit variance
//! 2. DBSCAN: points with at least `min_samples` neighbours (itself included)
//!    within `eps` are core points; neighbouring core points are joined with a
//!    disjoint-set forest, border points join their first core neighbour
//! 3. Walk the points in order: a clustered point whose cluster differs from
//!    the running segment's starts a new segment; noise points stay with the
//!    running segment

use log::{debug, info, warn};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::union_find::DisjointSet;
use crate::{compute_metrics, Point};

type IndexedFeature = GeomWithData<[f64; 3], usize>;

/// Configuration for spatiotemporal segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Neighbourhood radius in standardized units.
    /// Default: 0.15
    pub eps: f64,
    /// Neighbours (including the point itself) needed for a core point.
    /// Default: 80
    pub min_samples: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            eps: 0.15,
            min_samples: 80,
        }
    }
}

/// Split a recording into independent trips.
///
/// Concatenating the returned sequences reproduces the input exactly once, in
/// order. Without clusters the whole input comes back as one segment.
pub fn segment_points(points: Vec<Point>, config: &SegmentationConfig) -> Vec<Vec<Point>> {
    if points.is_empty() {
        return Vec::new();
    }

    let features = standardize(
        points
            .iter()
            .map(|p| [p.latitude(), p.longitude(), p.timestamp_secs()])
            .collect(),
    );
    let labels = dbscan(&features, config.eps, config.min_samples);

    let cluster_count = labels.iter().flatten().max().map_or(0, |&max| max + 1);
    if cluster_count == 0 {
        warn!(
            "[Segmenter] No clusters among {} points, keeping a single segment",
            points.len()
        );
        return vec![points];
    }

    let mut segments: Vec<Vec<Point>> = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    let mut running: Option<usize> = None;

    for (point, label) in points.into_iter().zip(labels) {
        if let Some(cluster) = label {
            if running != Some(cluster) {
                // Leading noise is adopted by the first cluster
                if running.is_some() {
                    segments.push(std::mem::take(&mut current));
                }
                running = Some(cluster);
            }
        }
        current.push(point);
    }
    if !current.is_empty() {
        segments.push(current);
    }

    info!(
        "[Segmenter] {} clusters produced {} segments",
        cluster_count,
        segments.len()
    );
    segments.into_iter().map(compute_metrics).collect()
}

/// Scale every column to zero mean and unit variance. Constant columns are
/// only centered.
fn standardize(features: Vec<[f64; 3]>) -> Vec<[f64; 3]> {
    let n = features.len() as f64;
    if features.is_empty() {
        return features;
    }

    let mut mean = [0.0; 3];
    for f in &features {
        for k in 0..3 {
            mean[k] += f[k] / n;
        }
    }
    let mut scale = [0.0; 3];
    for f in &features {
        for k in 0..3 {
            scale[k] += (f[k] - mean[k]).powi(2) / n;
        }
    }
    for s in &mut scale {
        *s = if *s > 0.0 { s.sqrt() } else { 1.0 };
    }

    features
        .into_iter()
        .map(|f| {
            [
                (f[0] - mean[0]) / scale[0],
                (f[1] - mean[1]) / scale[1],
                (f[2] - mean[2]) / scale[2],
            ]
        })
        .collect()
}

/// DBSCAN over 3-D features.
///
/// Returns one label per feature: `Some(cluster)` with clusters numbered in
/// order of first appearance, or `None` for noise.
pub fn dbscan(features: &[[f64; 3]], eps: f64, min_samples: usize) -> Vec<Option<usize>> {
    let n = features.len();
    if n == 0 {
        return Vec::new();
    }

    let tree: RTree<IndexedFeature> = RTree::bulk_load(
        features
            .iter()
            .enumerate()
            .map(|(i, f)| GeomWithData::new(*f, i))
            .collect(),
    );
    let eps_sq = eps * eps;
    let neighbours = |i: usize| tree.locate_within_distance(features[i], eps_sq).map(|g| g.data);

    let core: Vec<bool> = (0..n).map(|i| neighbours(i).count() >= min_samples).collect();
    debug!(
        "[Segmenter] {} of {} points are core points",
        core.iter().filter(|&&c| c).count(),
        n
    );

    let mut forest = DisjointSet::new(n);
    // Border points attach to their lowest-index core neighbour
    let mut border_anchor: Vec<Option<usize>> = vec![None; n];
    for i in 0..n {
        for j in neighbours(i) {
            if !core[j] {
                continue;
            }
            if core[i] {
                forest.union(i, j);
            } else if border_anchor[i].map_or(true, |anchor| j < anchor) {
                border_anchor[i] = Some(j);
            }
        }
    }

    let mut cluster_of_root: Vec<Option<usize>> = vec![None; n];
    let mut next_cluster = 0;
    (0..n)
        .map(|i| {
            let member = if core[i] { Some(i) } else { border_anchor[i] }?;
            let root = forest.find(member);
            let cluster = *cluster_of_root[root].get_or_insert_with(|| {
                next_cluster += 1;
                next_cluster - 1
            });
            Some(cluster)
        })
        .collect()
}
