//! Soft transportation-mode classifier.
//!
//! Each label owns an independent probability function of speed, a
//! [`ProbabilityTree`] trained on samples synthesized from hand-elicited
//! `(speed, probability)` anchors. A histogram feature vector is scored per
//! label as the time-share weighted mean probability of its bins, and the
//! most probable label wins.
//!
//! Models are immutable values: [`Classifier::learn`] returns a new version.
//! [`SharedClassifier`] publishes the current version to concurrent readers.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::features::{extract_features, feature_pairs};
use super::tree::{ProbabilityTree, TrainingSample};
use crate::{Segment, TransportMode};

/// A hand-elicited point of a label's probability curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Speed in km/h.
    pub value: f64,
    /// Membership probability at that speed.
    pub probability: f64,
}

impl Anchor {
    pub const fn new(value: f64, probability: f64) -> Self {
        Self { value, probability }
    }
}

const STOP_ANCHORS: &[Anchor] = &[
    Anchor::new(0.0, 1.0),
    Anchor::new(1.0, 0.9),
    Anchor::new(5.0, 0.18),
    Anchor::new(6.5, 0.0),
];

const FOOT_ANCHORS: &[Anchor] = &[
    Anchor::new(0.0, 0.0),
    Anchor::new(2.0, 0.1),
    Anchor::new(5.0, 0.8),
    Anchor::new(6.5, 0.95),
    Anchor::new(8.0, 0.8),
    Anchor::new(9.0, 0.1),
    Anchor::new(10.0, 0.0),
];

const RUN_ANCHORS: &[Anchor] = &[
    Anchor::new(6.5, 0.0),
    Anchor::new(7.0, 0.1),
    Anchor::new(11.0, 0.86),
    Anchor::new(22.0, 0.2),
    Anchor::new(28.0, 0.0),
];

const BIKE_ANCHORS: &[Anchor] = &[
    Anchor::new(6.5, 0.0),
    Anchor::new(7.0, 0.2),
    Anchor::new(10.0, 0.2),
    Anchor::new(20.0, 0.7),
    Anchor::new(21.0, 0.7),
    Anchor::new(22.0, 0.5),
    Anchor::new(38.0, 0.0),
];

const VEHICLE_ANCHORS: &[Anchor] = &[
    Anchor::new(9.0, 0.0),
    Anchor::new(10.0, 0.05),
    Anchor::new(20.0, 0.05),
    Anchor::new(38.0, 0.9),
    Anchor::new(40.0, 1.0),
];

/// Built-in anchors for a label. `None` for [`TransportMode::Unknown`].
pub fn default_anchors(label: TransportMode) -> Option<&'static [Anchor]> {
    match label {
        TransportMode::Stop => Some(STOP_ANCHORS),
        TransportMode::Foot => Some(FOOT_ANCHORS),
        TransportMode::Run => Some(RUN_ANCHORS),
        TransportMode::Bike => Some(BIKE_ANCHORS),
        TransportMode::Vehicle => Some(VEHICLE_ANCHORS),
        TransportMode::Unknown => None,
    }
}

/// Labels registered by [`Classifier::default_model`], in tie-break order.
pub const DEFAULT_LABELS: [TransportMode; 3] =
    [TransportMode::Stop, TransportMode::Foot, TransportMode::Vehicle];

static DEFAULT_MODEL: Lazy<Arc<Classifier>> =
    Lazy::new(|| Arc::new(Classifier::with_labels(&DEFAULT_LABELS, ClassifierConfig::default())));

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Interpolated values between consecutive anchors.
    /// Default: 100
    pub interpolation: usize,
    /// Observations synthesized per value (split into positives and
    /// negatives by the probability).
    /// Default: 100
    pub samples_per_value: usize,
    /// Maximum tree depth, unbounded when `None`.
    /// Default: None
    pub max_depth: Option<usize>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            interpolation: 100,
            samples_per_value: 100,
            max_depth: None,
        }
    }
}

/// Expand anchors into training samples by linear interpolation.
pub fn synthesize_samples(anchors: &[Anchor], config: &ClassifierConfig) -> Vec<TrainingSample> {
    let per_value = config.samples_per_value as f64;
    let sample = |value: f64, probability: f64| {
        let positives = (probability.clamp(0.0, 1.0) * per_value).round();
        TrainingSample::new(value, positives, per_value - positives)
    };

    let steps = config.interpolation + 1;
    let mut samples = Vec::with_capacity(anchors.len() * steps);
    for (i, anchor) in anchors.iter().enumerate() {
        samples.push(sample(anchor.value, anchor.probability));
        if i == 0 {
            continue;
        }
        let previous = anchors[i - 1];
        let value_step = (anchor.value - previous.value) / steps as f64;
        let probability_step = (anchor.probability - previous.probability) / steps as f64;
        for j in 1..steps {
            samples.push(sample(
                previous.value + value_step * j as f64,
                previous.probability + probability_step * j as f64,
            ));
        }
    }
    samples
}

/// Probability function of a single label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftClassifier {
    samples: Vec<TrainingSample>,
    tree: ProbabilityTree,
}

impl SoftClassifier {
    pub fn from_samples(samples: Vec<TrainingSample>, config: &ClassifierConfig) -> Self {
        let tree = ProbabilityTree::fit(&samples, config.max_depth);
        Self { samples, tree }
    }

    pub fn from_anchors(anchors: &[Anchor], config: &ClassifierConfig) -> Self {
        Self::from_samples(synthesize_samples(anchors, config), config)
    }

    /// Membership probability at a single speed.
    pub fn probability(&self, speed: f64) -> f64 {
        self.tree.predict(speed)
    }

    /// Time-share weighted mean probability over a feature vector's bins.
    pub fn feature_probability(&self, features: &[f64]) -> f64 {
        let (weighted, total) = feature_pairs(features).fold((0.0, 0.0), |(acc, total), (bin, weight)| {
            (acc + weight * self.probability(bin), total + weight)
        });
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    /// New classifier trained on the existing samples plus `extra`.
    fn with_samples(&self, extra: &[TrainingSample], config: &ClassifierConfig) -> Self {
        let mut samples = self.samples.clone();
        samples.extend_from_slice(extra);
        Self::from_samples(samples, config)
    }
}

/// Versioned set of per-label soft classifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    models: Vec<(TransportMode, SoftClassifier)>,
    config: ClassifierConfig,
    version: u64,
}

impl Classifier {
    /// Empty model. Classifies everything as `Unknown` until labels are
    /// registered.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            models: Vec::new(),
            config,
            version: 0,
        }
    }

    /// Shared instance of the built-in Stop / Foot / Vehicle model.
    pub fn default_model() -> Arc<Classifier> {
        Arc::clone(&DEFAULT_MODEL)
    }

    /// Model with the built-in anchors of each given label, registered in
    /// order. `Unknown` is skipped.
    pub fn with_labels(labels: &[TransportMode], config: ClassifierConfig) -> Self {
        labels.iter().fold(Self::new(config), |classifier, &label| match default_anchors(label) {
            Some(anchors) => classifier.register(label, anchors),
            None => classifier,
        })
    }

    /// Register (or replace) a label trained from anchors. Labels keep their
    /// first registration position.
    pub fn register(mut self, label: TransportMode, anchors: &[Anchor]) -> Self {
        let model = SoftClassifier::from_anchors(anchors, &self.config);
        match self.models.iter_mut().find(|(l, _)| *l == label) {
            Some((_, existing)) => *existing = model,
            None => self.models.push((label, model)),
        }
        self.version += 1;
        debug!("[Classifier] Registered {} ({} anchors)", label, anchors.len());
        self
    }

    /// Registered labels in tie-break order.
    pub fn labels(&self) -> Vec<TransportMode> {
        self.models.iter().map(|(label, _)| *label).collect()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn model(&self, label: TransportMode) -> Option<&SoftClassifier> {
        self.models.iter().find(|(l, _)| *l == label).map(|(_, m)| m)
    }

    /// Membership probability of every registered label.
    pub fn probabilities(&self, features: &[f64]) -> Vec<(TransportMode, f64)> {
        self.models
            .iter()
            .map(|(label, model)| (*label, model.feature_probability(features)))
            .collect()
    }

    /// Most probable label; ties go to the label registered first. Empty
    /// features or an empty model give `Unknown`.
    pub fn classify(&self, features: &[f64]) -> TransportMode {
        if features.is_empty() {
            return TransportMode::Unknown;
        }
        let mut best: Option<(TransportMode, f64)> = None;
        for (label, probability) in self.probabilities(features) {
            if best.map_or(true, |(_, p)| probability > p) {
                best = Some((label, probability));
            }
        }
        best.map_or(TransportMode::Unknown, |(label, _)| label)
    }

    /// Learn from a labelled segment, returning the next model version.
    ///
    /// Each span's histogram bins become positive evidence for its label and
    /// only that label's model is refit; other labels keep their models. A
    /// label without a model is created, seeded with the other labels'
    /// positive evidence as negatives. `Unknown` spans and spans without
    /// duration are ignored.
    pub fn learn(&self, segment: &Segment, ns: usize) -> Classifier {
        let per_value = self.config.samples_per_value as f64;
        let mut next = self.clone();

        for span in segment.modes() {
            if span.label == TransportMode::Unknown {
                continue;
            }
            let Some(points) = segment.points().get(span.from..span.to) else {
                continue;
            };
            let features = extract_features(points, ns);
            if features.is_empty() {
                continue;
            }

            let positives: Vec<TrainingSample> = feature_pairs(&features)
                .map(|(bin, weight)| TrainingSample::new(bin, weight * per_value, 0.0))
                .collect();

            let config = next.config.clone();
            match next.models.iter_mut().find(|(label, _)| *label == span.label) {
                Some((_, model)) => *model = model.with_samples(&positives, &config),
                None => {
                    let mut seed = next.opposing_evidence();
                    seed.extend_from_slice(&positives);
                    next.models
                        .push((span.label, SoftClassifier::from_samples(seed, &config)));
                }
            }
            debug!(
                "[Classifier] Learned {} span [{}, {}) over {} bins",
                span.label,
                span.from,
                span.to,
                positives.len()
            );
        }

        next.version = self.version + 1;
        info!(
            "[Classifier] Learned {} spans, model version {}",
            segment.modes().len(),
            next.version
        );
        next
    }

    /// Positive evidence of all registered labels, as negative samples.
    fn opposing_evidence(&self) -> Vec<TrainingSample> {
        self.models
            .iter()
            .flat_map(|(_, model)| model.samples())
            .filter(|s| s.positives > 0.0)
            .map(|s| TrainingSample::new(s.value, 0.0, s.positives))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Persistence for serialized classifier models.
///
/// Implementations live outside this crate (files, databases, key-value
/// stores); [`Classifier::to_json`] and [`Classifier::from_json`] provide
/// the serialized form.
pub trait ModelStore {
    type Error;

    /// Load the stored model, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Classifier>, Self::Error>;

    fn save(&self, classifier: &Classifier) -> Result<(), Self::Error>;
}

/// Copy-on-write publication of a classifier.
///
/// Readers take an `Arc` snapshot and keep using it for as long as they need;
/// learning trains a copy and swaps it in, so in-flight inference always sees
/// one consistent version. Writers are serialized.
#[derive(Debug)]
pub struct SharedClassifier {
    current: RwLock<Arc<Classifier>>,
    writer: Mutex<()>,
}

impl SharedClassifier {
    pub fn new(classifier: Classifier) -> Self {
        Self::from_arc(Arc::new(classifier))
    }

    pub fn from_arc(classifier: Arc<Classifier>) -> Self {
        Self {
            current: RwLock::new(classifier),
            writer: Mutex::new(()),
        }
    }

    /// Shared handle over the built-in model.
    pub fn default_model() -> Self {
        Self::from_arc(Classifier::default_model())
    }

    /// Current model version.
    pub fn snapshot(&self) -> Arc<Classifier> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Train the current model on a labelled segment and publish the result.
    pub fn learn(&self, segment: &Segment, ns: usize) -> Arc<Classifier> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let trained = Arc::new(self.snapshot().learn(segment, ns));
        self.publish(Arc::clone(&trained));
        trained
    }

    /// Publish a model (e.g. one loaded from a [`ModelStore`]), returning the
    /// previous one.
    ///
    /// The published version is never lower than the current one: a
    /// replacement with an older version is re-stamped as the next version.
    pub fn replace(&self, mut classifier: Classifier) -> Arc<Classifier> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        classifier.version = classifier.version.max(self.snapshot().version() + 1);
        self.publish(Arc::new(classifier))
    }

    fn publish(&self, classifier: Arc<Classifier>) -> Arc<Classifier> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        info!("[Classifier] Publishing model version {}", classifier.version());
        std::mem::replace(&mut *guard, classifier)
    }
}
