//! Grouping of classified intervals into mode spans.

use std::ops::Range;

use crate::{ModeSpan, TransportMode};

/// A classified changepoint interval.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedInterval {
    pub range: Range<usize>,
    pub label: TransportMode,
    /// Seconds covered by the interval.
    pub duration: f64,
}

/// Merge consecutive intervals into spans.
///
/// A label change only starts a new span when the interval lasts longer than
/// `dt_threshold` seconds; shorter intervals are absorbed into the running
/// span. A leading `Unknown` span takes the label of the first classified
/// interval after it. The spans cover `[0, len)`.
pub fn group_intervals(intervals: &[ClassifiedInterval], len: usize, dt_threshold: f64) -> Vec<ModeSpan> {
    let Some(first) = intervals.first() else {
        return Vec::new();
    };

    let mut spans: Vec<ModeSpan> = Vec::new();
    let mut running = ModeSpan::new(first.label, 0, len);

    for interval in &intervals[1..] {
        if interval.label == running.label || interval.label == TransportMode::Unknown {
            continue;
        }
        if running.label == TransportMode::Unknown {
            running.label = interval.label;
        } else if interval.duration > dt_threshold {
            running.to = interval.range.start;
            spans.push(running);
            running = ModeSpan::new(interval.label, interval.range.start, len);
        }
    }

    running.to = len;
    spans.push(running);
    spans
}

/// Run-length grouping of per-point labels.
pub fn group_labels(labels: &[TransportMode]) -> Vec<ModeSpan> {
    let mut spans: Vec<ModeSpan> = Vec::new();
    for (i, &label) in labels.iter().enumerate() {
        match spans.last_mut() {
            Some(span) if span.label == label => span.to = i + 1,
            _ => spans.push(ModeSpan::new(label, i, i + 1)),
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransportMode::*;

    fn interval(range: Range<usize>, label: TransportMode, duration: f64) -> ClassifiedInterval {
        ClassifiedInterval {
            range,
            label,
            duration,
        }
    }

    #[test]
    fn test_distinct_labels_split() {
        let intervals = vec![interval(0..50, Stop, 50.0), interval(50..100, Vehicle, 50.0)];
        let spans = group_intervals(&intervals, 100, 10.0);
        assert_eq!(
            spans,
            vec![ModeSpan::new(Stop, 0, 50), ModeSpan::new(Vehicle, 50, 100)]
        );
    }

    #[test]
    fn test_same_labels_merge() {
        let intervals = vec![
            interval(0..20, Foot, 20.0),
            interval(20..40, Foot, 20.0),
            interval(40..60, Foot, 20.0),
        ];
        assert_eq!(group_intervals(&intervals, 60, 10.0), vec![ModeSpan::new(Foot, 0, 60)]);
    }

    #[test]
    fn test_short_flip_absorbed() {
        let intervals = vec![
            interval(0..30, Vehicle, 30.0),
            interval(30..35, Stop, 5.0),
            interval(35..80, Vehicle, 45.0),
        ];
        assert_eq!(group_intervals(&intervals, 80, 10.0), vec![ModeSpan::new(Vehicle, 0, 80)]);
    }

    #[test]
    fn test_leading_unknown_adopts_label() {
        let intervals = vec![interval(0..1, Unknown, 0.0), interval(1..40, Foot, 39.0)];
        assert_eq!(group_intervals(&intervals, 40, 10.0), vec![ModeSpan::new(Foot, 0, 40)]);
    }

    #[test]
    fn test_spans_partition() {
        let intervals = vec![
            interval(0..10, Stop, 10.0),
            interval(10..30, Foot, 20.0),
            interval(30..33, Vehicle, 3.0),
            interval(33..60, Vehicle, 27.0),
            interval(60..61, Unknown, 0.0),
            interval(61..90, Stop, 29.0),
        ];
        let spans = group_intervals(&intervals, 90, 10.0);
        assert!(ModeSpan::partitions(&spans, 90));
        assert_eq!(spans.len(), 4);
        assert_eq!(spans[2], ModeSpan::new(Vehicle, 33, 61));
    }

    #[test]
    fn test_empty() {
        assert!(group_intervals(&[], 0, 10.0).is_empty());
        assert!(group_labels(&[]).is_empty());
    }

    #[test]
    fn test_group_labels() {
        let spans = group_labels(&[Stop, Stop, Foot, Foot, Foot, Vehicle]);
        assert_eq!(
            spans,
            vec![
                ModeSpan::new(Stop, 0, 2),
                ModeSpan::new(Foot, 2, 5),
                ModeSpan::new(Vehicle, 5, 6),
            ]
        );
    }
}
