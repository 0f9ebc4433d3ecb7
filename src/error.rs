//! Unified error handling for the trip pipeline.
//!
//! Every stage reports failures through [`TripError`]. Errors are local to the
//! segment being processed: a failing segment is reported to the caller and
//! never aborts sibling segments.

use thiserror::Error;

/// Unified error type for pipeline operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TripError {
    /// Fewer points than a stage needs remain after processing.
    #[error("{stage} left {point_count} points, minimum {minimum_required} required")]
    InsufficientPoints {
        stage: &'static str,
        point_count: usize,
        minimum_required: usize,
    },

    /// Unrecognised smoothing strategy token.
    #[error("invalid smoothing strategy '{value}', expected 'extrapolate' or 'inverse'")]
    InvalidStrategy { value: String },

    /// Unrecognised mode inference method token.
    #[error("invalid inference method '{value}', expected 'changepoint' or 'naive'")]
    InvalidInferenceMethod { value: String },

    /// Unrecognised transportation mode label.
    #[error("unknown transportation mode '{value}'")]
    InvalidMode { value: String },

    /// Mode spans do not partition the segment's points.
    #[error("mode spans do not cover [0, {point_count}) without gaps or overlaps")]
    InvalidModeSpans { point_count: usize },

    /// Changepoint mode inference was requested without a trained classifier.
    #[error("changepoint mode inference requires a trained classifier")]
    MissingClassifier,
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, TripError>;

/// Extension trait for converting Option to TripError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an insufficient points error.
    fn ok_or_insufficient_points(
        self,
        stage: &'static str,
        point_count: usize,
        minimum: usize,
    ) -> Result<T>;

    /// Convert Option to Result with a missing classifier error.
    fn ok_or_missing_classifier(self) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_points(
        self,
        stage: &'static str,
        point_count: usize,
        minimum: usize,
    ) -> Result<T> {
        self.ok_or(TripError::InsufficientPoints {
            stage,
            point_count,
            minimum_required: minimum,
        })
    }

    fn ok_or_missing_classifier(self) -> Result<T> {
        self.ok_or(TripError::MissingClassifier)
    }
}

/// Fail with [`TripError::InsufficientPoints`] unless `point_count >= minimum`.
pub(crate) fn ensure_points(stage: &'static str, point_count: usize, minimum: usize) -> Result<()> {
    (point_count >= minimum)
        .then_some(())
        .ok_or_insufficient_points(stage, point_count, minimum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TripError::InsufficientPoints {
            stage: "simplifier",
            point_count: 1,
            minimum_required: 2,
        };
        assert!(err.to_string().contains("simplifier"));
        assert!(err.to_string().contains("1 points"));

        let err = TripError::InvalidStrategy {
            value: "forward".to_string(),
        };
        assert!(err.to_string().contains("forward"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_insufficient_points("noise filter", 0, 2);
        assert!(matches!(
            result,
            Err(TripError::InsufficientPoints { point_count: 0, .. })
        ));

        let none: Option<i32> = None;
        assert_eq!(none.ok_or_missing_classifier(), Err(TripError::MissingClassifier));
    }

    #[test]
    fn test_ensure_points() {
        assert!(ensure_points("smoother", 2, 2).is_ok());
        assert!(ensure_points("smoother", 1, 2).is_err());
    }
}
