//! Error types for creditline.
//!
//! All errors are strongly typed using thiserror. Ambiguous evidence is never
//! an error: it is expressed as low confidence, recorded conflicts and review
//! flags. Only genuinely invalid input, leaf-strategy failures and storage
//! failures surface here.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors raised when constructing or deserializing core objects.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        field: &'static str,
        value: f64,
    },

    #[error("Coverage level {value} must lie strictly between 0.0 and 1.0")]
    InvalidCoverageLevel {
        value: f64,
    },

    #[error("Attribution record must contain at least one credit")]
    EmptyCredits,

    #[error("Resolved entity must reference at least one source")]
    EmptySourceReferences,

    #[error("needs_review is set but no review reason was given")]
    MissingReviewReason,

    #[error("updated_at ({updated_at}) precedes created_at ({created_at})")]
    TimestampOrder {
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    },

    #[error("Version must be at least 1, got {version}")]
    InvalidVersion {
        version: u64,
    },

    #[error("Invalid provenance chain: {reason}")]
    InvalidProvenance {
        reason: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: &'static str,
    },

    #[error("Field '{field}' cannot be empty")]
    EmptyField {
        field: &'static str,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    #[error("Calibration requires at least one (prediction, outcome) pair")]
    EmptyCalibrationSet,

    #[error("Contributor {entity_id} is not part of the attribution record")]
    UnknownContributor {
        entity_id: String,
    },
}

impl ValidationError {
    /// Checks that `value` is a finite number in [0, 1].
    pub fn check_unit(field: &'static str, value: f64) -> Result<f64, Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(value)
        } else {
            Err(Self::ConfidenceOutOfRange { field, value })
        }
    }
}

/// Failures inside a leaf resolution strategy.
///
/// The orchestrator catches these at the strategy boundary and records the
/// strategy as having abstained; they never abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("{strategy} is unavailable: {reason}")]
    Unavailable {
        strategy: String,
        reason: String,
    },

    #[error("{strategy} timed out after {duration_ms}ms")]
    Timeout {
        strategy: String,
        duration_ms: u64,
    },

    #[error("{strategy} cannot run on degenerate input: {reason}")]
    DegenerateInput {
        strategy: String,
        reason: String,
    },

    #[error("{strategy} backend error: {message}")]
    Backend {
        strategy: String,
        message: String,
    },
}

impl StrategyError {
    /// Creates an unavailable error.
    pub fn unavailable(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }

    /// Creates a degenerate-input error.
    pub fn degenerate(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DegenerateInput {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    /// Name of the strategy that failed.
    #[must_use]
    pub fn strategy(&self) -> &str {
        match self {
            Self::Unavailable { strategy, .. }
            | Self::Timeout { strategy, .. }
            | Self::DegenerateInput { strategy, .. }
            | Self::Backend { strategy, .. } => strategy,
        }
    }
}

/// Top-level error type for creditline.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl CoreError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the caller may retry the operation unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Strategy(e) => matches!(e, StrategyError::Timeout { .. }),
            Self::Storage(e) => e.is_retryable(),
        }
    }
}

/// Result type alias for creditline operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::AttributionId;

    #[test]
    fn test_check_unit_bounds() {
        assert_eq!(ValidationError::check_unit("confidence", 0.0), Ok(0.0));
        assert_eq!(ValidationError::check_unit("confidence", 1.0), Ok(1.0));
        assert!(ValidationError::check_unit("confidence", 1.01).is_err());
        assert!(ValidationError::check_unit("confidence", -0.1).is_err());
        assert!(ValidationError::check_unit("confidence", f64::NAN).is_err());
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::InvalidCoverageLevel { value: 1.0 };
        assert!(err.to_string().contains("strictly between"));

        let err = ValidationError::ConfidenceOutOfRange {
            field: "source_agreement",
            value: 1.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("source_agreement"));
        assert!(msg.contains("1.5"));
    }

    #[test]
    fn test_strategy_error_names_strategy() {
        let err = StrategyError::Timeout {
            strategy: "llm".to_string(),
            duration_ms: 250,
        };
        assert_eq!(err.strategy(), "llm");
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_core_error_retryable() {
        let err: CoreError = ValidationError::EmptyCredits.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());

        let err: CoreError = StrategyError::Timeout {
            strategy: "llm".to_string(),
            duration_ms: 10,
        }
        .into();
        assert!(err.is_retryable());

        let err: CoreError = StorageError::VersionConflict {
            id: AttributionId::new(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(err.is_retryable());

        let err = CoreError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("unexpected state"));
    }
}
