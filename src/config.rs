//! Tunable thresholds and weights.
//!
//! Every numeric constant that shapes a decision lives here so that callers
//! can tune it without code changes. All sections deserialize with defaults
//! for missing keys; `CoreConfig::validate` rejects values that would break
//! an invariant downstream.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Resolution cascade thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Combined string/embedding score at which two records match outright.
    pub match_threshold: f64,
    /// Combined score below which a pair is not worth corroborating.
    pub candidate_floor: f64,
    /// Resolution confidence below which an entity needs review.
    pub review_threshold: f64,
    /// Upper bound on the confidence of an unmatched single-source entity.
    pub single_source_cap: f64,
    /// Weight of string similarity when both lexical and embedding scores exist.
    pub string_weight: f64,
    /// Name similarity at or above which a name conflict is only MEDIUM.
    pub name_conflict_similarity: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.85,
            candidate_floor: 0.6,
            review_threshold: 0.7,
            single_source_cap: 0.5,
            string_weight: 0.6,
            name_conflict_similarity: 0.85,
        }
    }
}

/// Fellegi-Sunter linkage parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkageConfig {
    /// Run linkage at all.
    pub enabled: bool,
    /// Posterior match probability at which a pair is linked.
    pub probability_threshold: f64,
    /// Pairs below this probability are not considered by later strategies.
    pub prune_below: f64,
    /// Minimum number of unresolved records before linkage runs.
    pub min_batch: usize,
    /// EM iteration cap.
    pub max_iterations: usize,
    /// EM convergence tolerance on parameter change.
    pub tolerance: f64,
    /// String similarity at which a compared field counts as agreeing.
    pub field_agreement: f64,
    /// Metadata keys compared in addition to the name.
    pub comparison_fields: Vec<String>,
}

impl Default for LinkageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probability_threshold: 0.9,
            prune_below: 0.05,
            min_batch: 4,
            max_iterations: 50,
            tolerance: 1e-6,
            field_agreement: 0.85,
            comparison_fields: vec![
                "country".to_string(),
                "release_date".to_string(),
                "duration_ms".to_string(),
                "label".to_string(),
            ],
        }
    }
}

/// Relationship-graph evidence parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Minimum shared neighbors before graph evidence counts.
    pub min_shared_neighbors: usize,
    /// Neighborhood radius explored around each record.
    pub max_depth: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_shared_neighbors: 2,
            max_depth: 1,
        }
    }
}

/// Language-model gating and timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Lower edge of the ambiguous band.
    pub ambiguous_low: f64,
    /// Upper edge of the ambiguous band.
    pub ambiguous_high: f64,
    /// Call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum candidates sent in one request.
    pub max_candidates: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ambiguous_low: 0.5,
            ambiguous_high: 0.85,
            timeout_ms: 2_000,
            max_candidates: 5,
        }
    }
}

/// Credit aggregation weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Share of a per-source score taken from resolution confidence; the rest
    /// comes from source reliability.
    pub resolution_weight: f64,
    /// Fraction of the mean credit confidence kept at zero agreement.
    pub agreement_floor: f64,
    /// Agreement penalty per HIGH or CRITICAL conflict on a contributor.
    pub conflict_penalty: f64,
    /// Record confidence below which review is required.
    pub review_confidence: f64,
    /// Source agreement below which review is required.
    pub review_agreement: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            resolution_weight: 0.6,
            agreement_floor: 0.5,
            conflict_penalty: 0.15,
            review_confidence: 0.7,
            review_agreement: 0.5,
        }
    }
}

/// Conformal scoring defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformalConfig {
    /// Target coverage, strictly inside (0, 1).
    pub coverage_level: f64,
    /// Number of reliability bins for calibration error.
    pub calibration_bins: usize,
}

impl Default for ConformalConfig {
    fn default() -> Self {
        Self {
            coverage_level: 0.9,
            calibration_bins: 10,
        }
    }
}

/// Review priority coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// Weight of low confidence.
    pub confidence_weight: f64,
    /// Weight of source disagreement.
    pub agreement_weight: f64,
    /// Weight of prediction-set ambiguity.
    pub ambiguity_weight: f64,
    /// Weight of records never revised.
    pub novelty_weight: f64,
    /// Weight of time since the last update.
    pub staleness_weight: f64,
    /// Age in days at which the staleness signal saturates.
    pub staleness_horizon_days: f64,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            confidence_weight: 0.35,
            agreement_weight: 0.25,
            ambiguity_weight: 0.10,
            novelty_weight: 0.15,
            staleness_weight: 0.15,
            staleness_horizon_days: 90.0,
        }
    }
}

/// Parallel group processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads for batch resolution.
    pub workers: usize,
    /// Maximum queued groups.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

/// Top-level configuration.
///
/// # Examples
///
/// ```
/// use creditline::CoreConfig;
///
/// let config = CoreConfig::from_json_str(r#"{"conformal": {"coverage_level": 0.8}}"#).unwrap();
/// assert_eq!(config.conformal.coverage_level, 0.8);
/// assert_eq!(config.resolution.review_threshold, 0.7);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Resolution thresholds.
    pub resolution: ResolutionConfig,
    /// Probabilistic linkage.
    pub linkage: LinkageConfig,
    /// Relationship graph.
    pub graph: GraphConfig,
    /// Language-model gating.
    pub llm: LlmConfig,
    /// Credit aggregation.
    pub aggregation: AggregationConfig,
    /// Conformal scoring.
    pub conformal: ConformalConfig,
    /// Review priority.
    pub priority: PriorityConfig,
    /// Batch processing.
    pub pipeline: PipelineConfig,
}

impl CoreConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges and cross-field ordering.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let units = [
            ("resolution.match_threshold", self.resolution.match_threshold),
            ("resolution.candidate_floor", self.resolution.candidate_floor),
            ("resolution.review_threshold", self.resolution.review_threshold),
            ("resolution.single_source_cap", self.resolution.single_source_cap),
            ("resolution.string_weight", self.resolution.string_weight),
            ("resolution.name_conflict_similarity", self.resolution.name_conflict_similarity),
            ("linkage.probability_threshold", self.linkage.probability_threshold),
            ("linkage.prune_below", self.linkage.prune_below),
            ("linkage.field_agreement", self.linkage.field_agreement),
            ("llm.ambiguous_low", self.llm.ambiguous_low),
            ("llm.ambiguous_high", self.llm.ambiguous_high),
            ("aggregation.resolution_weight", self.aggregation.resolution_weight),
            ("aggregation.agreement_floor", self.aggregation.agreement_floor),
            ("aggregation.conflict_penalty", self.aggregation.conflict_penalty),
            ("aggregation.review_confidence", self.aggregation.review_confidence),
            ("aggregation.review_agreement", self.aggregation.review_agreement),
        ];
        for (field, value) in units {
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(invalid(format!("{field} must be in [0, 1], got {value}")));
            }
        }

        if self.resolution.candidate_floor > self.resolution.match_threshold {
            return Err(invalid("resolution.candidate_floor exceeds resolution.match_threshold"));
        }
        if self.llm.ambiguous_low >= self.llm.ambiguous_high {
            return Err(invalid("llm.ambiguous_low must be below llm.ambiguous_high"));
        }
        let coverage = self.conformal.coverage_level;
        if !(coverage > 0.0 && coverage < 1.0) {
            return Err(ValidationError::InvalidCoverageLevel { value: coverage });
        }
        if self.conformal.calibration_bins == 0 {
            return Err(invalid("conformal.calibration_bins must be positive"));
        }
        if self.linkage.max_iterations == 0 {
            return Err(invalid("linkage.max_iterations must be positive"));
        }

        let p = &self.priority;
        let weights = [
            p.confidence_weight,
            p.agreement_weight,
            p.ambiguity_weight,
            p.novelty_weight,
            p.staleness_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid("priority weights must be non-negative"));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(invalid("priority weights must not all be zero"));
        }
        if !(p.staleness_horizon_days.is_finite() && p.staleness_horizon_days > 0.0) {
            return Err(invalid("priority.staleness_horizon_days must be positive"));
        }

        if self.pipeline.workers == 0 || self.pipeline.queue_capacity == 0 {
            return Err(invalid("pipeline.workers and pipeline.queue_capacity must be positive"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig { reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = CoreConfig::from_json_str(r#"{"llm": {"timeout_ms": 50}}"#).unwrap();
        assert_eq!(config.llm.timeout_ms, 50);
        assert_eq!(config.llm.ambiguous_low, 0.5);
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_rejects_degenerate_coverage() {
        let err = CoreConfig::from_json_str(r#"{"conformal": {"coverage_level": 1.0}}"#).unwrap_err();
        assert_eq!(err, ValidationError::InvalidCoverageLevel { value: 1.0 });
    }

    #[test]
    fn test_rejects_inverted_band() {
        let err = CoreConfig::from_json_str(r#"{"llm": {"ambiguous_low": 0.9, "ambiguous_high": 0.6}}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { .. }));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            CoreConfig::from_json_str("{not json"),
            Err(ValidationError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut config = CoreConfig::default();
        config.resolution.review_threshold = 1.4;
        assert!(config.validate().is_err());
    }
}
