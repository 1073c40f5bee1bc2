//! Review scheduling and language-model gating.
//!
//! Priority favors the records a reviewer learns the most from: low
//! confidence, disputed sources, ambiguous prediction sets, records nobody
//! has revised yet and records that have gone stale.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::attribution::{AttributionRecord, CreditRole};
use crate::config::{LlmConfig, PriorityConfig};
use crate::confidence::clamp_unit;

/// Computes review priorities and orders records by them.
///
/// # Examples
///
/// ```
/// use creditline::ReviewPriorityQueue;
///
/// let queue = ReviewPriorityQueue::default();
/// assert!(queue.config().confidence_weight > 0.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewPriorityQueue {
    config: PriorityConfig,
}

impl ReviewPriorityQueue {
    /// Queue with the given coefficients.
    #[must_use]
    pub fn new(config: PriorityConfig) -> Self {
        Self { config }
    }

    /// The priority coefficients.
    #[must_use]
    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }

    /// Priority of a record as of now.
    #[must_use]
    pub fn compute_priority(&self, record: &AttributionRecord) -> f64 {
        self.priority_at(record, Utc::now())
    }

    /// Priority of a record as of `now`, bounded to [0, 1].
    ///
    /// Non-increasing in confidence and agreement; non-decreasing in age and
    /// in how few times the record has been revised.
    #[must_use]
    pub fn priority_at(&self, record: &AttributionRecord, now: DateTime<Utc>) -> f64 {
        let c = &self.config;
        let uncertainty = 1.0 - clamp_unit(record.confidence_score);
        let disagreement = 1.0 - clamp_unit(record.source_agreement);
        let ambiguity = ambiguity(record);
        #[allow(clippy::cast_precision_loss)]
        let novelty = 1.0 / record.version.max(1) as f64;
        let staleness = self.staleness(record.updated_at, now);

        let weighted = c.confidence_weight * uncertainty
            + c.agreement_weight * disagreement
            + c.ambiguity_weight * ambiguity
            + c.novelty_weight * novelty
            + c.staleness_weight * staleness;
        let total = c.confidence_weight + c.agreement_weight + c.ambiguity_weight + c.novelty_weight + c.staleness_weight;
        if total <= 0.0 {
            return 0.0;
        }
        clamp_unit(weighted / total)
    }

    fn staleness(&self, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let age_days = (now - updated_at).num_seconds().max(0) as f64 / 86_400.0;
        clamp_unit(age_days / self.config.staleness_horizon_days)
    }

    /// Every record paired with its priority, highest first.
    ///
    /// Ties keep input order.
    #[must_use]
    pub fn rank<'a>(&self, records: &'a [AttributionRecord]) -> Vec<(&'a AttributionRecord, f64)> {
        let now = Utc::now();
        let mut ranked: Vec<(&AttributionRecord, f64)> =
            records.iter().map(|r| (r, self.priority_at(r, now))).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// The `limit` most informative records to review next.
    #[must_use]
    pub fn next_for_review<'a>(&self, records: &'a [AttributionRecord], limit: usize) -> Vec<&'a AttributionRecord> {
        let selected: Vec<&AttributionRecord> =
            self.rank(records).into_iter().take(limit).map(|(record, _)| record).collect();
        debug!(candidates = records.len(), selected = selected.len(), "selected records for review");
        selected
    }
}

/// Mean prediction-set size relative to the all-roles set, in [0, 1].
fn ambiguity(record: &AttributionRecord) -> f64 {
    let all = CreditRole::ALL.len();
    if all <= 1 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let spread = (record.conformal_set.mean_size() - 1.0) / (all - 1) as f64;
    clamp_unit(spread)
}

/// Cost gate for language-model disambiguation.
///
/// The model is consulted only when every available cheap signal sits in
/// the ambiguous band; a decisive signal on either side skips it.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmGate {
    low: f64,
    high: f64,
}

impl Default for LlmGate {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

impl LlmGate {
    /// Gate over the half-open band `[low, high)`.
    #[must_use]
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Gate over the configured ambiguous band.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.ambiguous_low, config.ambiguous_high)
    }

    fn ambiguous(&self, score: f64) -> bool {
        score >= self.low && score < self.high
    }

    /// Returns true when the expensive strategy should run.
    #[must_use]
    pub fn should_invoke(&self, string_similarity: Option<f64>, embedding_similarity: Option<f64>) -> bool {
        match (string_similarity, embedding_similarity) {
            (None, None) => false,
            (Some(s), None) => self.ambiguous(s),
            (None, Some(e)) => self.ambiguous(e),
            (Some(s), Some(e)) => self.ambiguous(s) && self.ambiguous(e),
        }
    }
}
