//! Fellegi-Sunter probabilistic record linkage.
//!
//! Each record pair is reduced to an agreement pattern over comparison
//! fields (name plus configured metadata keys). Match (`m`) and non-match
//! (`u`) agreement probabilities and the match prior are estimated with EM;
//! the posterior match probability of each pair is the strategy's score.
//! Fields missing on either side are neutral.

use tracing::debug;

use crate::config::LinkageConfig;
use crate::error::StrategyError;
use crate::record::NormalizedRecord;
use crate::resolution::string::record_name_similarity;
use crate::resolution::{PairScore, ResolutionStrategy};
use crate::resolved::ResolutionMethod;

const PARAM_MIN: f64 = 0.001;
const PARAM_MAX: f64 = 0.999;
const VALUE_TOLERANCE: f64 = 0.01;

/// Estimated Fellegi-Sunter parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkageModel {
    /// Comparison field names, name first.
    pub fields: Vec<String>,
    /// P(field agrees | match).
    pub m: Vec<f64>,
    /// P(field agrees | non-match).
    pub u: Vec<f64>,
    /// Prior match rate.
    pub lambda: f64,
    /// EM iterations run.
    pub iterations: usize,
}

impl LinkageModel {
    /// Posterior match probability for one agreement pattern.
    #[must_use]
    pub fn posterior(&self, pattern: &[Option<bool>]) -> f64 {
        let mut log_match = self.lambda.ln();
        let mut log_non = (1.0 - self.lambda).ln();
        for (k, agrees) in pattern.iter().enumerate() {
            match agrees {
                Some(true) => {
                    log_match += self.m[k].ln();
                    log_non += self.u[k].ln();
                }
                Some(false) => {
                    log_match += (1.0 - self.m[k]).ln();
                    log_non += (1.0 - self.u[k]).ln();
                }
                None => {}
            }
        }
        // Logistic of the log-odds, stable for large magnitudes.
        let odds = log_match - log_non;
        if odds >= 0.0 {
            1.0 / (1.0 + (-odds).exp())
        } else {
            let e = odds.exp();
            e / (1.0 + e)
        }
    }

    /// Log-likelihood ratio weight of one field agreeing.
    #[must_use]
    pub fn agreement_weight(&self, field: usize) -> f64 {
        (self.m[field] / self.u[field]).log2()
    }
}

/// Probabilistic linkage matcher.
#[derive(Debug, Clone)]
pub struct LinkageMatcher {
    config: LinkageConfig,
}

impl Default for LinkageMatcher {
    fn default() -> Self {
        Self::new(LinkageConfig::default())
    }
}

impl LinkageMatcher {
    /// Linker with the given parameters.
    #[must_use]
    pub fn new(config: LinkageConfig) -> Self {
        Self { config }
    }

    fn field_names(&self) -> Vec<String> {
        std::iter::once("name".to_string())
            .chain(self.config.comparison_fields.iter().cloned())
            .collect()
    }

    /// Agreement pattern of one pair.
    #[must_use]
    pub fn compare(&self, a: &NormalizedRecord, b: &NormalizedRecord) -> Vec<Option<bool>> {
        let mut pattern = Vec::with_capacity(self.config.comparison_fields.len() + 1);
        pattern.push(Some(record_name_similarity(a, b) >= self.config.field_agreement));
        for field in &self.config.comparison_fields {
            let agrees = match (a.metadata.get(field), b.metadata.get(field)) {
                (Some(x), Some(y)) if !x.is_null() && !y.is_null() => Some(x.agrees_with(y, VALUE_TOLERANCE)),
                _ => None,
            };
            pattern.push(agrees);
        }
        pattern
    }

    /// Estimates parameters from the agreement patterns of a batch.
    ///
    /// # Errors
    ///
    /// Returns `StrategyError::DegenerateInput` when there are no patterns or
    /// every pattern is identical, leaving nothing to separate.
    pub fn estimate(&self, patterns: &[Vec<Option<bool>>]) -> Result<LinkageModel, StrategyError> {
        let fields = self.field_names();
        if patterns.is_empty() {
            return Err(StrategyError::degenerate("linkage", "no record pairs to compare"));
        }
        if patterns.iter().all(|p| *p == patterns[0]) {
            return Err(StrategyError::degenerate("linkage", "every pair has the same agreement pattern"));
        }

        let k = fields.len();
        let mut m = vec![0.9; k];
        let mut u = vec![0.1; k];
        let mut lambda = 0.1;
        let mut iterations = 0;

        for _ in 0..self.config.max_iterations {
            iterations += 1;
            let model = LinkageModel {
                fields: fields.clone(),
                m: m.clone(),
                u: u.clone(),
                lambda,
                iterations,
            };
            let weights: Vec<f64> = patterns.iter().map(|p| model.posterior(p)).collect();

            #[allow(clippy::cast_precision_loss)]
            let next_lambda = (weights.iter().sum::<f64>() / patterns.len() as f64).clamp(PARAM_MIN, PARAM_MAX);
            let mut next_m = vec![0.0; k];
            let mut next_u = vec![0.0; k];
            for field in 0..k {
                let (mut m_num, mut m_den, mut u_num, mut u_den) = (0.0, 0.0, 0.0, 0.0);
                for (pattern, w) in patterns.iter().zip(&weights) {
                    if let Some(agrees) = pattern[field] {
                        let hit = if agrees { 1.0 } else { 0.0 };
                        m_num += w * hit;
                        m_den += w;
                        u_num += (1.0 - w) * hit;
                        u_den += 1.0 - w;
                    }
                }
                next_m[field] = if m_den > 0.0 { (m_num / m_den).clamp(PARAM_MIN, PARAM_MAX) } else { m[field] };
                next_u[field] = if u_den > 0.0 { (u_num / u_den).clamp(PARAM_MIN, PARAM_MAX) } else { u[field] };
            }

            let delta = m
                .iter()
                .zip(&next_m)
                .chain(u.iter().zip(&next_u))
                .map(|(a, b)| (a - b).abs())
                .fold((lambda - next_lambda).abs(), f64::max);
            m = next_m;
            u = next_u;
            lambda = next_lambda;
            if delta < self.config.tolerance {
                break;
            }
        }

        debug!(iterations, lambda, "linkage parameters estimated");
        Ok(LinkageModel {
            fields,
            m,
            u,
            lambda,
            iterations,
        })
    }
}

impl ResolutionStrategy for LinkageMatcher {
    fn name(&self) -> &str {
        "probabilistic_linkage"
    }

    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Probabilistic
    }

    fn score_pairs(&self, records: &[&NormalizedRecord]) -> Result<Vec<PairScore>, StrategyError> {
        if records.len() < 2 {
            return Err(StrategyError::degenerate("linkage", "fewer than two records"));
        }
        let mut index = Vec::new();
        let mut patterns = Vec::new();
        for (i, left) in records.iter().enumerate() {
            for (offset, right) in records[i + 1..].iter().enumerate() {
                index.push((i, i + 1 + offset));
                patterns.push(self.compare(left, right));
            }
        }

        let model = self.estimate(&patterns)?;
        Ok(index
            .into_iter()
            .zip(&patterns)
            .map(|((left, right), pattern)| PairScore::new(left, right, model.posterior(pattern)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::source::SourceKind;

    fn recording(source: SourceKind, id: &str, name: &str, country: &str, date: &str) -> NormalizedRecord {
        NormalizedRecord::new(source, id, EntityType::Recording, name)
            .unwrap()
            .with_metadata("country", country)
            .with_metadata("release_date", date)
    }

    #[test]
    fn duplicates_outscore_distinct_records() {
        let records = [
            recording(SourceKind::MusicBrainz, "1", "Hey Jude", "GB", "1968-08-26"),
            recording(SourceKind::Discogs, "2", "Hey Jude", "GB", "1968-08-26"),
            recording(SourceKind::Spotify, "3", "Let It Be", "GB", "1970-03-06"),
            recording(SourceKind::FileMetadata, "4", "Yesterday", "US", "1965-09-13"),
            recording(SourceKind::Spotify, "5", "Something", "US", "1969-10-06"),
        ];
        let refs: Vec<&NormalizedRecord> = records.iter().collect();
        let pairs = LinkageMatcher::default().score_pairs(&refs).unwrap();
        assert_eq!(pairs.len(), 10);

        let dup = pairs.iter().find(|p| (p.left, p.right) == (0, 1)).unwrap();
        let best_other = pairs
            .iter()
            .filter(|p| (p.left, p.right) != (0, 1))
            .map(|p| p.score)
            .fold(0.0, f64::max);
        assert!(dup.score > best_other);
        assert!(pairs.iter().all(|p| (0.0..=1.0).contains(&p.score)));
    }

    #[test]
    fn identical_patterns_are_degenerate() {
        let records = [
            recording(SourceKind::MusicBrainz, "1", "A", "GB", "2000-01-01"),
            recording(SourceKind::Discogs, "2", "B", "US", "2001-01-01"),
        ];
        let refs: Vec<&NormalizedRecord> = records.iter().collect();
        let err = LinkageMatcher::default().score_pairs(&refs).unwrap_err();
        assert!(matches!(err, StrategyError::DegenerateInput { .. }));
    }

    #[test]
    fn missing_fields_are_neutral() {
        let matcher = LinkageMatcher::default();
        let a = NormalizedRecord::new(SourceKind::Discogs, "1", EntityType::Recording, "Help!").unwrap();
        let b = recording(SourceKind::Spotify, "2", "Help", "GB", "1965-07-19");
        let pattern = matcher.compare(&a, &b);
        assert_eq!(pattern[0], Some(true));
        assert!(pattern[1..].iter().all(Option::is_none));
    }

    #[test]
    fn parameters_stay_clamped() {
        let matcher = LinkageMatcher::default();
        let patterns = vec![
            vec![Some(true), Some(true), None, None, None],
            vec![Some(false), Some(false), None, None, None],
            vec![Some(false), Some(true), None, None, None],
        ];
        let model = matcher.estimate(&patterns).unwrap();
        assert!(model.m.iter().chain(&model.u).all(|p| (PARAM_MIN..=PARAM_MAX).contains(p)));
        assert!((PARAM_MIN..=PARAM_MAX).contains(&model.lambda));
        assert!(model.agreement_weight(0) > 0.0);
    }
}
