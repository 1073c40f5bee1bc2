//! Conformal confidence scoring.
//!
//! Adaptive prediction sets: candidate roles are ranked by evidence mass and
//! the shortest prefix reaching the coverage threshold becomes the set. A
//! calibration pass over historical (prediction, outcome) pairs measures the
//! expected calibration error and derives a split-conformal threshold that
//! replaces the nominal coverage when it is stricter.

use std::collections::BTreeMap;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::attribution::{Credit, CreditRole};
use crate::confidence::{clamp_unit, CalibrationMethod};
use crate::error::ValidationError;

const MASS_EPSILON: f64 = 1e-12;

/// Calibrated prediction sets attached to an attribution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct ConformalSet {
    /// Target coverage, strictly inside (0, 1).
    pub coverage_level: f64,

    /// One role set per credit (or one set for role-level evidence).
    pub prediction_sets: Vec<Vec<CreditRole>>,

    /// Size of each set.
    pub set_sizes: Vec<usize>,

    /// Achieved marginal coverage.
    pub marginal_coverage: f64,

    /// Calibration error estimate (non-negative).
    pub calibration_error: f64,

    /// How the threshold was derived.
    pub calibration_method: CalibrationMethod,

    /// Historical pairs used to derive the threshold; 0 when uncalibrated.
    pub calibration_sample_size: usize,
}

impl ConformalSet {
    /// Checks coverage bounds and internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` on a degenerate coverage level or
    /// inconsistent set sizes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_coverage(self.coverage_level)?;
        ValidationError::check_unit("marginal_coverage", self.marginal_coverage)?;
        if !(self.calibration_error.is_finite() && self.calibration_error >= 0.0) {
            return Err(ValidationError::ConfidenceOutOfRange {
                field: "calibration_error",
                value: self.calibration_error,
            });
        }
        let consistent = self.set_sizes.len() == self.prediction_sets.len()
            && self
                .prediction_sets
                .iter()
                .zip(&self.set_sizes)
                .all(|(set, size)| set.len() == *size);
        if !consistent {
            return Err(ValidationError::InvalidConfig {
                reason: "set_sizes do not match prediction_sets".to_string(),
            });
        }
        Ok(())
    }

    /// Sum of all set sizes.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.set_sizes.iter().sum()
    }

    /// Mean set size; larger means more ambiguity.
    #[must_use]
    pub fn mean_size(&self) -> f64 {
        if self.set_sizes.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = self.total_size() as f64 / self.set_sizes.len() as f64;
        mean
    }
}

impl Serialize for ConformalSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Self::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for ConformalSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let set = Self::deserialize(deserializer)?;
        set.validate().map_err(de::Error::custom)?;
        Ok(set)
    }
}

fn check_coverage(coverage: f64) -> Result<f64, ValidationError> {
    if coverage > 0.0 && coverage < 1.0 {
        Ok(coverage)
    } else {
        Err(ValidationError::InvalidCoverageLevel { value: coverage })
    }
}

/// One reliability bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    /// Inclusive lower edge.
    pub lower: f64,
    /// Upper edge.
    pub upper: f64,
    /// Pairs that fell in the bin.
    pub count: usize,
    /// Mean predicted probability.
    pub mean_predicted: f64,
    /// Fraction of positive outcomes.
    pub observed_rate: f64,
}

/// Result of a calibration pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Count-weighted mean gap between predicted and observed rates.
    pub expected_calibration_error: f64,
    /// Largest gap in any non-empty bin.
    pub max_calibration_error: f64,
    /// Non-empty bins, lowest first.
    pub bins: Vec<CalibrationBin>,
    /// Number of pairs.
    pub sample_size: usize,
    /// Coverage the threshold was derived for.
    pub coverage_level: f64,
    /// Split-conformal quantile of the nonconformity scores.
    pub quantile: f64,
    /// Fraction of calibration pairs covered at the derived threshold.
    pub empirical_coverage: f64,
    /// Always `ApsSplitConformal`.
    pub method: CalibrationMethod,
}

#[derive(Debug, Clone, PartialEq)]
struct Calibration {
    quantile: f64,
    error: f64,
    sample_size: usize,
    empirical_coverage: f64,
}

/// Adaptive-prediction-sets scorer.
///
/// # Examples
///
/// ```
/// use creditline::{ConformalScorer, CreditRole};
///
/// let scorer = ConformalScorer::default();
/// let sure = scorer.score(&[(CreditRole::Performer, 0.99)], 0.9).unwrap();
/// let split = scorer
///     .score(&[(CreditRole::Performer, 0.4), (CreditRole::Producer, 0.35), (CreditRole::Songwriter, 0.25)], 0.9)
///     .unwrap();
/// assert!(sure.total_size() < split.total_size());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConformalScorer {
    bins: usize,
    calibration: Option<Calibration>,
}

impl Default for ConformalScorer {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ConformalScorer {
    /// Creates an uncalibrated scorer with `bins` reliability bins.
    #[must_use]
    pub fn new(bins: usize) -> Self {
        Self {
            bins: bins.max(1),
            calibration: None,
        }
    }

    /// The method sets from this scorer will carry.
    #[must_use]
    pub const fn method(&self) -> CalibrationMethod {
        if self.calibration.is_some() {
            CalibrationMethod::ApsSplitConformal
        } else {
            CalibrationMethod::ApsUncalibrated
        }
    }

    fn threshold(&self, coverage: f64) -> f64 {
        match &self.calibration {
            Some(c) => coverage.max(c.quantile).min(1.0),
            None => coverage,
        }
    }

    /// Builds one prediction set from role-level evidence for a single work.
    ///
    /// Empty evidence yields the all-roles set.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidCoverageLevel` unless `0 < coverage < 1`,
    /// or `ConfidenceOutOfRange` for evidence outside [0, 1].
    pub fn score(&self, evidence: &[(CreditRole, f64)], coverage: f64) -> Result<ConformalSet, ValidationError> {
        check_coverage(coverage)?;
        for (_, confidence) in evidence {
            ValidationError::check_unit("evidence", *confidence)?;
        }
        let (set, mass) = self.prediction_set(evidence, coverage);
        Ok(self.assemble(coverage, vec![set], &[mass]))
    }

    /// Builds one prediction set per credit.
    ///
    /// Each credit contributes its own role at its confidence; the residual
    /// mass is spread over every other role.
    ///
    /// # Errors
    ///
    /// Same as [`ConformalScorer::score`].
    pub fn score_credits(&self, credits: &[Credit], coverage: f64) -> Result<ConformalSet, ValidationError> {
        check_coverage(coverage)?;
        if credits.is_empty() {
            let (set, mass) = self.prediction_set(&[], coverage);
            return Ok(self.assemble(coverage, vec![set], &[mass]));
        }
        let mut sets = Vec::with_capacity(credits.len());
        let mut masses = Vec::with_capacity(credits.len());
        for credit in credits {
            let confidence = ValidationError::check_unit("credit.confidence", credit.confidence)?;
            let (set, mass) = self.prediction_set(&[(credit.role, confidence)], coverage);
            sets.push(set);
            masses.push(mass);
        }
        Ok(self.assemble(coverage, sets, &masses))
    }

    fn prediction_set(&self, evidence: &[(CreditRole, f64)], coverage: f64) -> (Vec<CreditRole>, f64) {
        if evidence.is_empty() {
            return (CreditRole::ALL.to_vec(), 1.0);
        }
        let ranked = distribution(evidence);
        let threshold = self.threshold(coverage);
        let mut set = Vec::new();
        let mut mass = 0.0;
        for (role, p) in ranked {
            set.push(role);
            mass += p;
            if mass + MASS_EPSILON >= threshold {
                break;
            }
        }
        (set, clamp_unit(mass))
    }

    fn assemble(&self, coverage: f64, prediction_sets: Vec<Vec<CreditRole>>, masses: &[f64]) -> ConformalSet {
        let set_sizes: Vec<usize> = prediction_sets.iter().map(Vec::len).collect();
        #[allow(clippy::cast_precision_loss)]
        let mean_mass = masses.iter().sum::<f64>() / masses.len().max(1) as f64;
        let (marginal_coverage, calibration_error, sample_size) = match &self.calibration {
            Some(c) => (c.empirical_coverage, c.error, c.sample_size),
            None => (clamp_unit(mean_mass), (mean_mass - coverage).abs(), 0),
        };
        ConformalSet {
            coverage_level: coverage,
            prediction_sets,
            set_sizes,
            marginal_coverage,
            calibration_error,
            calibration_method: self.method(),
            calibration_sample_size: sample_size,
        }
    }

    /// Calibrates against historical `(predicted probability, observed outcome)` pairs.
    ///
    /// Returns the report and a scorer whose sets use the split-conformal
    /// threshold.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for an empty set, a degenerate coverage level
    /// or predictions outside [0, 1].
    pub fn calibrate(&self, pairs: &[(f64, bool)], coverage: f64) -> Result<(CalibrationReport, Self), ValidationError> {
        check_coverage(coverage)?;
        if pairs.is_empty() {
            return Err(ValidationError::EmptyCalibrationSet);
        }
        for (p, _) in pairs {
            ValidationError::check_unit("predicted_probability", *p)?;
        }

        let bins = reliability_bins(pairs, self.bins);
        let n = pairs.len();
        #[allow(clippy::cast_precision_loss)]
        let n_f = n as f64;
        let mut ece = 0.0;
        let mut max_error: f64 = 0.0;
        for bin in &bins {
            let gap = (bin.observed_rate - bin.mean_predicted).abs();
            #[allow(clippy::cast_precision_loss)]
            let weight = bin.count as f64 / n_f;
            ece += weight * gap;
            max_error = max_error.max(gap);
        }

        // Nonconformity: mass needed to reach the true role. A correct top
        // prediction needs its own probability; a miss needs everything.
        let mut scores: Vec<f64> = pairs.iter().map(|(p, hit)| if *hit { *p } else { 1.0 }).collect();
        scores.sort_by(f64::total_cmp);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let rank = ((n_f + 1.0) * coverage).ceil() as usize;
        let quantile = if rank > n { 1.0 } else { scores[rank.max(1) - 1] };
        let threshold = coverage.max(quantile).min(1.0);
        let covered = scores.iter().filter(|s| **s <= threshold + MASS_EPSILON).count();
        #[allow(clippy::cast_precision_loss)]
        let empirical_coverage = covered as f64 / n_f;

        debug!(
            sample_size = n,
            ece,
            quantile,
            empirical_coverage,
            "conformal calibration complete"
        );

        let report = CalibrationReport {
            expected_calibration_error: ece,
            max_calibration_error: max_error,
            bins,
            sample_size: n,
            coverage_level: coverage,
            quantile,
            empirical_coverage,
            method: CalibrationMethod::ApsSplitConformal,
        };
        let scorer = Self {
            bins: self.bins,
            calibration: Some(Calibration {
                quantile,
                error: ece,
                sample_size: n,
                empirical_coverage,
            }),
        };
        Ok((report, scorer))
    }
}

/// Collapses evidence to one mass per role and ranks it, highest first.
///
/// Repeated roles keep their maximum. A total below 1 leaves residual mass
/// spread evenly over unseen roles; a total above 1 is normalized.
fn distribution(evidence: &[(CreditRole, f64)]) -> Vec<(CreditRole, f64)> {
    let mut masses: BTreeMap<CreditRole, f64> = BTreeMap::new();
    for (role, confidence) in evidence {
        let entry = masses.entry(*role).or_insert(0.0);
        *entry = entry.max(clamp_unit(*confidence));
    }
    let total: f64 = masses.values().sum();
    if total > 1.0 {
        for mass in masses.values_mut() {
            *mass /= total;
        }
    } else {
        let unseen: Vec<CreditRole> = CreditRole::ALL.iter().copied().filter(|r| !masses.contains_key(r)).collect();
        if !unseen.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let share = (1.0 - total) / unseen.len() as f64;
            for role in unseen {
                masses.insert(role, share);
            }
        }
    }

    let mut ranked: Vec<(CreditRole, f64)> = masses.into_iter().collect();
    // Stable sort keeps role declaration order among equal masses.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

fn reliability_bins(pairs: &[(f64, bool)], bins: usize) -> Vec<CalibrationBin> {
    let mut sums = vec![(0usize, 0.0f64, 0usize); bins];
    for (p, hit) in pairs {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let index = ((p * bins as f64).floor() as usize).min(bins - 1);
        let slot = &mut sums[index];
        slot.0 += 1;
        slot.1 += p;
        if *hit {
            slot.2 += 1;
        }
    }
    sums.into_iter()
        .enumerate()
        .filter(|(_, (count, _, _))| *count > 0)
        .map(|(index, (count, sum, hits))| {
            #[allow(clippy::cast_precision_loss)]
            let (width, count_f) = (1.0 / bins as f64, count as f64);
            #[allow(clippy::cast_precision_loss)]
            let lower = index as f64 * width;
            #[allow(clippy::cast_precision_loss)]
            let observed_rate = hits as f64 / count_f;
            CalibrationBin {
                lower,
                upper: lower + width,
                count,
                mean_predicted: sum / count_f,
                observed_rate,
            }
        })
        .collect()
}
