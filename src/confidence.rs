//! Assurance tiers and calibration semantics.
//!
//! A confidence number alone says little. Every resolved entity and credit
//! also carries an assurance level describing what kind of evidence backs it,
//! and every conformal set names the calibration method that produced it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Strictly ordered evidence tier for identity resolution.
///
/// # Examples
///
/// ```
/// use creditline::AssuranceLevel;
///
/// assert!(AssuranceLevel::A3 > AssuranceLevel::A2);
/// assert_eq!(AssuranceLevel::from_evidence(true, 1, false), AssuranceLevel::A1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssuranceLevel {
    /// No identifier, a single weak source.
    A0,
    /// A single source carrying a standard identifier.
    A1,
    /// Two or more independent sources agree.
    A2,
    /// Explicit artist or rights-holder verification.
    A3,
}

impl AssuranceLevel {
    /// Derives the tier from the evidence available for one entity.
    ///
    /// `independent_sources` counts distinct source kinds, not records.
    #[must_use]
    pub fn from_evidence(has_identifier: bool, independent_sources: usize, verified: bool) -> Self {
        if verified {
            Self::A3
        } else if independent_sources >= 2 {
            Self::A2
        } else if has_identifier {
            Self::A1
        } else {
            Self::A0
        }
    }
}

impl Default for AssuranceLevel {
    fn default() -> Self {
        Self::A0
    }
}

impl fmt::Display for AssuranceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A0 => write!(f, "A0"),
            Self::A1 => write!(f, "A1"),
            Self::A2 => write!(f, "A2"),
            Self::A3 => write!(f, "A3"),
        }
    }
}

/// How a conformal prediction set was calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// Adaptive prediction sets using the nominal coverage as the mass threshold.
    ApsUncalibrated,

    /// Adaptive prediction sets with a split-conformal threshold derived from
    /// historical (prediction, outcome) pairs.
    ApsSplitConformal,
}

impl Default for CalibrationMethod {
    fn default() -> Self {
        Self::ApsUncalibrated
    }
}

impl fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApsUncalibrated => write!(f, "aps_uncalibrated"),
            Self::ApsSplitConformal => write!(f, "aps_split_conformal"),
        }
    }
}

/// Clamps a score into [0, 1], mapping non-finite values to 0.
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Probabilistic OR of two independent pieces of evidence.
///
/// `1 - (1 - prior) * (1 - evidence)`; never lower than either input.
#[must_use]
pub fn corroborate(prior: f64, evidence: f64) -> f64 {
    clamp_unit(1.0 - (1.0 - clamp_unit(prior)) * (1.0 - clamp_unit(evidence)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assurance_ordering() {
        assert!(AssuranceLevel::A0 < AssuranceLevel::A1);
        assert!(AssuranceLevel::A1 < AssuranceLevel::A2);
        assert!(AssuranceLevel::A2 < AssuranceLevel::A3);
    }

    #[test]
    fn test_assurance_from_evidence() {
        assert_eq!(AssuranceLevel::from_evidence(false, 1, false), AssuranceLevel::A0);
        assert_eq!(AssuranceLevel::from_evidence(true, 1, false), AssuranceLevel::A1);
        assert_eq!(AssuranceLevel::from_evidence(false, 2, false), AssuranceLevel::A2);
        assert_eq!(AssuranceLevel::from_evidence(false, 1, true), AssuranceLevel::A3);
    }

    #[test]
    fn test_assurance_serde_is_tag() {
        let json = serde_json::to_string(&AssuranceLevel::A2).unwrap();
        assert_eq!(json, "\"A2\"");
    }

    #[test]
    fn test_calibration_method_display() {
        assert_eq!(CalibrationMethod::ApsUncalibrated.to_string(), "aps_uncalibrated");
        let json = serde_json::to_string(&CalibrationMethod::ApsSplitConformal).unwrap();
        assert_eq!(json, "\"aps_split_conformal\"");
    }

    #[test]
    fn test_corroborate_never_weakens() {
        let posterior = corroborate(0.7, 0.5);
        assert!((posterior - 0.85).abs() < 1e-9);
        assert!(corroborate(0.99, 0.99) <= 1.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
    }
}
