//! Conflict records for source disagreements.
//!
//! Conflicts are explicit objects, not hidden errors. When contributing
//! source records disagree on a field, resolution records one `Conflict` per
//! field with every source's value and a severity tier.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Creates a new random conflict ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity tier, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictSeverity {
    /// Cosmetic difference (spelling, article placement).
    Low,
    /// Plausible but unconfirmed difference (dates, durations).
    Medium,
    /// Material difference a reviewer should look at.
    High,
    /// Contradictory identity evidence.
    Critical,
}

impl ConflictSeverity {
    /// HIGH and CRITICAL conflicts force human review.
    #[must_use]
    pub const fn requires_review(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// The value one source reported for a conflicting field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictValue {
    /// `"source:source_id"` label of the contributing record.
    pub source: String,
    /// The reported value, rendered as text.
    pub value: String,
}

/// A disagreement between contributing sources on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique identifier for this conflict.
    pub id: ConflictId,

    /// The disagreeing field (`canonical_name`, `isrc`, `release_date`, ...).
    pub field: String,

    /// Severity tier.
    pub severity: ConflictSeverity,

    /// Per-source values, in contribution order.
    pub values: Vec<ConflictValue>,

    /// Optional explanation (e.g. why an identifier is malformed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Creates a new conflict.
    #[must_use]
    pub fn new(field: impl Into<String>, severity: ConflictSeverity, values: Vec<ConflictValue>) -> Self {
        Self {
            id: ConflictId::new(),
            field: field.into(),
            severity,
            values,
            note: None,
            detected_at: Utc::now(),
        }
    }

    /// Attaches an explanation.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Returns true if the conflict forces human review.
    #[must_use]
    pub const fn requires_review(&self) -> bool {
        self.severity.requires_review()
    }

    /// Number of distinct values reported.
    #[must_use]
    pub fn distinct_values(&self) -> usize {
        let mut values: Vec<&str> = self.values.iter().map(|v| v.value.as_str()).collect();
        values.sort_unstable();
        values.dedup();
        values.len()
    }
}
