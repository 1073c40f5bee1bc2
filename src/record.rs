//! Per-source input records.
//!
//! A `NormalizedRecord` is one source's view of one entity, already fetched
//! and normalized by an upstream connector. Records are immutable once built.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::error::ValidationError;
use crate::identifier::{IdentifierBundle, IdentifierKind};
use crate::source::SourceKind;
use crate::value::Value;

/// Metadata key carrying an explicit verification flag.
pub const VERIFIED_KEY: &str = "verified";

/// A typed edge from the record's entity to a related entity.
///
/// `target` is a stable key for the neighbor, e.g. `"iswc:T0702371821"` or a
/// work title when no identifier is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    /// Relation name, e.g. `performed_on`, `wrote`.
    pub kind: String,
    /// Neighbor key.
    pub target: String,
}

impl Relationship {
    /// Creates a relationship of `kind` to `target`.
    #[must_use]
    pub fn new(kind: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: target.into(),
        }
    }
}

/// One source's view of one entity.
///
/// # Examples
///
/// ```
/// use creditline::{EntityType, IdentifierKind, NormalizedRecord, SourceKind};
///
/// let record = NormalizedRecord::new(SourceKind::MusicBrainz, "mb-1", EntityType::Artist, "The Beatles")
///     .unwrap()
///     .with_identifier(IdentifierKind::Isni, "0000 0001 2150 7008")
///     .with_source_confidence(0.9)
///     .unwrap();
/// assert_eq!(record.key(), "musicbrainz:mb-1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Source that produced the record.
    pub source: SourceKind,

    /// Id of the record inside its source.
    pub source_id: String,

    /// What kind of entity the record describes.
    pub entity_type: EntityType,

    /// Primary name as reported by the source.
    pub canonical_name: String,

    /// Other names the source reports.
    #[serde(default)]
    pub alternative_names: Vec<String>,

    /// Standard identifiers.
    #[serde(default)]
    pub identifiers: IdentifierBundle,

    /// Typed metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    /// Edges to related entities, used as graph evidence.
    #[serde(default)]
    pub relationships: Vec<Relationship>,

    /// Confidence the source itself reports (0.0-1.0).
    pub source_confidence: f64,

    /// When the record was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl NormalizedRecord {
    /// Creates a record with full source confidence.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` if the name or source id is blank.
    pub fn new(
        source: SourceKind,
        source_id: impl Into<String>,
        entity_type: EntityType,
        canonical_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let source_id = source_id.into();
        let canonical_name = canonical_name.into();
        if source_id.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "source_id" });
        }
        if canonical_name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "canonical_name",
            });
        }
        Ok(Self {
            source,
            source_id,
            entity_type,
            canonical_name,
            alternative_names: Vec::new(),
            identifiers: IdentifierBundle::new(),
            metadata: BTreeMap::new(),
            relationships: Vec::new(),
            source_confidence: 1.0,
            fetched_at: Utc::now(),
        })
    }

    /// Sets the source-reported confidence.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ConfidenceOutOfRange` outside [0, 1].
    pub fn with_source_confidence(mut self, confidence: f64) -> Result<Self, ValidationError> {
        self.source_confidence = ValidationError::check_unit("source_confidence", confidence)?;
        Ok(self)
    }

    /// Adds an alternative name.
    #[must_use]
    pub fn with_alternative_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() && !self.alternative_names.contains(&name) {
            self.alternative_names.push(name);
        }
        self
    }

    /// Adds an identifier; the value is normalized.
    #[must_use]
    pub fn with_identifier(mut self, kind: IdentifierKind, value: impl AsRef<str>) -> Self {
        self.identifiers.insert(kind, value);
        self
    }

    /// Adds a metadata field.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Adds a relationship.
    #[must_use]
    pub fn with_relationship(mut self, kind: impl Into<String>, target: impl Into<String>) -> Self {
        let rel = Relationship::new(kind, target);
        if !self.relationships.contains(&rel) {
            self.relationships.push(rel);
        }
        self
    }

    /// Overrides the fetch time.
    #[must_use]
    pub fn fetched_at(mut self, at: DateTime<Utc>) -> Self {
        self.fetched_at = at;
        self
    }

    /// `"source:source_id"`, unique per record.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.source, self.source_id)
    }

    /// Canonical name followed by alternative names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str())
            .chain(self.alternative_names.iter().map(String::as_str))
    }

    /// True when the record carries an explicit artist/rights-holder verification.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.source == SourceKind::ArtistInput
            || self
                .metadata
                .get(VERIFIED_KEY)
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NormalizedRecord {
        NormalizedRecord::new(SourceKind::Discogs, "82730", EntityType::Artist, "Beatles, The").unwrap()
    }

    #[test]
    fn test_record_rejects_blank_fields() {
        assert!(NormalizedRecord::new(SourceKind::Discogs, "", EntityType::Artist, "x").is_err());
        assert!(NormalizedRecord::new(SourceKind::Discogs, "1", EntityType::Artist, "  ").is_err());
    }

    #[test]
    fn test_record_confidence_validated() {
        assert!(record().with_source_confidence(0.7).is_ok());
        assert!(record().with_source_confidence(1.7).is_err());
    }

    #[test]
    fn test_names_and_dedup() {
        let r = record()
            .with_alternative_name("The Beatles")
            .with_alternative_name("The Beatles")
            .with_alternative_name(" ");
        let names: Vec<&str> = r.names().collect();
        assert_eq!(names, vec!["Beatles, The", "The Beatles"]);
    }

    #[test]
    fn test_verification_signal() {
        assert!(!record().is_verified());
        assert!(record().with_metadata(VERIFIED_KEY, true).is_verified());
        let artist = NormalizedRecord::new(SourceKind::ArtistInput, "self", EntityType::Artist, "X").unwrap();
        assert!(artist.is_verified());
    }

    #[test]
    fn test_record_round_trip() {
        let r = record()
            .with_identifier(IdentifierKind::Isrc, "GBAYE0601690")
            .with_metadata("country", "GB")
            .with_metadata("formed", 1960)
            .with_relationship("performed_on", "iswc:T0702371821")
            .with_source_confidence(0.85)
            .unwrap();
        let json = serde_json::to_string(&r).unwrap();
        let back: NormalizedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
