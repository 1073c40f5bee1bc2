//! Resolved entities: the output of the resolution cascade.
//!
//! A `ResolvedEntity` is created once per resolution pass and never mutated.
//! Corrections produce a new entity whose `merged_from` points back at the
//! entity it replaces.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::confidence::AssuranceLevel;
use crate::conflict::Conflict;
use crate::entity::{EntityId, EntityType};
use crate::error::ValidationError;
use crate::identifier::IdentifierBundle;
use crate::source::{SourceKind, SourceReference};

/// Which strategy produced a resolution decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionMethod {
    /// Shared standard identifier.
    ExactId,
    /// Normalized name similarity.
    StringSimilarity,
    /// Dense-vector similarity.
    Embedding,
    /// Fellegi-Sunter match probability.
    Probabilistic,
    /// Shared-relationship evidence.
    Graph,
    /// Language-model disambiguation.
    LlmAssisted,
    /// No other record matched; the entity stands alone.
    SingleSource,
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExactId => "EXACT_ID",
            Self::StringSimilarity => "STRING_SIMILARITY",
            Self::Embedding => "EMBEDDING",
            Self::Probabilistic => "PROBABILISTIC",
            Self::Graph => "GRAPH",
            Self::LlmAssisted => "LLM_ASSISTED",
            Self::SingleSource => "SINGLE_SOURCE",
        };
        f.write_str(name)
    }
}

/// Per-strategy breakdown of how an entity was resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionDetails {
    /// Every `"tag:value"` identifier pair that matched across records.
    #[serde(default)]
    pub matched_identifiers: Vec<String>,

    /// Best pairwise name similarity, when computed.
    #[serde(default)]
    pub string_similarity: Option<f64>,

    /// Best pairwise embedding similarity, when computed.
    #[serde(default)]
    pub embedding_similarity: Option<f64>,

    /// Best Fellegi-Sunter match probability, when computed.
    #[serde(default)]
    pub linkage_probability: Option<f64>,

    /// Best relationship-evidence score, when computed.
    #[serde(default)]
    pub graph_score: Option<f64>,

    /// Explanation returned by the language model, when consulted.
    #[serde(default)]
    pub llm_reasoning: Option<String>,

    /// Strategies that abstained, with the reason.
    #[serde(default)]
    pub abstentions: Vec<String>,
}

impl ResolutionDetails {
    /// Records an abstaining strategy once.
    pub fn abstain(&mut self, note: impl Into<String>) {
        let note = note.into();
        if !self.abstentions.contains(&note) {
            self.abstentions.push(note);
        }
    }
}

/// The canonical entity produced by resolution.
///
/// # Examples
///
/// ```
/// use creditline::{EntityType, ResolutionMethod, ResolvedEntity, SourceKind, SourceReference};
///
/// let entity = ResolvedEntity::builder()
///     .entity_type(EntityType::Artist)
///     .canonical_name("The Beatles")
///     .source(SourceReference::new(SourceKind::MusicBrainz, "mb-1", 1.0).unwrap())
///     .method(ResolutionMethod::SingleSource)
///     .confidence(0.5)
///     .build()
///     .unwrap();
/// assert_eq!(entity.version, 1);
/// assert!(!entity.needs_review);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct ResolvedEntity {
    /// Stable id.
    pub id: EntityId,

    /// Entity kind.
    pub entity_type: EntityType,

    /// Chosen primary name.
    pub canonical_name: String,

    /// Every other name reported by a contributing source.
    #[serde(default)]
    pub alternative_names: Vec<String>,

    /// Union of the contributing records' identifiers.
    #[serde(default)]
    pub identifiers: IdentifierBundle,

    /// Contributing sources; never empty.
    pub sources: Vec<SourceReference>,

    /// Strategy that made the decision.
    pub resolution_method: ResolutionMethod,

    /// Confidence in the decision (0.0-1.0).
    pub resolution_confidence: f64,

    /// Sub-scores and abstentions.
    #[serde(default)]
    pub details: ResolutionDetails,

    /// Evidence tier.
    pub assurance_level: AssuranceLevel,

    /// Source disagreements.
    #[serde(default)]
    pub conflicts: Vec<Conflict>,

    /// Whether a human should look at this entity.
    pub needs_review: bool,

    /// Why review is needed; present whenever `needs_review` is set.
    #[serde(default)]
    pub review_reason: Option<String>,

    /// The entity this one corrects, if any.
    #[serde(default)]
    pub merged_from: Option<EntityId>,

    /// Lineage depth, starting at 1.
    pub version: u64,

    /// When this entity was produced.
    pub created_at: DateTime<Utc>,
}

impl ResolvedEntity {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> ResolvedEntityBuilder {
        ResolvedEntityBuilder::new()
    }

    /// Checks every structural invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.canonical_name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "canonical_name",
            });
        }
        if self.sources.is_empty() {
            return Err(ValidationError::EmptySourceReferences);
        }
        ValidationError::check_unit("resolution_confidence", self.resolution_confidence)?;
        for source in &self.sources {
            ValidationError::check_unit("agreement_score", source.agreement_score)?;
        }
        if self.needs_review && self.review_reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
            return Err(ValidationError::MissingReviewReason);
        }
        if self.version == 0 {
            return Err(ValidationError::InvalidVersion { version: 0 });
        }
        Ok(())
    }

    /// Distinct source kinds backing this entity.
    #[must_use]
    pub fn source_kinds(&self) -> BTreeSet<SourceKind> {
        self.sources.iter().map(|s| s.source.clone()).collect()
    }

    /// Mean agreement score across contributing sources.
    #[must_use]
    pub fn mean_agreement(&self) -> f64 {
        if self.sources.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.sources.len() as f64;
        self.sources.iter().map(|s| s.agreement_score).sum::<f64>() / n
    }

    /// Produces the corrected successor of this entity.
    ///
    /// The successor gets a fresh id, `merged_from` pointing here and the
    /// next version. Identifiers in the correction override existing values
    /// of the same scheme. A renamed entity keeps its old name as an
    /// alternative.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the correction leaves the entity invalid.
    pub fn corrected(&self, correction: EntityCorrection) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        next.id = EntityId::new();
        next.merged_from = Some(self.id);
        next.version = self.version + 1;
        next.created_at = Utc::now().max(self.created_at);

        if let Some(name) = correction.canonical_name {
            if name != self.canonical_name {
                let previous = std::mem::replace(&mut next.canonical_name, name);
                next.alternative_names.retain(|n| *n != next.canonical_name);
                if !next.alternative_names.contains(&previous) {
                    next.alternative_names.push(previous);
                }
            }
        }
        for (kind, value) in correction.identifiers.iter() {
            next.identifiers.insert(kind.clone(), value);
        }
        if let Some(confidence) = correction.resolution_confidence {
            next.resolution_confidence = ValidationError::check_unit("resolution_confidence", confidence)?;
        }
        if let Some(level) = correction.assurance_level {
            next.assurance_level = level;
        }
        if correction.resolve_review {
            next.needs_review = false;
            next.review_reason = None;
        }
        next.validate()?;
        Ok(next)
    }
}

impl Serialize for ResolvedEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Self::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for ResolvedEntity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entity = Self::deserialize(deserializer)?;
        entity.validate().map_err(de::Error::custom)?;
        Ok(entity)
    }
}

/// A human or upstream correction applied to a resolved entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityCorrection {
    /// Replacement primary name.
    pub canonical_name: Option<String>,
    /// Identifiers to add or override.
    pub identifiers: IdentifierBundle,
    /// Replacement confidence.
    pub resolution_confidence: Option<f64>,
    /// Replacement assurance tier.
    pub assurance_level: Option<AssuranceLevel>,
    /// Clears the review flag.
    pub resolve_review: bool,
}

/// Builder for `ResolvedEntity`.
#[derive(Debug, Default)]
pub struct ResolvedEntityBuilder {
    id: Option<EntityId>,
    entity_type: Option<EntityType>,
    canonical_name: Option<String>,
    alternative_names: Vec<String>,
    identifiers: IdentifierBundle,
    sources: Vec<SourceReference>,
    method: Option<ResolutionMethod>,
    confidence: Option<f64>,
    details: ResolutionDetails,
    assurance_level: AssuranceLevel,
    conflicts: Vec<Conflict>,
    needs_review: bool,
    review_reason: Option<String>,
    merged_from: Option<EntityId>,
    version: Option<u64>,
    created_at: Option<DateTime<Utc>>,
}

impl ResolvedEntityBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the id (generated when omitted).
    #[must_use]
    pub fn id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the entity type.
    #[must_use]
    pub fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    /// Sets the canonical name.
    #[must_use]
    pub fn canonical_name(mut self, name: impl Into<String>) -> Self {
        self.canonical_name = Some(name.into());
        self
    }

    /// Sets the alternative names.
    #[must_use]
    pub fn alternative_names(mut self, names: Vec<String>) -> Self {
        self.alternative_names = names;
        self
    }

    /// Sets the identifiers.
    #[must_use]
    pub fn identifiers(mut self, identifiers: IdentifierBundle) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Adds one contributing source.
    #[must_use]
    pub fn source(mut self, source: SourceReference) -> Self {
        self.sources.push(source);
        self
    }

    /// Replaces the contributing sources.
    #[must_use]
    pub fn sources(mut self, sources: Vec<SourceReference>) -> Self {
        self.sources = sources;
        self
    }

    /// Sets the resolution method.
    #[must_use]
    pub fn method(mut self, method: ResolutionMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the resolution confidence.
    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Sets the per-strategy details.
    #[must_use]
    pub fn details(mut self, details: ResolutionDetails) -> Self {
        self.details = details;
        self
    }

    /// Sets the assurance tier.
    #[must_use]
    pub fn assurance_level(mut self, level: AssuranceLevel) -> Self {
        self.assurance_level = level;
        self
    }

    /// Sets the conflicts.
    #[must_use]
    pub fn conflicts(mut self, conflicts: Vec<Conflict>) -> Self {
        self.conflicts = conflicts;
        self
    }

    /// Flags the entity for review with a reason.
    #[must_use]
    pub fn review(mut self, reason: impl Into<String>) -> Self {
        self.needs_review = true;
        self.review_reason = Some(reason.into());
        self
    }

    /// Sets the review flag directly; `build` rejects a flag without a reason.
    #[must_use]
    pub fn needs_review(mut self, needs_review: bool) -> Self {
        self.needs_review = needs_review;
        self
    }

    /// Marks this entity as a correction of `id`.
    #[must_use]
    pub fn merged_from(mut self, id: EntityId) -> Self {
        self.merged_from = Some(id);
        self
    }

    /// Sets the lineage version (1 when omitted).
    #[must_use]
    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the creation time (now when omitted).
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Builds the entity.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a required field is missing or an
    /// invariant is violated.
    pub fn build(self) -> Result<ResolvedEntity, ValidationError> {
        let entity = ResolvedEntity {
            id: self.id.unwrap_or_default(),
            entity_type: self
                .entity_type
                .ok_or(ValidationError::MissingField { field: "entity_type" })?,
            canonical_name: self
                .canonical_name
                .ok_or(ValidationError::MissingField { field: "canonical_name" })?,
            alternative_names: self.alternative_names,
            identifiers: self.identifiers,
            sources: self.sources,
            resolution_method: self
                .method
                .ok_or(ValidationError::MissingField { field: "resolution_method" })?,
            resolution_confidence: self
                .confidence
                .ok_or(ValidationError::MissingField { field: "resolution_confidence" })?,
            details: self.details,
            assurance_level: self.assurance_level,
            conflicts: self.conflicts,
            needs_review: self.needs_review,
            review_reason: self.review_reason,
            merged_from: self.merged_from,
            version: self.version.unwrap_or(1),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        };
        entity.validate()?;
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictSeverity, ConflictValue};
    use crate::identifier::IdentifierKind;

    fn source(kind: SourceKind, id: &str) -> SourceReference {
        SourceReference::new(kind, id, 0.9).unwrap()
    }

    fn entity() -> ResolvedEntity {
        ResolvedEntity::builder()
            .entity_type(EntityType::Artist)
            .canonical_name("The Beatles")
            .identifiers(IdentifierBundle::new().with(IdentifierKind::Isni, "0000000121507008"))
            .source(source(SourceKind::MusicBrainz, "mb-1"))
            .source(source(SourceKind::Discogs, "82730"))
            .method(ResolutionMethod::ExactId)
            .confidence(1.0)
            .assurance_level(AssuranceLevel::A2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_sources() {
        let result = ResolvedEntity::builder()
            .entity_type(EntityType::Artist)
            .canonical_name("X")
            .method(ResolutionMethod::SingleSource)
            .confidence(0.3)
            .build();
        assert_eq!(result, Err(ValidationError::EmptySourceReferences));
    }

    #[test]
    fn test_builder_requires_review_reason() {
        let result = ResolvedEntity::builder()
            .entity_type(EntityType::Artist)
            .canonical_name("X")
            .source(source(SourceKind::Spotify, "s"))
            .method(ResolutionMethod::SingleSource)
            .confidence(0.3)
            .needs_review(true)
            .build();
        assert_eq!(result, Err(ValidationError::MissingReviewReason));
    }

    #[test]
    fn test_builder_missing_method() {
        let result = ResolvedEntity::builder()
            .entity_type(EntityType::Artist)
            .canonical_name("X")
            .source(source(SourceKind::Spotify, "s"))
            .confidence(0.3)
            .build();
        assert!(matches!(
            result,
            Err(ValidationError::MissingField { field: "resolution_method" })
        ));
    }

    #[test]
    fn test_builder_rejects_confidence_out_of_range() {
        let result = ResolvedEntity::builder()
            .entity_type(EntityType::Artist)
            .canonical_name("X")
            .source(source(SourceKind::Spotify, "s"))
            .method(ResolutionMethod::SingleSource)
            .confidence(1.2)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_corrected_entity_has_lineage() {
        let original = entity();
        let corrected = original
            .corrected(EntityCorrection {
                canonical_name: Some("Beatles".to_string()),
                identifiers: IdentifierBundle::new().with(IdentifierKind::Ipi, "00012345678"),
                ..EntityCorrection::default()
            })
            .unwrap();

        assert_ne!(corrected.id, original.id);
        assert_eq!(corrected.merged_from, Some(original.id));
        assert_eq!(corrected.version, 2);
        assert_eq!(corrected.canonical_name, "Beatles");
        assert!(corrected.alternative_names.contains(&"The Beatles".to_string()));
        assert_eq!(corrected.identifiers.len(), 2);
        assert_eq!(original.version, 1);
        assert_eq!(original.canonical_name, "The Beatles");
    }

    #[test]
    fn test_corrected_clears_review() {
        let flagged = ResolvedEntity::builder()
            .entity_type(EntityType::Recording)
            .canonical_name("Yesterday")
            .source(source(SourceKind::FileMetadata, "f"))
            .method(ResolutionMethod::SingleSource)
            .confidence(0.2)
            .review("confidence 0.20 below threshold 0.70")
            .build()
            .unwrap();
        let fixed = flagged
            .corrected(EntityCorrection {
                resolution_confidence: Some(0.95),
                resolve_review: true,
                ..EntityCorrection::default()
            })
            .unwrap();
        assert!(!fixed.needs_review);
        assert!(fixed.review_reason.is_none());
        assert!((fixed.resolution_confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_round_trip_preserves_all_fields() {
        let mut e = entity();
        e.conflicts.push(Conflict::new(
            "canonical_name",
            ConflictSeverity::Low,
            vec![
                ConflictValue {
                    source: "musicbrainz:mb-1".to_string(),
                    value: "The Beatles".to_string(),
                },
                ConflictValue {
                    source: "discogs:82730".to_string(),
                    value: "Beatles, The".to_string(),
                },
            ],
        ));
        e.details.matched_identifiers.push("isni:0000000121507008".to_string());
        e.details.string_similarity = Some(0.93);

        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"EXACT_ID\""));
        let back: ResolvedEntity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_deserialize_rejects_invalid() {
        let mut value = serde_json::to_value(entity()).unwrap();
        value["sources"] = serde_json::json!([]);
        assert!(serde_json::from_value::<ResolvedEntity>(value).is_err());
    }

    #[test]
    fn test_source_kinds_and_agreement() {
        let e = entity();
        assert_eq!(e.source_kinds().len(), 2);
        assert!((e.mean_agreement() - 0.9).abs() < 1e-12);
    }
}
