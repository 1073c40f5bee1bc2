//! Attribution records: scored, multi-source credits for one work.
//!
//! Records are versioned values. An update never edits a record in place; it
//! produces the next version with the same id and an UPDATE provenance event
//! describing what changed and why.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::confidence::AssuranceLevel;
use crate::conformal::ConformalSet;
use crate::entity::EntityId;
use crate::error::ValidationError;
use crate::source::SourceKind;

/// Unique identifier for an attribution record; stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributionId(Uuid);

impl AttributionId {
    /// Creates a new random ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for AttributionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttributionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a contributor plays on a work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditRole {
    Performer,
    Songwriter,
    Composer,
    Lyricist,
    Producer,
    Arranger,
    Engineer,
    Mixer,
    Mastering,
    Publisher,
}

impl CreditRole {
    /// Every role, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Performer,
        Self::Songwriter,
        Self::Composer,
        Self::Lyricist,
        Self::Producer,
        Self::Arranger,
        Self::Engineer,
        Self::Mixer,
        Self::Mastering,
        Self::Publisher,
    ];
}

impl fmt::Display for CreditRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Performer => "PERFORMER",
            Self::Songwriter => "SONGWRITER",
            Self::Composer => "COMPOSER",
            Self::Lyricist => "LYRICIST",
            Self::Producer => "PRODUCER",
            Self::Arranger => "ARRANGER",
            Self::Engineer => "ENGINEER",
            Self::Mixer => "MIXER",
            Self::Mastering => "MASTERING",
            Self::Publisher => "PUBLISHER",
        };
        f.write_str(name)
    }
}

/// One role assignment on a work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    /// Contributing entity.
    pub entity_id: EntityId,

    /// Role on the work.
    pub role: CreditRole,

    /// Per-credit confidence (0.0-1.0).
    pub confidence: f64,

    /// Distinct sources backing the credit.
    pub sources: Vec<SourceKind>,

    /// Evidence tier of the contributor.
    pub assurance_level: AssuranceLevel,

    /// How well the backing sources agree on this credit (0.0-1.0).
    pub agreement: f64,
}

impl Credit {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_unit("credit.confidence", self.confidence)?;
        ValidationError::check_unit("credit.agreement", self.agreement)?;
        Ok(())
    }
}

/// Provenance event type; the set is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProvenanceEventType {
    Fetch,
    Resolve,
    Score,
    Update,
    Review,
    Custom(String),
}

impl fmt::Display for ProvenanceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "FETCH"),
            Self::Resolve => write!(f, "RESOLVE"),
            Self::Score => write!(f, "SCORE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Review => write!(f, "REVIEW"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl TryFrom<String> for ProvenanceEventType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("provenance event type cannot be empty".to_string());
        }
        // Builtins match only their canonical spelling so custom names such
        // as "score" keep their identity.
        Ok(match trimmed {
            "FETCH" => Self::Fetch,
            "RESOLVE" => Self::Resolve,
            "SCORE" => Self::Score,
            "UPDATE" => Self::Update,
            "REVIEW" => Self::Review,
            _ => Self::Custom(trimmed.to_string()),
        })
    }
}

impl From<ProvenanceEventType> for String {
    fn from(value: ProvenanceEventType) -> Self {
        value.to_string()
    }
}

/// One step in a record's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEvent {
    /// What happened.
    pub event_type: ProvenanceEventType,

    /// Who or what did it.
    pub agent: String,

    /// When it happened.
    pub timestamp: DateTime<Utc>,

    /// Event-specific payload.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ProvenanceEvent {
    /// Creates an event stamped now.
    #[must_use]
    pub fn new(event_type: ProvenanceEventType, agent: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            event_type,
            agent: agent.into(),
            timestamp: Utc::now(),
            details,
        }
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// The scored attribution for one work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct AttributionRecord {
    /// Stable identity across versions.
    pub id: AttributionId,

    /// The work being credited.
    pub work_entity_id: EntityId,

    /// Credits; never empty.
    pub credits: Vec<Credit>,

    /// Lowest assurance tier among the credits.
    pub assurance_level: AssuranceLevel,

    /// Record-level confidence (0.0-1.0).
    pub confidence_score: f64,

    /// Calibrated prediction sets, one per credit.
    pub conformal_set: ConformalSet,

    /// Aggregate agreement across contributing sources (0.0-1.0).
    pub source_agreement: f64,

    /// Ordered history.
    pub provenance: Vec<ProvenanceEvent>,

    /// Whether a human should review this record.
    pub needs_review: bool,

    /// Scheduling priority for review (0.0-1.0, higher first).
    pub review_priority: f64,

    /// When version 1 was created.
    pub created_at: DateTime<Utc>,

    /// When the current version was produced.
    pub updated_at: DateTime<Utc>,

    /// Monotonic version, starting at 1.
    pub version: u64,
}

impl AttributionRecord {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> AttributionRecordBuilder {
        AttributionRecordBuilder::default()
    }

    /// Checks every structural invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.credits.is_empty() {
            return Err(ValidationError::EmptyCredits);
        }
        for credit in &self.credits {
            credit.validate()?;
        }
        ValidationError::check_unit("confidence_score", self.confidence_score)?;
        ValidationError::check_unit("source_agreement", self.source_agreement)?;
        ValidationError::check_unit("review_priority", self.review_priority)?;
        self.conformal_set.validate()?;
        if self.updated_at < self.created_at {
            return Err(ValidationError::TimestampOrder {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        if self.version == 0 {
            return Err(ValidationError::InvalidVersion { version: 0 });
        }
        self.validate_provenance()
    }

    fn validate_provenance(&self) -> Result<(), ValidationError> {
        for event in &self.provenance {
            if let ProvenanceEventType::Custom(name) = &event.event_type {
                if ProvenanceEventType::try_from(name.clone()).as_ref() != Ok(&event.event_type) {
                    return Err(ValidationError::InvalidProvenance {
                        reason: format!("custom event type {name:?} collides with a built-in type or is not trimmed"),
                    });
                }
            }
        }
        let first_score = self
            .provenance
            .iter()
            .position(|e| e.event_type == ProvenanceEventType::Score)
            .ok_or_else(|| ValidationError::InvalidProvenance {
                reason: "no SCORE event".to_string(),
            })?;

        let mut updates = 0u64;
        for (index, event) in self.provenance.iter().enumerate() {
            if event.event_type == ProvenanceEventType::Update {
                if index < first_score {
                    return Err(ValidationError::InvalidProvenance {
                        reason: "UPDATE precedes SCORE".to_string(),
                    });
                }
                updates += 1;
            }
        }
        if updates != self.version - 1 {
            return Err(ValidationError::InvalidProvenance {
                reason: format!("version {} requires {} UPDATE events, found {updates}", self.version, self.version - 1),
            });
        }
        Ok(())
    }

    /// Checks that this record can follow `previous` in its version history.
    ///
    /// The earlier provenance chain must survive unchanged as a prefix, and
    /// every appended event must be stamped no earlier than the previous
    /// update.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidProvenance` when history was dropped,
    /// rewritten or back-dated.
    pub fn validate_successor(&self, previous: &Self) -> Result<(), ValidationError> {
        let kept = previous.provenance.len();
        if self.provenance.len() < kept || self.provenance[..kept] != previous.provenance[..] {
            return Err(ValidationError::InvalidProvenance {
                reason: format!("version {} rewrites the provenance of version {}", self.version, previous.version),
            });
        }
        if let Some(event) = self.provenance[kept..].iter().find(|e| e.timestamp < previous.updated_at) {
            return Err(ValidationError::InvalidProvenance {
                reason: format!("{} event at {} predates the previous update", event.event_type, event.timestamp),
            });
        }
        if self.updated_at < previous.updated_at {
            return Err(ValidationError::InvalidProvenance {
                reason: "updated_at moves backwards".to_string(),
            });
        }
        Ok(())
    }

    /// Produces the next version of this record.
    ///
    /// Only fields that actually change are listed in the appended UPDATE
    /// event. `updated_at` never moves before `created_at`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the resulting record would be invalid.
    pub fn updated(&self, update: RecordUpdate) -> Result<Self, ValidationError> {
        self.updated_as_of(update, Utc::now())
    }

    /// Like [`AttributionRecord::updated`], stamping the new version at `now`.
    ///
    /// A `now` earlier than the current `updated_at` is raised to it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the resulting record would be invalid.
    pub fn updated_as_of(&self, update: RecordUpdate, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        let mut changed: Vec<&'static str> = Vec::new();

        if let Some(credits) = update.credits {
            if credits != next.credits {
                next.credits = credits;
                changed.push("credits");
            }
        }
        if let Some(score) = update.confidence_score {
            if (score - next.confidence_score).abs() > f64::EPSILON {
                next.confidence_score = score;
                changed.push("confidence_score");
            }
        }
        if let Some(agreement) = update.source_agreement {
            if (agreement - next.source_agreement).abs() > f64::EPSILON {
                next.source_agreement = agreement;
                changed.push("source_agreement");
            }
        }
        if let Some(set) = update.conformal_set {
            if set != next.conformal_set {
                next.conformal_set = set;
                changed.push("conformal_set");
            }
        }
        if let Some(level) = update.assurance_level {
            if level != next.assurance_level {
                next.assurance_level = level;
                changed.push("assurance_level");
            }
        }
        if let Some(flag) = update.needs_review {
            if flag != next.needs_review {
                next.needs_review = flag;
                changed.push("needs_review");
            }
        }
        if let Some(priority) = update.review_priority {
            if (priority - next.review_priority).abs() > f64::EPSILON {
                next.review_priority = priority;
                changed.push("review_priority");
            }
        }

        let now = now.max(self.updated_at);
        next.version = self.version + 1;
        next.updated_at = now;
        next.provenance.push(
            ProvenanceEvent::new(
                ProvenanceEventType::Update,
                update.agent,
                serde_json::json!({
                    "changed_fields": changed,
                    "reason": update.reason,
                    "previous_version": self.version,
                }),
            )
            .at(now),
        );
        next.validate()?;
        Ok(next)
    }

    /// Number of UPDATE events, i.e. how many times the record was revised.
    #[must_use]
    pub fn revision_count(&self) -> usize {
        self.provenance
            .iter()
            .filter(|e| e.event_type == ProvenanceEventType::Update)
            .count()
    }
}

impl Serialize for AttributionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Self::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for AttributionRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = Self::deserialize(deserializer)?;
        record.validate().map_err(de::Error::custom)?;
        Ok(record)
    }
}

/// Field changes for `AttributionRecord::updated`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    /// Replacement credits.
    pub credits: Option<Vec<Credit>>,
    /// Replacement overall score.
    pub confidence_score: Option<f64>,
    /// Replacement source agreement.
    pub source_agreement: Option<f64>,
    /// Replacement prediction sets.
    pub conformal_set: Option<ConformalSet>,
    /// Replacement assurance tier.
    pub assurance_level: Option<AssuranceLevel>,
    /// Replacement review flag.
    pub needs_review: Option<bool>,
    /// Replacement review priority.
    pub review_priority: Option<f64>,
    /// Who made the change.
    pub agent: String,
    /// Why.
    pub reason: String,
}

impl RecordUpdate {
    /// Creates an empty update attributed to `agent`.
    #[must_use]
    pub fn new(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            reason: reason.into(),
            ..Self::default()
        }
    }
}

/// Builder for `AttributionRecord`.
#[derive(Debug, Default)]
pub struct AttributionRecordBuilder {
    id: Option<AttributionId>,
    work_entity_id: Option<EntityId>,
    credits: Vec<Credit>,
    assurance_level: AssuranceLevel,
    confidence_score: Option<f64>,
    conformal_set: Option<ConformalSet>,
    source_agreement: Option<f64>,
    provenance: Vec<ProvenanceEvent>,
    needs_review: bool,
    review_priority: f64,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: Option<u64>,
}

impl AttributionRecordBuilder {
    /// Sets the id (generated when omitted).
    #[must_use]
    pub fn id(mut self, id: AttributionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the work the credits belong to.
    #[must_use]
    pub fn work_entity_id(mut self, id: EntityId) -> Self {
        self.work_entity_id = Some(id);
        self
    }

    /// Sets the credits.
    #[must_use]
    pub fn credits(mut self, credits: Vec<Credit>) -> Self {
        self.credits = credits;
        self
    }

    /// Sets the assurance tier.
    #[must_use]
    pub fn assurance_level(mut self, level: AssuranceLevel) -> Self {
        self.assurance_level = level;
        self
    }

    /// Sets the overall score.
    #[must_use]
    pub fn confidence_score(mut self, score: f64) -> Self {
        self.confidence_score = Some(score);
        self
    }

    /// Sets the prediction sets.
    #[must_use]
    pub fn conformal_set(mut self, set: ConformalSet) -> Self {
        self.conformal_set = Some(set);
        self
    }

    /// Sets the source agreement.
    #[must_use]
    pub fn source_agreement(mut self, agreement: f64) -> Self {
        self.source_agreement = Some(agreement);
        self
    }

    /// Sets the provenance chain.
    #[must_use]
    pub fn provenance(mut self, provenance: Vec<ProvenanceEvent>) -> Self {
        self.provenance = provenance;
        self
    }

    /// Sets the review flag.
    #[must_use]
    pub fn needs_review(mut self, needs_review: bool) -> Self {
        self.needs_review = needs_review;
        self
    }

    /// Sets the review priority.
    #[must_use]
    pub fn review_priority(mut self, priority: f64) -> Self {
        self.review_priority = priority;
        self
    }

    /// Sets the creation time (now when omitted).
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Sets the last update time (creation time when omitted).
    #[must_use]
    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// Sets the version (1 when omitted).
    #[must_use]
    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Builds the record.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a required field is missing or an
    /// invariant is violated.
    pub fn build(self) -> Result<AttributionRecord, ValidationError> {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        let record = AttributionRecord {
            id: self.id.unwrap_or_default(),
            work_entity_id: self
                .work_entity_id
                .ok_or(ValidationError::MissingField { field: "work_entity_id" })?,
            credits: self.credits,
            assurance_level: self.assurance_level,
            confidence_score: self
                .confidence_score
                .ok_or(ValidationError::MissingField { field: "confidence_score" })?,
            conformal_set: self
                .conformal_set
                .ok_or(ValidationError::MissingField { field: "conformal_set" })?,
            source_agreement: self
                .source_agreement
                .ok_or(ValidationError::MissingField { field: "source_agreement" })?,
            provenance: self.provenance,
            needs_review: self.needs_review,
            review_priority: self.review_priority,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
            version: self.version.unwrap_or(1),
        };
        record.validate()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::conformal::ConformalScorer;

    fn credit(confidence: f64) -> Credit {
        Credit {
            entity_id: EntityId::new(),
            role: CreditRole::Performer,
            confidence,
            sources: vec![SourceKind::MusicBrainz],
            assurance_level: AssuranceLevel::A1,
            agreement: 0.9,
        }
    }

    fn score_event() -> ProvenanceEvent {
        ProvenanceEvent::new(ProvenanceEventType::Score, "aggregator", serde_json::json!({"confidence": 0.9}))
    }

    fn builder() -> AttributionRecordBuilder {
        let set = ConformalScorer::default()
            .score(&[(CreditRole::Performer, 0.9)], 0.9)
            .unwrap();
        AttributionRecord::builder()
            .work_entity_id(EntityId::new())
            .credits(vec![credit(0.9)])
            .confidence_score(0.9)
            .conformal_set(set)
            .source_agreement(0.95)
            .provenance(vec![score_event()])
    }

    #[test]
    fn test_build_valid_record() {
        let record = builder().build().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_empty_credits_rejected() {
        assert_eq!(builder().credits(vec![]).build(), Err(ValidationError::EmptyCredits));
    }

    #[test]
    fn test_timestamp_order_enforced() {
        let now = Utc::now();
        let result = builder().created_at(now).updated_at(now - Duration::seconds(5)).build();
        assert!(matches!(result, Err(ValidationError::TimestampOrder { .. })));
    }

    #[test]
    fn test_score_event_required() {
        let result = builder().provenance(vec![]).build();
        assert!(matches!(result, Err(ValidationError::InvalidProvenance { .. })));
    }

    #[test]
    fn test_version_must_match_updates() {
        let result = builder().version(3).build();
        assert!(matches!(result, Err(ValidationError::InvalidProvenance { .. })));
        assert!(matches!(
            builder().version(0).build(),
            Err(ValidationError::InvalidVersion { version: 0 })
        ));
    }

    #[test]
    fn test_updated_bumps_version_and_appends_event() {
        let record = builder().build().unwrap();
        let mut update = RecordUpdate::new("reviewer-7", "confirmed by label");
        update.confidence_score = Some(0.97);
        update.needs_review = Some(false);
        let next = record.updated(update).unwrap();

        assert_eq!(next.id, record.id);
        assert_eq!(next.version, 2);
        assert!(next.updated_at >= record.updated_at);
        assert_eq!(next.provenance.len(), record.provenance.len() + 1);
        let event = next.provenance.last().unwrap();
        assert_eq!(event.event_type, ProvenanceEventType::Update);
        assert_eq!(event.details["changed_fields"], serde_json::json!(["confidence_score"]));
        assert_eq!(event.details["previous_version"], serde_json::json!(1));
        assert_eq!(record.version, 1);
    }

    #[test]
    fn test_updated_rejects_invalid_values() {
        let record = builder().build().unwrap();
        let mut update = RecordUpdate::new("x", "bad");
        update.confidence_score = Some(1.5);
        assert!(record.updated(update).is_err());
    }

    #[test]
    fn test_event_type_serde() {
        let json = serde_json::to_string(&ProvenanceEventType::Score).unwrap();
        assert_eq!(json, "\"SCORE\"");
        let custom: ProvenanceEventType = serde_json::from_str("\"EXPORT\"").unwrap();
        assert_eq!(custom, ProvenanceEventType::Custom("EXPORT".to_string()));
    }

    #[test]
    fn test_custom_event_types_keep_their_identity() {
        for name in ["score", "Update", "export"] {
            let custom = ProvenanceEventType::Custom(name.to_string());
            let json = serde_json::to_string(&custom).unwrap();
            let decoded: ProvenanceEventType = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, custom);
        }
        let record = builder()
            .provenance(vec![
                score_event(),
                ProvenanceEvent::new(ProvenanceEventType::Custom("update".to_string()), "exporter", serde_json::Value::Null),
            ])
            .build()
            .unwrap();
        assert_eq!(record.revision_count(), 0);
        let back: AttributionRecord = serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_custom_event_type_shadowing_a_builtin_is_rejected() {
        for name in ["SCORE", " export"] {
            let result = builder()
                .provenance(vec![
                    score_event(),
                    ProvenanceEvent::new(ProvenanceEventType::Custom(name.to_string()), "x", serde_json::Value::Null),
                ])
                .build();
            assert!(matches!(result, Err(ValidationError::InvalidProvenance { .. })), "{name:?}");
        }
    }

    #[test]
    fn test_round_trip_preserves_provenance_order() {
        let record = builder()
            .provenance(vec![
                ProvenanceEvent::new(ProvenanceEventType::Fetch, "etl", serde_json::json!({"source": "musicbrainz"})),
                ProvenanceEvent::new(ProvenanceEventType::Resolve, "orchestrator", serde_json::Value::Null),
                score_event(),
            ])
            .build()
            .unwrap();
        let record = record.updated(RecordUpdate::new("reviewer", "spot check")).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let back: AttributionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        let types: Vec<String> = back.provenance.iter().map(|e| e.event_type.to_string()).collect();
        assert_eq!(types, vec!["FETCH", "RESOLVE", "SCORE", "UPDATE"]);
    }

    #[test]
    fn test_deserialize_rejects_reversed_timestamps() {
        let record = builder().build().unwrap();
        let mut value = serde_json::to_value(&record).unwrap();
        value["updated_at"] = serde_json::to_value(record.created_at - Duration::hours(1)).unwrap();
        assert!(serde_json::from_value::<AttributionRecord>(value).is_err());
    }
}
