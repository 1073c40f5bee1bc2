//! Credit aggregation.
//!
//! Turns a resolved work and its resolved contributors into a scored
//! `AttributionRecord`:
//!
//! - each credit's confidence is the reliability-weighted mean, over the
//!   contributor's sources, of `α · resolution_confidence + (1 - α) · reliability`;
//! - each credit's agreement is the contributor's mean source agreement,
//!   penalized per HIGH/CRITICAL conflict;
//! - the record's `source_agreement` is the mean credit agreement scaled down
//!   by how far the credit confidences spread apart;
//! - the record's `confidence_score` is the mean credit confidence scaled by
//!   `β + (1 - β) · source_agreement`, so disagreement always lowers it.
//!
//! `α` and `β` are `resolution_weight` and `agreement_floor` in
//! [`AggregationConfig`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::attribution::{
    AttributionRecord, Credit, CreditRole, ProvenanceEvent, ProvenanceEventType, RecordUpdate,
};
use crate::config::{AggregationConfig, CoreConfig};
use crate::confidence::{clamp_unit, corroborate, AssuranceLevel};
use crate::conformal::{ConformalScorer, ConformalSet};
use crate::entity::EntityId;
use crate::error::ValidationError;
use crate::resolved::ResolvedEntity;
use crate::review::ReviewPriorityQueue;
use crate::source::{ReliabilityTable, SourceReliability};

/// Agent name recorded on provenance events this module writes.
pub const AGGREGATOR_AGENT: &str = "credit_aggregator";

/// Evidence given for a confirmed credit.
const CONFIRMATION_EVIDENCE: f64 = 0.9;

/// Reviewer feedback on one credit.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    /// The credit is correct.
    Confirm { entity_id: EntityId },
    /// The contributor does not belong on the work.
    Reject { entity_id: EntityId },
    /// The contributor belongs on the work in another role.
    Reassign { entity_id: EntityId, role: CreditRole },
}

impl Feedback {
    const fn entity_id(&self) -> EntityId {
        match self {
            Self::Confirm { entity_id } | Self::Reject { entity_id } | Self::Reassign { entity_id, .. } => *entity_id,
        }
    }
}

/// Record-level figures derived from a credit list.
#[derive(Debug, Clone, PartialEq)]
struct Summary {
    confidence_score: f64,
    source_agreement: f64,
    assurance_level: AssuranceLevel,
    conformal_set: ConformalSet,
    needs_review: bool,
}

/// Builds and re-scores attribution records.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
///
/// use creditline::aggregation::CreditAggregator;
/// use creditline::{CoreConfig, CreditRole, EntityType, ResolutionMethod, ResolvedEntity, SourceKind, SourceReference};
///
/// let entity = |name: &str, kind| {
///     ResolvedEntity::builder()
///         .entity_type(kind)
///         .canonical_name(name)
///         .source(SourceReference::new(SourceKind::MusicBrainz, name, 1.0).unwrap())
///         .method(ResolutionMethod::ExactId)
///         .confidence(1.0)
///         .build()
///         .unwrap()
/// };
/// let work = entity("Yesterday", EntityType::Recording);
/// let artist = entity("Paul McCartney", EntityType::Artist);
/// let roles = HashMap::from([(artist.id, CreditRole::Performer)]);
///
/// let aggregator = CreditAggregator::new(&CoreConfig::default());
/// let record = aggregator.aggregate(&work, &[artist], &roles).unwrap();
/// assert_eq!(record.credits.len(), 1);
/// assert!(record.confidence_score > 0.9);
/// ```
pub struct CreditAggregator {
    config: AggregationConfig,
    coverage: f64,
    reliability: Arc<dyn SourceReliability>,
    scorer: ConformalScorer,
    queue: ReviewPriorityQueue,
}

impl std::fmt::Debug for CreditAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditAggregator")
            .field("config", &self.config)
            .field("coverage", &self.coverage)
            .field("reliability", &self.reliability.name())
            .field("scorer", &self.scorer)
            .finish_non_exhaustive()
    }
}

impl CreditAggregator {
    /// Aggregator using the default reliability table and an uncalibrated scorer.
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            config: config.aggregation.clone(),
            coverage: config.conformal.coverage_level,
            reliability: Arc::new(ReliabilityTable::default()),
            scorer: ConformalScorer::new(config.conformal.calibration_bins),
            queue: ReviewPriorityQueue::new(config.priority.clone()),
        }
    }

    /// Replaces the source reliability weights.
    #[must_use]
    pub fn with_reliability(mut self, reliability: Arc<dyn SourceReliability>) -> Self {
        self.reliability = reliability;
        self
    }

    /// Uses a calibrated scorer, e.g. one returned by `ConformalScorer::calibrate`.
    #[must_use]
    pub fn with_scorer(mut self, scorer: ConformalScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// The queue used to prioritize produced records.
    #[must_use]
    pub fn queue(&self) -> &ReviewPriorityQueue {
        &self.queue
    }

    /// Aggregates contributors into a new attribution record for `work`.
    ///
    /// Contributors without a role in `roles` are skipped. The provenance
    /// chain records one FETCH per distinct source, one RESOLVE per credited
    /// contributor and a final SCORE.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyCredits` when no contributor has a role,
    /// or any other invariant violation of the assembled record.
    pub fn aggregate(
        &self,
        work: &ResolvedEntity,
        contributors: &[ResolvedEntity],
        roles: &HashMap<EntityId, CreditRole>,
    ) -> Result<AttributionRecord, ValidationError> {
        let now = Utc::now();
        let credited = self.credited(contributors, roles);
        let credits: Vec<Credit> = credited.iter().map(|(entity, role)| self.credit(entity, *role)).collect();
        let flagged: Vec<String> = credited
            .iter()
            .filter(|(entity, _)| entity.needs_review)
            .map(|(entity, _)| entity.canonical_name.clone())
            .collect();
        let summary = self.summarize(&credits, !flagged.is_empty())?;

        let mut provenance = Vec::new();
        let mut seen = BTreeSet::new();
        for source in std::iter::once(work)
            .chain(credited.iter().map(|(entity, _)| *entity))
            .flat_map(|entity| entity.sources.iter())
        {
            let label = source.label();
            if seen.insert(label.clone()) {
                provenance.push(
                    ProvenanceEvent::new(ProvenanceEventType::Fetch, source.source.to_string(), json!({ "source": label }))
                        .at(now),
                );
            }
        }
        for (entity, role) in &credited {
            provenance.push(
                ProvenanceEvent::new(
                    ProvenanceEventType::Resolve,
                    entity.resolution_method.to_string(),
                    json!({
                        "entity_id": entity.id.to_string(),
                        "canonical_name": entity.canonical_name,
                        "role": role.to_string(),
                        "resolution_confidence": entity.resolution_confidence,
                    }),
                )
                .at(now),
            );
        }
        provenance.push(self.score_event(&credits, &summary, &flagged).at(now));

        let mut record = AttributionRecord::builder()
            .work_entity_id(work.id)
            .credits(credits)
            .assurance_level(summary.assurance_level)
            .confidence_score(summary.confidence_score)
            .conformal_set(summary.conformal_set)
            .source_agreement(summary.source_agreement)
            .provenance(provenance)
            .needs_review(summary.needs_review)
            .created_at(now)
            .build()?;
        record.review_priority = self.queue.priority_at(&record, now);

        info!(
            record = %record.id,
            work = %work.id,
            credits = record.credits.len(),
            confidence = record.confidence_score,
            agreement = record.source_agreement,
            needs_review = record.needs_review,
            "attribution aggregated"
        );
        Ok(record)
    }

    /// Re-runs aggregation on fresh resolved inputs as a new version of `record`.
    ///
    /// # Errors
    ///
    /// Same as [`CreditAggregator::aggregate`].
    pub fn rescore(
        &self,
        record: &AttributionRecord,
        contributors: &[ResolvedEntity],
        roles: &HashMap<EntityId, CreditRole>,
        agent: &str,
        reason: &str,
    ) -> Result<AttributionRecord, ValidationError> {
        let credited = self.credited(contributors, roles);
        let credits: Vec<Credit> = credited.iter().map(|(entity, role)| self.credit(entity, *role)).collect();
        let flagged: Vec<String> = credited
            .iter()
            .filter(|(entity, _)| entity.needs_review)
            .map(|(entity, _)| entity.canonical_name.clone())
            .collect();
        let summary = self.summarize(&credits, !flagged.is_empty())?;
        self.revise(record, credits, summary, &flagged, agent, reason)
    }

    /// Applies reviewer feedback, producing the next version of `record`.
    ///
    /// Confirmed credits are corroborated and their agreement set to full;
    /// rejected credits are removed; reassigned credits change role.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownContributor` for feedback on an
    /// entity without a credit, `EmptyCredits` if every credit is rejected.
    pub fn apply_feedback(
        &self,
        record: &AttributionRecord,
        feedback: &[Feedback],
        agent: &str,
        reason: &str,
    ) -> Result<AttributionRecord, ValidationError> {
        let mut credits = record.credits.clone();
        for item in feedback {
            let entity_id = item.entity_id();
            let Some(index) = credits.iter().position(|c| c.entity_id == entity_id) else {
                return Err(ValidationError::UnknownContributor {
                    entity_id: entity_id.to_string(),
                });
            };
            match item {
                Feedback::Confirm { .. } => {
                    let credit = &mut credits[index];
                    credit.confidence = corroborate(credit.confidence, CONFIRMATION_EVIDENCE);
                    credit.agreement = 1.0;
                }
                Feedback::Reject { .. } => {
                    credits.remove(index);
                }
                Feedback::Reassign { role, .. } => credits[index].role = *role,
            }
        }
        debug!(record = %record.id, feedback = feedback.len(), "applying feedback");
        let summary = self.summarize(&credits, false)?;
        self.revise(record, credits, summary, &[], agent, reason)
    }

    /// Next version of `record` carrying `summary`.
    ///
    /// Appends the UPDATE event followed by a SCORE event for the new
    /// values, all stamped at one instant that also dates the priority.
    fn revise(
        &self,
        record: &AttributionRecord,
        credits: Vec<Credit>,
        summary: Summary,
        flagged: &[String],
        agent: &str,
        reason: &str,
    ) -> Result<AttributionRecord, ValidationError> {
        let now = Utc::now().max(record.updated_at);
        let score = self.score_event(&credits, &summary, flagged).at(now);

        let mut update = RecordUpdate::new(agent, reason);
        update.credits = Some(credits);
        update.confidence_score = Some(summary.confidence_score);
        update.source_agreement = Some(summary.source_agreement);
        update.conformal_set = Some(summary.conformal_set);
        update.assurance_level = Some(summary.assurance_level);
        update.needs_review = Some(summary.needs_review);

        let preview = record.updated_as_of(update.clone(), now)?;
        update.review_priority = Some(self.queue.priority_at(&preview, now));
        let mut next = record.updated_as_of(update, now)?;
        next.provenance.push(score);
        next.validate()?;
        info!(
            record = %next.id,
            version = next.version,
            confidence = next.confidence_score,
            agreement = next.source_agreement,
            "attribution revised"
        );
        Ok(next)
    }

    fn credited<'a>(
        &self,
        contributors: &'a [ResolvedEntity],
        roles: &HashMap<EntityId, CreditRole>,
    ) -> Vec<(&'a ResolvedEntity, CreditRole)> {
        contributors
            .iter()
            .filter_map(|entity| match roles.get(&entity.id) {
                Some(role) => Some((entity, *role)),
                None => {
                    warn!(entity = %entity.id, name = %entity.canonical_name, "contributor has no role, skipped");
                    None
                }
            })
            .collect()
    }

    /// One credit from one resolved contributor.
    fn credit(&self, entity: &ResolvedEntity, role: CreditRole) -> Credit {
        let alpha = self.config.resolution_weight;
        let mut weighted = 0.0;
        let mut total = 0.0;
        for source in &entity.sources {
            let w = self.reliability.weight(&source.source);
            weighted += w * (alpha * entity.resolution_confidence + (1.0 - alpha) * w);
            total += w;
        }
        let confidence = if total > 0.0 {
            clamp_unit(weighted / total)
        } else {
            clamp_unit(alpha * entity.resolution_confidence)
        };

        let serious = entity.conflicts.iter().filter(|c| c.requires_review()).count();
        #[allow(clippy::cast_precision_loss)]
        let agreement = clamp_unit(entity.mean_agreement() - self.config.conflict_penalty * serious as f64);

        Credit {
            entity_id: entity.id,
            role,
            confidence,
            sources: entity.source_kinds().into_iter().collect(),
            assurance_level: entity.assurance_level,
            agreement,
        }
    }

    fn summarize(&self, credits: &[Credit], contributor_flagged: bool) -> Result<Summary, ValidationError> {
        if credits.is_empty() {
            return Err(ValidationError::EmptyCredits);
        }
        #[allow(clippy::cast_precision_loss)]
        let n = credits.len() as f64;
        let mean_confidence = credits.iter().map(|c| c.confidence).sum::<f64>() / n;
        let mean_agreement = credits.iter().map(|c| c.agreement).sum::<f64>() / n;

        let mut spread = 0.0;
        let mut pairs = 0usize;
        for (i, a) in credits.iter().enumerate() {
            for b in &credits[i + 1..] {
                spread += (a.confidence - b.confidence).abs();
                pairs += 1;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let spread = if pairs > 0 { spread / pairs as f64 } else { 0.0 };

        let source_agreement = clamp_unit(mean_agreement * (1.0 - spread));
        let floor = self.config.agreement_floor;
        let confidence_score = clamp_unit(mean_confidence * (floor + (1.0 - floor) * source_agreement));
        let assurance_level = credits
            .iter()
            .map(|c| c.assurance_level)
            .min()
            .unwrap_or_default();
        let conformal_set = self.scorer.score_credits(credits, self.coverage)?;
        let needs_review = contributor_flagged
            || confidence_score < self.config.review_confidence
            || source_agreement < self.config.review_agreement;

        Ok(Summary {
            confidence_score,
            source_agreement,
            assurance_level,
            conformal_set,
            needs_review,
        })
    }

    fn score_event(&self, credits: &[Credit], summary: &Summary, flagged: &[String]) -> ProvenanceEvent {
        let inputs: Vec<serde_json::Value> = credits
            .iter()
            .map(|c| {
                json!({
                    "entity_id": c.entity_id.to_string(),
                    "role": c.role.to_string(),
                    "confidence": c.confidence,
                    "agreement": c.agreement,
                })
            })
            .collect();
        ProvenanceEvent::new(
            ProvenanceEventType::Score,
            AGGREGATOR_AGENT,
            json!({
                "inputs": inputs,
                "source_agreement": summary.source_agreement,
                "confidence_score": summary.confidence_score,
                "coverage_level": summary.conformal_set.coverage_level,
                "calibration_method": summary.conformal_set.calibration_method.to_string(),
                "flagged_contributors": flagged,
            }),
        )
    }
}

/// Timestamp of the latest SCORE event, if any.
#[must_use]
pub fn scored_at(record: &AttributionRecord) -> Option<DateTime<Utc>> {
    record
        .provenance
        .iter()
        .rev()
        .find(|e| e.event_type == ProvenanceEventType::Score)
        .map(|e| e.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{Conflict, ConflictSeverity};
    use crate::entity::EntityType;
    use crate::resolved::ResolutionMethod;
    use crate::source::{SourceKind, SourceReference};

    fn entity(name: &str, confidence: f64, sources: &[(SourceKind, f64)]) -> ResolvedEntity {
        let mut builder = ResolvedEntity::builder()
            .entity_type(EntityType::Artist)
            .canonical_name(name)
            .method(ResolutionMethod::StringSimilarity)
            .confidence(confidence);
        for (i, (kind, agreement)) in sources.iter().enumerate() {
            builder = builder.source(SourceReference::new(kind.clone(), format!("{name}-{i}"), *agreement).unwrap());
        }
        builder.build().unwrap()
    }

    fn work() -> ResolvedEntity {
        entity("Let It Be", 1.0, &[(SourceKind::MusicBrainz, 1.0)])
    }

    fn aggregator() -> CreditAggregator {
        CreditAggregator::new(&CoreConfig::default())
    }

    #[test]
    fn provenance_chain_is_ordered() {
        let artist = entity("The Beatles", 1.0, &[(SourceKind::MusicBrainz, 1.0), (SourceKind::Discogs, 1.0)]);
        let roles = HashMap::from([(artist.id, CreditRole::Performer)]);
        let record = aggregator().aggregate(&work(), &[artist], &roles).unwrap();

        let types: Vec<&ProvenanceEventType> = record.provenance.iter().map(|e| &e.event_type).collect();
        assert_eq!(
            types,
            vec![
                &ProvenanceEventType::Fetch,
                &ProvenanceEventType::Fetch,
                &ProvenanceEventType::Fetch,
                &ProvenanceEventType::Resolve,
                &ProvenanceEventType::Score,
            ]
        );
        assert_eq!(scored_at(&record), Some(record.created_at));
        assert_eq!(record.version, 1);
    }

    #[test]
    fn reliable_sources_raise_confidence() {
        let registry = entity("A", 0.8, &[(SourceKind::MusicBrainz, 1.0)]);
        let tags = entity("B", 0.8, &[(SourceKind::FileMetadata, 1.0)]);
        let a = aggregator().credit(&registry, CreditRole::Performer);
        let b = aggregator().credit(&tags, CreditRole::Performer);
        assert!(a.confidence > b.confidence);
        // 0.6 * 0.8 + 0.4 * 0.9
        assert!((a.confidence - 0.84).abs() < 1e-12);
    }

    #[test]
    fn serious_conflicts_lower_agreement() {
        let mut disputed = entity("A", 0.9, &[(SourceKind::MusicBrainz, 1.0)]);
        disputed.conflicts.push(Conflict::new("isni", ConflictSeverity::Critical, Vec::new()));
        let credit = aggregator().credit(&disputed, CreditRole::Performer);
        assert!((credit.agreement - 0.85).abs() < 1e-12);
    }

    #[test]
    fn spread_between_credits_lowers_agreement_and_score() {
        let strong = entity("Strong", 0.95, &[(SourceKind::Spotify, 1.0)]);
        let weak = entity("Weak", 0.4, &[(SourceKind::Spotify, 1.0)]);
        let single_roles = HashMap::from([(strong.id, CreditRole::Performer)]);
        let single = aggregator().aggregate(&work(), &[strong.clone()], &single_roles).unwrap();

        let roles = HashMap::from([(strong.id, CreditRole::Performer), (weak.id, CreditRole::Producer)]);
        let pair = aggregator().aggregate(&work(), &[strong, weak], &roles).unwrap();

        assert!(pair.source_agreement < single.source_agreement - 0.2);
        assert!(pair.confidence_score < single.confidence_score);
        assert!(pair.review_priority > single.review_priority);
        assert!(pair.needs_review);
    }

    #[test]
    fn contributors_without_roles_are_skipped() {
        let artist = entity("A", 0.9, &[(SourceKind::MusicBrainz, 1.0)]);
        let stranger = entity("B", 0.9, &[(SourceKind::MusicBrainz, 1.0)]);
        let roles = HashMap::from([(artist.id, CreditRole::Songwriter)]);
        let record = aggregator().aggregate(&work(), &[artist, stranger.clone()], &roles).unwrap();
        assert_eq!(record.credits.len(), 1);

        let err = aggregator().aggregate(&work(), &[stranger], &roles).unwrap_err();
        assert_eq!(err, ValidationError::EmptyCredits);
    }

    #[test]
    fn flagged_contributor_flags_record() {
        let mut artist = entity("A", 0.95, &[(SourceKind::MusicBrainz, 1.0)]);
        artist.needs_review = true;
        artist.review_reason = Some("HIGH conflict on canonical_name".to_string());
        let roles = HashMap::from([(artist.id, CreditRole::Performer)]);
        let record = aggregator().aggregate(&work(), &[artist], &roles).unwrap();
        assert!(record.confidence_score > 0.9);
        assert!(record.needs_review);
    }

    #[test]
    fn feedback_produces_next_version() {
        let strong = entity("Strong", 0.95, &[(SourceKind::Spotify, 1.0)]);
        let weak = entity("Weak", 0.4, &[(SourceKind::Spotify, 1.0)]);
        let roles = HashMap::from([(strong.id, CreditRole::Performer), (weak.id, CreditRole::Producer)]);
        let agg = aggregator();
        let record = agg.aggregate(&work(), &[strong.clone(), weak.clone()], &roles).unwrap();

        let next = agg
            .apply_feedback(
                &record,
                &[
                    Feedback::Confirm { entity_id: strong.id },
                    Feedback::Reassign {
                        entity_id: weak.id,
                        role: CreditRole::Mixer,
                    },
                ],
                "reviewer:ana",
                "liner notes",
            )
            .unwrap();
        assert_eq!(next.id, record.id);
        assert_eq!(next.version, 2);
        assert_eq!(next.revision_count(), 1);
        assert!(next.updated_at >= record.updated_at);
        assert_eq!(next.credits[1].role, CreditRole::Mixer);
        assert!(next.credits[0].confidence > record.credits[0].confidence);

        let added = &next.provenance[record.provenance.len()..];
        assert_eq!(added.len(), 2);
        let update = &added[0];
        assert_eq!(update.event_type, ProvenanceEventType::Update);
        assert_eq!(update.agent, "reviewer:ana");
        let changed = update.details["changed_fields"].as_array().unwrap();
        assert!(changed.iter().any(|f| f == "credits"));
        assert_eq!(added[1].event_type, ProvenanceEventType::Score);
        assert_eq!(added[1].details["confidence_score"].as_f64(), Some(next.confidence_score));

        let rejected = agg
            .apply_feedback(&next, &[Feedback::Reject { entity_id: weak.id }], "reviewer:ana", "not on this take")
            .unwrap();
        assert_eq!(rejected.credits.len(), 1);
        assert_eq!(rejected.version, 3);
        assert!(rejected.source_agreement > next.source_agreement);
    }

    #[test]
    fn feedback_on_unknown_contributor_fails() {
        let artist = entity("A", 0.9, &[(SourceKind::MusicBrainz, 1.0)]);
        let roles = HashMap::from([(artist.id, CreditRole::Performer)]);
        let agg = aggregator();
        let record = agg.aggregate(&work(), &[artist.clone()], &roles).unwrap();

        let err = agg
            .apply_feedback(&record, &[Feedback::Confirm { entity_id: EntityId::new() }], "r", "x")
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownContributor { .. }));

        let err = agg
            .apply_feedback(&record, &[Feedback::Reject { entity_id: artist.id }], "r", "x")
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyCredits);
    }

    #[test]
    fn rescore_keeps_identity() {
        let artist = entity("A", 0.6, &[(SourceKind::FileMetadata, 0.7)]);
        let roles = HashMap::from([(artist.id, CreditRole::Performer)]);
        let agg = aggregator();
        let record = agg.aggregate(&work(), &[artist.clone()], &roles).unwrap();

        let mut better = artist;
        better.resolution_confidence = 1.0;
        let next = agg.rescore(&record, &[better], &roles, AGGREGATOR_AGENT, "re-resolved").unwrap();
        assert_eq!(next.id, record.id);
        assert_eq!(next.version, 2);
        assert!(next.confidence_score > record.confidence_score);

        let added: Vec<&ProvenanceEventType> =
            next.provenance[record.provenance.len()..].iter().map(|e| &e.event_type).collect();
        assert_eq!(added, vec![&ProvenanceEventType::Update, &ProvenanceEventType::Score]);
        let score = next.provenance.last().unwrap();
        assert_eq!(score.agent, AGGREGATOR_AGENT);
        assert_eq!(score.details["confidence_score"].as_f64(), Some(next.confidence_score));
        assert_eq!(score.details["source_agreement"].as_f64(), Some(next.source_agreement));
        assert_eq!(scored_at(&next), Some(next.updated_at));
        assert_eq!(score.timestamp, next.updated_at);
        assert!((next.review_priority - agg.queue().priority_at(&next, next.updated_at)).abs() < 1e-12);
        next.validate_successor(&record).unwrap();
    }
}
