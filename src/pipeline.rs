//! Batch processing over independent entity groups.
//!
//! Groups share no mutable state, so resolution fans out over a bounded
//! pool of scoped worker threads fed through a `crossbeam-channel` queue.
//! A group's entities are published only after its whole resolution
//! completes, and results come back in input order. Attribution writes go
//! through an `AttributionStore` with compare-and-increment versioning.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use tracing::{debug, info, warn};

use crate::aggregation::{CreditAggregator, Feedback};
use crate::attribution::{AttributionId, AttributionRecord, CreditRole};
use crate::config::{CoreConfig, PipelineConfig};
use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use crate::record::NormalizedRecord;
use crate::resolution::ResolutionOrchestrator;
use crate::resolved::ResolvedEntity;
use crate::storage::{AttributionStore, StorageError};

/// Attempts for a feedback write that keeps losing version races.
const MAX_WRITE_ATTEMPTS: usize = 3;

type GroupResult = (usize, CoreResult<Vec<ResolvedEntity>>);

/// Resolution, aggregation and persistence wired together.
pub struct AttributionPipeline {
    orchestrator: ResolutionOrchestrator,
    aggregator: CreditAggregator,
    store: Arc<dyn AttributionStore>,
    config: PipelineConfig,
}

impl std::fmt::Debug for AttributionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributionPipeline")
            .field("orchestrator", &self.orchestrator)
            .field("aggregator", &self.aggregator)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AttributionPipeline {
    /// Default orchestrator and aggregator over `store`.
    #[must_use]
    pub fn new(config: &CoreConfig, store: Arc<dyn AttributionStore>) -> Self {
        Self {
            orchestrator: ResolutionOrchestrator::new(config),
            aggregator: CreditAggregator::new(config),
            store,
            config: config.pipeline.clone(),
        }
    }

    /// Replaces the resolution orchestrator.
    #[must_use]
    pub fn with_orchestrator(mut self, orchestrator: ResolutionOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Replaces the credit aggregator.
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: CreditAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// The resolution orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &ResolutionOrchestrator {
        &self.orchestrator
    }

    /// The credit aggregator.
    #[must_use]
    pub fn aggregator(&self) -> &CreditAggregator {
        &self.aggregator
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn AttributionStore> {
        &self.store
    }

    /// Resolves every group in parallel; `result[i]` belongs to `groups[i]`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing group, in input order, or
    /// `CoreError::Internal` if a worker could not be started.
    pub fn resolve_groups(&self, groups: &[Vec<NormalizedRecord>]) -> CoreResult<Vec<Vec<ResolvedEntity>>> {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.config.workers.clamp(1, groups.len());
        let (job_tx, job_rx) = bounded::<(usize, &[NormalizedRecord])>(self.config.queue_capacity.max(1));
        let (result_tx, result_rx) = bounded::<GroupResult>(groups.len());

        thread::scope(|scope| {
            let mut spawned = 0;
            for idx in 0..workers {
                let jobs: Receiver<(usize, &[NormalizedRecord])> = job_rx.clone();
                let results = result_tx.clone();
                let orchestrator = &self.orchestrator;
                let started = thread::Builder::new()
                    .name(format!("creditline-resolve-{idx}"))
                    .spawn_scoped(scope, move || {
                        while let Ok((index, group)) = jobs.recv() {
                            let _ = results.send((index, orchestrator.resolve(group)));
                        }
                    });
                match started {
                    Ok(_) => spawned += 1,
                    Err(e) => warn!(worker = idx, error = %e, "failed to start resolution worker"),
                }
            }
            drop(job_rx);
            drop(result_tx);
            if spawned == 0 {
                return Err(CoreError::internal("no resolution worker could be started"));
            }

            for (index, group) in groups.iter().enumerate() {
                if job_tx.send((index, group.as_slice())).is_err() {
                    return Err(CoreError::internal("resolution workers exited early"));
                }
            }
            // Close the queue: workers drain it then exit.
            drop(job_tx);
            Ok(())
        })?;

        let mut slots: Vec<Option<CoreResult<Vec<ResolvedEntity>>>> = (0..groups.len()).map(|_| None).collect();
        for (index, result) in result_rx.iter() {
            slots[index] = Some(result);
        }
        let resolved = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(CoreError::internal("group result missing"))))
            .collect::<CoreResult<Vec<_>>>()?;
        info!(
            groups = groups.len(),
            workers,
            entities = resolved.iter().map(Vec::len).sum::<usize>(),
            "groups resolved"
        );
        Ok(resolved)
    }

    /// Aggregates a work's credits and stores the new record.
    ///
    /// # Errors
    ///
    /// Returns validation errors from aggregation and storage errors from
    /// the store.
    pub fn attribute(
        &self,
        work: &ResolvedEntity,
        contributors: &[ResolvedEntity],
        roles: &HashMap<EntityId, CreditRole>,
    ) -> CoreResult<AttributionRecord> {
        let record = self.aggregator.aggregate(work, contributors, roles)?;
        self.store.store(record.clone())?;
        Ok(record)
    }

    /// Applies feedback to the stored record as its next version.
    ///
    /// A concurrent writer that bumps the version first causes a re-read and
    /// retry; after repeated losses the conflict is returned to the caller.
    ///
    /// # Errors
    ///
    /// `StorageError::RecordNotFound`, a retryable `VersionConflict`, or
    /// validation errors from the feedback itself.
    pub fn apply_feedback(
        &self,
        id: AttributionId,
        feedback: &[Feedback],
        agent: &str,
        reason: &str,
    ) -> CoreResult<AttributionRecord> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.store.find_by_id(id)?.ok_or(StorageError::RecordNotFound(id))?;
            let next = self.aggregator.apply_feedback(&current, feedback, agent, reason)?;
            match self.store.save_version(next.clone()) {
                Ok(()) => {
                    debug!(record = %id, version = next.version, attempt, "feedback stored");
                    return Ok(next);
                }
                Err(e @ StorageError::VersionConflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(record = %id, attempt, error = %e, "version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Up to `limit` stored records awaiting review, highest priority first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn review_backlog(&self, limit: usize) -> CoreResult<Vec<AttributionRecord>> {
        Ok(self.store.find_needs_review(limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::identifier::IdentifierKind;
    use crate::resolved::ResolutionMethod;
    use crate::source::SourceKind;
    use crate::storage::InMemoryAttributionStore;

    fn pipeline(workers: usize) -> AttributionPipeline {
        let mut config = CoreConfig::default();
        config.pipeline.workers = workers;
        config.pipeline.queue_capacity = 2;
        AttributionPipeline::new(&config, Arc::new(InMemoryAttributionStore::new()))
    }

    fn group(i: usize) -> Vec<NormalizedRecord> {
        let isrc = format!("USRC1{i:07}");
        vec![
            NormalizedRecord::new(SourceKind::MusicBrainz, format!("mb-{i}"), EntityType::Recording, format!("Track {i}"))
                .unwrap()
                .with_identifier(IdentifierKind::Isrc, &isrc),
            NormalizedRecord::new(SourceKind::Spotify, format!("sp-{i}"), EntityType::Recording, format!("Track {i}"))
                .unwrap()
                .with_identifier(IdentifierKind::Isrc, &isrc),
        ]
    }

    #[test]
    fn groups_resolve_in_input_order() {
        let groups: Vec<Vec<NormalizedRecord>> = (0..9).map(group).collect();
        let resolved = pipeline(3).resolve_groups(&groups).unwrap();
        assert_eq!(resolved.len(), 9);
        for (i, entities) in resolved.iter().enumerate() {
            assert_eq!(entities.len(), 1);
            assert_eq!(entities[0].canonical_name, format!("Track {i}"));
            assert_eq!(entities[0].resolution_method, ResolutionMethod::ExactId);
        }
    }

    #[test]
    fn empty_input_needs_no_workers() {
        assert!(pipeline(4).resolve_groups(&[]).unwrap().is_empty());
    }

    #[test]
    fn feedback_goes_through_the_store() {
        let p = pipeline(1);
        let work = p.resolve_groups(&[group(1)]).unwrap().remove(0).remove(0);
        let artist = ResolvedEntity::builder()
            .entity_type(EntityType::Artist)
            .canonical_name("Nina Simone")
            .source(crate::source::SourceReference::new(SourceKind::Discogs, "d-1", 0.9).unwrap())
            .method(ResolutionMethod::SingleSource)
            .confidence(0.5)
            .review("resolution confidence 0.50 below threshold 0.70")
            .build()
            .unwrap();
        let roles = HashMap::from([(artist.id, CreditRole::Performer)]);

        let record = p.attribute(&work, &[artist.clone()], &roles).unwrap();
        assert!(record.needs_review);
        assert_eq!(p.review_backlog(10).unwrap().len(), 1);

        let next = p
            .apply_feedback(record.id, &[Feedback::Confirm { entity_id: artist.id }], "reviewer", "confirmed")
            .unwrap();
        assert_eq!(next.version, 2);
        assert_eq!(p.store().list_versions(record.id).unwrap().len(), 2);

        let missing = p.apply_feedback(AttributionId::new(), &[], "reviewer", "noop").unwrap_err();
        assert!(matches!(missing, CoreError::Storage(StorageError::RecordNotFound(_))));
    }
}
