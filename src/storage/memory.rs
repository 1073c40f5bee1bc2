//! In-memory storage backend.
//!
//! Thread-safe implementations of the storage traits, intended for embedded
//! usage, tests and as a reference for real backends.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use tracing::debug;

use crate::attribution::{AttributionId, AttributionRecord, RecordUpdate};
use crate::entity::EntityId;
use crate::identifier::{normalize_identifier, IdentifierKind};
use crate::resolved::ResolvedEntity;
use crate::storage::traits::{AttributionStore, ResolvedEntityStore, StorageError};

const MAX_LINEAGE_HOPS: usize = 128;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct AttributionState {
    versions: HashMap<AttributionId, Vec<AttributionRecord>>,
    by_work: HashMap<EntityId, Vec<AttributionId>>,
    insertion_order: Vec<AttributionId>,
}

impl AttributionState {
    fn current(&self, id: AttributionId) -> Option<&AttributionRecord> {
        self.versions.get(&id).and_then(|v| v.last())
    }
}

/// In-memory attribution store with per-record version history.
#[derive(Debug, Default)]
pub struct InMemoryAttributionStore {
    state: RwLock<AttributionState>,
}

impl InMemoryAttributionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttributionStore for InMemoryAttributionStore {
    fn store(&self, record: AttributionRecord) -> Result<(), StorageError> {
        record.validate()?;
        let mut state = self.state.write().map_err(|_| lock_err("attribution.store"))?;
        if state.versions.contains_key(&record.id) {
            return Err(StorageError::DuplicateKey(record.id.to_string()));
        }
        state.by_work.entry(record.work_entity_id).or_default().push(record.id);
        state.insertion_order.push(record.id);
        state.versions.insert(record.id, vec![record]);
        Ok(())
    }

    fn update(
        &self,
        id: AttributionId,
        expected_version: u64,
        update: RecordUpdate,
    ) -> Result<AttributionRecord, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("attribution.update"))?;
        let current = state.current(id).ok_or(StorageError::RecordNotFound(id))?;
        if current.version != expected_version {
            return Err(StorageError::VersionConflict {
                id,
                expected: expected_version,
                actual: current.version,
            });
        }
        let next = current.updated(update)?;
        debug!(record = %id, version = next.version, "attribution record updated");
        state.versions.entry(id).or_default().push(next.clone());
        Ok(next)
    }

    fn save_version(&self, record: AttributionRecord) -> Result<(), StorageError> {
        record.validate()?;
        let mut state = self.state.write().map_err(|_| lock_err("attribution.save_version"))?;
        let id = record.id;
        let current = state.current(id).ok_or(StorageError::RecordNotFound(id))?;
        let expected = record.version.saturating_sub(1);
        if current.version != expected {
            return Err(StorageError::VersionConflict {
                id,
                expected,
                actual: current.version,
            });
        }
        if current.work_entity_id != record.work_entity_id || current.created_at != record.created_at {
            return Err(StorageError::BackendError(format!(
                "version {} of {id} changes its work or creation time",
                record.version
            )));
        }
        record.validate_successor(current)?;
        state.versions.entry(id).or_default().push(record);
        Ok(())
    }

    fn find_by_id(&self, id: AttributionId) -> Result<Option<AttributionRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("attribution.find_by_id"))?;
        Ok(state.current(id).cloned())
    }

    fn find_by_work_entity_id(&self, work: EntityId) -> Result<Vec<AttributionRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("attribution.find_by_work_entity_id"))?;
        Ok(state
            .by_work
            .get(&work)
            .into_iter()
            .flatten()
            .filter_map(|id| state.current(*id).cloned())
            .collect())
    }

    fn find_needs_review(&self, limit: usize) -> Result<Vec<AttributionRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("attribution.find_needs_review"))?;
        let mut flagged: Vec<&AttributionRecord> = state
            .insertion_order
            .iter()
            .filter_map(|id| state.current(*id))
            .filter(|r| r.needs_review)
            .collect();
        flagged.sort_by(|a, b| b.review_priority.total_cmp(&a.review_priority));
        Ok(flagged.into_iter().take(limit).cloned().collect())
    }

    fn list_versions(&self, id: AttributionId) -> Result<Vec<AttributionRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("attribution.list_versions"))?;
        Ok(state.versions.get(&id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct EntityState {
    by_id: HashMap<EntityId, ResolvedEntity>,
    superseded_by: HashMap<EntityId, EntityId>,
    by_identifier: HashMap<String, BTreeSet<EntityId>>,
}

fn identifier_key(kind: &IdentifierKind, value: &str) -> String {
    format!("{kind}:{value}")
}

fn resolve_latest_id(state: &EntityState, id: EntityId) -> Result<EntityId, StorageError> {
    let mut current = id;
    for _ in 0..MAX_LINEAGE_HOPS {
        let Some(next) = state.superseded_by.get(&current).copied() else {
            return Ok(current);
        };
        if next == current {
            return Err(StorageError::BackendError(
                "entity lineage contains a self-cycle".to_string(),
            ));
        }
        current = next;
    }

    Err(StorageError::BackendError(
        "entity lineage resolution exceeded hop limit".to_string(),
    ))
}

/// In-memory store for resolved entities.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    state: RwLock<EntityState>,
}

impl InMemoryEntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResolvedEntityStore for InMemoryEntityStore {
    fn insert(&self, entity: ResolvedEntity) -> Result<(), StorageError> {
        entity.validate()?;
        let mut state = self.state.write().map_err(|_| lock_err("entity.insert"))?;
        if state.by_id.contains_key(&entity.id) {
            return Err(StorageError::DuplicateKey(entity.id.to_string()));
        }
        if let Some(previous) = entity.merged_from {
            if !state.by_id.contains_key(&previous) {
                return Err(StorageError::EntityNotFound(previous));
            }
            if let Some(existing) = state.superseded_by.get(&previous) {
                return Err(StorageError::DuplicateKey(format!(
                    "{previous} already superseded by {existing}"
                )));
            }
            state.superseded_by.insert(previous, entity.id);
        }
        for (kind, value) in entity.identifiers.iter() {
            state
                .by_identifier
                .entry(identifier_key(kind, value))
                .or_default()
                .insert(entity.id);
        }
        state.by_id.insert(entity.id, entity);
        Ok(())
    }

    fn get(&self, id: EntityId) -> Result<Option<ResolvedEntity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn latest(&self, id: EntityId) -> Result<Option<ResolvedEntity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity.latest"))?;
        if !state.by_id.contains_key(&id) {
            return Ok(None);
        }
        let head = resolve_latest_id(&state, id)?;
        Ok(state.by_id.get(&head).cloned())
    }

    fn find_by_identifier(&self, kind: &IdentifierKind, value: &str) -> Result<Vec<ResolvedEntity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity.find_by_identifier"))?;
        let key = identifier_key(kind, &normalize_identifier(kind, value));
        let Some(ids) = state.by_identifier.get(&key) else {
            return Ok(Vec::new());
        };
        let mut heads = BTreeSet::new();
        for id in ids {
            heads.insert(resolve_latest_id(&state, *id)?);
        }
        Ok(heads.into_iter().filter_map(|id| state.by_id.get(&id).cloned()).collect())
    }

    fn lineage(&self, id: EntityId) -> Result<Vec<ResolvedEntity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity.lineage"))?;
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if chain.len() >= MAX_LINEAGE_HOPS {
                return Err(StorageError::BackendError(
                    "entity lineage exceeded hop limit".to_string(),
                ));
            }
            let entity = state.by_id.get(&current).ok_or(StorageError::EntityNotFound(current))?;
            cursor = entity.merged_from;
            chain.push(entity.clone());
        }
        Ok(chain)
    }
}
