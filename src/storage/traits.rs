//! Abstract storage traits.
//!
//! Backends must be safe to share across worker threads. Attribution updates
//! are compare-and-increment on `version`: a writer holding a stale version
//! gets a retryable `VersionConflict` instead of silently overwriting.

use thiserror::Error;

use crate::attribution::{AttributionId, AttributionRecord, RecordUpdate};
use crate::entity::EntityId;
use crate::error::ValidationError;
use crate::identifier::IdentifierKind;
use crate::resolved::ResolvedEntity;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// Attribution record not found.
    #[error("Attribution record not found: {0}")]
    RecordNotFound(AttributionId),

    /// Resolved entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// A concurrent writer bumped the version first.
    #[error("Version conflict on {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        id: AttributionId,
        expected: u64,
        actual: u64,
    },

    /// The write would produce an invalid record.
    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] ValidationError),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

impl StorageError {
    /// Returns true if re-reading and retrying can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// Storage for versioned attribution records.
pub trait AttributionStore: Send + Sync {
    /// Stores a new record. Returns error if the ID already exists.
    fn store(&self, record: AttributionRecord) -> Result<(), StorageError>;

    /// Applies `update` to the current version if it still equals
    /// `expected_version`, returning the new version.
    ///
    /// # Errors
    /// - `RecordNotFound`: no record with this ID
    /// - `VersionConflict`: the stored version moved on
    /// - `InvalidRecord`: the update would break an invariant
    fn update(
        &self,
        id: AttributionId,
        expected_version: u64,
        update: RecordUpdate,
    ) -> Result<AttributionRecord, StorageError>;

    /// Stores an externally produced next version.
    ///
    /// Succeeds only when `record.version` is exactly one above the stored version.
    fn save_version(&self, record: AttributionRecord) -> Result<(), StorageError>;

    /// Current version of a record.
    fn find_by_id(&self, id: AttributionId) -> Result<Option<AttributionRecord>, StorageError>;

    /// Current versions of every record for a work.
    fn find_by_work_entity_id(&self, work: EntityId) -> Result<Vec<AttributionRecord>, StorageError>;

    /// Up to `limit` current records flagged for review, by `review_priority`
    /// descending; ties keep insertion order.
    fn find_needs_review(&self, limit: usize) -> Result<Vec<AttributionRecord>, StorageError>;

    /// Every stored version of a record (ascending by version).
    fn list_versions(&self, id: AttributionId) -> Result<Vec<AttributionRecord>, StorageError>;
}

/// Storage for immutable resolved entities and their correction lineage.
pub trait ResolvedEntityStore: Send + Sync {
    /// Inserts an entity. An entity with `merged_from` supersedes its predecessor.
    fn insert(&self, entity: ResolvedEntity) -> Result<(), StorageError>;

    /// Gets an entity by exact ID, superseded or not.
    fn get(&self, id: EntityId) -> Result<Option<ResolvedEntity>, StorageError>;

    /// Follows corrections forward to the newest entity.
    fn latest(&self, id: EntityId) -> Result<Option<ResolvedEntity>, StorageError>;

    /// Newest entities carrying an identifier value.
    fn find_by_identifier(&self, kind: &IdentifierKind, value: &str) -> Result<Vec<ResolvedEntity>, StorageError>;

    /// The entity followed by each predecessor, newest first.
    fn lineage(&self, id: EntityId) -> Result<Vec<ResolvedEntity>, StorageError>;
}
