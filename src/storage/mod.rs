//! Persistence contracts for resolved entities and attribution records.
//!
//! The core does not own persistence. These traits describe what it needs
//! from a backend; `memory` provides the in-process reference implementation.

mod memory;
mod traits;

pub use memory::{InMemoryAttributionStore, InMemoryEntityStore};
pub use traits::{AttributionStore, ResolvedEntityStore, StorageError};
