#![allow(dead_code)]

use std::sync::Once;

use creditline::{EntityType, IdentifierKind, NormalizedRecord, SourceKind};

static TRACING: Once = Once::new();

/// Routes library logs to the test harness; filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn record(source: SourceKind, id: &str, entity_type: EntityType, name: &str) -> NormalizedRecord {
    NormalizedRecord::new(source, id, entity_type, name).unwrap()
}

pub fn with_isrc(source: SourceKind, id: &str, name: &str, isrc: &str) -> NormalizedRecord {
    record(source, id, EntityType::Recording, name).with_identifier(IdentifierKind::Isrc, isrc)
}
