//! Review ordering and language-model gating.

use chrono::{DateTime, Duration, Utc};
use creditline::{
    AssuranceLevel, AttributionRecord, ConformalScorer, Credit, CreditRole, EntityId, LlmGate, ProvenanceEvent,
    ProvenanceEventType, RecordUpdate, ReviewPriorityQueue, SourceKind,
};

fn record(confidence: f64, agreement: f64, updated_at: DateTime<Utc>) -> AttributionRecord {
    let credits = vec![Credit {
        entity_id: EntityId::new(),
        role: CreditRole::Songwriter,
        confidence,
        sources: vec![SourceKind::MusicBrainz],
        assurance_level: AssuranceLevel::A1,
        agreement,
    }];
    let conformal_set = ConformalScorer::default().score_credits(&credits, 0.9).unwrap();
    AttributionRecord::builder()
        .work_entity_id(EntityId::new())
        .credits(credits)
        .confidence_score(confidence)
        .source_agreement(agreement)
        .conformal_set(conformal_set)
        .provenance(vec![ProvenanceEvent::new(
            ProvenanceEventType::Score,
            "credit_aggregator",
            serde_json::json!({}),
        )
        .at(updated_at)])
        .created_at(updated_at)
        .build()
        .unwrap()
}

#[test]
fn priority_never_rises_with_confidence_or_agreement() {
    let queue = ReviewPriorityQueue::default();
    let now = Utc::now();
    let steps: Vec<f64> = (0..=10).map(|i| f64::from(i) / 10.0).collect();

    for &agreement in &steps {
        let mut previous = f64::INFINITY;
        for &confidence in &steps {
            let p = queue.priority_at(&record(confidence, agreement, now), now);
            assert!((0.0..=1.0).contains(&p));
            assert!(p <= previous + 1e-12, "confidence {confidence} agreement {agreement}");
            previous = p;
        }
    }
    for &confidence in &steps {
        let mut previous = f64::INFINITY;
        for &agreement in &steps {
            let p = queue.priority_at(&record(confidence, agreement, now), now);
            assert!(p <= previous + 1e-12);
            previous = p;
        }
    }
}

#[test]
fn stale_and_unrevised_records_come_first() {
    let queue = ReviewPriorityQueue::default();
    let now = Utc::now();
    let fresh = record(0.8, 0.8, now);
    let stale = record(0.8, 0.8, now - Duration::days(60));
    assert!(queue.priority_at(&stale, now) > queue.priority_at(&fresh, now));

    let revised = fresh.updated(RecordUpdate::new("reviewer", "checked")).unwrap();
    assert!(queue.priority_at(&revised, now) < queue.priority_at(&fresh, now));
}

#[test]
fn next_for_review_takes_the_top_and_keeps_ties_in_order() {
    let queue = ReviewPriorityQueue::default();
    let now = Utc::now();
    let records = vec![
        record(0.9, 0.9, now),
        record(0.2, 0.3, now),
        record(0.6, 0.6, now),
        record(0.6, 0.6, now),
    ];

    let next = queue.next_for_review(&records, 3);
    assert_eq!(next.len(), 3);
    assert_eq!(next[0].id, records[1].id);
    assert_eq!(next[1].id, records[2].id);
    assert_eq!(next[2].id, records[3].id);

    assert_eq!(queue.next_for_review(&records, 10).len(), records.len());
    assert!(queue.next_for_review(&[], 5).is_empty());
}

#[test]
fn gate_opens_only_inside_the_ambiguous_band() {
    let gate = LlmGate::default();
    assert!(gate.should_invoke(Some(0.7), Some(0.6)));
    assert!(gate.should_invoke(Some(0.5), None));
    assert!(!gate.should_invoke(Some(0.9), Some(0.7)));
    assert!(!gate.should_invoke(Some(0.7), Some(0.3)));
    assert!(!gate.should_invoke(Some(0.85), None));
    assert!(!gate.should_invoke(None, None));

    let narrow = LlmGate::new(0.6, 0.7);
    assert!(!narrow.should_invoke(Some(0.55), None));
    assert!(narrow.should_invoke(None, Some(0.65)));
}
