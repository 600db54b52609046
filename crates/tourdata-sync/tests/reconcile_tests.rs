//! Reconciliation against the in-memory record store

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{base_tour_item, greentour_items};
use serde_json::{json, Value};
use tourdata_sync::mapper::map_items;
use tourdata_sync::models::NormalizedRecord;
use tourdata_sync::store::MemoryRecordStore;
use tourdata_sync::{Reconciler, SourceType, WriteMode};

const GREENTOUR: &str = "greentour_areabased";
const BASE_TOUR: &str = "base_tour_areabased";

fn records(source: SourceType, items: &[Value]) -> Vec<NormalizedRecord> {
    let batch = map_items(source, items);
    assert_eq!(batch.failed, 0);
    batch.records
}

#[tokio::test]
async fn test_second_run_over_same_data_writes_nothing() {
    let store = MemoryRecordStore::new();
    let incoming = records(SourceType::GreenTour, &greentour_items(0, 40));

    let first = Reconciler::new(&store)
        .reconcile(GREENTOUR, SourceType::GreenTour, &incoming)
        .await
        .unwrap();
    assert_eq!(first.new, 40);
    assert_eq!(first.updated, 0);

    store.reset_calls();
    let second = Reconciler::new(&store)
        .reconcile(GREENTOUR, SourceType::GreenTour, &incoming)
        .await
        .unwrap();

    assert_eq!(second.new, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 40);
    let calls = store.calls();
    assert_eq!(calls.inserted_rows, 0);
    assert_eq!(calls.updates, 0);
    assert_eq!(calls.selects, 1);
    assert_eq!(store.rows(GREENTOUR).len(), 40);
}

#[tokio::test]
async fn test_changed_item_updates_exactly_one_row() {
    let store = MemoryRecordStore::new();
    let mut items = greentour_items(0, 10);
    Reconciler::new(&store)
        .reconcile(GREENTOUR, SourceType::GreenTour, &records(SourceType::GreenTour, &items))
        .await
        .unwrap();

    // An unmapped field changes; the fingerprint still differs
    items[3]["modifiedtime"] = json!("20250401120000");
    store.reset_calls();
    let outcome = Reconciler::new(&store)
        .reconcile(GREENTOUR, SourceType::GreenTour, &records(SourceType::GreenTour, &items))
        .await
        .unwrap();

    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.new, 0);
    assert_eq!(outcome.unchanged, 9);
    assert_eq!(store.calls().updates, 1);

    let rows = store.rows(GREENTOUR);
    let updated: Vec<_> = rows.iter().filter(|row| row.revisions == 1).collect();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].values["contentid"].as_text().as_deref(), Some("3"));
}

#[tokio::test]
async fn test_new_key_inserts_exactly_one_row() {
    let store = MemoryRecordStore::new();
    Reconciler::new(&store)
        .reconcile(
            GREENTOUR,
            SourceType::GreenTour,
            &records(SourceType::GreenTour, &greentour_items(0, 5)),
        )
        .await
        .unwrap();

    store.reset_calls();
    let outcome = Reconciler::new(&store)
        .reconcile(
            GREENTOUR,
            SourceType::GreenTour,
            &records(SourceType::GreenTour, &greentour_items(0, 6)),
        )
        .await
        .unwrap();

    assert_eq!(outcome.new, 1);
    assert_eq!(outcome.unchanged, 5);
    assert_eq!(store.calls().inserted_rows, 1);
    assert_eq!(store.rows(GREENTOUR).len(), 6);
}

#[tokio::test]
async fn test_composite_key_distinguishes_months_and_codes() {
    let store = MemoryRecordStore::new();
    let first = [base_tour_item("A", "202503", "47111")];
    Reconciler::new(&store)
        .reconcile(BASE_TOUR, SourceType::BaseTour, &records(SourceType::BaseTour, &first))
        .await
        .unwrap();

    let incoming = [
        base_tour_item("A", "202503", "47111"),
        base_tour_item("B", "202503", "47111"),
        base_tour_item("A", "202504", "47111"),
    ];
    let incoming = records(SourceType::BaseTour, &incoming);
    assert_eq!(incoming[0].key_value(), "A_202503");
    assert_eq!(incoming[1].key_value(), "B_202503");

    let outcome = Reconciler::new(&store)
        .reconcile(BASE_TOUR, SourceType::BaseTour, &incoming)
        .await
        .unwrap();

    assert_eq!(outcome.unchanged, 1);
    assert_eq!(outcome.new, 2);
    assert_eq!(store.rows(BASE_TOUR).len(), 3);
}

#[tokio::test]
async fn test_composite_key_change_updates_only_that_row() {
    let store = MemoryRecordStore::new();
    let stored = [
        base_tour_item("A", "202503", "47111"),
        base_tour_item("B", "202503", "47111"),
    ];
    Reconciler::new(&store)
        .reconcile(BASE_TOUR, SourceType::BaseTour, &records(SourceType::BaseTour, &stored))
        .await
        .unwrap();

    let mut changed = base_tour_item("A", "202503", "47111");
    changed["hubRank"] = json!("1");
    store.reset_calls();
    let outcome = Reconciler::new(&store)
        .reconcile(BASE_TOUR, SourceType::BaseTour, &records(SourceType::BaseTour, &[changed]))
        .await
        .unwrap();

    assert_eq!(outcome.new, 0);
    assert_eq!(outcome.updated, 1);
    assert_eq!(store.calls().updates, 1);
    assert_eq!(store.calls().inserted_rows, 0);

    let rows = store.rows(BASE_TOUR);
    assert_eq!(rows.len(), 2);
    let updated: Vec<_> = rows.iter().filter(|row| row.revisions == 1).collect();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].values["hubtatscode"].as_text().as_deref(), Some("A"));
}

#[tokio::test]
async fn test_partial_write_failure_is_counted_not_fatal() {
    let store = MemoryRecordStore::new();
    store.reject_writes_where("contentid", "2");

    let outcome = Reconciler::new(&store)
        .reconcile(
            GREENTOUR,
            SourceType::GreenTour,
            &records(SourceType::GreenTour, &greentour_items(0, 5)),
        )
        .await
        .unwrap();

    assert_eq!(outcome.total, 5);
    assert_eq!(outcome.new, 4);
    assert_eq!(outcome.failed, 1);
    assert_eq!(store.rows(GREENTOUR).len(), 4);
}

#[tokio::test]
async fn test_duplicate_keys_in_one_batch_are_both_inserted() {
    let store = MemoryRecordStore::new();
    let items = [
        json!({"contentid": "7", "title": "first"}),
        json!({"contentid": "7", "title": "second"}),
    ];

    let outcome = Reconciler::new(&store)
        .reconcile(GREENTOUR, SourceType::GreenTour, &records(SourceType::GreenTour, &items))
        .await
        .unwrap();

    assert_eq!(outcome.new, 2);
    assert_eq!(store.rows(GREENTOUR).len(), 2);
}

#[tokio::test]
async fn test_write_modes_agree_on_counts() {
    let seed = records(SourceType::GreenTour, &greentour_items(0, 10));
    let mut items = greentour_items(0, 15);
    items[0]["title"] = json!("Renamed");
    items[9]["title"] = json!("Renamed too");
    let incoming = records(SourceType::GreenTour, &items);

    let mut results = Vec::new();
    for mode in [WriteMode::PerRecord, WriteMode::Batched { batch_size: 4 }] {
        let store = MemoryRecordStore::new();
        Reconciler::new(&store)
            .reconcile(GREENTOUR, SourceType::GreenTour, &seed)
            .await
            .unwrap();

        let outcome = Reconciler::new(&store)
            .with_mode(mode)
            .reconcile(GREENTOUR, SourceType::GreenTour, &incoming)
            .await
            .unwrap();
        assert_eq!(store.rows(GREENTOUR).len(), 15);
        results.push(outcome);
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].new, 5);
    assert_eq!(results[0].updated, 2);
    assert_eq!(results[0].unchanged, 8);
}

#[tokio::test]
async fn test_unreachable_store_fails_reconciliation() {
    let store = MemoryRecordStore::new();
    store.set_unreachable(true);

    let result = Reconciler::new(&store)
        .reconcile(
            GREENTOUR,
            SourceType::GreenTour,
            &records(SourceType::GreenTour, &greentour_items(0, 1)),
        )
        .await;
    assert!(result.is_err());
}
