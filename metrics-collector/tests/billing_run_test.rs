//! Billing run tests against the in-memory reporting store.

mod common;

use common::{bucket, buckets, init_test_tracing, memory_recorder, recorder_with, GIB};
use metrics_collector::catalog::{BillingCatalog, DiscountPolicy};
use metrics_collector::models::{Aggregated, Fact, Key, ObjectType};
use metrics_collector::services::{MemoryStore, RunObserver, UsageRecorder};
use metrics_collector::BillingError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn saving_the_same_bucket_twice_keeps_one_fact() {
    let (store, recorder) = memory_recorder().await;
    let usage = buckets([bucket("ns1", "hobbyist-2", "pg", "org1", 2.0)]);
    let cancel = CancellationToken::new();

    let first = recorder.save_usage(&usage, &cancel).await;
    let second = recorder.save_usage(&usage, &cancel).await;

    assert_eq!(first.created, 1);
    assert_eq!(second.created, 0);
    assert_eq!(second.reused, 1);

    let data = store.snapshot().unwrap();
    assert_eq!(data.facts.len(), 1);
    assert_eq!(data.tenants.len(), 1);
    assert_eq!(data.categories.len(), 1);
    assert_eq!(data.date_times.len(), 1);
    assert_eq!(data.facts[0].quantity, 2.0);
}

#[tokio::test]
async fn failed_bucket_does_not_stop_the_run() {
    let (store, recorder) = memory_recorder().await;
    let usage = buckets([
        bucket("ns1", "hobbyist-2", "pg", "org1", 1.0),
        bucket("ns2", "enterprise-900", "pg", "org2", 1.0),
        bucket("ns3", "startup-4", "pg", "org3", 3.0),
    ]);

    let report = recorder.save_usage(&usage, &CancellationToken::new()).await;

    assert_eq!(report.attempted, 3);
    assert_eq!(report.created, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key.as_str(), "ns2:enterprise-900:pg");
    assert_eq!(report.failures[0].error_type, "no_product_match");
    assert!(!report.is_complete());

    let data = store.snapshot().unwrap();
    assert_eq!(data.facts.len(), 2);
}

#[tokio::test]
async fn failed_bucket_leaves_no_dimension_rows() {
    let (store, recorder) = memory_recorder().await;
    let usage = buckets([bucket("ns2", "enterprise-900", "pg", "org2", 1.0)]);

    let report = recorder.save_usage(&usage, &CancellationToken::new()).await;
    assert_eq!(report.failures.len(), 1);

    let data = store.snapshot().unwrap();
    assert!(data.tenants.is_empty());
    assert!(data.categories.is_empty());
    assert!(data.date_times.is_empty());
    assert!(data.facts.is_empty());
}

#[tokio::test]
async fn storage_bytes_are_recorded_as_gb_days() {
    let (store, recorder) = memory_recorder().await;
    let usage = buckets([bucket("ns1", "default", "sos", "org1", 3.0 * GIB)]);

    let report = recorder.save_usage(&usage, &CancellationToken::new()).await;
    assert_eq!(report.created, 1);

    let data = store.snapshot().unwrap();
    assert_eq!(data.facts[0].quantity, 3.0);
    assert_eq!(data.categories[0].source, "exoscale:ns1");
    assert_eq!(data.tenants[0].source, "org1");

    let query = data
        .queries
        .iter()
        .find(|q| q.id == data.facts[0].query_id)
        .unwrap();
    assert_eq!(query.name, "object-storage-storage:exoscale");
}

#[tokio::test]
async fn cancelled_run_reports_remaining_buckets() {
    let (store, recorder) = memory_recorder().await;
    let usage = buckets([
        bucket("ns1", "hobbyist-2", "pg", "org1", 1.0),
        bucket("ns2", "startup-4", "mysql", "org2", 1.0),
    ]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = recorder.save_usage(&usage, &cancel).await;

    assert_eq!(report.attempted, 0);
    assert_eq!(report.not_attempted, 2);
    assert!(store.snapshot().unwrap().facts.is_empty());
}

/// Cancels the run as soon as the first bucket is saved.
struct CancelOnFirstSave {
    cancel: CancellationToken,
    skipped: AtomicUsize,
}

impl RunObserver for CancelOnFirstSave {
    fn bucket_persisted(&self, _: &Aggregated, _: ObjectType, _: &Fact, _: bool) {
        self.cancel.cancel();
    }

    fn run_cancelled(&self, skipped: &[&Aggregated]) {
        self.skipped.store(skipped.len(), Ordering::SeqCst);
    }
}

#[tokio::test]
async fn cancellation_during_a_run_keeps_the_saved_bucket() {
    init_test_tracing();
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let observer = Arc::new(CancelOnFirstSave {
        cancel: cancel.clone(),
        skipped: AtomicUsize::new(0),
    });
    let recorder = UsageRecorder::new(
        Arc::new(store.clone()),
        Arc::new(BillingCatalog::exoscale_default()),
        common::billing_date(),
        observer.clone(),
    );
    recorder.initialize().await.unwrap();
    let usage = buckets([
        bucket("ns1", "hobbyist-2", "pg", "org1", 1.0),
        bucket("ns2", "startup-4", "pg", "org2", 1.0),
        bucket("ns3", "business-8", "pg", "org3", 1.0),
    ]);

    let report = recorder.save_usage(&usage, &cancel).await;

    assert_eq!(report.attempted, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.not_attempted, 2);
    assert!(!report.is_complete());
    assert_eq!(observer.skipped.load(Ordering::SeqCst), 2);

    let data = store.snapshot().unwrap();
    assert_eq!(data.facts.len(), 1);
    assert_eq!(data.tenants.len(), 1);
}

#[tokio::test]
async fn empty_run_returns_empty_report() {
    let (store, recorder) = memory_recorder().await;

    let report = recorder
        .save_usage(&buckets([]), &CancellationToken::new())
        .await;

    assert_eq!(report.attempted, 0);
    assert!(report.is_complete());
    assert!(store.snapshot().unwrap().tenants.is_empty());
}

fn without_discounts(policy: DiscountPolicy) -> BillingCatalog {
    let mut catalog = BillingCatalog::exoscale_default();
    for entry in catalog.entries.values_mut() {
        entry.discounts.clear();
    }
    catalog.discount_policy = policy;
    catalog
}

#[tokio::test]
async fn missing_discount_fails_when_required() {
    let store = MemoryStore::new();
    let recorder = recorder_with(
        Arc::new(store.clone()),
        without_discounts(DiscountPolicy::Required),
    )
    .await;
    let (_, usage) = bucket("ns1", "hobbyist-2", "redis", "org1", 1.0);

    let err = recorder.ensure_bucket_usage(&usage).await.unwrap_err();

    assert_eq!(err.error_type(), "no_discount_match");
    assert!(store.snapshot().unwrap().facts.is_empty());
}

#[tokio::test]
async fn missing_discount_is_allowed_when_optional() {
    let store = MemoryStore::new();
    let recorder = recorder_with(
        Arc::new(store.clone()),
        without_discounts(DiscountPolicy::Optional),
    )
    .await;
    let (_, usage) = bucket("ns1", "hobbyist-2", "redis", "org1", 1.0);

    let outcome = recorder.ensure_bucket_usage(&usage).await.unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.object_type, ObjectType::Redis);
    assert_eq!(outcome.fact.discount_id, None);
}

#[tokio::test]
async fn missing_query_fails_the_bucket() {
    let mut catalog = BillingCatalog::exoscale_default();
    if let Some(entry) = catalog.entries.get_mut(&ObjectType::Kafka) {
        entry.query.name = "dbaas-kafka:elsewhere".to_string();
    }
    let store = MemoryStore::new();
    let recorder = recorder_with(Arc::new(store.clone()), catalog).await;
    let (_, usage) = bucket("ns1", "business-8", "kafka", "org1", 1.0);

    let err = recorder.ensure_bucket_usage(&usage).await.unwrap_err();

    match err {
        BillingError::QueryNotFound(name) => assert_eq!(name, "dbaas-kafka:exoscale"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn query_unit_must_fit_the_measurement() {
    let mut catalog = BillingCatalog::exoscale_default();
    if let Some(entry) = catalog.entries.get_mut(&ObjectType::ObjectStorage) {
        entry.query.unit = "Instances".to_string();
    }
    let store = MemoryStore::new();
    let recorder = recorder_with(Arc::new(store.clone()), catalog).await;
    let (_, usage) = bucket("ns1", "default", "sos", "org1", GIB);

    let err = recorder.ensure_bucket_usage(&usage).await.unwrap_err();

    assert_eq!(err.error_type(), "unsupported_unit");
    assert!(store.snapshot().unwrap().tenants.is_empty());
}

#[tokio::test]
async fn unknown_resource_type_is_a_malformed_key() {
    let (_, recorder) = memory_recorder().await;
    let (_, usage) = bucket("ns1", "hobbyist-2", "cassandra", "org1", 1.0);

    let err = recorder.ensure_bucket_usage(&usage).await.unwrap_err();

    assert_eq!(err.error_type(), "malformed_key");
}

#[tokio::test]
async fn catalog_initialization_is_repeatable() {
    let (store, recorder) = memory_recorder().await;
    let before = store.snapshot().unwrap();

    recorder.initialize().await.unwrap();

    let after = store.snapshot().unwrap();
    assert_eq!(before.products.len(), after.products.len());
    assert_eq!(before.discounts.len(), after.discounts.len());
    assert_eq!(before.queries.len(), after.queries.len());
    // One storage product plus four plans for each of the five database types.
    assert_eq!(after.products.len(), 21);
    assert_eq!(after.queries.len(), 6);
}

#[tokio::test]
async fn buckets_are_processed_in_key_order() {
    let (_, recorder) = memory_recorder().await;
    let usage = buckets([
        bucket("ns-b", "enterprise-900", "pg", "org1", 1.0),
        bucket("ns-a", "enterprise-900", "pg", "org1", 1.0),
    ]);

    let report = recorder.save_usage(&usage, &CancellationToken::new()).await;

    let keys: Vec<&Key> = report.failures.iter().map(|f| &f.key).collect();
    assert_eq!(keys[0].as_str(), "ns-a:enterprise-900:pg");
    assert_eq!(keys[1].as_str(), "ns-b:enterprise-900:pg");
}
