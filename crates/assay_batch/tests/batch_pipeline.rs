use assay_batch::{
    batch::BatchValidator,
    config::{Config, DatabaseConfig, ExtractConfig},
    pipeline::ProductPipeline,
    repository::{MemoryRepository, RepositoryManager},
};
use assay_common::{models::RawRecord, schema::Schema, validator::RecordValidator};
use serde_json::{Value, json};
use std::sync::Arc;

const BATCH: &str = "scheduled__2026-01-01T02:00:00";

fn setup(dedupe: bool) -> (Arc<MemoryRepository>, RepositoryManager, BatchValidator) {
    let store = Arc::new(MemoryRepository::new());
    let repositories = RepositoryManager::in_memory(Arc::clone(&store));
    let validator = BatchValidator::new(
        RecordValidator::new(Schema::products()),
        repositories.clone(),
        dedupe,
    );

    (store, repositories, validator)
}

async fn stage(repositories: &RepositoryManager, batch_id: &str, payloads: &[&str]) {
    let staging = repositories.staging_repository();
    for payload in payloads {
        staging
            .insert(batch_id, "vendor_a", &RawRecord::from_json(*payload))
            .await
            .unwrap();
    }
}

const GOOD: &str = r#"{"product_id":"P001","name":"Widget","price":"$19.99","stock":"10"}"#;
const BAD: &str = r#"{"product_id":"P003","name":null,"price":"CALL","stock":"-1"}"#;

#[tokio::test]
async fn batch_splits_into_clean_and_quarantine() {
    let (store, repositories, validator) = setup(true);
    stage(&repositories, BATCH, &[GOOD, BAD]).await;

    let summary = validator.run(BATCH).await.unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.valid, 1);
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.quality_percent(), 50.0);

    let clean = store.clean_records();
    assert_eq!(clean.len(), 1);
    assert_eq!(
        Value::Object(clean[0].fields().clone()),
        json!({"product_id": "P001", "name": "Widget", "price": 19.99, "stock": 10})
    );

    let quarantined = store.quarantined();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].raw().payload(), BAD.as_bytes());
    assert_eq!(
        quarantined[0].joined_reasons(),
        "missing name, price not numeric, stock out of range"
    );

    assert!(store.staged().iter().all(|row| row.processed));
}

#[tokio::test]
async fn rerunning_a_batch_processes_nothing_new() {
    let (store, repositories, validator) = setup(true);
    stage(&repositories, BATCH, &[GOOD, BAD]).await;

    validator.run(BATCH).await.unwrap();
    let rerun = validator.run(BATCH).await.unwrap();

    assert_eq!(rerun.total, 0);
    assert_eq!(store.clean_records().len(), 1);
    assert_eq!(store.quarantined().len(), 1);
}

#[tokio::test]
async fn same_product_across_batches_is_upserted_once() {
    let (store, repositories, validator) = setup(true);
    let restocked = r#"{"product_id":"P001","name":"Widget","price":"$21.00","stock":4}"#;
    stage(&repositories, "batch_1", &[GOOD]).await;
    stage(&repositories, "batch_2", &[restocked]).await;

    validator.run("batch_1").await.unwrap();
    validator.run("batch_2").await.unwrap();

    let clean = store.clean_records();
    assert_eq!(clean.len(), 1);
    assert_eq!(clean[0].get_f64("price"), Some(21.0));
    assert_eq!(clean[0].get_i64("stock"), Some(4));
}

#[tokio::test]
async fn repeated_key_within_a_run_is_quarantined() {
    let (store, repositories, validator) = setup(true);
    stage(&repositories, BATCH, &[GOOD, GOOD, BAD, BAD]).await;

    let summary = validator.run(BATCH).await.unwrap();

    assert_eq!(summary.valid, 1);
    assert_eq!(summary.invalid, 3);
    assert_eq!(summary.duplicates, 2);

    let reasons: Vec<String> = store
        .quarantined()
        .iter()
        .map(|q| q.joined_reasons())
        .collect();
    assert_eq!(
        reasons,
        [
            "duplicate product_id",
            "missing name, price not numeric, stock out of range",
            "missing name, price not numeric, stock out of range, duplicate product_id",
        ]
    );
}

#[tokio::test]
async fn dedupe_can_be_switched_off() {
    let (store, repositories, validator) = setup(false);
    stage(&repositories, BATCH, &[GOOD, GOOD]).await;

    let summary = validator.run(BATCH).await.unwrap();

    assert_eq!(summary.valid, 2);
    assert_eq!(summary.duplicates, 0);
    assert_eq!(store.clean_records().len(), 1);
}

#[tokio::test]
async fn reason_breakdown_is_ordered_by_frequency() {
    let (_store, repositories, validator) = setup(false);
    stage(
        &repositories,
        BATCH,
        &[
            BAD,
            r#"{"product_id":"P004","name":"Lamp","price":"N/A","stock":1}"#,
            r#"{"product_id":"P005","name":"Desk","price":"TBD","stock":2}"#,
        ],
    )
    .await;

    let summary = validator.run(BATCH).await.unwrap();

    assert_eq!(
        summary.reasons,
        [
            ("price not numeric".to_string(), 3),
            ("missing name".to_string(), 1),
            ("stock out of range".to_string(), 1),
        ]
    );
}

#[tokio::test]
async fn sink_outage_skips_items_for_the_next_run() {
    let (store, repositories, validator) = setup(true);
    stage(&repositories, BATCH, &[GOOD, BAD]).await;

    store.set_failing_sink(true);
    let failed = validator.run(BATCH).await.unwrap();

    assert_eq!(failed.total, 2);
    assert_eq!(failed.skipped, 2);
    assert!(store.staged().iter().all(|row| !row.processed));

    store.set_failing_sink(false);
    let recovered = validator.run(BATCH).await.unwrap();

    assert_eq!(recovered.valid, 1);
    assert_eq!(recovered.invalid, 1);
    assert_eq!(store.clean_records().len(), 1);
}

#[tokio::test]
async fn pipeline_extracts_loads_and_validates() {
    let store = Arc::new(MemoryRepository::new());
    let repositories = RepositoryManager::in_memory(Arc::clone(&store));
    let config = Config::builder()
        .database(DatabaseConfig::builder().url("postgres://unused").build())
        .extract(
            ExtractConfig::builder()
                .sources(vec!["vendor_a".to_string(), "vendor_b".to_string()])
                .products_per_source(20)
                .seed(42)
                .build(),
        )
        .build();

    let report = ProductPipeline::new(config, repositories).run().await.unwrap();

    assert_eq!(report.extracted, 42);
    assert_eq!(report.loaded_raw, 42);
    assert_eq!(report.summary.total, 42);
    assert_eq!(report.summary.valid + report.summary.invalid, 42);
    assert!(report.summary.duplicates >= 1);
    assert!(report.batch_id.starts_with("manual__"));

    let staged = store.staged();
    assert!(staged.iter().all(|row| row.processed && row.batch_id == report.batch_id));
    assert_eq!(store.quarantined().len(), report.summary.invalid);
}
