#![cfg(feature = "test-utils")]

use starsync::coordinator::LoadCoordinator;
use starsync::sink::memory::MemoryWarehouse;
use starsync::source::memory::MemoryChangeSource;
use starsync::state::watermark::WatermarkAdvance;
use starsync::store::base::WatermarkStore;
use starsync::store::json::JsonWatermarkStore;
use starsync::test_utils::schema::{
    dim_user_config, dim_user_name, fast_loader_config, user_row,
};
use starsync::types::CdcValue;
use starsync_config::shared::TablesConfig;
use starsync_telemetry::tracing::init_test_tracing;

fn cdc(text: &str) -> CdcValue {
    CdcValue::parse(text).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn watermarks_survive_a_store_restart() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watermarks.json");

    let store = JsonWatermarkStore::new(&path);
    store.load_watermarks().await.unwrap();
    store
        .advance_watermark(&dim_user_name(), cdc("2025-01-03"))
        .await
        .unwrap();
    drop(store);

    let reopened = JsonWatermarkStore::new(&path);
    assert_eq!(reopened.load_watermarks().await.unwrap(), 1);
    assert_eq!(
        reopened
            .get_watermark(&dim_user_name())
            .await
            .unwrap()
            .unwrap()
            .cdc,
        cdc("2025-01-03")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn persisted_watermarks_never_regress() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watermarks.json");

    let store = JsonWatermarkStore::new(&path);
    store.load_watermarks().await.unwrap();
    store
        .advance_watermark(&dim_user_name(), cdc("2025-01-03"))
        .await
        .unwrap();

    let outcome = store
        .advance_watermark(&dim_user_name(), cdc("2025-01-02"))
        .await
        .unwrap();
    assert!(matches!(outcome, WatermarkAdvance::Regressed { .. }));

    // The refused advance must not have touched the file either.
    let reopened = JsonWatermarkStore::new(&path);
    reopened.load_watermarks().await.unwrap();
    assert_eq!(
        reopened
            .get_watermark(&dim_user_name())
            .await
            .unwrap()
            .unwrap()
            .cdc,
        cdc("2025-01-03")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn operators_can_edit_the_watermark_file_by_hand() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watermarks.json");

    // An operator rewinds a table by editing its entry directly.
    let contents = serde_json::json!({
        "analytics.dim_user": {
            "cdc": "2025-01-01",
            "last_success_at": "2025-01-03T12:00:00Z"
        }
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&contents).unwrap()).unwrap();

    let store = JsonWatermarkStore::new(&path);
    assert_eq!(store.load_watermarks().await.unwrap(), 1);
    assert_eq!(
        store
            .get_watermark(&dim_user_name())
            .await
            .unwrap()
            .unwrap()
            .cdc,
        cdc("2025-01-01")
    );

    // Deleting the entry forces a full reload next cycle.
    store.reset_watermark(&dim_user_name()).await.unwrap();

    let reopened = JsonWatermarkStore::new(&path);
    assert_eq!(reopened.load_watermarks().await.unwrap(), 0);
    assert!(
        reopened
            .get_watermark(&dim_user_name())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn a_missing_file_is_an_empty_store() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let store = JsonWatermarkStore::new(dir.path().join("does-not-exist.json"));

    assert_eq!(store.load_watermarks().await.unwrap(), 0);
    assert!(
        store
            .get_watermark(&dim_user_name())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cycles_persist_watermarks_through_the_json_store() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watermarks.json");

    let source = MemoryChangeSource::new();
    source
        .add_rows(
            &dim_user_name(),
            vec![
                user_row(1, "ana", "2025-01-01T00:00:00Z"),
                user_row(2, "ben", "2025-01-02T00:00:00Z"),
            ],
        )
        .await;

    let store = JsonWatermarkStore::new(&path);
    store.load_watermarks().await.unwrap();

    let coordinator = LoadCoordinator::new(
        fast_loader_config(),
        source,
        MemoryWarehouse::new(),
        store,
    );

    let tables = TablesConfig {
        tables: vec![dim_user_config()],
    };
    let result = coordinator.run_cycle(&tables).await.unwrap();
    assert_eq!(result.rows_applied(), 2);

    // A fresh process picks up where the previous cycle left off.
    let reopened = JsonWatermarkStore::new(&path);
    assert_eq!(reopened.load_watermarks().await.unwrap(), 1);
    assert_eq!(
        reopened
            .get_watermark(&dim_user_name())
            .await
            .unwrap()
            .unwrap()
            .cdc,
        cdc("2025-01-02T00:00:00Z")
    );
}
