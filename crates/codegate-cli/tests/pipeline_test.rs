//! Submit-then-process through the environment-configured components.

use std::collections::HashMap;
use std::time::Duration;

use codegate_cli::{open_upload, Pipeline, UploadOptions};
use codegate_core::constants::ATTEMPT_COUNT_PROPERTY;
use codegate_core::{Config, PipelineConfig, QueueBackend, ScanStatus, StorageBackend};
use codegate_queue::QueueTransport;
use codegate_storage::ContentStore;
use codegate_worker::Settlement;

async fn pipeline(root: &std::path::Path, extra: &[(&str, &str)]) -> Pipeline {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("STORAGE_BACKEND".to_string(), "local".to_string()),
        (
            "LOCAL_STORAGE_PATH".to_string(),
            root.join("store").to_string_lossy().into_owned(),
        ),
        (
            "LOCAL_STORAGE_BASE_URL".to_string(),
            "http://localhost:4000".to_string(),
        ),
        ("QUEUE_RECEIVE_WAIT_SECS".to_string(), "1".to_string()),
    ]);
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }

    let config = PipelineConfig::from_source(|key| vars.get(key).cloned()).unwrap();
    Pipeline::from_config(Config(Box::new(config))).await.unwrap()
}

async fn submit_file(pipeline: &Pipeline, dir: &std::path::Path, name: &str, body: &[u8]) {
    let path = dir.join(name);
    tokio::fs::write(&path, body).await.unwrap();
    let options = UploadOptions {
        organisation: "acme".to_string(),
        project: "api".to_string(),
        ..Default::default()
    };
    let request = open_upload(&path, &options).await.unwrap();
    pipeline.submitter().submit(request).await.unwrap();
}

#[tokio::test]
async fn defaults_wire_local_store_and_memory_queue() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), &[]).await;

    assert_eq!(pipeline.store().backend_type(), StorageBackend::Local);
    assert_eq!(pipeline.queue().backend_type(), QueueBackend::Memory);
}

#[tokio::test]
async fn report_is_accepted_when_scan_check_is_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), &[("SCAN_CHECK_ENABLED", "false")]).await;
    submit_file(&pipeline, dir.path(), "lint.json", br#"{"findings":[]}"#).await;

    let delivery = pipeline.queue().receive().await.unwrap().unwrap();
    let settlement = pipeline.processor().handle(&delivery).await;

    assert_eq!(settlement, Settlement::Acked);
    assert!(pipeline.queue().receive().await.unwrap().is_none());
}

#[tokio::test]
async fn unscanned_report_is_retried_with_incremented_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), &[]).await;
    submit_file(&pipeline, dir.path(), "lint.json", br#"{"findings":[]}"#).await;

    let delivery = pipeline.queue().receive().await.unwrap().unwrap();
    let settlement = pipeline.processor().handle(&delivery).await;
    assert_eq!(
        settlement,
        Settlement::Abandoned {
            attempt: 2,
            backoff: Duration::from_secs(4),
        }
    );

    // Blocking mode releases the message at once; the slot is what waits.
    let redelivered = pipeline.queue().receive().await.unwrap().unwrap();
    assert_eq!(
        redelivered.properties.get_u32(ATTEMPT_COUNT_PROPERTY),
        Some(2)
    );
    assert_eq!(redelivered.body, delivery.body);
}

#[tokio::test]
async fn recorded_clean_verdict_lets_report_through() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), &[]).await;
    submit_file(&pipeline, dir.path(), "results.csv", b"rule,line\nno-eval,1\n").await;

    let delivery = pipeline.queue().receive().await.unwrap().unwrap();
    let report =
        codegate_core::StoredReport::from_message_body(std::str::from_utf8(&delivery.body).unwrap())
            .unwrap();
    pipeline
        .store()
        .set_scan_status(&report.storage_path, ScanStatus::Clean)
        .await
        .unwrap();

    assert_eq!(
        pipeline.store().scan_status(&report.storage_url).await.unwrap(),
        ScanStatus::Clean
    );
    assert_eq!(
        pipeline.processor().handle(&delivery).await,
        Settlement::Acked
    );
}
