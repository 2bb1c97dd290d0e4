use async_compression::tokio::write::BrotliEncoder;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use codegate_core::constants::{
    ATTEMPT_COUNT_PROPERTY, DEFAULT_ALLOWED_CONTENT_TYPES, MAX_UPLOAD_SIZE_BYTES,
    MESSAGE_CONTENT_TYPE,
};
use codegate_core::{AppError, ContentEncoding, QueueBackend, ScanStatus, StoredReport};
use codegate_ingest::{UploadRequest, UploadSubmitter, UploadValidator};
use codegate_queue::{
    Delivery, InMemoryQueue, LockToken, MessageProperties, QueueError, QueueResult,
    QueueTransport,
};
use codegate_storage::{ContentStore, LocalContentStore, WriteOptions};

struct Fixture {
    _dir: tempfile::TempDir,
    root: std::path::PathBuf,
    store: Arc<LocalContentStore>,
    queue: Arc<InMemoryQueue>,
    submitter: UploadSubmitter,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let store = Arc::new(
        LocalContentStore::new(
            &root,
            "reports",
            "http://localhost:4000".to_string(),
            WriteOptions::default(),
        )
        .unwrap(),
    );
    let queue = Arc::new(InMemoryQueue::new(
        "report-processing",
        Duration::from_secs(60),
        Duration::from_millis(10),
    ));
    let submitter = UploadSubmitter::new(store.clone(), queue.clone(), validator());
    Fixture {
        _dir: dir,
        root,
        store,
        queue,
        submitter,
    }
}

fn validator() -> UploadValidator {
    UploadValidator::new(
        MAX_UPLOAD_SIZE_BYTES,
        DEFAULT_ALLOWED_CONTENT_TYPES
            .iter()
            .map(|s| s.to_string())
            .collect(),
    )
}

fn upload(file_name: &str, content_type: &str, body: Vec<u8>) -> UploadRequest {
    let length = body.len() as u64;
    UploadRequest::new(
        "acme",
        "api",
        file_name,
        content_type,
        length,
        Box::pin(std::io::Cursor::new(body)),
    )
}

fn json_report(size: usize) -> Vec<u8> {
    let mut body = br#"{"findings":["#.to_vec();
    while body.len() < size - 2 {
        body.extend_from_slice(br#"{"rule":"no-eval","line":1},"#);
    }
    body.truncate(size - 2);
    body.extend_from_slice(b"]}");
    body
}

#[tokio::test]
async fn json_upload_is_stored_and_queued_once() {
    let f = fixture();
    let body = json_report(10 * 1024);

    let report = f
        .submitter
        .submit(upload("lint.json", "application/json", body.clone()))
        .await
        .unwrap();

    assert_eq!(report.length, 10 * 1024);
    assert_eq!(report.checksum, hex::encode(Sha256::digest(&body)));
    assert_eq!(f.store.read(&report.storage_path).await.unwrap(), body);
    assert_eq!(
        f.store.scan_status(&report.storage_url).await.unwrap(),
        ScanStatus::NotScanned
    );

    let delivery = f.queue.receive().await.unwrap().unwrap();
    assert_eq!(delivery.properties.get_u32(ATTEMPT_COUNT_PROPERTY), Some(1));
    assert_eq!(
        delivery.properties.content_type.as_deref(),
        Some(MESSAGE_CONTENT_TYPE)
    );
    let queued = StoredReport::from_message_body(std::str::from_utf8(&delivery.body).unwrap())
        .unwrap();
    assert_eq!(queued, report);
    assert!(f.queue.receive().await.unwrap().is_none());
}

#[tokio::test]
async fn brotli_upload_is_stored_decompressed() {
    let f = fixture();
    let body = json_report(64 * 1024);
    let mut encoder = BrotliEncoder::new(Vec::new());
    encoder.write_all(&body).await.unwrap();
    encoder.shutdown().await.unwrap();
    let wire = encoder.into_inner();
    assert!(wire.len() < body.len());

    let request = upload("lint.json", "application/json", wire).with_encoding(ContentEncoding::Brotli);
    let report = f.submitter.submit(request).await.unwrap();

    assert_eq!(report.length, body.len() as u64);
    assert_eq!(report.checksum, hex::encode(Sha256::digest(&body)));
    assert_eq!(f.store.read(&report.storage_path).await.unwrap(), body);
}

#[tokio::test]
async fn oversized_upload_has_no_side_effects() {
    let f = fixture();
    let mut request = upload("huge.pdf", "application/pdf", b"%PDF".to_vec());
    request.content_length = MAX_UPLOAD_SIZE_BYTES + 1;

    let err = f.submitter.submit(request).await.unwrap_err();
    assert!(matches!(err, AppError::PayloadTooLarge(_)));

    assert!(!f.root.join("reports").exists());
    assert_eq!(f.queue.pending_count().await, 0);
}

#[tokio::test]
async fn disallowed_content_type_has_no_side_effects() {
    let f = fixture();
    for content_type in ["image/png", "application/octet-stream", "text/html"] {
        let err = f
            .submitter
            .submit(upload("shot.png", content_type, vec![0x89, b'P', b'N', b'G']))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedContentType(_)));
        assert!(err.is_validation());
    }

    assert!(!f.root.join("reports").exists());
    assert_eq!(f.queue.pending_count().await, 0);
}

#[tokio::test]
async fn content_type_check_is_case_insensitive() {
    let f = fixture();
    f.submitter
        .submit(upload("results.csv", "TEXT/CSV; charset=UTF-8", b"a,b\n1,2\n".to_vec()))
        .await
        .unwrap();
    assert_eq!(f.queue.pending_count().await, 1);
}

#[tokio::test]
async fn traversal_in_names_is_rejected() {
    let f = fixture();
    let request = UploadRequest::new(
        "acme",
        "../other-tenant",
        "lint.json",
        "application/json",
        2,
        Box::pin(std::io::Cursor::new(b"{}".to_vec())),
    );

    let err = f.submitter.submit(request).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(f.queue.pending_count().await, 0);
}

#[tokio::test]
async fn corrupt_compressed_stream_is_invalid_input() {
    let f = fixture();
    let request = upload("lint.json", "application/json", b"definitely not gzip".to_vec())
        .with_encoding(ContentEncoding::Gzip);

    let err = f.submitter.submit(request).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(f.queue.pending_count().await, 0);
}

/// Transport whose sends always fail.
struct UnavailableQueue;

#[async_trait]
impl QueueTransport for UnavailableQueue {
    async fn send(&self, _body: Vec<u8>, _properties: MessageProperties) -> QueueResult<String> {
        Err(QueueError::SendFailed("broker unreachable".to_string()))
    }

    async fn receive(&self) -> QueueResult<Option<Delivery>> {
        Ok(None)
    }

    async fn ack(&self, _delivery: &Delivery) -> QueueResult<()> {
        Ok(())
    }

    async fn abandon(
        &self,
        _delivery: &Delivery,
        _properties: MessageProperties,
        _delay: Duration,
    ) -> QueueResult<()> {
        Ok(())
    }

    async fn dead_letter(
        &self,
        _delivery: &Delivery,
        _reason_code: &str,
        _reason_detail: &str,
    ) -> QueueResult<()> {
        Ok(())
    }

    async fn renew_lock(&self, _token: &LockToken) -> QueueResult<()> {
        Ok(())
    }

    fn backend_type(&self) -> QueueBackend {
        QueueBackend::Memory
    }
}

#[tokio::test]
async fn enqueue_failure_leaves_blob_and_reports_queue_error() {
    let f = fixture();
    let submitter = UploadSubmitter::new(f.store.clone(), Arc::new(UnavailableQueue), validator());

    let err = submitter
        .submit(upload("lint.json", "application/json", b"{\"ok\":true}".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Queue(ref msg) if msg.contains("acme/api/")));

    // The orphaned blob stays in the container.
    let project_dir = f.root.join("reports/acme/api");
    let mut entries = tokio::fs::read_dir(&project_dir).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_some());
}
