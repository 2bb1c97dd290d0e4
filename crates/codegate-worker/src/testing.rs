//! Test doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use codegate_core::{ScanStatus, StoredReport};
use codegate_storage::{ContentStore, StorageBackend, StorageError, StorageResult, WriteRequest};

pub fn report() -> StoredReport {
    StoredReport {
        organisation: "acme".to_string(),
        project: "api".to_string(),
        file_name: "lint.json".to_string(),
        storage_url: "http://localhost:4000/reports/acme/api/20240101000000_lint.json"
            .to_string(),
        storage_path: "acme/api/20240101000000_lint.json".to_string(),
        content_type: "application/json".to_string(),
        length: 12,
        checksum: "00".repeat(32),
        uploaded_at: Utc::now(),
        metadata: None,
    }
}

/// Store whose only behaviour is reporting a configurable scan status.
pub struct FixedStatusStore {
    status: Mutex<ScanStatus>,
    reads: AtomicUsize,
    fail: AtomicBool,
}

impl FixedStatusStore {
    pub fn new(status: ScanStatus) -> Self {
        Self {
            status: Mutex::new(status),
            reads: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_lookups(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for FixedStatusStore {
    async fn ensure_container_exists(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn write(&self, _request: WriteRequest) -> StorageResult<StoredReport> {
        Err(StorageError::BackendError("read-only test store".to_string()))
    }

    async fn scan_status(&self, _storage_url: &str) -> StorageResult<ScanStatus> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::BackendError("connection reset".to_string()));
        }
        Ok(*self.status.lock().unwrap())
    }

    async fn read(&self, storage_path: &str) -> StorageResult<Vec<u8>> {
        Err(StorageError::NotFound(storage_path.to_string()))
    }

    async fn set_scan_status(&self, _storage_path: &str, status: ScanStatus) -> StorageResult<()> {
        *self.status.lock().unwrap() = status;
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
