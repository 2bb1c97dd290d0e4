//! Malware scan integration.
//!
//! `ScanningContentStore` wraps any [`ContentStore`]. After a successful write it
//! marks the blob `Scanning`, scans the decompressed bytes in a background task and
//! records the verdict as the blob's scan status. Writes never wait for the scan.

use crate::traits::{ContentStore, StorageResult, WriteRequest};
use crate::StorageBackend;
use async_trait::async_trait;
use codegate_core::{ScanStatus, StoredReport};
use std::sync::Arc;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Clean,
    Infected(String),
    Error(String),
}

impl ScanResult {
    pub fn status(&self) -> ScanStatus {
        match self {
            ScanResult::Clean => ScanStatus::Clean,
            ScanResult::Infected(_) => ScanStatus::Infected,
            ScanResult::Error(_) => ScanStatus::Error,
        }
    }
}

/// Scans an in-memory buffer. Failures are reported as [`ScanResult::Error`].
#[async_trait]
pub trait MalwareScanner: Send + Sync {
    async fn scan(&self, data: &[u8]) -> ScanResult;
}

/// Content store decorator that scans every written blob.
#[derive(Clone)]
pub struct ScanningContentStore {
    inner: Arc<dyn ContentStore>,
    scanner: Arc<dyn MalwareScanner>,
    tasks: TaskTracker,
}

impl ScanningContentStore {
    pub fn new(inner: Arc<dyn ContentStore>, scanner: Arc<dyn MalwareScanner>) -> Self {
        Self {
            inner,
            scanner,
            tasks: TaskTracker::new(),
        }
    }

    /// Wait for every scan started so far to record its verdict.
    pub async fn wait_for_scans(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    fn spawn_scan(&self, storage_path: String) {
        let inner = Arc::clone(&self.inner);
        let scanner = Arc::clone(&self.scanner);

        self.tasks.spawn(async move {
            let result = match inner.read(&storage_path).await {
                Ok(data) => scanner.scan(&data).await,
                Err(e) => ScanResult::Error(format!("Failed to read blob for scanning: {}", e)),
            };

            match &result {
                ScanResult::Clean => {
                    tracing::info!(key = %storage_path, "Report scan completed: clean")
                }
                ScanResult::Infected(signature) => {
                    tracing::warn!(key = %storage_path, virus = %signature, "Report scan detected malware")
                }
                ScanResult::Error(error) => {
                    tracing::error!(key = %storage_path, error = %error, "Report scan failed")
                }
            }

            if let Err(e) = inner.set_scan_status(&storage_path, result.status()).await {
                tracing::error!(key = %storage_path, error = %e, "Failed to record scan verdict");
            }
        });
    }
}

#[async_trait]
impl ContentStore for ScanningContentStore {
    async fn ensure_container_exists(&self) -> StorageResult<()> {
        self.inner.ensure_container_exists().await
    }

    async fn write(&self, request: WriteRequest) -> StorageResult<StoredReport> {
        let report = self.inner.write(request).await?;

        match self
            .inner
            .set_scan_status(&report.storage_path, ScanStatus::Scanning)
            .await
        {
            Ok(()) => self.spawn_scan(report.storage_path.clone()),
            Err(e) => {
                // Status stays NotScanned; the processor keeps retrying until it expires.
                tracing::warn!(key = %report.storage_path, error = %e, "Failed to schedule report scan");
            }
        }

        Ok(report)
    }

    async fn scan_status(&self, storage_url: &str) -> StorageResult<ScanStatus> {
        self.inner.scan_status(storage_url).await
    }

    async fn read(&self, storage_path: &str) -> StorageResult<Vec<u8>> {
        self.inner.read(storage_path).await
    }

    async fn set_scan_status(&self, storage_path: &str, status: ScanStatus) -> StorageResult<()> {
        self.inner.set_scan_status(storage_path, status).await
    }

    async fn flush(&self) {
        self.wait_for_scans().await;
        self.inner.flush().await;
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}
