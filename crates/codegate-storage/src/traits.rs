//! Content store abstraction trait
//!
//! This module defines the ContentStore trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use codegate_core::{ContentEncoding, ScanStatus, StoredReport};
use std::collections::BTreeMap;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Decompressed content exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Per-store write behaviour shared by all backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Insert a UUID into every key so same-second uploads never collide.
    pub unique_paths: bool,
    /// Abort writes whose decompressed size exceeds this many bytes.
    pub max_decompressed_bytes: Option<u64>,
}

/// A report stream to persist.
pub struct WriteRequest {
    pub organisation: String,
    pub project: String,
    pub file_name: String,
    pub content_type: String,
    /// Compression applied to `reader`; the store persists decompressed bytes.
    pub content_encoding: ContentEncoding,
    pub metadata: Option<BTreeMap<String, String>>,
    pub reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
}

impl std::fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteRequest")
            .field("organisation", &self.organisation)
            .field("project", &self.project)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("content_encoding", &self.content_encoding)
            .finish_non_exhaustive()
    }
}

/// Content store abstraction
///
/// A store persists decompressed report bytes under
/// `{organisation}/{project}/{timestamp}_{fileName}`, records the SHA-256 of the
/// decompressed content, and keeps content type, custom metadata and scan status
/// as out-of-band attributes of the blob.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Create the container if it does not exist. Safe to call concurrently.
    async fn ensure_container_exists(&self) -> StorageResult<()>;

    /// Decompress, hash and persist a report stream.
    async fn write(&self, request: WriteRequest) -> StorageResult<StoredReport>;

    /// Scan status of the blob behind `storage_url`. No side effects.
    async fn scan_status(&self, storage_url: &str) -> StorageResult<ScanStatus>;

    /// Read back the decompressed bytes of a stored blob.
    async fn read(&self, storage_path: &str) -> StorageResult<Vec<u8>>;

    /// Record a scan verdict for a stored blob (used by the scan integration).
    async fn set_scan_status(&self, storage_path: &str, status: ScanStatus) -> StorageResult<()>;

    /// Wait for background work started by earlier writes, such as malware scans.
    async fn flush(&self) {}

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
