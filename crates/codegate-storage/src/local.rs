use crate::decode::decoder;
use crate::digest::{limit_exceeded, HashingReader};
use crate::keys::{key_from_url, manifest_key, storage_path, validate_key};
use crate::manifest::BlobManifest;
use crate::traits::{ContentStore, StorageError, StorageResult, WriteRequest};
use crate::{StorageBackend, WriteOptions};
use async_trait::async_trait;
use chrono::Utc;
use codegate_core::{ScanStatus, StoredReport};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local filesystem content store
///
/// Blobs live under `{base_path}/{container}/{key}`; attribute sidecars live under
/// the reserved `.codegate-meta/` prefix of the same container.
#[derive(Clone)]
pub struct LocalContentStore {
    root: PathBuf,
    base_url: String,
    options: WriteOptions,
}

impl LocalContentStore {
    /// Create a new LocalContentStore instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for report storage (e.g., "/var/lib/codegate")
    /// * `container` - Container directory below the root (e.g., "reports")
    /// * `base_url` - Base URL under which the container is served
    ///
    /// The container directory itself is created by `ensure_container_exists`.
    pub fn new(
        base_path: impl Into<PathBuf>,
        container: &str,
        base_url: String,
        options: WriteOptions,
    ) -> StorageResult<Self> {
        validate_key(container)?;
        if container.contains('/') {
            return Err(StorageError::ConfigError(format!(
                "Container name must be a single path segment: {}",
                container
            )));
        }

        Ok(LocalContentStore {
            root: base_path.into().join(container),
            base_url: format!("{}/{}", base_url.trim_end_matches('/'), container),
            options,
        })
    }

    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;
        Ok(self.root.join(storage_key))
    }

    fn manifest_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;
        Ok(self.root.join(manifest_key(storage_key)))
    }

    /// Generate public URL for a blob
    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn read_manifest(&self, storage_key: &str) -> StorageResult<BlobManifest> {
        let path = self.manifest_path(storage_key)?;
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(storage_key.to_string()))
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to read attributes {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_slice(&raw).map_err(|e| {
            StorageError::BackendError(format!("Corrupt attributes for {}: {}", storage_key, e))
        })
    }

    /// Write the sidecar through a temp file and rename, so readers never see a torn file.
    async fn write_manifest(&self, storage_key: &str, manifest: &BlobManifest) -> StorageResult<()> {
        let path = self.manifest_path(storage_key)?;
        self.ensure_parent_dir(&path).await?;

        let body = serde_json::to_vec(manifest)
            .map_err(|e| StorageError::BackendError(format!("Failed to encode attributes: {}", e)))?;
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, body).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write attributes {}: {}", tmp.display(), e))
        })?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to commit attributes {}: {}",
                path.display(),
                e
            )));
        }
        Ok(())
    }

    async fn discard_partial(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial blob");
        }
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn ensure_container_exists(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create container directory {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    #[tracing::instrument(skip(self, request), fields(organisation = %request.organisation, project = %request.project, file_name = %request.file_name))]
    async fn write(&self, request: WriteRequest) -> StorageResult<StoredReport> {
        let uploaded_at = Utc::now();
        let unique = self.options.unique_paths.then(Uuid::new_v4);
        let key = storage_path(
            &request.organisation,
            &request.project,
            uploaded_at,
            &request.file_name,
            unique,
        );
        let path = self.key_to_path(&key)?;
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        let mut reader = HashingReader::new(
            decoder(request.content_encoding, request.reader),
            self.options.max_decompressed_bytes,
        );

        if let Err(e) = tokio::io::copy(&mut reader, &mut file).await {
            drop(file);
            self.discard_partial(&path).await;
            return Err(match limit_exceeded(&e) {
                Some(limit) => StorageError::TooLarge { limit },
                None if e.kind() == std::io::ErrorKind::InvalidData
                    || e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    StorageError::Decompression(e.to_string())
                }
                None => StorageError::UploadFailed(format!(
                    "Failed to write stream to file {}: {}",
                    path.display(),
                    e
                )),
            });
        }

        let synced = match file.flush().await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        drop(file);
        if let Err(e) = synced {
            self.discard_partial(&path).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to sync file {}: {}",
                path.display(),
                e
            )));
        }

        let digest = reader.finish();
        let report = StoredReport {
            organisation: request.organisation,
            project: request.project,
            file_name: request.file_name,
            storage_url: self.generate_url(&key),
            storage_path: key,
            content_type: request.content_type,
            length: digest.length,
            checksum: digest.checksum,
            uploaded_at,
            metadata: request.metadata,
        };

        // A blob is only kept together with its manifest.
        if let Err(e) = self
            .write_manifest(&report.storage_path, &BlobManifest::for_report(&report))
            .await
        {
            self.discard_partial(&path).await;
            return Err(e);
        }

        tracing::info!(
            path = %path.display(),
            key = %report.storage_path,
            size_bytes = report.length,
            checksum = %report.checksum,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(report)
    }

    async fn scan_status(&self, storage_url: &str) -> StorageResult<ScanStatus> {
        let key = key_from_url(&self.base_url, storage_url)?;
        Ok(self.read_manifest(&key).await?.scan_status)
    }

    async fn read(&self, storage_path: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(storage_path)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_path.to_string()))
            }
            Err(e) => Err(StorageError::DownloadFailed(format!(
                "Failed to read file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn set_scan_status(&self, storage_path: &str, status: ScanStatus) -> StorageResult<()> {
        let mut manifest = self.read_manifest(storage_path).await?;
        manifest.scan_status = status;
        self.write_manifest(storage_path, &manifest).await?;
        tracing::debug!(key = %storage_path, scan_status = %status, "Scan status recorded");
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
