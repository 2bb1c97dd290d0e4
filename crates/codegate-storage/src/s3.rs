use crate::decode::decoder;
use crate::digest::{limit_exceeded, HashingReader};
use crate::keys::{key_from_url, manifest_key, storage_path, validate_key, META_PREFIX};
use crate::manifest::BlobManifest;
use crate::traits::{ContentStore, StorageError, StorageResult, WriteRequest};
use crate::{StorageBackend, WriteOptions};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use codegate_core::{ScanStatus, StoredReport};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutMode, PutOptions, PutPayload,
    Result as ObjectResult,
};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

/// S3 content store
///
/// The container is the bucket. Buckets are provisioned out of band; the store
/// only claims a marker object so `ensure_container_exists` verifies access.
#[derive(Clone)]
pub struct S3ContentStore {
    store: AmazonS3,
    bucket: String,
    base_url: String,
    options: WriteOptions,
}

impl S3ContentStore {
    /// Create a new S3ContentStore instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        options: WriteOptions,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3ContentStore {
            store,
            base_url: object_base_url(&bucket, &region, endpoint_url.as_deref()),
            bucket,
            options,
        })
    }

    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn read_manifest(&self, storage_key: &str) -> StorageResult<BlobManifest> {
        let location = Path::from(manifest_key(storage_key));
        let result: ObjectResult<_> = self.store.get(&location).await;
        let raw = match result {
            Ok(found) => found
                .bytes()
                .await
                .map_err(|e| StorageError::DownloadFailed(e.to_string()))?,
            Err(ObjectStoreError::NotFound { .. }) => {
                return Err(StorageError::NotFound(storage_key.to_string()))
            }
            Err(e) => return Err(StorageError::DownloadFailed(e.to_string())),
        };
        serde_json::from_slice(&raw).map_err(|e| {
            StorageError::BackendError(format!("Corrupt attributes for {}: {}", storage_key, e))
        })
    }

    async fn write_manifest(&self, storage_key: &str, manifest: &BlobManifest) -> StorageResult<()> {
        let body = serde_json::to_vec(manifest)
            .map_err(|e| StorageError::BackendError(format!("Failed to encode attributes: {}", e)))?;
        let location = Path::from(manifest_key(storage_key));
        let result: ObjectResult<_> = self
            .store
            .put(&location, PutPayload::from(Bytes::from(body)))
            .await;
        result.map_err(|e| {
            tracing::error!(error = %e, bucket = %self.bucket, key = %storage_key, "S3 attribute write failed");
            StorageError::UploadFailed(e.to_string())
        })?;
        Ok(())
    }
}

/// Public URL prefix of a bucket.
///
/// AWS uses virtual-hosted style; S3-compatible providers use path style under
/// their endpoint.
fn object_base_url(bucket: &str, region: &str, endpoint_url: Option<&str>) -> String {
    match endpoint_url {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
        None => format!("https://{}.s3.{}.amazonaws.com", bucket, region),
    }
}

fn object_attributes(content_type: &str, manifest: &BlobManifest) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(Attribute::ContentType, content_type.to_string().into());
    for (key, value) in &manifest.metadata {
        attributes.insert(Attribute::Metadata(key.clone().into()), value.clone().into());
    }
    attributes
}

#[async_trait]
impl ContentStore for S3ContentStore {
    async fn ensure_container_exists(&self) -> StorageResult<()> {
        let location = Path::from(format!("{}/container.json", META_PREFIX));
        let opts = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };
        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from_static(b"{}"), opts)
            .await;

        match result {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "S3 container initialised");
                Ok(())
            }
            Err(ObjectStoreError::AlreadyExists { .. }) => Ok(()),
            Err(e) => Err(StorageError::ConfigError(format!(
                "Bucket {} is not usable: {}",
                self.bucket, e
            ))),
        }
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
        validate_key(&key)?;
        let start = std::time::Instant::now();

        // Single put: the decompressed payload is buffered in memory.
        let mut reader = HashingReader::new(
            decoder(request.content_encoding, request.reader),
            self.options.max_decompressed_bytes,
        );
        let mut buffer = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buffer).await {
            return Err(match limit_exceeded(&e) {
                Some(limit) => StorageError::TooLarge { limit },
                None if e.kind() == std::io::ErrorKind::InvalidData
                    || e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    StorageError::Decompression(e.to_string())
                }
                None => StorageError::UploadFailed(format!("Failed to read from stream: {}", e)),
            });
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
        let manifest = BlobManifest::for_report(&report);

        let opts = PutOptions {
            attributes: object_attributes(&report.content_type, &manifest),
            ..Default::default()
        };
        let location = Path::from(report.storage_path.clone());
        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(Bytes::from(buffer)), opts)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %report.storage_path,
                size_bytes = report.length,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        self.write_manifest(&report.storage_path, &manifest).await?;

        tracing::info!(
            bucket = %self.bucket,
            key = %report.storage_path,
            size_bytes = report.length,
            checksum = %report.checksum,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(report)
    }

    async fn scan_status(&self, storage_url: &str) -> StorageResult<ScanStatus> {
        let key = key_from_url(&self.base_url, storage_url)?;
        Ok(self.read_manifest(&key).await?.scan_status)
    }

    async fn read(&self, storage_path: &str) -> StorageResult<Vec<u8>> {
        validate_key(storage_path)?;
        let start = std::time::Instant::now();
        let location = Path::from(storage_path.to_string());

        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(storage_path.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %storage_path,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn set_scan_status(&self, storage_path: &str, status: ScanStatus) -> StorageResult<()> {
        validate_key(storage_path)?;
        let mut manifest = self.read_manifest(storage_path).await?;
        manifest.scan_status = status;
        self.write_manifest(storage_path, &manifest).await
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aws_urls_are_virtual_hosted() {
        assert_eq!(
            object_base_url("reports", "eu-west-1", None),
            "https://reports.s3.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn compatible_urls_are_path_style() {
        let base = object_base_url("reports", "us-east-1", Some("http://localhost:9000/"));
        assert_eq!(base, "http://localhost:9000/reports");
        assert_eq!(
            key_from_url(&base, "http://localhost:9000/reports/acme/api/1_a.json").unwrap(),
            "acme/api/1_a.json"
        );
    }

    #[test]
    fn attributes_carry_content_type_and_metadata() {
        let manifest = BlobManifest {
            content_type: "application/json".to_string(),
            checksum: String::new(),
            length: 0,
            uploaded_at: Utc::now(),
            metadata: [("branch".to_string(), "main".to_string())].into(),
            scan_status: ScanStatus::NotScanned,
        };
        let attributes = object_attributes("application/json", &manifest);
        assert_eq!(attributes.len(), 2);
        assert_eq!(
            attributes.get(&Attribute::ContentType).map(|v| v.as_ref()),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_before_upload() {
        // Nothing listens on the endpoint; the limit must trip before any request.
        let store = S3ContentStore::new(
            "reports".to_string(),
            "us-east-1".to_string(),
            Some("http://127.0.0.1:9".to_string()),
            WriteOptions {
                unique_paths: false,
                max_decompressed_bytes: Some(16),
            },
        )
        .await
        .unwrap();

        let result = store
            .write(WriteRequest {
                organisation: "acme".to_string(),
                project: "api".to_string(),
                file_name: "big.json".to_string(),
                content_type: "application/json".to_string(),
                content_encoding: codegate_core::ContentEncoding::Identity,
                metadata: None,
                reader: Box::pin(std::io::Cursor::new(vec![b'x'; 64])),
            })
            .await;

        assert!(matches!(result, Err(StorageError::TooLarge { limit: 16 })));
    }
}
