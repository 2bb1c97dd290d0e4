#[cfg(feature = "clamav")]
use crate::clamav::ClamAvScanner;
#[cfg(feature = "storage-local")]
use crate::LocalContentStore;
#[cfg(feature = "storage-s3")]
use crate::S3ContentStore;
use crate::{ContentStore, StorageBackend, StorageError, StorageResult, WriteOptions};
use codegate_core::Config;
use std::sync::Arc;

/// Create a content store based on configuration.
///
/// When ClamAV is enabled the store is wrapped in a `ScanningContentStore`.
pub async fn create_content_store(config: &Config) -> StorageResult<Arc<dyn ContentStore>> {
    let options = WriteOptions {
        unique_paths: config.storage_unique_paths(),
        max_decompressed_bytes: config.max_decompressed_size_bytes(),
    };

    let store: Arc<dyn ContentStore> = match config.storage_backend() {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket()
                .map(String::from)
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config
                .s3_region()
                .map(String::from)
                .or_else(|| config.aws_region().map(String::from))
                .ok_or_else(|| {
                    StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
                })?;
            let endpoint = config.s3_endpoint().map(String::from);

            Arc::new(S3ContentStore::new(bucket, region, endpoint, options).await?)
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => {
            return Err(StorageError::ConfigError(
                "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
            ))
        }

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config.local_storage_base_url().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
            })?;

            Arc::new(LocalContentStore::new(
                base_path,
                config.storage_container(),
                base_url,
                options,
            )?)
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => {
            return Err(StorageError::ConfigError(
                "Local storage backend not available (storage-local feature not enabled)"
                    .to_string(),
            ))
        }
    };

    with_scanner(store, config)
}

#[cfg(feature = "clamav")]
fn with_scanner(
    store: Arc<dyn ContentStore>,
    config: &Config,
) -> StorageResult<Arc<dyn ContentStore>> {
    if !config.clamav_enabled() {
        return Ok(store);
    }
    tracing::info!(
        host = %config.clamav_host(),
        port = config.clamav_port(),
        "ClamAV scanning enabled"
    );
    let scanner = ClamAvScanner::new(
        config.clamav_host().to_string(),
        config.clamav_port(),
        config.clamav_timeout_secs(),
    );
    Ok(Arc::new(crate::ScanningContentStore::new(
        store,
        Arc::new(scanner),
    )))
}

#[cfg(not(feature = "clamav"))]
fn with_scanner(
    store: Arc<dyn ContentStore>,
    config: &Config,
) -> StorageResult<Arc<dyn ContentStore>> {
    if config.clamav_enabled() {
        return Err(StorageError::ConfigError(
            "CLAMAV_ENABLED is set but the clamav feature is not enabled".to_string(),
        ));
    }
    Ok(store)
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use codegate_core::PipelineConfig;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config(Box::new(
            PipelineConfig::from_source(|k| map.get(k).cloned()).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_local_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&[
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", dir.path().to_str().unwrap()),
            ("LOCAL_STORAGE_BASE_URL", "http://localhost:4000"),
        ]);

        let store = create_content_store(&config).await.unwrap();
        assert_eq!(store.backend_type(), StorageBackend::Local);
        store.ensure_container_exists().await.unwrap();
        assert!(dir.path().join("reports").is_dir());
    }

    #[tokio::test]
    async fn test_local_store_requires_path() {
        let mut config = config(&[
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", "/tmp/codegate"),
            ("LOCAL_STORAGE_BASE_URL", "http://localhost:4000"),
        ]);
        config.0.local_storage_path = None;
        let result = create_content_store(&config).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }
}
