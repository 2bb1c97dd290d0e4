//! Shared key generation for storage backends.
//!
//! Blob key format: `{organisation}/{project}/{timestamp}_{fileName}`, with the
//! timestamp in UTC at second resolution. The key is deterministic, so two uploads
//! of the same file name within one second collide unless unique paths are enabled,
//! in which case a UUID is inserted after the timestamp.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{StorageError, StorageResult};

/// Prefix holding out-of-band blob attributes (sidecars), outside every report key.
pub(crate) const META_PREFIX: &str = ".codegate-meta";

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Generate the storage path for a report.
pub fn storage_path(
    organisation: &str,
    project: &str,
    uploaded_at: DateTime<Utc>,
    file_name: &str,
    unique: Option<Uuid>,
) -> String {
    let timestamp = uploaded_at.format(TIMESTAMP_FORMAT);
    match unique {
        Some(id) => format!("{}/{}/{}_{}_{}", organisation, project, timestamp, id, file_name),
        None => format!("{}/{}/{}_{}", organisation, project, timestamp, file_name),
    }
}

/// Key of the attribute sidecar for a blob.
pub(crate) fn manifest_key(storage_path: &str) -> String {
    format!("{}/{}.json", META_PREFIX, storage_path)
}

/// Keys must not escape the container or address the sidecar area.
pub(crate) fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty()
        || storage_key.contains("..")
        || storage_key.starts_with('/')
        || storage_key.contains('\\')
        || storage_key.starts_with(META_PREFIX)
    {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            storage_key
        )));
    }
    Ok(())
}

/// Resolve a blob URL back to its key, given the store's URL prefix.
pub(crate) fn key_from_url(base_url: &str, storage_url: &str) -> StorageResult<String> {
    let prefix = format!("{}/", base_url.trim_end_matches('/'));
    let key = storage_url.strip_prefix(&prefix).ok_or_else(|| {
        StorageError::InvalidKey(format!("URL does not belong to this store: {}", storage_url))
    })?;
    validate_key(key)?;
    Ok(key.to_string())
}
