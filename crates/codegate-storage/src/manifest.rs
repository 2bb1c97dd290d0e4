//! Out-of-band blob attributes, stored as a JSON sidecar next to each blob.

use chrono::{DateTime, Utc};
use codegate_core::{ScanStatus, StoredReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobManifest {
    pub content_type: String,
    pub checksum: String,
    pub length: u64,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub scan_status: ScanStatus,
}

impl BlobManifest {
    pub fn for_report(report: &StoredReport) -> Self {
        Self {
            content_type: report.content_type.clone(),
            checksum: report.checksum.clone(),
            length: report.length,
            uploaded_at: report.uploaded_at,
            metadata: report.metadata.clone().unwrap_or_default(),
            scan_status: ScanStatus::NotScanned,
        }
    }
}
