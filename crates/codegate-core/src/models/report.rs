use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata of a report persisted in the content store.
///
/// Written once by the content store and immutable afterwards. Serialized as the
/// JSON body of every processing message.
///
/// `length` and `checksum` describe the **decompressed** content. They are not
/// comparable with the declared upload length, which counts the bytes as they
/// were transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub organisation: String,
    pub project: String,
    pub file_name: String,
    pub storage_url: String,
    pub storage_path: String,
    pub content_type: String,
    pub length: u64,
    /// Lowercase hex SHA-256 over the decompressed bytes
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl StoredReport {
    /// Serialize to the queue message body.
    pub fn to_message_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a queue message body.
    pub fn from_message_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}
