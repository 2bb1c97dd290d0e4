use codegate_core::ContentEncoding;
use std::collections::BTreeMap;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// A report upload as received at the boundary. Lives for one `submit` call.
pub struct UploadRequest {
    pub organisation: String,
    pub project: String,
    pub file_name: String,
    /// Declared media type; parameters such as `charset` are ignored when validating.
    pub content_type: String,
    /// Declared byte length of the stream as transmitted (possibly compressed).
    pub content_length: u64,
    pub content_encoding: ContentEncoding,
    pub metadata: Option<BTreeMap<String, String>>,
    pub body: Pin<Box<dyn AsyncRead + Send + Unpin>>,
}

impl UploadRequest {
    pub fn new(
        organisation: impl Into<String>,
        project: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        content_length: u64,
        body: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> Self {
        Self {
            organisation: organisation.into(),
            project: project.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            content_length,
            content_encoding: ContentEncoding::Identity,
            metadata: None,
            body,
        }
    }

    pub fn with_encoding(mut self, encoding: ContentEncoding) -> Self {
        self.content_encoding = encoding;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("organisation", &self.organisation)
            .field("project", &self.project)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("content_encoding", &self.content_encoding)
            .finish_non_exhaustive()
    }
}
