//! Upload submission: validate, store, enqueue.
//!
//! Submission is not transactional. When the enqueue fails after a successful write,
//! the stored blob is left orphaned; its path is logged and the error is surfaced to
//! the uploader. Nothing is deleted and the enqueue is not retried.

use std::sync::Arc;

use codegate_core::constants::{ATTEMPT_COUNT_PROPERTY, MESSAGE_CONTENT_TYPE};
use codegate_core::{AppError, Config, ErrorMetadata, LogLevel, StoredReport};
use codegate_queue::{MessageProperties, QueueTransport};
use codegate_storage::{ContentStore, StorageError, WriteRequest};

use crate::request::UploadRequest;
use crate::validator::UploadValidator;

/// First processing attempt carried by a freshly enqueued message.
const INITIAL_ATTEMPT: u32 = 1;

#[derive(Clone)]
pub struct UploadSubmitter {
    store: Arc<dyn ContentStore>,
    queue: Arc<dyn QueueTransport>,
    validator: UploadValidator,
}

impl UploadSubmitter {
    pub fn new(
        store: Arc<dyn ContentStore>,
        queue: Arc<dyn QueueTransport>,
        validator: UploadValidator,
    ) -> Self {
        Self {
            store,
            queue,
            validator,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn ContentStore>,
        queue: Arc<dyn QueueTransport>,
    ) -> Self {
        let validator = UploadValidator::new(
            config.max_upload_size_bytes(),
            config.allowed_content_types().to_vec(),
        );
        Self::new(store, queue, validator)
    }

    /// Validate, store and enqueue one report.
    #[tracing::instrument(skip(self, request), fields(
        organisation = %request.organisation,
        project = %request.project,
        file_name = %request.file_name,
        content_length = request.content_length,
    ))]
    pub async fn submit(&self, request: UploadRequest) -> Result<StoredReport, AppError> {
        let result = self.store_and_enqueue(request).await;
        if let Err(ref e) = result {
            log_failure(e);
        }
        result
    }

    async fn store_and_enqueue(&self, request: UploadRequest) -> Result<StoredReport, AppError> {
        self.validator.validate_all(
            &request.organisation,
            &request.project,
            &request.file_name,
            &request.content_type,
            request.content_length,
        )?;

        self.store
            .ensure_container_exists()
            .await
            .map_err(storage_error)?;

        let report = self
            .store
            .write(WriteRequest {
                organisation: request.organisation,
                project: request.project,
                file_name: request.file_name,
                content_type: request.content_type,
                content_encoding: request.content_encoding,
                metadata: request.metadata,
                reader: request.body,
            })
            .await
            .map_err(storage_error)?;

        let body = report.to_message_body()?;
        let properties = MessageProperties::new(MESSAGE_CONTENT_TYPE)
            .with(ATTEMPT_COUNT_PROPERTY, INITIAL_ATTEMPT);

        match self.queue.send(body.into_bytes(), properties).await {
            Ok(message_id) => {
                tracing::info!(
                    storage_path = %report.storage_path,
                    checksum = %report.checksum,
                    size_bytes = report.length,
                    message_id = %message_id,
                    "Report stored and queued for processing"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    orphaned_storage_path = %report.storage_path,
                    "Report stored but enqueue failed; blob is orphaned"
                );
                Err(AppError::Queue(format!(
                    "Failed to enqueue report {}: {}",
                    report.storage_path, e
                )))
            }
        }
    }
}

fn storage_error(err: StorageError) -> AppError {
    match err {
        // Compression problems are in the uploaded bytes, not the infrastructure.
        StorageError::Decompression(_) => AppError::InvalidInput(err.to_string()),
        StorageError::TooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
        StorageError::InvalidKey(_) => AppError::InvalidInput(err.to_string()),
        other => AppError::Storage(other.to_string()),
    }
}

fn log_failure(err: &AppError) {
    let code = err.error_code();
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(code, error = %err, "Upload rejected"),
        LogLevel::Warn => tracing::warn!(code, error = %err, "Upload failed"),
        LogLevel::Error => tracing::error!(code, error = %err.with_causes(), "Upload failed"),
    }
}
