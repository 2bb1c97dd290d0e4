#[cfg(feature = "queue-memory")]
use crate::InMemoryQueue;
#[cfg(feature = "queue-sqs")]
use crate::SqsQueue;
use crate::{QueueBackend, QueueError, QueueResult, QueueTransport};
use codegate_core::Config;
use std::sync::Arc;
use std::time::Duration;

/// Create a queue transport based on configuration
pub async fn create_queue(config: &Config) -> QueueResult<Arc<dyn QueueTransport>> {
    let lock_duration = Duration::from_secs(config.queue_lock_duration_secs());
    let receive_wait = Duration::from_secs(config.queue_receive_wait_secs());

    match config.queue_backend() {
        #[cfg(feature = "queue-memory")]
        QueueBackend::Memory => {
            tracing::warn!(
                queue = %config.queue_name(),
                "Using in-memory queue; messages do not survive the process"
            );
            Ok(Arc::new(InMemoryQueue::new(
                config.queue_name(),
                lock_duration,
                receive_wait,
            )))
        }

        #[cfg(not(feature = "queue-memory"))]
        QueueBackend::Memory => Err(QueueError::ConfigError(
            "In-memory queue not available (queue-memory feature not enabled)".to_string(),
        )),

        #[cfg(feature = "queue-sqs")]
        QueueBackend::Sqs => {
            let queue_url = config
                .sqs_queue_url()
                .map(String::from)
                .ok_or_else(|| QueueError::ConfigError("SQS_QUEUE_URL not configured".to_string()))?;
            let dead_letter_queue_url = config
                .sqs_dead_letter_queue_url()
                .map(String::from)
                .ok_or_else(|| {
                    QueueError::ConfigError("SQS_DEAD_LETTER_QUEUE_URL not configured".to_string())
                })?;
            let region = config
                .aws_region()
                .or_else(|| config.s3_region())
                .ok_or_else(|| QueueError::ConfigError("AWS_REGION not configured".to_string()))?;

            let queue = SqsQueue::new(
                region,
                queue_url,
                dead_letter_queue_url,
                lock_duration,
                receive_wait,
            )
            .await?;
            Ok(Arc::new(queue))
        }

        #[cfg(not(feature = "queue-sqs"))]
        QueueBackend::Sqs => Err(QueueError::ConfigError(
            "SQS queue backend not available (queue-sqs feature not enabled)".to_string(),
        )),
    }
}
