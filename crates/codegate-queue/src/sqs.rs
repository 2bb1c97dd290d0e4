//! Amazon SQS queue transport.
//!
//! SQS has no native abandon-with-properties or dead-letter-with-reason, so both are
//! expressed as publish-then-delete: the new copy is sent first and the received copy
//! is deleted afterwards. A crash in between yields a duplicate, never a loss.
//!
//! Message attributes map to [`MessageProperties`]; integer values are sent with the
//! `Number` data type and the content type travels as the `ContentType` attribute.

use crate::message::{Delivery, LockToken, MessageProperties};
use crate::transport::QueueTransport;
use crate::{QueueBackend, QueueError, QueueResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::Client as SqsClient;
use std::collections::HashMap;
use std::time::Duration;

/// Longest delay SQS accepts on a single message.
pub const MAX_DELAY_SECS: u64 = 900;

const CONTENT_TYPE_ATTRIBUTE: &str = "ContentType";
const DEAD_LETTER_REASON_ATTRIBUTE: &str = "DeadLetterReason";
const DEAD_LETTER_DESCRIPTION_ATTRIBUTE: &str = "DeadLetterErrorDescription";

#[derive(Clone)]
pub struct SqsQueue {
    client: SqsClient,
    queue_url: String,
    dead_letter_queue_url: String,
    lock_duration: Duration,
    receive_wait: Duration,
}

impl SqsQueue {
    /// Create an SQS transport for the given region
    ///
    /// # Arguments
    /// * `queue_url` - URL of the processing queue
    /// * `dead_letter_queue_url` - URL of the queue receiving dead-lettered messages
    /// * `lock_duration` - Visibility timeout applied on receive and on renewal
    /// * `receive_wait` - Long-poll wait (SQS caps it at 20 seconds)
    pub async fn new(
        region: &str,
        queue_url: String,
        dead_letter_queue_url: String,
        lock_duration: Duration,
        receive_wait: Duration,
    ) -> QueueResult<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Ok(SqsQueue {
            client: SqsClient::new(&config),
            queue_url,
            dead_letter_queue_url,
            lock_duration,
            receive_wait: receive_wait.min(Duration::from_secs(20)),
        })
    }

    async fn publish(
        &self,
        queue_url: &str,
        body: Vec<u8>,
        attributes: HashMap<String, MessageAttributeValue>,
        delay: Duration,
    ) -> QueueResult<String> {
        let body = String::from_utf8(body)
            .map_err(|e| QueueError::InvalidMessage(format!("Body is not UTF-8: {}", e)))?;

        let output = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .set_message_attributes(Some(attributes))
            .delay_seconds(delay.as_secs().min(MAX_DELAY_SECS) as i32)
            .send()
            .await
            .map_err(|e| QueueError::SendFailed(e.to_string()))?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }

    async fn delete(&self, token: &LockToken) -> QueueResult<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&token.0)
            .send()
            .await
            .map_err(|e| QueueError::SettleFailed(e.to_string()))?;
        Ok(())
    }
}

fn attribute(value: &str) -> QueueResult<MessageAttributeValue> {
    // Integers travel as Number so they stay filterable on the SQS side.
    let data_type = if value.parse::<i64>().is_ok() {
        "Number"
    } else {
        "String"
    };
    MessageAttributeValue::builder()
        .data_type(data_type)
        .string_value(value)
        .build()
        .map_err(|e| QueueError::InvalidMessage(e.to_string()))
}

fn to_attributes(
    properties: &MessageProperties,
) -> QueueResult<HashMap<String, MessageAttributeValue>> {
    let mut attributes = HashMap::new();
    if let Some(ref content_type) = properties.content_type {
        attributes.insert(CONTENT_TYPE_ATTRIBUTE.to_string(), attribute(content_type)?);
    }
    for (key, value) in &properties.application {
        attributes.insert(key.clone(), attribute(value)?);
    }
    Ok(attributes)
}

fn from_attributes(attributes: Option<&HashMap<String, MessageAttributeValue>>) -> MessageProperties {
    let mut properties = MessageProperties::default();
    for (key, value) in attributes.into_iter().flatten() {
        let Some(text) = value.string_value() else {
            continue;
        };
        if key == CONTENT_TYPE_ATTRIBUTE {
            properties.content_type = Some(text.to_string());
        } else {
            properties.set(key.clone(), text);
        }
    }
    properties
}

#[async_trait]
impl QueueTransport for SqsQueue {
    async fn send(&self, body: Vec<u8>, properties: MessageProperties) -> QueueResult<String> {
        let attributes = to_attributes(&properties)?;
        let message_id = self
            .publish(&self.queue_url, body, attributes, Duration::ZERO)
            .await?;
        tracing::debug!(queue_url = %self.queue_url, message_id = %message_id, "SQS message sent");
        Ok(message_id)
    }

    async fn receive(&self) -> QueueResult<Option<Delivery>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(self.receive_wait.as_secs() as i32)
            .visibility_timeout(self.lock_duration.as_secs() as i32)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| QueueError::ReceiveFailed(e.to_string()))?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };

        let receipt_handle = message.receipt_handle().ok_or_else(|| {
            QueueError::InvalidMessage("SQS message without receipt handle".to_string())
        })?;

        Ok(Some(Delivery {
            message_id: message.message_id().unwrap_or_default().to_string(),
            body: message.body().unwrap_or_default().as_bytes().to_vec(),
            properties: from_attributes(message.message_attributes()),
            lock_token: LockToken(receipt_handle.to_string()),
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.delete(&delivery.lock_token).await
    }

    async fn abandon(
        &self,
        delivery: &Delivery,
        properties: MessageProperties,
        delay: Duration,
    ) -> QueueResult<()> {
        let attributes = to_attributes(&properties)?;
        let message_id = self
            .publish(&self.queue_url, delivery.body.clone(), attributes, delay)
            .await
            .map_err(|e| QueueError::SettleFailed(e.to_string()))?;
        self.delete(&delivery.lock_token).await?;

        tracing::debug!(
            previous_message_id = %delivery.message_id,
            message_id = %message_id,
            delay_secs = delay.as_secs().min(MAX_DELAY_SECS),
            "SQS message republished for retry"
        );
        Ok(())
    }

    async fn dead_letter(
        &self,
        delivery: &Delivery,
        reason_code: &str,
        reason_detail: &str,
    ) -> QueueResult<()> {
        let mut attributes = to_attributes(&delivery.properties)?;
        attributes.insert(
            DEAD_LETTER_REASON_ATTRIBUTE.to_string(),
            attribute(reason_code)?,
        );
        if !reason_detail.is_empty() {
            attributes.insert(
                DEAD_LETTER_DESCRIPTION_ATTRIBUTE.to_string(),
                attribute(reason_detail)?,
            );
        }

        self.publish(
            &self.dead_letter_queue_url,
            delivery.body.clone(),
            attributes,
            Duration::ZERO,
        )
        .await
        .map_err(|e| QueueError::SettleFailed(e.to_string()))?;
        self.delete(&delivery.lock_token).await
    }

    async fn renew_lock(&self, token: &LockToken) -> QueueResult<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(&token.0)
            .visibility_timeout(self.lock_duration.as_secs() as i32)
            .send()
            .await
            .map_err(|e| QueueError::SettleFailed(e.to_string()))?;
        Ok(())
    }

    fn backend_type(&self) -> QueueBackend {
        QueueBackend::Sqs
    }
}
