//! Queue transport abstraction trait

use crate::message::{Delivery, LockToken, MessageProperties};
use crate::{QueueBackend, QueueResult};
use async_trait::async_trait;
use std::time::Duration;

/// Durable at-least-once message channel with explicit settlement.
///
/// Every delivery must be settled once through `ack`, `abandon` or `dead_letter`.
/// A delivery that is never settled becomes visible again when its lock expires.
/// Settlement takes the whole delivery because some transports republish the body;
/// lock renewal only needs the token.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Publish a message. Returns the transport-assigned message id.
    async fn send(&self, body: Vec<u8>, properties: MessageProperties) -> QueueResult<String>;

    /// Wait up to the transport's receive window for the next message.
    ///
    /// Returns `None` when nothing became available. Dropping the future is a safe way
    /// to cancel the wait.
    async fn receive(&self) -> QueueResult<Option<Delivery>>;

    /// Settle successfully; the message is removed.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Release the message for redelivery with updated properties, visible again
    /// after `delay`.
    async fn abandon(
        &self,
        delivery: &Delivery,
        properties: MessageProperties,
        delay: Duration,
    ) -> QueueResult<()>;

    /// Move the message to the dead-letter sink.
    async fn dead_letter(
        &self,
        delivery: &Delivery,
        reason_code: &str,
        reason_detail: &str,
    ) -> QueueResult<()>;

    /// Extend the lock of an in-flight message by one lock duration.
    async fn renew_lock(&self, token: &LockToken) -> QueueResult<()>;

    fn backend_type(&self) -> QueueBackend;
}
