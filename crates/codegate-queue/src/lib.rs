//! Codegate queue transport
//!
//! At-least-once delivery of report processing messages. A received message is
//! locked to its consumer until it is settled exactly once: acknowledged, abandoned
//! for redelivery (optionally delayed) or moved to the dead-letter sink. Locks expire
//! unless renewed, after which the message is redelivered.

pub mod error;
pub mod factory;
#[cfg(feature = "queue-memory")]
pub mod memory;
pub mod message;
#[cfg(feature = "queue-sqs")]
pub mod sqs;
pub mod transport;

pub use codegate_core::QueueBackend;
pub use error::{QueueError, QueueResult};
pub use factory::create_queue;
#[cfg(feature = "queue-memory")]
pub use memory::{DeadLetteredMessage, InMemoryQueue};
pub use message::{Delivery, LockToken, MessageProperties};
#[cfg(feature = "queue-sqs")]
pub use sqs::SqsQueue;
pub use transport::QueueTransport;
