//! In-process queue transport.
//!
//! Used for local runs and tests. Lock expiry and delayed redelivery run on tokio's
//! clock, so paused-time tests can step through them.

use crate::message::{Delivery, LockToken, MessageProperties};
use crate::transport::QueueTransport;
use crate::{QueueBackend, QueueError, QueueResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: Vec<u8>,
    properties: MessageProperties,
}

/// A message moved to the dead-letter sink, with the reason it was given.
#[derive(Debug, Clone)]
pub struct DeadLetteredMessage {
    pub message_id: String,
    pub body: Vec<u8>,
    pub properties: MessageProperties,
    pub reason_code: String,
    pub reason_detail: String,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    delayed: Vec<(Instant, StoredMessage)>,
    in_flight: HashMap<LockToken, (Instant, StoredMessage)>,
    dead_letters: Vec<DeadLetteredMessage>,
    acked: u64,
}

impl QueueState {
    /// Move due delayed messages and expired locks back to the ready list.
    fn promote(&mut self, now: Instant) {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|(at, _)| *at <= now);
        self.delayed = waiting;
        self.ready.extend(due.into_iter().map(|(_, message)| message));

        let expired: Vec<LockToken> = self
            .in_flight
            .iter()
            .filter(|(_, (expires, _))| *expires <= now)
            .map(|(token, _)| token.clone())
            .collect();
        for token in expired {
            if let Some((_, message)) = self.in_flight.remove(&token) {
                tracing::debug!(message_id = %message.message_id, "Message lock expired, redelivering");
                self.ready.push_front(message);
            }
        }
    }

    /// Earliest instant at which a delayed message or a lock becomes due.
    fn next_due(&self) -> Option<Instant> {
        self.delayed
            .iter()
            .map(|(at, _)| *at)
            .chain(self.in_flight.values().map(|(expires, _)| *expires))
            .min()
    }

    fn take_locked(&mut self, token: &LockToken, now: Instant) -> QueueResult<StoredMessage> {
        match self.in_flight.remove(token) {
            Some((expires, message)) if expires > now => Ok(message),
            Some((_, message)) => {
                self.ready.push_front(message);
                Err(QueueError::LockLost(token.to_string()))
            }
            None => Err(QueueError::LockLost(token.to_string())),
        }
    }
}

/// FIFO queue held in memory, shared between producers and consumers of one process.
pub struct InMemoryQueue {
    name: String,
    lock_duration: Duration,
    receive_wait: Duration,
    state: Mutex<QueueState>,
    available: Notify,
}

impl InMemoryQueue {
    /// # Arguments
    /// * `name` - Queue name, used in logs
    /// * `lock_duration` - How long a received message stays locked without renewal
    /// * `receive_wait` - Upper bound for a single `receive` call
    pub fn new(name: impl Into<String>, lock_duration: Duration, receive_wait: Duration) -> Self {
        Self {
            name: name.into(),
            lock_duration,
            receive_wait,
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
        }
    }

    /// Messages moved to the dead-letter sink so far, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetteredMessage> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Messages not yet settled: ready, delayed and in flight.
    pub async fn pending_count(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.delayed.len() + state.in_flight.len()
    }

    /// Number of messages settled with `ack`.
    pub async fn acked_count(&self) -> u64 {
        self.state.lock().await.acked
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn send(&self, body: Vec<u8>, properties: MessageProperties) -> QueueResult<String> {
        let message_id = Uuid::new_v4().to_string();
        self.state.lock().await.ready.push_back(StoredMessage {
            message_id: message_id.clone(),
            body,
            properties,
        });
        self.available.notify_waiters();
        tracing::debug!(queue = %self.name, message_id = %message_id, "Message sent");
        Ok(message_id)
    }

    async fn receive(&self) -> QueueResult<Option<Delivery>> {
        let deadline = Instant::now() + self.receive_wait;

        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.promote(now);

                if let Some(message) = state.ready.pop_front() {
                    let token = LockToken(Uuid::new_v4().to_string());
                    let delivery = Delivery {
                        message_id: message.message_id.clone(),
                        body: message.body.clone(),
                        properties: message.properties.clone(),
                        lock_token: token.clone(),
                    };
                    state
                        .in_flight
                        .insert(token, (now + self.lock_duration, message));
                    return Ok(Some(delivery));
                }

                if now >= deadline {
                    return Ok(None);
                }
                state.next_due().map_or(deadline, |due| due.min(deadline))
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = sleep_until(wake_at) => {}
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let message = state.take_locked(&delivery.lock_token, Instant::now())?;
        state.acked += 1;
        tracing::debug!(queue = %self.name, message_id = %message.message_id, "Message acknowledged");
        Ok(())
    }

    async fn abandon(
        &self,
        delivery: &Delivery,
        properties: MessageProperties,
        delay: Duration,
    ) -> QueueResult<()> {
        {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let mut message = state.take_locked(&delivery.lock_token, now)?;
            message.properties = properties;
            tracing::debug!(
                queue = %self.name,
                message_id = %message.message_id,
                delay_secs = delay.as_secs(),
                "Message abandoned"
            );
            if delay.is_zero() {
                state.ready.push_back(message);
            } else {
                state.delayed.push((now + delay, message));
            }
        }
        self.available.notify_waiters();
        Ok(())
    }

    async fn dead_letter(
        &self,
        delivery: &Delivery,
        reason_code: &str,
        reason_detail: &str,
    ) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let message = state.take_locked(&delivery.lock_token, Instant::now())?;
        tracing::debug!(
            queue = %self.name,
            message_id = %message.message_id,
            reason_code = %reason_code,
            "Message dead-lettered"
        );
        state.dead_letters.push(DeadLetteredMessage {
            message_id: message.message_id,
            body: message.body,
            properties: message.properties,
            reason_code: reason_code.to_string(),
            reason_detail: reason_detail.to_string(),
        });
        Ok(())
    }

    async fn renew_lock(&self, token: &LockToken) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        match state.in_flight.get_mut(token) {
            Some((expires, _)) if *expires > now => {
                *expires = now + self.lock_duration;
                Ok(())
            }
            _ => Err(QueueError::LockLost(token.to_string())),
        }
    }

    fn backend_type(&self) -> QueueBackend {
        QueueBackend::Memory
    }
}
