//! Report processor: receive loop, worker slots, retry with backoff, dead-lettering.
//!
//! Each received message is settled exactly once. Retryable outcomes are abandoned
//! with an incremented `AttemptCount` until the attempt budget is spent; terminal
//! outcomes, exhausted budgets, undecodable bodies and unexpected failures go to the
//! dead-letter sink.
//!
//! Shutdown: [`ProcessorHandle::shutdown`] stops receiving, cuts any backoff wait
//! short and waits for in-flight messages to be settled.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use codegate_core::constants::{
    ATTEMPT_COUNT_PROPERTY, DEAD_LETTER_DESERIALIZATION_ERROR, DEAD_LETTER_PROCESSING_FAILED,
    DEAD_LETTER_RETRIES_EXHAUSTED, DEAD_LETTER_UNEXPECTED_ERROR, MAX_RETRY_ATTEMPTS,
};
use codegate_core::{BackoffMode, Config, ProcessingOutcome, StoredReport};
use codegate_queue::{Delivery, QueueTransport};

use crate::decision::ProcessingDecision;

/// Maximum delay in seconds before a retry. Caps exponential backoff so a large
/// attempt budget does not produce excessively long waits.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Pause after a failed receive before polling the transport again.
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Backoff in seconds before the given attempt runs (exponential with cap).
#[inline]
pub fn compute_retry_backoff_seconds(base_secs: u64, next_attempt: u32) -> u64 {
    base_secs
        .saturating_pow(next_attempt)
        .min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// A message makes at most this many attempts before it is dead-lettered.
    pub max_retry_attempts: u32,
    pub max_concurrent_messages: usize,
    pub backoff_mode: BackoffMode,
    pub backoff_base_secs: u64,
    pub lock_renewal_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            max_concurrent_messages: 1,
            backoff_mode: BackoffMode::Blocking,
            backoff_base_secs: 2,
            lock_renewal_interval: Duration::from_secs(20),
        }
    }
}

impl ProcessorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retry_attempts: config.processor_max_retry_attempts(),
            max_concurrent_messages: config.processor_max_concurrent_messages(),
            backoff_mode: config.processor_backoff_mode(),
            backoff_base_secs: config.processor_backoff_base_secs(),
            lock_renewal_interval: Duration::from_secs(config.lock_renewal_interval_secs()),
        }
    }
}

/// How a delivery was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    /// Released for redelivery as `attempt`, after `backoff`.
    Abandoned { attempt: u32, backoff: Duration },
    DeadLettered { reason_code: String, reason_detail: String },
    /// The transport refused the settlement; the lock will expire and the message
    /// will be redelivered.
    Unsettled,
}

#[derive(Clone)]
pub struct ReportProcessor {
    queue: Arc<dyn QueueTransport>,
    decision: Arc<ProcessingDecision>,
    config: ProcessorConfig,
}

/// Handle to a running processor.
pub struct ProcessorHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl ProcessorHandle {
    /// Stop receiving and wait for in-flight messages to be settled.
    pub async fn shutdown(self) {
        tracing::info!("Initiating report processor shutdown");
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Report processor task failed");
        }
    }
}

impl ReportProcessor {
    pub fn new(
        queue: Arc<dyn QueueTransport>,
        decision: Arc<ProcessingDecision>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            queue,
            decision,
            config,
        }
    }

    /// Run the processor on a background task.
    pub fn spawn(self) -> ProcessorHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        ProcessorHandle { shutdown, join }
    }

    /// Receive and process messages until `shutdown` is cancelled, then wait for
    /// in-flight messages.
    pub async fn run(&self, shutdown: CancellationToken) {
        let slots = self.config.max_concurrent_messages.max(1);
        tracing::info!(
            max_concurrent_messages = slots,
            max_retry_attempts = self.config.max_retry_attempts,
            backoff_mode = %self.config.backoff_mode,
            queue_backend = %self.queue.backend_type(),
            "Report processor started"
        );

        let semaphore = Arc::new(Semaphore::new(slots));

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.queue.receive() => received,
            };

            match received {
                Ok(Some(delivery)) => {
                    let this = self.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        this.process(delivery, &shutdown).await;
                    });
                }
                Ok(None) => {
                    tracing::trace!("No messages available");
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(error = %e, "Failed to receive from queue");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_PAUSE) => {}
                    }
                }
            }
        }

        tracing::info!("Report processor waiting for in-flight messages");
        let _ = semaphore.acquire_many(slots as u32).await;
        tracing::info!("Report processor stopped");
    }

    /// Process one delivery: decide, settle, and in blocking mode wait out the backoff.
    pub async fn process(&self, delivery: Delivery, shutdown: &CancellationToken) -> Settlement {
        let settlement = self.handle(&delivery).await;

        if let Settlement::Abandoned { backoff, .. } = settlement {
            if self.config.backoff_mode == BackoffMode::Blocking && !backoff.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!(message_id = %delivery.message_id, "Backoff cut short by shutdown");
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        settlement
    }

    /// Decide and settle one delivery, renewing its lock meanwhile.
    #[tracing::instrument(skip(self, delivery), fields(message_id = %delivery.message_id))]
    pub async fn handle(&self, delivery: &Delivery) -> Settlement {
        let renewal = self.spawn_lock_renewal(delivery);
        let verdict = AssertUnwindSafe(self.evaluate(delivery)).catch_unwind().await;
        renewal.abort();

        let verdict = verdict.unwrap_or_else(|panic| {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "processing panicked".to_string());
            Verdict::DeadLetter(DEAD_LETTER_UNEXPECTED_ERROR, detail)
        });

        self.settle(delivery, verdict).await
    }

    async fn evaluate(&self, delivery: &Delivery) -> Verdict {
        let report = match decode_report(&delivery.body) {
            Ok(report) => report,
            Err(detail) => {
                tracing::warn!(error = %detail, "Undecodable report message");
                return Verdict::DeadLetter(DEAD_LETTER_DESERIALIZATION_ERROR, detail);
            }
        };

        let attempt = delivery
            .properties
            .get_u32(ATTEMPT_COUNT_PROPERTY)
            .filter(|attempt| *attempt >= 1)
            .unwrap_or(1);

        let outcome = match self.decision.decide(&report).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, attempt, "Unexpected processing failure");
                return Verdict::DeadLetter(DEAD_LETTER_UNEXPECTED_ERROR, format!("{:#}", e));
            }
        };

        match outcome {
            ProcessingOutcome::Accepted => Verdict::Ack,
            ProcessingOutcome::Retryable { reason } if attempt < self.config.max_retry_attempts => {
                let next_attempt = attempt + 1;
                let backoff = Duration::from_secs(compute_retry_backoff_seconds(
                    self.config.backoff_base_secs,
                    next_attempt,
                ));
                tracing::info!(
                    storage_path = %report.storage_path,
                    attempt,
                    next_attempt,
                    backoff_seconds = backoff.as_secs(),
                    reason = %reason,
                    "Scheduling report retry"
                );
                Verdict::Retry {
                    next_attempt,
                    backoff,
                }
            }
            ProcessingOutcome::Retryable { reason } => {
                tracing::warn!(
                    storage_path = %report.storage_path,
                    attempt,
                    reason = %reason,
                    "Report retries exhausted"
                );
                Verdict::DeadLetter(DEAD_LETTER_RETRIES_EXHAUSTED, reason)
            }
            ProcessingOutcome::Terminal { reason } => {
                tracing::warn!(
                    storage_path = %report.storage_path,
                    attempt,
                    reason = %reason,
                    "Report processing failed"
                );
                Verdict::DeadLetter(DEAD_LETTER_PROCESSING_FAILED, reason)
            }
        }
    }

    async fn settle(&self, delivery: &Delivery, verdict: Verdict) -> Settlement {
        let (result, settlement) = match verdict {
            Verdict::Ack => (self.queue.ack(delivery).await, Settlement::Acked),
            Verdict::Retry {
                next_attempt,
                backoff,
            } => {
                let mut properties = delivery.properties.clone();
                properties.set(ATTEMPT_COUNT_PROPERTY, next_attempt);
                let delay = match self.config.backoff_mode {
                    BackoffMode::Blocking => Duration::ZERO,
                    BackoffMode::Delayed => backoff,
                };
                (
                    self.queue.abandon(delivery, properties, delay).await,
                    Settlement::Abandoned {
                        attempt: next_attempt,
                        backoff,
                    },
                )
            }
            Verdict::DeadLetter(reason_code, reason_detail) => (
                self.queue
                    .dead_letter(delivery, reason_code, &reason_detail)
                    .await,
                Settlement::DeadLettered {
                    reason_code: reason_code.to_string(),
                    reason_detail,
                },
            ),
        };

        match result {
            Ok(()) => {
                tracing::info!(settlement = ?settlement, "Message settled");
                settlement
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    lock_lost = e.is_lock_lost(),
                    settlement = ?settlement,
                    "Failed to settle message; it will be redelivered after lock expiry"
                );
                Settlement::Unsettled
            }
        }
    }

    fn spawn_lock_renewal(&self, delivery: &Delivery) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let token = delivery.lock_token.clone();
        let period = self.config.lock_renewal_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match queue.renew_lock(&token).await {
                    Ok(()) => tracing::trace!("Message lock renewed"),
                    Err(e) if e.is_lock_lost() => {
                        tracing::warn!(error = %e, "Message lock lost during processing");
                        break;
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to renew message lock"),
                }
            }
        })
    }
}

enum Verdict {
    Ack,
    Retry { next_attempt: u32, backoff: Duration },
    DeadLetter(&'static str, String),
}

fn decode_report(body: &[u8]) -> Result<StoredReport, String> {
    let text = std::str::from_utf8(body).map_err(|e| format!("Body is not UTF-8: {}", e))?;
    StoredReport::from_message_body(text).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{AcceptAllAnalyzer, REASON_INFECTED, REASON_SCAN_NOT_COMPLETE};
    use crate::testing::{report, FixedStatusStore};
    use codegate_core::constants::MESSAGE_CONTENT_TYPE;
    use codegate_core::ScanStatus;
    use codegate_queue::{InMemoryQueue, MessageProperties};

    fn queue() -> Arc<InMemoryQueue> {
        Arc::new(InMemoryQueue::new(
            "reports",
            Duration::from_secs(60),
            Duration::from_secs(1),
        ))
    }

    fn processor(
        queue: Arc<InMemoryQueue>,
        status: ScanStatus,
        config: ProcessorConfig,
    ) -> ReportProcessor {
        let decision = ProcessingDecision::new(
            Arc::new(FixedStatusStore::new(status)),
            Arc::new(AcceptAllAnalyzer),
            true,
        );
        ReportProcessor::new(queue, Arc::new(decision), config)
    }

    async fn deliver(queue: &InMemoryQueue, body: Vec<u8>, attempt: Option<u32>) -> Delivery {
        let mut properties = MessageProperties::new(MESSAGE_CONTENT_TYPE);
        if let Some(attempt) = attempt {
            properties.set(ATTEMPT_COUNT_PROPERTY, attempt);
        }
        queue.send(body, properties).await.unwrap();
        queue.receive().await.unwrap().unwrap()
    }

    fn body() -> Vec<u8> {
        report().to_message_body().unwrap().into_bytes()
    }

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(2, 2), 4);
        assert_eq!(compute_retry_backoff_seconds(2, 4), 16);
        assert_eq!(compute_retry_backoff_seconds(2, 5), 32);
        assert_eq!(compute_retry_backoff_seconds(2, 9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(10, 40), MAX_RETRY_BACKOFF_SECS);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_report_is_acked_once() {
        let queue = queue();
        let processor = processor(queue.clone(), ScanStatus::Clean, ProcessorConfig::default());
        let delivery = deliver(&queue, body(), Some(1)).await;

        assert_eq!(processor.handle(&delivery).await, Settlement::Acked);
        assert_eq!(queue.acked_count().await, 1);
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_body_dead_lettered_on_first_delivery() {
        let queue = queue();
        let processor = processor(queue.clone(), ScanStatus::Clean, ProcessorConfig::default());
        let delivery = deliver(&queue, b"{not json".to_vec(), Some(1)).await;

        let settlement = processor.handle(&delivery).await;
        assert!(matches!(
            settlement,
            Settlement::DeadLettered { ref reason_code, .. } if reason_code == DEAD_LETTER_DESERIALIZATION_ERROR
        ));
        assert_eq!(queue.dead_letters().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_attempt_count_defaults_to_first_attempt() {
        let queue = queue();
        let processor = processor(queue.clone(), ScanStatus::Scanning, ProcessorConfig::default());
        let delivery = deliver(&queue, body(), None).await;

        assert_eq!(
            processor.handle(&delivery).await,
            Settlement::Abandoned {
                attempt: 2,
                backoff: Duration::from_secs(4)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_outcome_abandons_with_incremented_attempt() {
        for attempt in 1..MAX_RETRY_ATTEMPTS {
            let queue = queue();
            let processor =
                processor(queue.clone(), ScanStatus::NotScanned, ProcessorConfig::default());
            let delivery = deliver(&queue, body(), Some(attempt)).await;

            let settlement = processor.handle(&delivery).await;
            assert!(
                matches!(settlement, Settlement::Abandoned { attempt: next, .. } if next == attempt + 1)
            );

            let redelivered = queue.receive().await.unwrap().unwrap();
            assert_eq!(
                redelivered.properties.get_u32(ATTEMPT_COUNT_PROPERTY),
                Some(attempt + 1)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhausted_at_fifth_attempt() {
        let queue = queue();
        let processor = processor(queue.clone(), ScanStatus::Scanning, ProcessorConfig::default());
        let delivery = deliver(&queue, body(), Some(MAX_RETRY_ATTEMPTS)).await;

        processor.handle(&delivery).await;

        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason_code, DEAD_LETTER_RETRIES_EXHAUSTED);
        assert_eq!(dead[0].reason_detail, REASON_SCAN_NOT_COMPLETE);
    }

    #[tokio::test(start_paused = true)]
    async fn infected_never_retried() {
        let queue = queue();
        let processor = processor(queue.clone(), ScanStatus::Infected, ProcessorConfig::default());
        let delivery = deliver(&queue, body(), Some(1)).await;

        processor.handle(&delivery).await;

        let dead = queue.dead_letters().await;
        assert_eq!(dead[0].reason_code, DEAD_LETTER_PROCESSING_FAILED);
        assert_eq!(dead[0].reason_detail, REASON_INFECTED);
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_lookup_failure_is_unexpected() {
        let queue = queue();
        let store = FixedStatusStore::new(ScanStatus::Clean);
        store.fail_lookups();
        let decision = ProcessingDecision::new(Arc::new(store), Arc::new(AcceptAllAnalyzer), true);
        let processor = ReportProcessor::new(
            queue.clone(),
            Arc::new(decision),
            ProcessorConfig::default(),
        );
        let delivery = deliver(&queue, body(), Some(1)).await;

        processor.handle(&delivery).await;

        let dead = queue.dead_letters().await;
        assert_eq!(dead[0].reason_code, DEAD_LETTER_UNEXPECTED_ERROR);
        assert!(dead[0].reason_detail.contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_mode_hands_backoff_to_transport() {
        let queue = queue();
        let config = ProcessorConfig {
            backoff_mode: BackoffMode::Delayed,
            ..Default::default()
        };
        let processor = processor(queue.clone(), ScanStatus::Scanning, config);
        let delivery = deliver(&queue, body(), Some(3)).await;

        let start = tokio::time::Instant::now();
        processor.process(delivery, &CancellationToken::new()).await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        let redelivered = queue.receive().await;
        // Receive window (1 s) is shorter than the 16 s transport delay.
        assert!(redelivered.unwrap().is_none());
        assert_eq!(queue.pending_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn settling_an_expired_lock_leaves_message_for_redelivery() {
        let queue = Arc::new(InMemoryQueue::new(
            "reports",
            Duration::from_secs(5),
            Duration::from_secs(1),
        ));
        let processor = processor(queue.clone(), ScanStatus::Clean, ProcessorConfig::default());
        let delivery = deliver(&queue, body(), Some(1)).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(processor.handle(&delivery).await, Settlement::Unsettled);
        assert_eq!(queue.pending_count().await, 1);
    }
}
