//! WebhookProcessor - dedup, reconcile and record one authenticated payload.
//!
//! ## How It Works
//!
//! 1. Classify the payload (unreadable payloads are still recorded, as
//!    failed, under their event id or a generated fallback id)
//! 2. Insert the webhook event; a duplicate `(provider, event_id)` ends here
//!    as `AlreadyProcessed` and leaves the stored row untouched
//! 3. Dispatch to the ledger in the same transaction
//! 4. Mark the event processed or skipped and commit
//!
//! ## Error Handling
//!
//! A failed dispatch rolls the whole transaction back, then the event is
//! recorded as failed in a fresh transaction with its retry schedule.
//! Errors never leave the processor; the provider already got its
//! acknowledgment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::foundation::{Provider, WebhookEventId};
use crate::domain::notification::{
    classify, extract_event_id, ClassifiedNotification, RetryPolicy, WebhookError, WebhookEvent,
};
use crate::domain::order::OrderError;
use crate::ports::{Clock, IdGenerator, LedgerStore, LedgerTx, SaveResult};

use super::reconcile::{Disposition, ReconcileDispatcher};

/// Event type recorded for payloads the classifier could not read.
pub const UNRECOGNIZED_EVENT_TYPE: &str = "UNRECOGNIZED";

/// Counters over every payload the processor has seen.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    processed: AtomicU64,
    duplicates: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of `PipelineStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PipelineStatsSnapshot {
    pub received: u64,
    pub processed: u64,
    pub duplicates: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &WebhookOutcome) {
        let counter = match outcome {
            WebhookOutcome::Processed(_) => &self.processed,
            WebhookOutcome::AlreadyProcessed => &self.duplicates,
            WebhookOutcome::Skipped(_) => &self.skipped,
            WebhookOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What happened to one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Reconciled and committed.
    Processed(Disposition),

    /// The event id was already recorded; nothing was done.
    AlreadyProcessed,

    /// Recorded without reconciliation.
    Skipped(String),

    /// Recorded as failed; retryable failures are picked up by the sweeper.
    Failed(WebhookError),
}

impl WebhookOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, WebhookOutcome::Failed(_))
    }
}

pub struct WebhookProcessor {
    store: Arc<dyn LedgerStore>,
    dispatcher: ReconcileDispatcher,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    retry_policy: RetryPolicy,
    stats: Arc<PipelineStats>,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        dispatcher: ReconcileDispatcher,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            ids,
            retry_policy,
            stats: Arc::new(PipelineStats::new()),
        }
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Processes one payload whose envelope the provider adapter has
    /// already authenticated.
    pub async fn process(&self, provider: Provider, payload: &[u8]) -> WebhookOutcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let outcome = match classify(provider, payload) {
            Ok(classified) => self.reconcile(classified, payload).await,
            Err(err) => self.record_unrecognized(provider, payload, err).await,
        };
        self.stats.record(&outcome);
        outcome
    }

    async fn reconcile(&self, classified: ClassifiedNotification, payload: &[u8]) -> WebhookOutcome {
        let event = WebhookEvent::received(
            self.ids.webhook_event_id(),
            classified.provider,
            classified.event_id.clone(),
            classified.event_type(),
            payload,
            self.clock.now(),
        );

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => return self.record_failure(event, WebhookError::from(e)).await,
        };

        let applied = self.apply(tx.as_mut(), &classified, event.clone()).await;
        match applied {
            Ok(Some(outcome)) => {
                let committed = tx.commit().await;
                drop(tx);
                match committed {
                    Ok(()) => {
                        info!(
                            event_id = %classified.event_id,
                            provider = %classified.provider,
                            event_type = %classified.event_type(),
                            "Webhook processed"
                        );
                        outcome
                    }
                    Err(e) => self.record_failure(event, WebhookError::from(e)).await,
                }
            }
            Ok(None) => {
                rollback(tx).await;
                warn!(
                    event_id = %classified.event_id,
                    provider = %classified.provider,
                    "Duplicate webhook ignored"
                );
                WebhookOutcome::AlreadyProcessed
            }
            Err(err) => {
                rollback(tx).await;
                self.record_failure(event, err).await
            }
        }
    }

    /// Dedup insert, dispatch and status update. `None` for a duplicate.
    async fn apply(
        &self,
        tx: &mut dyn LedgerTx,
        classified: &ClassifiedNotification,
        mut event: WebhookEvent,
    ) -> Result<Option<WebhookOutcome>, WebhookError> {
        if tx.insert_webhook_event(&event).await? == SaveResult::AlreadyExists {
            return Ok(None);
        }

        let disposition = self.dispatcher.dispatch(tx, classified).await?;
        let outcome = finish_event(&mut event, disposition, self.clock.now())?;
        tx.update_webhook_event(&event).await?;
        Ok(Some(outcome))
    }

    /// Stores `event` as failed in its own transaction.
    async fn record_failure(&self, mut event: WebhookEvent, err: WebhookError) -> WebhookOutcome {
        log_failure(&event, &err);

        let result = async {
            event
                .mark_failed(&err, &self.retry_policy, self.clock.now())
                .map_err(OrderError::from)?;
            let mut tx = self.store.begin().await?;
            if tx.insert_webhook_event(&event).await? == SaveResult::AlreadyExists {
                // Recorded by a concurrent delivery in the meantime.
                tx.rollback().await?;
                return Ok(false);
            }
            tx.commit().await?;
            Ok::<_, WebhookError>(true)
        }
        .await;

        match result {
            Ok(true) => WebhookOutcome::Failed(err),
            Ok(false) => WebhookOutcome::AlreadyProcessed,
            Err(e) => {
                error!(
                    event_id = %event.event_id,
                    provider = %event.provider,
                    error = %e,
                    "Failed to record webhook failure"
                );
                WebhookOutcome::Failed(err)
            }
        }
    }

    async fn record_unrecognized(
        &self,
        provider: Provider,
        payload: &[u8],
        err: WebhookError,
    ) -> WebhookOutcome {
        let event_id = extract_event_id(provider, payload)
            .unwrap_or_else(|| self.ids.fallback_event_id(provider));
        let event = WebhookEvent::received(
            self.ids.webhook_event_id(),
            provider,
            event_id,
            UNRECOGNIZED_EVENT_TYPE,
            payload,
            self.clock.now(),
        );
        self.record_failure(event, err).await
    }

    /// Replays a failed event. Used by the retry sweeper.
    ///
    /// Returns `AlreadyProcessed` when the event is gone, no longer due, or
    /// locked by another replay.
    pub async fn replay(&self, id: &WebhookEventId) -> Result<WebhookOutcome, WebhookError> {
        let mut tx = self.store.begin().await?;
        let locked = tx.lock_webhook_event(id).await?;
        let event = match locked {
            Some(event) if event.is_due(self.clock.now()) => event,
            _ => {
                rollback(tx).await;
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
        };

        let classified = match classify(event.provider, event.payload.as_bytes()) {
            Ok(classified) => classified,
            Err(err) => {
                rollback(tx).await;
                return self.record_retry_failure(id, err).await;
            }
        };

        let mut updated = event.clone();
        let result = async {
            let disposition = self.dispatcher.dispatch(tx.as_mut(), &classified).await?;
            let outcome = finish_event(&mut updated, disposition, self.clock.now())?;
            tx.update_webhook_event(&updated).await?;
            Ok::<_, WebhookError>(outcome)
        }
        .await;

        let result = match result {
            Ok(outcome) => {
                let committed = tx.commit().await;
                drop(tx);
                committed.map(|_| outcome).map_err(WebhookError::from)
            }
            Err(err) => {
                rollback(tx).await;
                Err(err)
            }
        };

        match result {
            Ok(outcome) => {
                info!(
                    event_id = %event.event_id,
                    provider = %event.provider,
                    retry_count = event.retry_count,
                    "Webhook replayed"
                );
                self.stats.record(&outcome);
                Ok(outcome)
            }
            Err(err) => self.record_retry_failure(id, err).await,
        }
    }

    async fn record_retry_failure(
        &self,
        id: &WebhookEventId,
        err: WebhookError,
    ) -> Result<WebhookOutcome, WebhookError> {
        let mut tx = self.store.begin().await?;
        let locked = tx.lock_webhook_event(id).await?;
        let mut event = match locked {
            Some(event) => event,
            None => {
                rollback(tx).await;
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
        };

        event
            .record_retry_failure(&err, &self.retry_policy, self.clock.now())
            .map_err(OrderError::from)?;
        tx.update_webhook_event(&event).await?;
        tx.commit().await?;

        log_failure(&event, &err);
        let outcome = WebhookOutcome::Failed(err);
        self.stats.record(&outcome);
        Ok(outcome)
    }
}

fn finish_event(
    event: &mut WebhookEvent,
    disposition: Disposition,
    now: crate::domain::foundation::Timestamp,
) -> Result<WebhookOutcome, WebhookError> {
    match disposition {
        Disposition::Skipped(reason) => {
            event.mark_skipped(&reason, now).map_err(OrderError::from)?;
            Ok(WebhookOutcome::Skipped(reason))
        }
        applied @ Disposition::Applied { .. } => {
            event
                .mark_processed(applied.summary(), now)
                .map_err(OrderError::from)?;
            Ok(WebhookOutcome::Processed(applied))
        }
    }
}

fn log_failure(event: &WebhookEvent, err: &WebhookError) {
    if err.is_retryable() {
        warn!(
            event_id = %event.event_id,
            provider = %event.provider,
            retry_count = event.retry_count,
            error = %err,
            "Webhook failed, will retry"
        );
    } else {
        error!(
            event_id = %event.event_id,
            provider = %event.provider,
            error = %err,
            "Webhook failed"
        );
    }
}

async fn rollback(mut tx: Box<dyn LedgerTx>) {
    if let Err(e) = tx.rollback().await {
        debug!(error = %e, "Rollback failed");
    }
}
